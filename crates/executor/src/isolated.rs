//! `IsolatedWorkerExecutor` — runs the task in a disposable worker so the
//! agent's filesystem access is bounded and the controller never exposes
//! its write-capable credentials to the agent (spec.md §4.5 steps 1-7).

use std::time::{Duration, Instant};

use controller_core::config::WorkerRuntimeConfig;
use controller_core::{ControllerError, ControllerResult, TaskParams, TaskResult};
use controller_store::Store;

use crate::orchestrator::{WorkerOrchestratorClient, WorkerPhase, WorkerSpec};

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Serializes `TaskKind` the same way the wire/store JSON does (`mr_review`,
/// not the Rust variant name), so the worker's own env parsing matches.
fn task_kind_env_value(kind: controller_core::TaskKind) -> String {
    serde_json::to_value(kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

pub struct IsolatedWorkerExecutor {
    orchestrator: WorkerOrchestratorClient,
    store: Store,
    shared_store_url: String,
    worker_runtime: WorkerRuntimeConfig,
}

impl IsolatedWorkerExecutor {
    pub fn new(
        orchestrator: WorkerOrchestratorClient,
        store: Store,
        shared_store_url: String,
        worker_runtime: WorkerRuntimeConfig,
    ) -> Self {
        Self { orchestrator, store, shared_store_url, worker_runtime }
    }

    fn worker_name(task_id: &str) -> String {
        format!("agent-worker-{task_id}")
    }

    pub async fn execute(&self, params: &TaskParams) -> ControllerResult<TaskResult> {
        let name = Self::worker_name(&params.task_id);

        // Step 2: idempotent retry — a previous attempt may already have
        // published a result for this task id.
        if let Some(result) = self.store.get_result(&params.task_id).await? {
            tracing::debug!(task_id = %params.task_id, "isolated worker result already cached");
            return Ok(result);
        }

        // Step 3: stale remnants from a prior attempt must not return stale
        // results — only a still-running worker is reused.
        match self.orchestrator.get_worker_phase(&name).await? {
            WorkerPhase::NotFound => self.create_worker(&name, params).await?,
            WorkerPhase::Running => {}
            WorkerPhase::Succeeded | WorkerPhase::Failed => {
                self.orchestrator.delete_worker(&name).await?;
                self.create_worker(&name, params).await?;
            }
        }

        // Step 5: poll to terminal state or timeout.
        let deadline = Instant::now() + params.timeout;
        let phase = loop {
            let phase = self.orchestrator.get_worker_phase(&name).await?;
            if matches!(phase, WorkerPhase::Succeeded | WorkerPhase::Failed) {
                break phase;
            }
            if Instant::now() >= deadline {
                self.orchestrator.delete_worker(&name).await?;
                return Err(ControllerError::AgentTimeout(params.timeout));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        };

        if phase == WorkerPhase::Failed {
            return Err(ControllerError::Transient(format!("worker {name} terminated without success")));
        }

        // Step 6: read the published result, falling back to the worker's
        // last annotation if the store entry is missing.
        let result = match self.store.get_result(&params.task_id).await? {
            Some(result) => result,
            None => self
                .orchestrator
                .last_annotation_result(&name)
                .await?
                .ok_or_else(|| ControllerError::ResultInvalid(format!("worker {name} published no result")))?,
        };

        // Step 7: leave the worker for the orchestrator's TTL-after-finished
        // reaper; return the parsed result.
        Ok(result)
    }

    async fn create_worker(&self, name: &str, params: &TaskParams) -> ControllerResult<()> {
        let mut runtime = self.worker_runtime.clone();
        runtime.timeout = params.timeout;
        let env = vec![
            ("TASK_KIND", task_kind_env_value(params.kind)),
            ("TASK_ID", params.task_id.clone()),
            ("REPO_URL", params.repo_clone_url.clone()),
            ("BRANCH", params.branch.clone()),
            ("SYSTEM_PROMPT", params.system_prompt.clone()),
            ("USER_PROMPT", params.user_prompt.clone()),
            ("SHARED_STORE_URL", self.shared_store_url.clone()),
            ("TASK_TIMEOUT_SECS", params.timeout.as_secs().to_string()),
        ];
        self.orchestrator
            .create_worker(&WorkerSpec { name: name.to_string(), env, runtime: &runtime })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_name_is_stable_and_namespaced() {
        let name = IsolatedWorkerExecutor::worker_name("abc123");
        assert_eq!(name, "agent-worker-abc123");
    }
}
