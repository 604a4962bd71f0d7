//! Runs the agent directly against a pre-cloned workspace (spec.md §4.5
//! "InProcessExecutor"). The coding pipeline reads the on-disk result itself;
//! this executor never captures a patch.

use controller_core::{ControllerError, ControllerResult, TaskKind, TaskParams, TaskResult};
use controller_llm::AgentSession;

pub struct InProcessExecutor {
    session: AgentSession,
}

impl InProcessExecutor {
    pub fn new(session: AgentSession) -> Self {
        Self { session }
    }

    pub async fn execute(&self, params: &TaskParams) -> ControllerResult<TaskResult> {
        let working_directory = params.working_directory.as_deref().ok_or_else(|| {
            ControllerError::Validation("in-process execution requires TaskParams.working_directory".into())
        })?;

        let summary_text = self
            .session
            .run_agent_session(
                &params.system_prompt,
                &params.user_prompt,
                Some(std::path::Path::new(working_directory)),
                params.timeout,
            )
            .await?;

        Ok(match params.kind {
            TaskKind::MrReview => TaskResult::Review { summary_text },
            TaskKind::MrCopilotCommand | TaskKind::JiraCoding => TaskResult::Coding {
                summary_text,
                patch_bytes: Vec::new(),
                base_commit_sha: String::new(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use controller_core::config::LlmConfig;
    use std::time::Duration;

    fn params(kind: TaskKind, working_directory: Option<String>) -> TaskParams {
        TaskParams {
            task_id: "t1".into(),
            kind,
            repo_clone_url: "https://gitlab.example.com/a/b.git".into(),
            branch: "main".into(),
            system_prompt: "you are an agent".into(),
            user_prompt: "do the thing".into(),
            timeout: Duration::from_millis(1),
            working_directory,
        }
    }

    #[tokio::test]
    async fn rejects_missing_working_directory() {
        let cfg = LlmConfig {
            kind: "ollama".into(),
            base_url: Some("http://127.0.0.1:1".into()),
            api_key: String::new(),
            model: "m".into(),
        };
        let executor = InProcessExecutor::new(AgentSession::from_config(&cfg).unwrap());
        let result = executor.execute(&params(TaskKind::MrReview, None)).await;
        assert!(matches!(result, Err(ControllerError::Validation(_))));
    }

    #[tokio::test]
    async fn propagates_agent_timeout() {
        let cfg = LlmConfig {
            kind: "ollama".into(),
            base_url: Some("http://127.0.0.1:1".into()),
            api_key: String::new(),
            model: "m".into(),
        };
        let executor = InProcessExecutor::new(AgentSession::from_config(&cfg).unwrap());
        let result = executor
            .execute(&params(TaskKind::JiraCoding, Some("/tmp".into())))
            .await;
        assert!(matches!(result, Err(ControllerError::AgentTimeout(_))));
    }
}
