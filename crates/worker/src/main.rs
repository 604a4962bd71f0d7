//! Isolated-worker entrypoint (spec.md §4.6): clone → agent session →
//! stage-and-diff → publish `TaskResult` to the shared store. Bootstrap
//! grounded on the teacher's root binary (`dotenvy::dotenv()` +
//! `#[tokio::main]`), generalized to exit non-zero on any error so the
//! `IsolatedWorkerExecutor` can read worker logs for diagnosis.

mod coding_output;
mod env;

use std::time::Duration;

use controller_core::{ControllerError, ControllerResult, RepoRef, TaskKind, TaskResult};
use controller_llm::AgentSession;
use controller_store::Store;
use tracing::{error, info, warn};

use coding_output::parse_coding_output;
use env::{validate_repo_authority, WorkerEnv};

const RESULT_TTL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() {
    // Containerized workers don't ship a .env file; a missing one is not an
    // error, unlike the controller's own bootstrap.
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(err) = run().await {
        error!(error = %err, "worker run failed");
        std::process::exit(1);
    }
}

async fn run() -> ControllerResult<()> {
    let env = WorkerEnv::from_env()?;
    validate_repo_authority(&env.repo_url, &env.forge_base_url)?;

    let store = Store::shared(&env.shared_store_url).await?;
    let repo = RepoRef::parse(&env.repo_url, false)?;
    let clone_dir = std::env::temp_dir();

    info!(task_id = %env.task_id, kind = ?env.task_kind, "cloning workspace");
    let workspace = controller_git_workspace::clone(&repo, &env.branch, &env.forge_token, &clone_dir, env.timeout).await?;

    let session = AgentSession::from_config(&env.llm)?;
    let agent_output = session
        .run_agent_session(&env.system_prompt, &env.user_prompt, Some(workspace.as_path()), env.timeout)
        .await?;

    let result = match env.task_kind {
        TaskKind::MrReview => TaskResult::Review { summary_text: agent_output },
        TaskKind::MrCopilotCommand | TaskKind::JiraCoding => build_coding_result(&workspace, &agent_output).await?,
    };

    store.put_result(&env.task_id, &result, RESULT_TTL).await?;
    info!(task_id = %env.task_id, "published result");
    Ok(())
}

async fn build_coding_result(workspace: &std::path::Path, agent_output: &str) -> ControllerResult<TaskResult> {
    let (files_touched, summary_text) = match parse_coding_output(agent_output) {
        Some(out) => (out.files_touched, out.summary),
        None => {
            warn!("agent produced no structured files_touched block; falling back to a working-tree status scan");
            let changed = controller_git_workspace::changed_paths(workspace).await?;
            (changed, agent_output.to_string())
        }
    };

    if files_touched.is_empty() {
        return Ok(TaskResult::EmptyCoding { summary_text });
    }

    controller_git_workspace::stage_paths(workspace, &files_touched).await?;
    let base_commit_sha = controller_git_workspace::head_sha(workspace).await?;
    let patch_bytes = controller_git_workspace::staged_diff(workspace).await?;

    if patch_bytes.is_empty() {
        return Ok(TaskResult::EmptyCoding { summary_text });
    }
    controller_git_workspace::validate_patch(&patch_bytes)?;

    let result = TaskResult::Coding { summary_text, patch_bytes, base_commit_sha };
    result
        .validate()
        .map_err(ControllerError::ResultInvalid)?;
    Ok(result)
}
