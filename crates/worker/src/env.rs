//! Reads the worker's inputs from the environment the orchestrator set up
//! (spec.md §4.6 "Inputs from env"): the task-specific vars the executor
//! passes explicitly, plus forge/LLM credentials mounted from the
//! platform's secret/config store as plain env vars alongside them.

use std::time::Duration;

use controller_core::config::LlmConfig;
use controller_core::{ControllerError, ControllerResult, TaskKind};

pub struct WorkerEnv {
    pub task_kind: TaskKind,
    pub task_id: String,
    pub repo_url: String,
    pub branch: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub shared_store_url: String,
    pub timeout: Duration,
    pub forge_base_url: String,
    pub forge_token: String,
    pub llm: LlmConfig,
}

fn must_env(name: &str) -> ControllerResult<String> {
    std::env::var(name).map_err(|_| ControllerError::ConfigInvalid(format!("missing required env var: {name}")))
}

impl WorkerEnv {
    pub fn from_env() -> ControllerResult<Self> {
        let task_kind_raw = must_env("TASK_KIND")?;
        let task_kind: TaskKind = serde_json::from_value(serde_json::Value::String(task_kind_raw.clone()))
            .map_err(|_| ControllerError::ConfigInvalid(format!("unrecognized TASK_KIND: {task_kind_raw}")))?;

        let timeout_secs: u64 = must_env("TASK_TIMEOUT_SECS")?
            .parse()
            .map_err(|_| ControllerError::ConfigInvalid("TASK_TIMEOUT_SECS must be a u64".into()))?;

        Ok(Self {
            task_kind,
            task_id: must_env("TASK_ID")?,
            repo_url: must_env("REPO_URL")?,
            branch: must_env("BRANCH")?,
            system_prompt: must_env("SYSTEM_PROMPT")?,
            user_prompt: must_env("USER_PROMPT")?,
            shared_store_url: must_env("SHARED_STORE_URL")?,
            timeout: Duration::from_secs(timeout_secs),
            forge_base_url: must_env("FORGE_BASE_URL")?,
            forge_token: must_env("FORGE_TOKEN")?,
            llm: LlmConfig {
                kind: must_env("LLM_KIND")?,
                base_url: std::env::var("LLM_BASE_URL").ok().filter(|v| !v.is_empty()),
                api_key: must_env("LLM_API_KEY")?,
                model: must_env("LLM_MODEL")?,
            },
        })
    }
}

/// Validates that `repo_url`'s authority matches `forge_base_url`'s,
/// preventing a forged task from pointing the worker's credentials at an
/// arbitrary host (spec.md §4.6 step 1).
pub fn validate_repo_authority(repo_url: &str, forge_base_url: &str) -> ControllerResult<()> {
    let repo_authority = authority_of(repo_url)?;
    let forge_authority = authority_of(forge_base_url)?;
    if repo_authority != forge_authority {
        return Err(ControllerError::Validation(format!(
            "REPO_URL authority ({repo_authority}) does not match configured forge base"
        )));
    }
    Ok(())
}

fn authority_of(url: &str) -> ControllerResult<String> {
    let scheme_end = url
        .find("://")
        .ok_or_else(|| ControllerError::Validation(format!("url missing scheme: {url}")))?;
    let rest = &url[scheme_end + 3..];
    let authority = rest.split('/').next().unwrap_or("");
    if authority.is_empty() {
        return Err(ControllerError::Validation(format!("url missing authority: {url}")));
    }
    Ok(authority.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authority_matches_ignores_path_and_case() {
        assert!(validate_repo_authority(
            "https://GitLab.example.com/group/project.git",
            "https://gitlab.example.com"
        )
        .is_ok());
    }

    #[test]
    fn authority_mismatch_rejected() {
        assert!(validate_repo_authority("https://evil.example.com/a/b.git", "https://gitlab.example.com").is_err());
    }
}
