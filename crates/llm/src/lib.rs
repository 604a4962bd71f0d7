//! Thin agent-session-runner abstraction: `(system_prompt, user_prompt,
//! working_directory, timeout) → text result`, the "opaque callable"
//! spec.md §1 carves the actual LLM session out of scope for.
//!
//! Enum-dispatch (no `async-trait`, no `Box<dyn>`), the house rule stated in
//! `mr-reviewer/src/review/llm.rs`. Provider bodies adapted from
//! `ai-llm-service`'s `ollama_service.rs`/`open_ai_service.rs`.

mod ollama;
mod openai;

use std::path::Path;
use std::time::Duration;

use controller_core::config::LlmConfig;
use controller_core::instructions::discover_instructions;
use controller_core::{ControllerError, ControllerResult};

use ollama::OllamaAgent;
use openai::OpenAiAgent;

/// Thin enum client for dispatch, mirroring `LlmClient` in the teacher.
pub enum AgentSession {
    Ollama(OllamaAgent),
    OpenAi(OpenAiAgent),
}

impl AgentSession {
    /// Constructs the session runner for the configured provider
    /// (spec.md §6 "LLM credential or BYOK {kind, base URL, api key, model}").
    pub fn from_config(cfg: &LlmConfig) -> ControllerResult<Self> {
        let base_url = cfg
            .base_url
            .as_deref()
            .ok_or_else(|| ControllerError::ConfigInvalid("LLM base_url is required".into()))?;

        match cfg.kind.as_str() {
            "ollama" => Ok(Self::Ollama(OllamaAgent::new(reqwest::Client::new(), base_url, cfg.model.clone()))),
            "openai" => Ok(Self::OpenAi(OpenAiAgent::new(base_url, &cfg.api_key, cfg.model.clone())?)),
            other => Err(ControllerError::ConfigInvalid(format!("unsupported LLM kind: {other}"))),
        }
    }

    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> ControllerResult<String> {
        match self {
            Self::Ollama(c) => c.generate(system_prompt, user_prompt).await,
            Self::OpenAi(c) => c.generate(system_prompt, user_prompt).await,
        }
    }

    /// Runs one agent session against `working_directory`, prepending any
    /// discovered repo-level instructions (AGENTS.md/CLAUDE.md/etc, spec.md
    /// §1 "repo-level skills/agents/instructions discovery") to the system
    /// prompt, and enforcing `timeout` (spec.md §4.5/§5: per-call timeout,
    /// default floor 300s).
    pub async fn run_agent_session(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        working_directory: Option<&Path>,
        timeout: Duration,
    ) -> ControllerResult<String> {
        let augmented_system_prompt = match working_directory {
            Some(dir) => {
                let instructions = discover_instructions(dir);
                if instructions.is_empty() {
                    system_prompt.to_string()
                } else {
                    format!("{system_prompt}\n\n{}", instructions.join("\n\n"))
                }
            }
            None => system_prompt.to_string(),
        };

        match tokio::time::timeout(timeout, self.generate(&augmented_system_prompt, user_prompt)).await {
            Ok(result) => result,
            Err(_) => Err(ControllerError::AgentTimeout(timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_rejects_unsupported_kind() {
        let cfg = LlmConfig {
            kind: "anthropic".into(),
            base_url: Some("https://api.anthropic.com".into()),
            api_key: "key".into(),
            model: "claude".into(),
        };
        assert!(matches!(AgentSession::from_config(&cfg), Err(ControllerError::ConfigInvalid(_))));
    }

    #[test]
    fn from_config_requires_base_url() {
        let cfg = LlmConfig {
            kind: "ollama".into(),
            base_url: None,
            api_key: String::new(),
            model: "qwen2.5-coder".into(),
        };
        assert!(matches!(AgentSession::from_config(&cfg), Err(ControllerError::ConfigInvalid(_))));
    }

    #[test]
    fn from_config_accepts_ollama() {
        let cfg = LlmConfig {
            kind: "ollama".into(),
            base_url: Some("http://127.0.0.1:11434".into()),
            api_key: String::new(),
            model: "qwen2.5-coder".into(),
        };
        assert!(AgentSession::from_config(&cfg).is_ok());
    }

    #[tokio::test]
    async fn run_agent_session_times_out_when_exceeded() {
        let cfg = LlmConfig {
            kind: "ollama".into(),
            base_url: Some("http://127.0.0.1:1".into()),
            api_key: String::new(),
            model: "qwen2.5-coder".into(),
        };
        let session = AgentSession::from_config(&cfg).unwrap();
        let result = session
            .run_agent_session("system", "user", None, Duration::from_millis(1))
            .await;
        assert!(matches!(result, Err(ControllerError::AgentTimeout(_))));
    }
}
