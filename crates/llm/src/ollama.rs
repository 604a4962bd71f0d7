//! Ollama provider, adapted from `ai-llm-service/src/services/ollama_service.rs`:
//! same `/api/generate`, non-streaming shape, narrowed to the single
//! `generate` operation this system needs (embeddings dropped — this
//! system never does semantic search).

use controller_core::{ControllerError, ControllerResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct OllamaAgent {
    http: reqwest::Client,
    model: String,
    url_generate: String,
}

impl OllamaAgent {
    pub fn new(http: reqwest::Client, base_url: &str, model: String) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            http,
            model,
            url_generate: format!("{base}/api/generate"),
        }
    }

    pub async fn generate(&self, system_prompt: &str, user_prompt: &str) -> ControllerResult<String> {
        let body = GenerateRequest {
            model: &self.model,
            prompt: format!("{system_prompt}\n\n{user_prompt}"),
            stream: false,
        };

        let resp = self
            .http
            .post(&self.url_generate)
            .json(&body)
            .send()
            .await
            .map_err(|e| ControllerError::ExternalUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ControllerError::ExternalUnavailable(format!(
                "ollama generate failed: status={status} body={text}"
            )));
        }

        let out: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| ControllerError::ResultInvalid(format!("ollama response did not parse: {e}")))?;
        Ok(out.response)
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}
