//! OpenAI-compatible chat-completions provider, adapted from
//! `ai-llm-service/src/services/open_ai_service.rs`: non-streaming
//! `/v1/chat/completions`, narrowed to `generate` (embeddings dropped, same
//! reasoning as `ollama.rs`).

use controller_core::{ControllerError, ControllerResult};
use reqwest::header;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct OpenAiAgent {
    http: reqwest::Client,
    model: String,
    url_chat: String,
}

impl OpenAiAgent {
    pub fn new(base_url: &str, api_key: &str, model: String) -> ControllerResult<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| ControllerError::ConfigInvalid(format!("invalid OpenAI API key header: {e}")))?,
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ControllerError::ConfigInvalid(format!("failed to build OpenAI http client: {e}")))?;

        let base = base_url.trim_end_matches('/');
        Ok(Self {
            http,
            model,
            url_chat: format!("{base}/v1/chat/completions"),
        })
    }

    pub async fn generate(&self, system_prompt: &str, user_prompt: &str) -> ControllerResult<String> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system_prompt },
                ChatMessage { role: "user", content: user_prompt },
            ],
        };

        let resp = self
            .http
            .post(&self.url_chat)
            .json(&body)
            .send()
            .await
            .map_err(|e| ControllerError::ExternalUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ControllerError::ExternalUnavailable(format!(
                "openai chat completion failed: status={status} body={text}"
            )));
        }

        let out: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| ControllerError::ResultInvalid(format!("openai response did not parse: {e}")))?;

        out.choices
            .into_iter()
            .find_map(|c| c.message.content)
            .ok_or_else(|| ControllerError::ResultInvalid("openai response had no message content".into()))
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageOut,
}

#[derive(Deserialize)]
struct ChatMessageOut {
    content: Option<String>,
}
