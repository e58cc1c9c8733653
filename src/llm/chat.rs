//! OpenAI-compatible chat completion client.
//!
//! One request per answer: no streaming, deterministic temperature, hard
//! token cap, 60 s timeout. Failures surface as `Answer` errors so the
//! HTTP layer can return a stable 502; nothing partial is ever emitted.

use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{require_secret, LlmConfig};
use crate::error::EngineError;

/// The two prompt halves of one completion call.
#[derive(Debug, Clone)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
}

pub struct ChatClient {
    client: reqwest::Client,
    config: LlmConfig,
    api_key: OnceLock<String>,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

impl ChatClient {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self {
            client,
            config,
            api_key: OnceLock::new(),
        }
    }

    fn api_key(&self) -> Result<&str, EngineError> {
        if let Some(key) = self.api_key.get() {
            return Ok(key.as_str());
        }
        let key = require_secret("LLM_API_KEY")?;
        Ok(self.api_key.get_or_init(|| key).as_str())
    }

    /// Run one completion. `model_override` substitutes the configured
    /// chat model for this call only.
    pub async fn complete(
        &self,
        prompt: &ChatPrompt,
        model_override: Option<&str>,
    ) -> Result<String, EngineError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let api_key = self.api_key()?;
        let model = model_override.unwrap_or(&self.config.chat_model);

        let request = CompletionRequest {
            model,
            messages: vec![
                Message {
                    role: "system",
                    content: &prompt.system,
                },
                Message {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: self.config.temperature.min(0.3),
            max_tokens: self.config.max_tokens,
            stream: false,
        };

        let resp = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::Answer("LLM call timed out".into())
                } else {
                    EngineError::Answer(format!("LLM request failed: {e}"))
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::Answer(format!(
                "LLM API returned {status}: {body}"
            )));
        }

        let body: CompletionResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::Answer(format!("failed to parse LLM response: {e}")))?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| EngineError::Answer("LLM returned no choices".into()))
    }
}
