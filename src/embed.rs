//! Embedding provider: text in, unit-norm fixed-dimension vectors out.
//!
//! The HTTP implementation speaks the OpenAI-compatible `/embeddings`
//! dialect. The API key resolves lazily on first call, inputs are
//! truncated to the model cap on UTF-8 boundaries, and transient failures
//! retry with full-jitter backoff.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{require_secret, EmbeddingConfig};
use crate::error::EngineError;
use crate::retry;

/// Text → vector provider. Output ordering always matches input ordering;
/// every vector is L2-normalised to unit length.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EngineError>;

    fn dimensions(&self) -> usize;
}

/// OpenAI-compatible HTTP embedder. Process-wide; the one-shot key latch
/// makes the first call pay the configuration cost.
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: EmbeddingConfig,
    api_key: OnceLock<String>,
}

#[derive(Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(client: reqwest::Client, config: EmbeddingConfig) -> Self {
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
        let key = require_secret("EMBED_API_KEY")?;
        Ok(self.api_key.get_or_init(|| key).as_str())
    }

    async fn request_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        let url = format!("{}/embeddings", self.config.base_url);
        let api_key = self.api_key()?.to_string();
        let timeout = Duration::from_secs(self.config.request_timeout_secs);

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let req = EmbedRequest {
                model: self.config.model.clone(),
                input: inputs.to_vec(),
            };

            let result = self
                .client
                .post(&url)
                .timeout(timeout)
                .header("Authorization", format!("Bearer {api_key}"))
                .json(&req)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let body: EmbedResponse = resp.json().await.map_err(|e| {
                        EngineError::Embed(format!("failed to parse embed response: {e}"))
                    })?;
                    if body.data.len() != inputs.len() {
                        return Err(EngineError::Embed(format!(
                            "provider returned {} vectors for {} inputs",
                            body.data.len(),
                            inputs.len()
                        )));
                    }
                    return Ok(body
                        .data
                        .into_iter()
                        .map(|d| unit_normalize(d.embedding))
                        .collect());
                }
                Ok(resp) => {
                    let status = resp.status();
                    if retry::is_transient_status(status) && attempt < retry::MAX_ATTEMPTS {
                        let delay = retry::backoff_delay(attempt);
                        tracing::warn!(
                            "embed API returned {status}, retrying in {delay:?} (attempt {attempt})"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    let body = resp.text().await.unwrap_or_default();
                    return Err(EngineError::Embed(format!(
                        "embed API returned {status}: {body}"
                    )));
                }
                Err(e) => {
                    if retry::is_transient_error(&e) && attempt < retry::MAX_ATTEMPTS {
                        let delay = retry::backoff_delay(attempt);
                        tracing::warn!("embed request failed ({e}), retrying in {delay:?}");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(EngineError::Embed(format!("embed request failed: {e}")));
                }
            }
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let truncated: Vec<String> = texts
            .iter()
            .map(|t| truncate_chars(t, self.config.max_input_chars).to_string())
            .collect();
        self.request_batch(&truncated).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EngineError> {
        let vectors = self
            .request_batch(&[truncate_chars(text, self.config.max_input_chars).to_string()])
            .await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::Embed("empty response from embed API".into()))
    }

    fn dimensions(&self) -> usize {
        self.config.dim
    }
}

/// Scale a vector to unit L2 norm. Zero vectors pass through unchanged so
/// the indexer's NaN/degenerate check can catch them.
pub fn unit_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

/// Truncate to at most `max_bytes`, backing up to a UTF-8 char boundary.
fn truncate_chars(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_makes_unit_length() {
        let v = unit_normalize(vec![3.0, 4.0]);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn normalize_leaves_zero_vector() {
        assert_eq!(unit_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn truncate_short_text_is_identity() {
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[test]
    fn truncate_respects_utf8_boundary() {
        let text = "é".repeat(100); // 2 bytes each
        let result = truncate_chars(&text, 151);
        assert!(result.len() <= 151);
        assert!(result.len() % 2 == 0);
    }

    #[tokio::test]
    async fn missing_api_key_is_config_error() {
        std::env::remove_var("EMBED_API_KEY");
        let embedder = HttpEmbedder::new(
            reqwest::Client::new(),
            crate::config::Config::default().embedding,
        );
        let err = embedder.embed_query("hello").await.unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[tokio::test]
    async fn empty_batch_short_circuits() {
        let embedder = HttpEmbedder::new(
            reqwest::Client::new(),
            crate::config::Config::default().embedding,
        );
        let out = embedder.embed_documents(&[]).await.unwrap();
        assert!(out.is_empty());
    }
}
