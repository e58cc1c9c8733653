//! HTTP vector store client.
//!
//! Speaks the Pinecone-style REST dialect: `/vectors/upsert`, `/query`
//! with `{"$eq"/"$in"/"$lte"/...}` metadata filters, `/vectors/delete`.
//! The API key resolves lazily on first use; transient failures retry
//! with the shared backoff policy.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{require_secret, VectorConfig};
use crate::error::EngineError;
use crate::models::ChunkPayload;
use crate::retry;
use crate::search::filter::FilterSet;

use super::{QueryMatch, VectorRecord, VectorStore};

pub struct HttpVectorStore {
    client: reqwest::Client,
    config: VectorConfig,
    api_key: OnceLock<String>,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    namespace: &'a str,
    vectors: Vec<WireVector<'a>>,
}

#[derive(Serialize)]
struct WireVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a ChunkPayload,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    namespace: &'a str,
    vector: &'a [f32],
    #[serde(rename = "topK")]
    top_k: usize,
    #[serde(rename = "includeMetadata")]
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Value>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<WireMatch>,
}

#[derive(Deserialize)]
struct WireMatch {
    id: String,
    score: f32,
    metadata: ChunkPayload,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    namespace: &'a str,
    #[serde(rename = "deleteAll")]
    delete_all: bool,
}

impl HttpVectorStore {
    pub fn new(client: reqwest::Client, config: VectorConfig) -> Self {
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
        let key = require_secret("VECTOR_STORE_API_KEY")?;
        Ok(self.api_key.get_or_init(|| key).as_str())
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/indexes/{}{path}",
            self.config.base_url, self.config.index_name
        )
    }

    /// POST `body` to `path` with auth, retrying transient failures.
    /// Returns the raw successful response.
    async fn post_json<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, EngineError> {
        let url = self.endpoint(path);
        let api_key = self.api_key()?.to_string();
        let timeout = Duration::from_secs(self.config.request_timeout_secs);

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = self
                .client
                .post(&url)
                .timeout(timeout)
                .header("Api-Key", &api_key)
                .json(body)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    if retry::is_transient_status(status) && attempt < retry::MAX_ATTEMPTS {
                        let delay = retry::backoff_delay(attempt);
                        tracing::warn!(
                            "vector store returned {status}, retrying in {delay:?} (attempt {attempt})"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    let body = resp.text().await.unwrap_or_default();
                    return Err(EngineError::Upsert(format!(
                        "vector store returned {status}: {body}"
                    )));
                }
                Err(e) => {
                    if retry::is_transient_error(&e) && attempt < retry::MAX_ATTEMPTS {
                        let delay = retry::backoff_delay(attempt);
                        tracing::warn!("vector store request failed ({e}), retrying in {delay:?}");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(EngineError::Upsert(format!(
                        "vector store request failed: {e}"
                    )));
                }
            }
        }
    }
}

#[async_trait]
impl VectorStore for HttpVectorStore {
    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<(), EngineError> {
        if records.is_empty() {
            return Ok(());
        }
        let request = UpsertRequest {
            namespace,
            vectors: records
                .iter()
                .map(|r| WireVector {
                    id: &r.id,
                    values: &r.vector,
                    metadata: &r.metadata,
                })
                .collect(),
        };
        self.post_json("/vectors/upsert", &request).await?;
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&FilterSet>,
    ) -> Result<Vec<QueryMatch>, EngineError> {
        let request = QueryRequest {
            namespace,
            vector,
            top_k,
            include_metadata: true,
            filter: filter.filter(|f| !f.is_empty()).map(|f| f.to_store_filter()),
        };
        let resp = self.post_json("/query", &request).await?;
        let body: QueryResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::Upsert(format!("failed to parse query response: {e}")))?;

        Ok(body
            .matches
            .into_iter()
            .map(|m| QueryMatch {
                id: m.id,
                score: m.score,
                metadata: m.metadata,
            })
            .collect())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<(), EngineError> {
        let request = DeleteRequest {
            namespace,
            delete_all: true,
        };
        self.post_json("/vectors/delete", &request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileCategory, SizeCategory};
    use crate::search::filter::FilterOp;
    use serde_json::json;

    fn sample_payload() -> ChunkPayload {
        ChunkPayload {
            path: "src/lib.rs".into(),
            start_line: 1,
            end_line: 5,
            text: "fn x() {}".into(),
            category: FileCategory::Code,
            language: "rust".into(),
            depth: 1,
            size_category: SizeCategory::Small,
            has_class_def: false,
            has_fn_def: true,
            has_imports: false,
            has_tests: false,
            complexity: 1,
            word_count: 3,
        }
    }

    #[test]
    fn upsert_request_wire_format() {
        let record = VectorRecord {
            id: "abc".into(),
            vector: vec![0.1, 0.2],
            metadata: sample_payload(),
        };
        let request = UpsertRequest {
            namespace: "ns",
            vectors: vec![WireVector {
                id: &record.id,
                values: &record.vector,
                metadata: &record.metadata,
            }],
        };
        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["namespace"], "ns");
        assert_eq!(wire["vectors"][0]["id"], "abc");
        assert_eq!(wire["vectors"][0]["metadata"]["language"], "rust");
    }

    #[test]
    fn query_request_carries_filter_and_top_k() {
        let filter = FilterSet::new().with("language", FilterOp::Eq(json!("python")));
        let request = QueryRequest {
            namespace: "ns",
            vector: &[0.5, 0.5],
            top_k: 40,
            include_metadata: true,
            filter: Some(filter.to_store_filter()),
        };
        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["topK"], 40);
        assert_eq!(wire["includeMetadata"], true);
        assert_eq!(wire["filter"]["language"]["$eq"], "python");
    }

    #[test]
    fn empty_filter_is_omitted_from_wire() {
        let request = QueryRequest {
            namespace: "ns",
            vector: &[1.0],
            top_k: 10,
            include_metadata: true,
            filter: None,
        };
        let wire = serde_json::to_value(&request).unwrap();
        assert!(wire.get("filter").is_none());
    }

    #[test]
    fn query_response_parses_matches() {
        let raw = json!({
            "matches": [
                { "id": "a", "score": 0.92, "metadata": serde_json::to_value(sample_payload()).unwrap() }
            ]
        });
        let parsed: QueryResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.matches.len(), 1);
        assert_eq!(parsed.matches[0].id, "a");
        assert!((parsed.matches[0].score - 0.92).abs() < 1e-6);
    }

    #[tokio::test]
    async fn missing_api_key_is_config_error() {
        std::env::remove_var("VECTOR_STORE_API_KEY");
        let store = HttpVectorStore::new(
            reqwest::Client::new(),
            crate::config::Config::default().vector,
        );
        let err = store.delete_namespace("ns").await.unwrap_err();
        assert_eq!(err.kind(), "config");
    }
}
