//! In-memory vector store: cosine similarity over per-namespace record
//! lists, with full pre-filter evaluation. Backs the test suite and the
//! `memory` backend for single-host runs without an external service.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::EngineError;
use crate::search::filter::FilterSet;

use super::{QueryMatch, VectorRecord, VectorStore};

#[derive(Default)]
pub struct MemoryVectorStore {
    namespaces: RwLock<HashMap<String, Vec<VectorRecord>>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_count(&self, namespace: &str) -> usize {
        self.namespaces
            .read()
            .get(namespace)
            .map(|r| r.len())
            .unwrap_or(0)
    }

    /// Ids currently stored in a namespace, unordered.
    pub fn ids(&self, namespace: &str) -> Vec<String> {
        self.namespaces
            .read()
            .get(namespace)
            .map(|records| records.iter().map(|r| r.id.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<(), EngineError> {
        let mut namespaces = self.namespaces.write();
        let existing = namespaces.entry(namespace.to_string()).or_default();
        for record in records {
            match existing.iter_mut().find(|r| r.id == record.id) {
                Some(slot) => *slot = record.clone(),
                None => existing.push(record.clone()),
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&FilterSet>,
    ) -> Result<Vec<QueryMatch>, EngineError> {
        let namespaces = self.namespaces.read();
        let Some(records) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<QueryMatch> = records
            .iter()
            .filter(|r| filter.map(|f| f.matches(&r.metadata)).unwrap_or(true))
            .map(|r| QueryMatch {
                id: r.id.clone(),
                score: cosine_similarity(vector, &r.vector),
                metadata: r.metadata.clone(),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<(), EngineError> {
        self.namespaces.write().remove(namespace);
        Ok(())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkPayload, FileCategory, SizeCategory};
    use crate::search::filter::FilterOp;
    use serde_json::json;

    fn record(id: &str, vector: Vec<f32>, language: &str, category: FileCategory) -> VectorRecord {
        VectorRecord {
            id: id.into(),
            vector,
            metadata: ChunkPayload {
                path: format!("src/{id}.rs"),
                start_line: 1,
                end_line: 10,
                text: format!("chunk {id}"),
                category,
                language: language.into(),
                depth: 1,
                size_category: SizeCategory::Small,
                has_class_def: false,
                has_fn_def: true,
                has_imports: false,
                has_tests: false,
                complexity: 1,
                word_count: 2,
            },
        }
    }

    #[tokio::test]
    async fn query_ranks_by_cosine_similarity() {
        let store = MemoryVectorStore::new();
        store
            .upsert(
                "ns",
                &[
                    record("a", vec![1.0, 0.0, 0.0], "rust", FileCategory::Code),
                    record("b", vec![0.0, 1.0, 0.0], "rust", FileCategory::Code),
                    record("c", vec![0.7, 0.7, 0.0], "rust", FileCategory::Code),
                ],
            )
            .await
            .unwrap();

        let results = store.query("ns", &[1.0, 0.0, 0.0], 2, None).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert_eq!(results[1].id, "c");
    }

    #[tokio::test]
    async fn upsert_is_idempotent_on_id() {
        let store = MemoryVectorStore::new();
        let rec = record("a", vec![1.0, 0.0], "rust", FileCategory::Code);
        store.upsert("ns", &[rec.clone()]).await.unwrap();
        store.upsert("ns", &[rec.clone()]).await.unwrap();
        store.upsert("ns", &[rec]).await.unwrap();
        assert_eq!(store.record_count("ns"), 1);
    }

    #[tokio::test]
    async fn pre_filter_is_applied_before_ranking() {
        let store = MemoryVectorStore::new();
        store
            .upsert(
                "ns",
                &[
                    record("py", vec![1.0, 0.0], "python", FileCategory::Code),
                    record("rs", vec![1.0, 0.0], "rust", FileCategory::Code),
                ],
            )
            .await
            .unwrap();

        let filter = FilterSet::new().with("language", FilterOp::Eq(json!("python")));
        let results = store
            .query("ns", &[1.0, 0.0], 10, Some(&filter))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "py");
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let store = MemoryVectorStore::new();
        store
            .upsert("a", &[record("x", vec![1.0], "rust", FileCategory::Code)])
            .await
            .unwrap();
        store
            .upsert("b", &[record("y", vec![1.0], "rust", FileCategory::Code)])
            .await
            .unwrap();

        let results = store.query("a", &[1.0], 10, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "x");
    }

    #[tokio::test]
    async fn delete_namespace_drops_everything() {
        let store = MemoryVectorStore::new();
        store
            .upsert("ns", &[record("x", vec![1.0], "rust", FileCategory::Code)])
            .await
            .unwrap();
        store.delete_namespace("ns").await.unwrap();
        assert_eq!(store.record_count("ns"), 0);
        assert!(store.query("ns", &[1.0], 10, None).await.unwrap().is_empty());
    }
}
