//! Vector store abstraction.
//!
//! The engine treats the ANN service as external and linearizable per key:
//! `upsert` is idempotent on id, `query` pre-filters on indexed metadata,
//! `delete_namespace` drops one repository's partition. Two backends: the
//! HTTP client for a remote store and an in-memory store for tests and
//! single-host development.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::ChunkPayload;
use crate::search::filter::FilterSet;

/// One stored vector with its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkPayload,
}

/// A ranked query result.
#[derive(Debug, Clone)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    pub metadata: ChunkPayload,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite records by id. Retrying an unchanged batch
    /// leaves the store in the same state.
    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<(), EngineError>;

    /// ANN search within one namespace, optionally pre-filtered on the
    /// indexed metadata fields. Results are ranked by similarity.
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&FilterSet>,
    ) -> Result<Vec<QueryMatch>, EngineError>;

    /// Drop every record in the namespace.
    async fn delete_namespace(&self, namespace: &str) -> Result<(), EngineError>;
}
