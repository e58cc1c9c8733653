//! Reciprocal Rank Fusion of the dense and sparse result lists.
//!
//! `score(id) = Σ_list w_list / (k + rank_list(id))` with k = 60 and
//! weights dense 1.0 / sparse 0.5 by default. Rank-only: the raw backend
//! scores are kept on the hit for display but never mixed into fusion.

use std::collections::HashMap;

use crate::models::ChunkPayload;
use crate::search::sparse::SparseHit;
use crate::vector::QueryMatch;

/// A candidate surviving fusion, carrying both backend scores.
#[derive(Debug, Clone)]
pub struct FusedHit {
    pub id: String,
    pub payload: ChunkPayload,
    pub dense_score: f32,
    pub sparse_score: f32,
    pub fused_score: f32,
}

/// Fusion weights; the query plan may adjust them.
#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    pub k: f32,
    pub dense: f32,
    pub sparse: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            k: 60.0,
            dense: 1.0,
            sparse: 0.5,
        }
    }
}

/// Fuse ranked dense and sparse lists into one descending-score list.
pub fn rrf_fuse(
    dense: &[QueryMatch],
    sparse: &[SparseHit],
    weights: FusionWeights,
) -> Vec<FusedHit> {
    let mut fused: HashMap<String, FusedHit> = HashMap::new();

    for (rank, hit) in dense.iter().enumerate() {
        let rrf = weights.dense / (weights.k + rank as f32 + 1.0);
        let entry = fused.entry(hit.id.clone()).or_insert_with(|| FusedHit {
            id: hit.id.clone(),
            payload: hit.metadata.clone(),
            dense_score: 0.0,
            sparse_score: 0.0,
            fused_score: 0.0,
        });
        entry.dense_score = entry.dense_score.max(hit.score);
        entry.fused_score += rrf;
    }

    for (rank, hit) in sparse.iter().enumerate() {
        let rrf = weights.sparse / (weights.k + rank as f32 + 1.0);
        let entry = fused.entry(hit.id.clone()).or_insert_with(|| FusedHit {
            id: hit.id.clone(),
            payload: hit.payload.clone(),
            dense_score: 0.0,
            sparse_score: 0.0,
            fused_score: 0.0,
        });
        entry.sparse_score = entry.sparse_score.max(hit.score);
        entry.fused_score += rrf;
    }

    let mut results: Vec<FusedHit> = fused.into_values().collect();
    results.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    results
}

/// Upper bound of a fused score: rank 1 in both lists. Used to normalise
/// confidence into [0, 1].
pub fn max_fused_score(weights: FusionWeights) -> f32 {
    (weights.dense + weights.sparse) / (weights.k + 1.0)
}
