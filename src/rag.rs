//! Hybrid retrieval and grounded answering.
//!
//! One query runs: plan → dense (pre-filtered) + sparse BM25 → RRF
//! fusion → post-filter with recall fallback → intent-weighted rerank →
//! context assembly under a token budget → a single LLM call →
//! confidence + citations. The retrieval half is separable from the LLM
//! call so it can be exercised without a provider.

use crate::error::EngineError;
use crate::llm::ChatPrompt;
use crate::models::{ChatResponse, Confidence, SourceRef};
use crate::search::hybrid::{max_fused_score, rrf_fuse, FusedHit};
use crate::search::planner::{plan_query, rerank_boost, QueryPlan};
use crate::state::AppState;

/// Canonical answer when retrieval comes back empty.
pub const NO_INFORMATION_ANSWER: &str = "No relevant information found.";

/// How many top fused scores feed the confidence mean.
const CONFIDENCE_TOP_N: usize = 5;

/// Everything the answer step needs from retrieval.
pub struct Retrieval {
    pub plan: QueryPlan,
    /// Ranked hits that made it into the context window.
    pub context: Vec<ContextEntry>,
    /// The assembled, budget-trimmed context text.
    pub context_text: String,
    pub confidence: Confidence,
}

/// One context block and the hit it was built from.
pub struct ContextEntry {
    pub hit: FusedHit,
    pub block: String,
}

/// Run the retrieval half of the pipeline against one namespace.
pub async fn retrieve(
    state: &AppState,
    namespace: &str,
    query: &str,
) -> Result<Retrieval, EngineError> {
    let cfg = &state.config.search;
    let plan = plan_query(query, namespace, &state.catalog, cfg);

    // The query embeds exactly once; both fallback paths reuse it.
    let query_vector = state.embedder.embed_query(query).await?;

    let pre = (!plan.pre_filters.is_empty()).then_some(&plan.pre_filters);
    let dense = state
        .store
        .query(namespace, &query_vector, cfg.top_k_dense, pre)
        .await?;
    let sparse = state.catalog.search(namespace, query, cfg.top_k_sparse);

    let fused = rrf_fuse(&dense, &sparse, plan.fusion);

    // Post-filter, then recall fallback: if filtering starves the
    // candidate set, disable both filter stages rather than answer from
    // nothing. Re-query dense unfiltered when a pre-filter was in play.
    let filtered: Vec<FusedHit> = fused
        .iter()
        .filter(|h| plan.post_filters.matches(&h.payload))
        .cloned()
        .collect();

    let mut candidates = if filtered.len() >= cfg.min_candidates {
        filtered
    } else if pre.is_some() {
        tracing::info!(
            "filters left {} candidates (< {}), falling back to unfiltered retrieval",
            filtered.len(),
            cfg.min_candidates
        );
        let dense_unfiltered = state
            .store
            .query(namespace, &query_vector, cfg.top_k_dense, None)
            .await?;
        rrf_fuse(&dense_unfiltered, &sparse, plan.fusion)
    } else if filtered.len() < fused.len() {
        tracing::info!(
            "post-filter left {} candidates (< {}), using the fused set",
            filtered.len(),
            cfg.min_candidates
        );
        fused
    } else {
        fused
    };

    // Confidence comes from the fused scores before intent boosts.
    let confidence = score_confidence(&candidates, plan.fusion, CONFIDENCE_TOP_N);

    // Intent-weighted rerank; sort_by is stable so ties keep fused order.
    for hit in candidates.iter_mut() {
        hit.fused_score *= rerank_boost(plan.intent, &hit.payload);
    }
    candidates.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let (context, context_text) = assemble_context(
        &candidates,
        cfg.context_chunks,
        cfg.context_token_budget,
    );

    Ok(Retrieval {
        plan,
        context,
        context_text,
        confidence,
    })
}

/// Answer one query end to end. Empty retrieval short-circuits to the
/// canonical no-information response; LLM failures propagate untouched.
pub async fn answer(
    state: &AppState,
    query: &str,
    model_override: Option<&str>,
) -> Result<ChatResponse, EngineError> {
    let Some(namespace) = state.active_namespace() else {
        let plan = plan_query(query, "", &state.catalog, &state.config.search);
        return Ok(no_information_response(plan.intent.as_str()));
    };

    let retrieval = retrieve(state, &namespace, query).await?;
    let intent = retrieval.plan.intent.as_str();

    if retrieval.context.is_empty() {
        return Ok(no_information_response(intent));
    }

    let prompt = ChatPrompt {
        system: system_prompt(),
        user: format!(
            "Source code context from the indexed repository:\n\n{}\n\n---\nQuestion: {query}",
            retrieval.context_text
        ),
    };
    let answer = state.llm.complete(&prompt, model_override).await?;

    Ok(ChatResponse {
        answer,
        sources: citations(&retrieval.context),
        confidence: retrieval.confidence,
        intent: intent.to_string(),
    })
}

fn no_information_response(intent: &str) -> ChatResponse {
    ChatResponse {
        answer: NO_INFORMATION_ANSWER.to_string(),
        sources: Vec::new(),
        confidence: Confidence {
            score: 0.0,
            level: "none".to_string(),
        },
        intent: intent.to_string(),
    }
}

fn system_prompt() -> String {
    String::from(
        "You are a code analysis assistant answering questions about one \
         indexed repository.\n\
         Answer ONLY from the provided source snippets. Never invent code, \
         paths, or behavior that is not in the context.\n\
         Cite file paths and line numbers for every claim.\n\
         If the snippets do not answer the question, say what is missing \
         instead of guessing.",
    )
}

/// Build `[S_i] <path> (L<start>-<end>):` blocks, dropping from the tail
/// once the token budget is spent (~4 chars per token).
fn assemble_context(
    candidates: &[FusedHit],
    max_chunks: usize,
    token_budget: usize,
) -> (Vec<ContextEntry>, String) {
    let char_budget = token_budget.saturating_mul(4);
    let mut entries = Vec::new();
    let mut used_chars = 0usize;

    for (i, hit) in candidates.iter().take(max_chunks).enumerate() {
        let block = format!(
            "[S{}] {} (L{}-{}):\n{}",
            i + 1,
            hit.payload.path,
            hit.payload.start_line,
            hit.payload.end_line,
            hit.payload.text
        );
        if used_chars + block.len() > char_budget && !entries.is_empty() {
            break;
        }
        used_chars += block.len();
        entries.push(ContextEntry {
            hit: hit.clone(),
            block,
        });
    }

    let text = entries
        .iter()
        .map(|e| e.block.as_str())
        .collect::<Vec<_>>()
        .join("\n---\n");
    (entries, text)
}

/// Citations are exactly the context entries, deduplicated by
/// `(path, start..end)`, in descending score order.
fn citations(context: &[ContextEntry]) -> Vec<SourceRef> {
    let mut seen = std::collections::HashSet::new();
    let mut sources = Vec::new();
    for entry in context {
        let payload = &entry.hit.payload;
        let key = (
            payload.path.clone(),
            payload.start_line,
            payload.end_line,
        );
        if !seen.insert(key) {
            continue;
        }
        sources.push(SourceRef {
            file: payload.path.clone(),
            lines: format!("{}-{}", payload.start_line, payload.end_line),
            score: (entry.hit.fused_score * 1000.0).round() / 1000.0,
            category: payload.category.as_str().to_string(),
        });
    }
    sources
}

/// Mean of the top-5 fused scores, normalised by the maximum attainable
/// fused score, bucketed high / medium / low (none when empty).
fn score_confidence(
    candidates: &[FusedHit],
    weights: crate::search::hybrid::FusionWeights,
    top_n: usize,
) -> Confidence {
    if candidates.is_empty() {
        return Confidence {
            score: 0.0,
            level: "none".to_string(),
        };
    }

    let n = candidates.len().min(top_n);
    let mean: f32 = candidates[..n].iter().map(|h| h.fused_score).sum::<f32>() / n as f32;
    let score = (mean / max_fused_score(weights)).clamp(0.0, 1.0);

    let level = if score >= 0.7 {
        "high"
    } else if score >= 0.4 {
        "medium"
    } else {
        "low"
    };

    Confidence {
        score,
        level: level.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkPayload, FileCategory, SizeCategory};
    use crate::search::hybrid::FusionWeights;

    fn hit(id: &str, path: &str, fused: f32) -> FusedHit {
        FusedHit {
            id: id.into(),
            payload: ChunkPayload {
                path: path.into(),
                start_line: 1,
                end_line: 20,
                text: format!("contents of {path}"),
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
            },
            dense_score: 0.5,
            sparse_score: 0.5,
            fused_score: fused,
        }
    }

    #[test]
    fn context_blocks_are_labeled_with_path_and_lines() {
        let candidates = vec![hit("a", "src/auth.rs", 0.02)];
        let (entries, text) = assemble_context(&candidates, 10, 8_000);
        assert_eq!(entries.len(), 1);
        assert!(text.starts_with("[S1] src/auth.rs (L1-20):"));
        assert!(text.contains("contents of src/auth.rs"));
    }

    #[test]
    fn context_respects_chunk_cap_and_budget() {
        let candidates: Vec<FusedHit> = (0..20)
            .map(|i| hit(&format!("h{i}"), &format!("src/f{i}.rs"), 0.02))
            .collect();

        let (entries, _) = assemble_context(&candidates, 10, 8_000);
        assert_eq!(entries.len(), 10);

        // A tiny budget keeps the head and drops the tail.
        let (entries, _) = assemble_context(&candidates, 10, 20);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn citations_dedup_by_span_and_keep_order() {
        let candidates = vec![
            hit("a", "src/auth.rs", 0.03),
            hit("b", "src/auth.rs", 0.02), // same path and span: dropped
            hit("c", "src/db.rs", 0.01),
        ];
        let (entries, _) = assemble_context(&candidates, 10, 8_000);
        let sources = citations(&entries);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].file, "src/auth.rs");
        assert_eq!(sources[0].lines, "1-20");
        assert_eq!(sources[1].file, "src/db.rs");
        assert!(sources[0].score >= sources[1].score);
    }

    #[test]
    fn confidence_buckets() {
        let weights = FusionWeights::default();
        let max = max_fused_score(weights);

        let high: Vec<FusedHit> = (0..5).map(|i| hit(&format!("h{i}"), "f", max * 0.9)).collect();
        assert_eq!(score_confidence(&high, weights, 5).level, "high");

        let medium: Vec<FusedHit> = (0..5).map(|i| hit(&format!("m{i}"), "f", max * 0.5)).collect();
        assert_eq!(score_confidence(&medium, weights, 5).level, "medium");

        let low: Vec<FusedHit> = (0..5).map(|i| hit(&format!("l{i}"), "f", max * 0.1)).collect();
        assert_eq!(score_confidence(&low, weights, 5).level, "low");

        assert_eq!(score_confidence(&[], weights, 5).level, "none");
    }

    #[test]
    fn confidence_is_monotone_in_scores() {
        let weights = FusionWeights::default();
        let base: Vec<FusedHit> = (0..5).map(|i| hit(&format!("a{i}"), "f", 0.004)).collect();
        let raised: Vec<FusedHit> = (0..5).map(|i| hit(&format!("b{i}"), "f", 0.008)).collect();
        let a = score_confidence(&base, weights, 5).score;
        let b = score_confidence(&raised, weights, 5).score;
        assert!(b >= a);
    }

    #[test]
    fn no_information_response_shape() {
        let resp = no_information_response("implementation");
        assert_eq!(resp.answer, NO_INFORMATION_ANSWER);
        assert!(resp.sources.is_empty());
        assert_eq!(resp.confidence.level, "none");
        assert_eq!(resp.intent, "implementation");
    }
}
