//! Query planning: intent classification, implicit filter extraction,
//! and the selectivity gate that decides whether pre-filters ship to the
//! vector store at all.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;

use crate::config::SearchConfig;
use crate::models::ChunkPayload;
use crate::search::filter::{FilterOp, FilterSet, POST_FILTER_FIELDS, PRE_FILTER_FIELDS};
use crate::search::hybrid::FusionWeights;
use crate::search::sparse::CorpusCatalog;

/// Coarse query class. Biases filter defaults and reranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryIntent {
    Implementation,
    Debugging,
    Architecture,
    Documentation,
    General,
}

impl QueryIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryIntent::Implementation => "implementation",
            QueryIntent::Debugging => "debugging",
            QueryIntent::Architecture => "architecture",
            QueryIntent::Documentation => "documentation",
            QueryIntent::General => "general",
        }
    }
}

/// The retrieval plan for one query.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub intent: QueryIntent,
    /// Indexed-metadata filter shipped with the dense query. Empty when
    /// the selectivity gate dropped it.
    pub pre_filters: FilterSet,
    /// In-process filter applied to retrieved candidates.
    pub post_filters: FilterSet,
    pub fusion: FusionWeights,
}

static DEBUG_TRIGGERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(debug|error|exception|stack trace|traceback|crash|fail(s|ing|ed|ure)?|bug|broken|not working|fix)\b")
        .unwrap()
});
static ARCH_TRIGGERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(architecture|structure|organization|design|diagram|flow|overview|high[\s-]?level)\b")
        .unwrap()
});
static DOC_TRIGGERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(readme|documentation|docs?|changelog|guide|tutorial|comments?)\b").unwrap()
});
static IMPL_TRIGGERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(implement(s|ed|ation)?|show me|where is|find|locate|code|function|method|class|logic|source)\b")
        .unwrap()
});

/// Classify the query into the closed intent set. Checked in priority
/// order so "show me the architecture" stays architectural.
pub fn detect_intent(query: &str) -> QueryIntent {
    let q = query.to_lowercase();
    if DEBUG_TRIGGERS.is_match(&q) {
        QueryIntent::Debugging
    } else if ARCH_TRIGGERS.is_match(&q) {
        QueryIntent::Architecture
    } else if DOC_TRIGGERS.is_match(&q) {
        QueryIntent::Documentation
    } else if IMPL_TRIGGERS.is_match(&q) {
        QueryIntent::Implementation
    } else {
        QueryIntent::General
    }
}

const LANGUAGE_TOKENS: &[(&str, &str)] = &[
    ("python", "python"),
    ("javascript", "javascript"),
    ("js", "javascript"),
    ("typescript", "typescript"),
    ("ts", "typescript"),
    ("java", "java"),
    ("golang", "go"),
    ("rust", "rust"),
    ("ruby", "ruby"),
    ("php", "php"),
    ("c++", "cpp"),
    ("cpp", "cpp"),
    ("haskell", "haskell"),
    ("kotlin", "kotlin"),
    ("swift", "swift"),
    ("scala", "scala"),
    ("shell", "shell"),
];

/// Pull implicit filters out of the phrasing. Language and file-kind
/// tokens become pre-filters; entity-shape tokens become post-filters.
pub fn extract_filters(query: &str, intent: QueryIntent) -> (FilterSet, FilterSet) {
    let q = query.to_lowercase();
    let words: Vec<&str> = q
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | '.' | '?' | '!' | ';' | ':'))
        .filter(|w| !w.is_empty())
        .collect();

    let mut pre = FilterSet::new();
    let mut post = FilterSet::new();

    for (token, language) in LANGUAGE_TOKENS {
        if words.contains(token) {
            pre.insert("language", FilterOp::Eq(json!(language)));
            break;
        }
    }

    let category = if words.iter().any(|w| *w == "test" || *w == "tests" || *w == "spec") {
        Some("test")
    } else if words.iter().any(|w| *w == "config" || *w == "configuration") {
        Some("config")
    } else if words
        .iter()
        .any(|w| *w == "readme" || *w == "doc" || *w == "docs" || *w == "documentation")
    {
        Some("docs")
    } else if words.contains(&"build") {
        Some("build")
    } else if words.contains(&"code") || intent == QueryIntent::Implementation {
        // Implementation queries implicitly want code.
        Some("code")
    } else {
        None
    };
    if let Some(category) = category {
        pre.insert("category", FilterOp::Eq(json!(category)));
    }

    if words.iter().any(|w| *w == "main" || *w == "root" || *w == "top-level")
        || q.contains("top level")
    {
        pre.insert("depth", FilterOp::Lte(2.0));
    }

    if words.iter().any(|w| *w == "class" || *w == "classes") {
        post.insert("has_class_def", FilterOp::Eq(json!(true)));
    }
    if words
        .iter()
        .any(|w| *w == "function" || *w == "functions" || *w == "method" || *w == "methods")
    {
        post.insert("has_fn_def", FilterOp::Eq(json!(true)));
    }

    (pre, post)
}

/// Static corpus-distribution fallback for selectivity when the namespace
/// corpus is not resident in this process.
fn static_selectivity(filters: &FilterSet) -> f64 {
    let mut selectivity = 1.0f64;
    for (field, op) in filters.iter() {
        let factor = match (field.as_str(), op) {
            ("category", FilterOp::Eq(v)) => match v.as_str().unwrap_or("") {
                "code" => 0.60,
                "test" => 0.15,
                "docs" => 0.15,
                "config" => 0.05,
                "build" => 0.05,
                _ => 0.10,
            },
            ("language", FilterOp::Eq(v)) => match v.as_str().unwrap_or("") {
                "python" => 0.40,
                "javascript" => 0.30,
                "typescript" => 0.15,
                _ => 0.05,
            },
            ("depth", FilterOp::Lte(d)) => (0.2 + d * 0.2).min(1.0),
            _ => 0.5,
        };
        selectivity *= factor;
    }
    selectivity.clamp(0.01, 1.0)
}

/// Estimated fraction of the corpus matching `filters`.
pub fn estimate_selectivity(
    catalog: &CorpusCatalog,
    namespace: &str,
    filters: &FilterSet,
) -> f64 {
    if filters.is_empty() {
        return 1.0;
    }
    catalog
        .selectivity(namespace, filters)
        .unwrap_or_else(|| static_selectivity(filters))
}

/// Build the retrieval plan: classify, extract, validate, gate.
pub fn plan_query(
    query: &str,
    namespace: &str,
    catalog: &CorpusCatalog,
    cfg: &SearchConfig,
) -> QueryPlan {
    let intent = detect_intent(query);
    let (mut pre_filters, mut post_filters) = extract_filters(query, intent);

    // A malformed filter disables that stage rather than failing the query.
    if let Err(e) = pre_filters.validate(PRE_FILTER_FIELDS) {
        tracing::warn!("dropping pre-filters: {e}");
        pre_filters = FilterSet::new();
    }
    if let Err(e) = post_filters.validate(POST_FILTER_FIELDS) {
        tracing::warn!("dropping post-filters: {e}");
        post_filters = FilterSet::new();
    }

    if !pre_filters.is_empty() {
        let selectivity = estimate_selectivity(catalog, namespace, &pre_filters);
        if selectivity < cfg.selectivity_min {
            tracing::info!("pre-filter too restrictive ({selectivity:.2}), dropping");
            pre_filters = FilterSet::new();
        } else if selectivity > cfg.selectivity_max {
            tracing::info!("pre-filter too broad ({selectivity:.2}), dropping");
            pre_filters = FilterSet::new();
        } else {
            tracing::debug!("pre-filter kept (selectivity {selectivity:.2})");
        }
    }

    QueryPlan {
        intent,
        pre_filters,
        post_filters,
        fusion: FusionWeights {
            k: cfg.rrf_k,
            dense: cfg.dense_weight,
            sparse: cfg.sparse_weight,
        },
    }
}

/// Intent-conditioned score multiplier applied during reranking.
pub fn rerank_boost(intent: QueryIntent, payload: &ChunkPayload) -> f32 {
    use crate::models::FileCategory;
    match intent {
        QueryIntent::Implementation => {
            if payload.category == FileCategory::Code && payload.has_fn_def {
                1.25
            } else {
                1.0
            }
        }
        QueryIntent::Architecture => {
            if payload.depth <= 2 {
                1.20
            } else {
                1.0
            }
        }
        QueryIntent::Debugging => {
            if matches!(payload.category, FileCategory::Code | FileCategory::Test) {
                1.15
            } else {
                1.0
            }
        }
        QueryIntent::Documentation => {
            if payload.category == FileCategory::Docs {
                1.20
            } else {
                1.0
            }
        }
        QueryIntent::General => 1.0,
    }
}
