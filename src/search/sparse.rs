//! Lexical retrieval: a per-namespace in-memory inverted index scored
//! with BM25 (k1 = 1.2, b = 0.75).
//!
//! The catalog holds each active namespace's chunk corpus, fed by the
//! indexer during ingestion. The inverted index is built lazily on the
//! first query and rebuilt when the chunk count drifts materially. It
//! also answers selectivity estimates for the planner's gate, since it
//! already holds every payload. Reads take the shared lock; rebuilds
//! take the write lock.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::models::ChunkPayload;
use crate::search::filter::FilterSet;

const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;
/// Rebuild when the corpus size has drifted past this fraction.
const REBUILD_DRIFT: f64 = 0.05;

/// One chunk as the sparse side sees it.
#[derive(Debug, Clone)]
pub struct CorpusEntry {
    pub id: String,
    pub payload: ChunkPayload,
}

/// A scored lexical hit.
#[derive(Debug, Clone)]
pub struct SparseHit {
    pub id: String,
    pub score: f32,
    pub payload: ChunkPayload,
}

#[derive(Default)]
struct NamespaceCorpus {
    entries: Vec<CorpusEntry>,
    index: Option<InvertedIndex>,
    /// Corpus size when the index was last built.
    indexed_count: usize,
}

impl NamespaceCorpus {
    fn index_is_stale(&self) -> bool {
        match &self.index {
            None => true,
            Some(_) => {
                let drift = self.entries.len().abs_diff(self.indexed_count) as f64
                    / self.indexed_count.max(1) as f64;
                drift > REBUILD_DRIFT
            }
        }
    }
}

/// Per-namespace chunk corpora plus their lazily built indexes.
#[derive(Default)]
pub struct CorpusCatalog {
    namespaces: RwLock<HashMap<String, NamespaceCorpus>>,
}

impl CorpusCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a namespace's corpus wholesale (end of an ingest). The
    /// index is dropped and rebuilt on the next query.
    pub fn replace_namespace(&self, namespace: &str, entries: Vec<CorpusEntry>) {
        let mut namespaces = self.namespaces.write();
        namespaces.insert(
            namespace.to_string(),
            NamespaceCorpus {
                entries,
                index: None,
                indexed_count: 0,
            },
        );
    }

    pub fn delete_namespace(&self, namespace: &str) {
        self.namespaces.write().remove(namespace);
    }

    pub fn chunk_count(&self, namespace: &str) -> usize {
        self.namespaces
            .read()
            .get(namespace)
            .map(|ns| ns.entries.len())
            .unwrap_or(0)
    }

    /// BM25 search over one namespace. Builds or refreshes the inverted
    /// index if needed, then scores under the shared lock.
    pub fn search(&self, namespace: &str, query: &str, top_k: usize) -> Vec<SparseHit> {
        {
            let namespaces = self.namespaces.read();
            match namespaces.get(namespace) {
                None => return Vec::new(),
                Some(ns) if ns.entries.is_empty() => return Vec::new(),
                Some(ns) if !ns.index_is_stale() => {
                    return score(ns.index.as_ref().unwrap(), &ns.entries, query, top_k);
                }
                Some(_) => {}
            }
        }

        let mut namespaces = self.namespaces.write();
        let Some(ns) = namespaces.get_mut(namespace) else {
            return Vec::new();
        };
        if ns.index_is_stale() {
            tracing::debug!(
                "rebuilding inverted index for {namespace} ({} chunks)",
                ns.entries.len()
            );
            ns.index = Some(InvertedIndex::build(&ns.entries));
            ns.indexed_count = ns.entries.len();
        }
        score(ns.index.as_ref().unwrap(), &ns.entries, query, top_k)
    }

    /// Fraction of the namespace corpus matching `filters`, or `None`
    /// when the corpus is not resident (e.g. after a restart).
    pub fn selectivity(&self, namespace: &str, filters: &FilterSet) -> Option<f64> {
        let namespaces = self.namespaces.read();
        let ns = namespaces.get(namespace)?;
        if ns.entries.is_empty() {
            return None;
        }
        let matching = ns
            .entries
            .iter()
            .filter(|e| filters.matches(&e.payload))
            .count();
        Some(matching as f64 / ns.entries.len() as f64)
    }
}

fn score(
    index: &InvertedIndex,
    entries: &[CorpusEntry],
    query: &str,
    top_k: usize,
) -> Vec<SparseHit> {
    index
        .search(query, top_k)
        .into_iter()
        .map(|(doc, score)| SparseHit {
            id: entries[doc].id.clone(),
            score,
            payload: entries[doc].payload.clone(),
        })
        .collect()
}

// ─── Inverted index ──────────────────────────────────────

struct Posting {
    doc: u32,
    tf: u32,
}

struct InvertedIndex {
    postings: HashMap<String, Vec<Posting>>,
    doc_lengths: Vec<u32>,
    avg_doc_len: f32,
}

impl InvertedIndex {
    fn build(entries: &[CorpusEntry]) -> Self {
        let mut postings: HashMap<String, Vec<Posting>> = HashMap::new();
        let mut doc_lengths = Vec::with_capacity(entries.len());

        for (doc, entry) in entries.iter().enumerate() {
            let mut counts: HashMap<String, u32> = HashMap::new();
            // Path tokens participate so file-name queries hit.
            for token in tokenize(&entry.payload.path).chain(tokenize(&entry.payload.text)) {
                *counts.entry(token).or_insert(0) += 1;
            }
            let len: u32 = counts.values().sum();
            doc_lengths.push(len);
            for (token, tf) in counts {
                postings.entry(token).or_default().push(Posting {
                    doc: doc as u32,
                    tf,
                });
            }
        }

        let avg_doc_len = if doc_lengths.is_empty() {
            0.0
        } else {
            doc_lengths.iter().sum::<u32>() as f32 / doc_lengths.len() as f32
        };

        Self {
            postings,
            doc_lengths,
            avg_doc_len,
        }
    }

    fn search(&self, query: &str, top_k: usize) -> Vec<(usize, f32)> {
        let terms: Vec<String> = tokenize(query).collect();
        if terms.is_empty() || self.doc_lengths.is_empty() {
            return Vec::new();
        }

        let n = self.doc_lengths.len() as f32;
        let mut scores: HashMap<u32, f32> = HashMap::new();

        for term in &terms {
            let Some(postings) = self.postings.get(term) else {
                continue;
            };
            let df = postings.len() as f32;
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();

            for posting in postings {
                let tf = posting.tf as f32;
                let doc_len = self.doc_lengths[posting.doc as usize] as f32;
                let norm = 1.0 - BM25_B + BM25_B * doc_len / self.avg_doc_len.max(1.0);
                let term_score = idf * tf * (BM25_K1 + 1.0) / (tf + BM25_K1 * norm);
                *scores.entry(posting.doc).or_insert(0.0) += term_score;
            }
        }

        let mut ranked: Vec<(usize, f32)> = scores
            .into_iter()
            .map(|(doc, score)| (doc as usize, score))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(top_k);
        ranked
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.len() > 1)
        .map(|t| t.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileCategory, SizeCategory};
    use crate::search::filter::FilterOp;
    use serde_json::json;

    fn entry(id: &str, path: &str, text: &str, language: &str, category: FileCategory) -> CorpusEntry {
        CorpusEntry {
            id: id.into(),
            payload: ChunkPayload {
                path: path.into(),
                start_line: 1,
                end_line: 10,
                text: text.into(),
                category,
                language: language.into(),
                depth: path.matches('/').count() as u32,
                size_category: SizeCategory::Small,
                has_class_def: false,
                has_fn_def: true,
                has_imports: false,
                has_tests: false,
                complexity: 1,
                word_count: text.split_whitespace().count(),
            },
        }
    }

    fn sample_corpus() -> Vec<CorpusEntry> {
        vec![
            entry(
                "a",
                "src/db.rs",
                "pub async fn connect(url: &str) { let pool = PgPool::connect(url); }",
                "rust",
                FileCategory::Code,
            ),
            entry(
                "b",
                "src/handlers.rs",
                "pub async fn health_check() { StatusCode::OK }",
                "rust",
                FileCategory::Code,
            ),
            entry(
                "c",
                "README.md",
                "A REST API for managing users and database connections",
                "markdown",
                FileCategory::Docs,
            ),
        ]
    }

    #[test]
    fn bm25_ranks_term_matches_first() {
        let catalog = CorpusCatalog::new();
        catalog.replace_namespace("ns", sample_corpus());

        let hits = catalog.search("ns", "database connect pool", 10);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].id, "a");
    }

    #[test]
    fn path_tokens_are_searchable() {
        let catalog = CorpusCatalog::new();
        catalog.replace_namespace("ns", sample_corpus());

        let hits = catalog.search("ns", "handlers", 10);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].id, "b");
    }

    #[test]
    fn unknown_terms_and_namespaces_return_nothing() {
        let catalog = CorpusCatalog::new();
        catalog.replace_namespace("ns", sample_corpus());

        assert!(catalog.search("ns", "zzzqqq", 10).is_empty());
        assert!(catalog.search("other", "database", 10).is_empty());
    }

    #[test]
    fn replace_invalidates_and_rebuilds() {
        let catalog = CorpusCatalog::new();
        catalog.replace_namespace("ns", sample_corpus());
        assert_eq!(catalog.search("ns", "database", 10).len(), 1);

        catalog.replace_namespace(
            "ns",
            vec![entry("x", "auth.py", "def login(): pass", "python", FileCategory::Code)],
        );
        assert!(catalog.search("ns", "database", 10).is_empty());
        assert_eq!(catalog.search("ns", "login", 10).len(), 1);
        assert_eq!(catalog.chunk_count("ns"), 1);
    }

    #[test]
    fn idf_prefers_rare_terms() {
        let mut corpus = Vec::new();
        for i in 0..20 {
            corpus.push(entry(
                &format!("common{i}"),
                &format!("file{i}.txt"),
                "shared boilerplate words everywhere",
                "text",
                FileCategory::Docs,
            ));
        }
        corpus.push(entry(
            "rare",
            "special.txt",
            "shared boilerplate words everywhere plus quixotic",
            "text",
            FileCategory::Docs,
        ));
        let catalog = CorpusCatalog::new();
        catalog.replace_namespace("ns", corpus);

        let hits = catalog.search("ns", "quixotic shared", 5);
        assert_eq!(hits[0].id, "rare");
    }

    #[test]
    fn selectivity_measures_matching_fraction() {
        let catalog = CorpusCatalog::new();
        catalog.replace_namespace("ns", sample_corpus());

        let rust = FilterSet::new().with("language", FilterOp::Eq(json!("rust")));
        let sel = catalog.selectivity("ns", &rust).unwrap();
        assert!((sel - 2.0 / 3.0).abs() < 1e-9);

        let docs = FilterSet::new().with("category", FilterOp::Eq(json!("docs")));
        let sel = catalog.selectivity("ns", &docs).unwrap();
        assert!((sel - 1.0 / 3.0).abs() < 1e-9);

        assert!(catalog.selectivity("missing", &rust).is_none());
    }

    #[test]
    fn delete_namespace_clears_corpus() {
        let catalog = CorpusCatalog::new();
        catalog.replace_namespace("ns", sample_corpus());
        catalog.delete_namespace("ns");
        assert_eq!(catalog.chunk_count("ns"), 0);
        assert!(catalog.search("ns", "database", 10).is_empty());
    }
}
