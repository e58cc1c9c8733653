use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Top-level configuration, assembled from environment variables.
///
/// Secrets are deliberately *not* read here: each client resolves its own
/// key at first use (`require_secret`), so the server can boot without a
/// fully configured environment and `/health` can report what is missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address, `0.0.0.0:<PORT>`.
    pub bind_addr: String,
    pub vector: VectorConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub ingest: IngestConfig,
    pub search: SearchConfig,
}

/// External vector store (ANN service with metadata pre-filtering).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    /// `"http"` for the remote store, `"memory"` for the in-process one.
    pub backend: String,
    pub base_url: String,
    /// VECTOR_INDEX_NAME.
    pub index_name: String,
    /// Per-upsert and per-query timeout.
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    /// Fixed output dimension of the provider.
    pub dim: usize,
    /// Input cap per text, chars. Truncated on a UTF-8 boundary.
    pub max_input_chars: usize,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub chat_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Files larger than this are skipped by the walker.
    pub max_file_bytes: u64,
    /// Files smaller than this become a single chunk.
    pub min_chunk_bytes: usize,
    /// Target chunk size, bytes (~512 embedder tokens).
    pub target_chunk_bytes: usize,
    /// Hard per-chunk ceiling, bytes (~1024 tokens).
    pub max_chunk_bytes: usize,
    /// Overlap carried between consecutive chunks, chars.
    pub overlap_chars: usize,
    /// Micro-batch size for embed+upsert; floor 1, capped at 32.
    pub batch_size: usize,
    /// Max in-flight upsert batches.
    pub max_in_flight: usize,
    /// Abort after this many consecutive skipped chunks.
    pub max_consecutive_skips: usize,
    pub fetch_timeout_secs: u64,
    pub job_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub top_k_dense: usize,
    pub top_k_sparse: usize,
    pub rrf_k: f32,
    pub dense_weight: f32,
    pub sparse_weight: f32,
    /// Fall back to the unfiltered fused set below this many candidates.
    pub min_candidates: usize,
    /// Chunks considered for the answer context.
    pub context_chunks: usize,
    /// Context budget, tokens (estimated at ~4 chars/token).
    pub context_token_budget: usize,
    /// Pre-filters estimated below this selectivity are dropped.
    pub selectivity_min: f64,
    /// Pre-filters estimated above this selectivity are dropped.
    pub selectivity_max: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            vector: VectorConfig {
                backend: "http".to_string(),
                base_url: "https://api.pinecone.io".to_string(),
                index_name: "repo-rag".to_string(),
                request_timeout_secs: 15,
            },
            embedding: EmbeddingConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                model: "text-embedding-3-small".to_string(),
                dim: 768,
                max_input_chars: 3_000,
                request_timeout_secs: 30,
            },
            llm: LlmConfig {
                base_url: "https://api.groq.com/openai/v1".to_string(),
                chat_model: "llama-3.1-8b-instant".to_string(),
                temperature: 0.2,
                max_tokens: 2_048,
                request_timeout_secs: 60,
            },
            ingest: IngestConfig {
                max_file_bytes: 1_048_576,
                min_chunk_bytes: 100,
                target_chunk_bytes: 2_000,
                max_chunk_bytes: 4_000,
                overlap_chars: 200,
                batch_size: 8,
                max_in_flight: 4,
                max_consecutive_skips: 50,
                fetch_timeout_secs: 120,
                job_timeout_secs: 600,
            },
            search: SearchConfig {
                top_k_dense: 40,
                top_k_sparse: 40,
                rrf_k: 60.0,
                dense_weight: 1.0,
                sparse_weight: 0.5,
                min_candidates: 5,
                context_chunks: 10,
                context_token_budget: 8_000,
                selectivity_min: 0.10,
                selectivity_max: 0.50,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(port) = std::env::var("PORT") {
            config.bind_addr = format!("0.0.0.0:{port}");
        }
        if let Ok(backend) = std::env::var("REPO_RAG_VECTOR_BACKEND") {
            config.vector.backend = backend;
        }
        if let Ok(url) = std::env::var("VECTOR_STORE_URL") {
            config.vector.base_url = url;
        }
        if let Ok(name) = std::env::var("VECTOR_INDEX_NAME") {
            config.vector.index_name = name;
        }
        if let Ok(url) = std::env::var("EMBED_BASE_URL") {
            config.embedding.base_url = url;
        }
        if let Ok(model) = std::env::var("EMBED_MODEL") {
            config.embedding.model = model;
        }
        if let Ok(dim) = std::env::var("EMBED_DIM") {
            if let Ok(d) = dim.parse() {
                config.embedding.dim = d;
            }
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Ok(val) = std::env::var("REPO_RAG_MAX_FILE_BYTES") {
            if let Ok(v) = val.parse() {
                config.ingest.max_file_bytes = v;
            }
        }
        if let Ok(val) = std::env::var("REPO_RAG_BATCH_SIZE") {
            if let Ok(v) = val.parse::<usize>() {
                config.ingest.batch_size = v.clamp(1, 32);
            }
        }
        if let Ok(val) = std::env::var("REPO_RAG_MAX_IN_FLIGHT") {
            if let Ok(v) = val.parse::<usize>() {
                config.ingest.max_in_flight = v.max(1);
            }
        }
        if let Ok(val) = std::env::var("REPO_RAG_JOB_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                config.ingest.job_timeout_secs = v;
            }
        }
        if let Ok(val) = std::env::var("REPO_RAG_TOP_K") {
            if let Ok(v) = val.parse::<usize>() {
                config.search.top_k_dense = v;
                config.search.top_k_sparse = v;
            }
        }

        config
    }

    /// Whether the three external-service secrets are all present. Only a
    /// health-report signal; actual resolution happens lazily per client.
    pub fn secrets_configured() -> bool {
        ["VECTOR_STORE_API_KEY", "EMBED_API_KEY", "LLM_API_KEY"]
            .iter()
            .all(|k| std::env::var(k).map(|v| !v.is_empty()).unwrap_or(false))
    }
}

/// Read a required secret from the environment at first use.
pub fn require_secret(name: &str) -> Result<String, EngineError> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(EngineError::Config(format!(
            "required environment variable {name} is not set"
        ))),
    }
}
