use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::Config;
use crate::embed::{Embedder, HttpEmbedder};
use crate::ingest::job::JobTracker;
use crate::llm::ChatClient;
use crate::models::RepoRecord;
use crate::search::sparse::CorpusCatalog;
use crate::vector::http::HttpVectorStore;
use crate::vector::memory::MemoryVectorStore;
use crate::vector::VectorStore;

/// Shared application state.
///
/// The store and embedder are trait objects so tests and the `memory`
/// backend can swap in local implementations; everything else is the
/// concrete service wiring.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub http_client: reqwest::Client,
    pub job: Arc<JobTracker>,
    pub store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<ChatClient>,
    pub catalog: Arc<CorpusCatalog>,
    pub repos: Arc<RwLock<Vec<RepoRecord>>>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(120))
            .build()?;

        let store: Arc<dyn VectorStore> = match config.vector.backend.as_str() {
            "memory" => Arc::new(MemoryVectorStore::new()),
            _ => Arc::new(HttpVectorStore::new(
                http_client.clone(),
                config.vector.clone(),
            )),
        };
        let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::new(
            http_client.clone(),
            config.embedding.clone(),
        ));

        Ok(Self::with_components(config, http_client, store, embedder))
    }

    /// Assemble state around explicit store/embedder implementations.
    /// This is the seam the integration tests use.
    pub fn with_components(
        config: Config,
        http_client: reqwest::Client,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        let llm = Arc::new(ChatClient::new(http_client.clone(), config.llm.clone()));
        Self {
            config,
            http_client,
            job: Arc::new(JobTracker::new()),
            store,
            embedder,
            llm,
            catalog: Arc::new(CorpusCatalog::new()),
            repos: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// The namespace `/chat` answers against: the most recently indexed
    /// repository, if any.
    pub fn active_namespace(&self) -> Option<String> {
        let repos = self.repos.read();
        repos
            .iter()
            .max_by_key(|r| r.indexed_at)
            .map(|r| r.namespace.clone())
    }
}
