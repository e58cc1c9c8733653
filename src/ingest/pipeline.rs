//! The ingestion pipeline body: clear namespace → clone → walk →
//! chunk+enrich → embed+upsert, with progress mapped into the bands the
//! job tracker exposes. Runs off the request path; the caller owns the
//! terminal-state guarantee.

use chrono::Utc;

use crate::chunking;
use crate::error::EngineError;
use crate::git;
use crate::ingest::indexer::Indexer;
use crate::ingest::job::CancelFlag;
use crate::models::{repo_id_from_url, Chunk, IngestSummary, RepoRecord};
use crate::state::AppState;

/// Execute one full ingestion. Every `?` here surfaces in the job's
/// terminal error; the fetched checkout is removed on all exits.
pub async fn run(
    state: &AppState,
    repo_url: &str,
    cancel: &CancelFlag,
) -> Result<IngestSummary, EngineError> {
    let namespace = repo_id_from_url(repo_url);
    if namespace.is_empty() {
        return Err(EngineError::Fetch(format!("invalid repository url: {repo_url}")));
    }

    // Stage 1: clear any previous contents of this namespace (0-10%).
    state.job.update("Preparing index", 0);
    state.store.delete_namespace(&namespace).await?;
    state.catalog.delete_namespace(&namespace);
    state.job.update("Index cleared", 10);
    cancel.check()?;

    // Stage 2: shallow clone (10-30%).
    state.job.update("Cloning repository", 15);
    let url = repo_url.to_string();
    let fetch_timeout = std::time::Duration::from_secs(state.config.ingest.fetch_timeout_secs);
    let fetched = tokio::time::timeout(
        fetch_timeout,
        tokio::task::spawn_blocking(move || git::fetch_repo(&url, None)),
    )
    .await
    .map_err(|_| EngineError::Fetch("clone timed out".into()))?
    .map_err(|e| EngineError::Fetch(format!("clone task failed: {e}")))??;
    state.job.update("Repository cloned", 30);
    cancel.check()?;

    // Stage 3: walk, chunk, enrich (30-60%). CPU-bound, so off the
    // async threads; the checkout moves into the task and back out to
    // stay alive until walking finishes.
    state.job.update("Scanning files", 35);
    let max_file_bytes = state.config.ingest.max_file_bytes;
    let ingest_cfg = state.config.ingest.clone();
    let ns = namespace.clone();
    let (revision, file_count, chunks) = tokio::task::spawn_blocking(move || {
        let files = git::walk::walk_repo(fetched.path(), max_file_bytes);
        let file_count = files.len();
        let mut chunks: Vec<Chunk> = Vec::new();
        for file in &files {
            chunks.extend(chunking::chunk_file(&ns, file, &ingest_cfg));
        }
        (fetched.revision.clone(), file_count, chunks)
    })
    .await
    .map_err(|e| EngineError::Index(format!("chunking task failed: {e}")))?;

    tracing::info!("{file_count} files produced {} chunks", chunks.len());
    state.job.update(
        &format!("Processed {file_count} files into {} chunks", chunks.len()),
        60,
    );
    cancel.check()?;

    // Stage 4: embed and upsert (60-100%).
    let indexer = Indexer {
        store: state.store.as_ref(),
        embedder: state.embedder.as_ref(),
        job: state.job.as_ref(),
        cancel,
        cfg: &state.config.ingest,
    };
    let outcome = indexer.index_chunks(&namespace, chunks).await?;
    let chunk_count = outcome.indexed.len();

    // The sparse side and the selectivity histogram see exactly what the
    // store acknowledged.
    state.catalog.replace_namespace(&namespace, outcome.indexed);

    let record = RepoRecord {
        id: namespace.clone(),
        url: repo_url.to_string(),
        revision,
        namespace: namespace.clone(),
        file_count,
        chunk_count,
        indexed_at: Utc::now(),
    };
    {
        let mut repos = state.repos.write();
        repos.retain(|r| r.id != record.id);
        repos.push(record);
    }

    Ok(IngestSummary {
        success: true,
        file_count,
        chunk_count,
        skipped_count: outcome.skipped,
    })
}
