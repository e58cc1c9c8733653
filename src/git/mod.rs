//! Repository acquisition: shallow clone into a temp directory that is
//! released when the pipeline finishes, on success and failure alike.

pub mod walk;

use std::path::Path;

use tempfile::TempDir;

use crate::error::EngineError;

/// A cloned repository snapshot. Dropping the value removes the on-disk
/// checkout; keep it alive for the duration of the ingestion.
#[derive(Debug)]
pub struct FetchedRepo {
    dir: TempDir,
    /// Resolved commit id of the checked-out revision.
    pub revision: String,
}

impl FetchedRepo {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Shallow-clone `url` at its default branch tip, or at `revision` when
/// given. Blocking; callers run this on a blocking thread.
pub fn fetch_repo(url: &str, revision: Option<&str>) -> Result<FetchedRepo, EngineError> {
    let dir = tempfile::Builder::new()
        .prefix("repo_rag_")
        .tempdir()
        .map_err(|e| EngineError::Fetch(format!("failed to create temp dir: {e}")))?;

    tracing::info!("cloning {url} into {}", dir.path().display());

    let mut fetch_options = git2::FetchOptions::new();
    // Single revision, no history. Keeps disk use bounded for large repos.
    fetch_options.depth(1);

    let repo = git2::build::RepoBuilder::new()
        .fetch_options(fetch_options)
        .clone(url, dir.path())
        .map_err(|e| EngineError::Fetch(format!("failed to clone {url}: {e}")))?;

    if let Some(rev) = revision {
        checkout_revision(&repo, rev)?;
    }

    let head = repo
        .head()
        .and_then(|h| h.peel_to_commit())
        .map_err(|e| EngineError::Fetch(format!("failed to resolve HEAD of {url}: {e}")))?;
    let revision = head.id().to_string();

    tracing::info!("clone complete: {url} at {revision}");
    Ok(FetchedRepo { dir, revision })
}

fn checkout_revision(repo: &git2::Repository, rev: &str) -> Result<(), EngineError> {
    let object = repo
        .revparse_single(rev)
        .map_err(|_| EngineError::Fetch(format!("revision not found: {rev}")))?;
    repo.checkout_tree(&object, None)
        .map_err(|e| EngineError::Fetch(format!("failed to check out {rev}: {e}")))?;
    repo.set_head_detached(object.id())
        .map_err(|e| EngineError::Fetch(format!("failed to detach HEAD at {rev}: {e}")))?;
    Ok(())
}
