//! Background ingestion: the job tracker, the micro-batched indexer, and
//! the pipeline body that strings the stages together.

pub mod indexer;
pub mod job;
pub mod pipeline;

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;

use crate::error::EngineError;
use crate::ingest::job::CancelFlag;
use crate::state::AppState;

/// Launch the pipeline on a worker task. The request handler returns
/// immediately; this wrapper guarantees the job reaches a terminal state
/// on success, error, panic, and timeout alike.
pub fn spawn_ingestion(state: AppState, repo_url: String, cancel: CancelFlag) {
    tokio::spawn(async move {
        let timeout = Duration::from_secs(state.config.ingest.job_timeout_secs);
        let body = pipeline::run(&state, &repo_url, &cancel);

        let result = match tokio::time::timeout(timeout, AssertUnwindSafe(body).catch_unwind()).await
        {
            Err(_) => {
                cancel.cancel();
                Err(EngineError::Cancelled(format!(
                    "ingestion exceeded {}s, cancelled",
                    timeout.as_secs()
                )))
            }
            Ok(Err(_panic)) => Err(EngineError::Index("ingestion panicked".into())),
            Ok(Ok(result)) => result,
        };

        match result {
            Ok(summary) => {
                tracing::info!(
                    "ingestion complete: {} files, {} chunks, {} skipped",
                    summary.file_count,
                    summary.chunk_count,
                    summary.skipped_count
                );
                state.job.finish_success(summary);
            }
            Err(e) => state.job.finish_error(&e),
        }
    });
}
