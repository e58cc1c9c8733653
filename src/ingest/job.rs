//! Singleton ingestion-job state.
//!
//! At most one job runs at a time; a second start while running yields a
//! conflict. All state lives behind one mutex and every read returns a
//! copy. Progress is clamped monotone non-decreasing for the lifetime of
//! a job, and a job always reaches a terminal state: the pipeline runner
//! wraps the body so that errors, panics, and timeouts all land in
//! `finish_error`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use crate::error::EngineError;
use crate::models::{IngestSummary, JobError, JobSnapshot};

/// Cooperative cancellation handle, checked at stage boundaries and
/// inside the indexer loop.
#[derive(Clone, Default, Debug)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Error out if cancellation was requested.
    pub fn check(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled("ingestion cancelled".into()))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
struct JobState {
    in_progress: bool,
    repo_url: Option<String>,
    progress: u8,
    stage: String,
    started_at: Option<chrono::DateTime<Utc>>,
    result: Option<IngestSummary>,
    error: Option<JobError>,
    cancel: Option<CancelFlag>,
}

/// Process-wide job tracker.
#[derive(Default)]
pub struct JobTracker {
    state: Mutex<JobState>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition to running. Fails with `Conflict` while another job is
    /// active; otherwise clears the previous result/error and returns the
    /// cancellation flag for the new job.
    pub fn try_start(&self, repo_url: &str) -> Result<CancelFlag, EngineError> {
        let mut state = self.state.lock();
        if state.in_progress {
            return Err(EngineError::Conflict);
        }
        let cancel = CancelFlag::new();
        *state = JobState {
            in_progress: true,
            repo_url: Some(repo_url.to_string()),
            progress: 0,
            stage: "Starting".to_string(),
            started_at: Some(Utc::now()),
            result: None,
            error: None,
            cancel: Some(cancel.clone()),
        };
        Ok(cancel)
    }

    /// Update stage and progress. Progress never decreases within a job.
    pub fn update(&self, stage: &str, progress: u8) {
        let mut state = self.state.lock();
        if !state.in_progress {
            return;
        }
        state.stage = stage.to_string();
        state.progress = state.progress.max(progress.min(100));
        tracing::info!("progress: {}% - {stage}", state.progress);
    }

    pub fn finish_success(&self, summary: IngestSummary) {
        let mut state = self.state.lock();
        state.in_progress = false;
        state.progress = 100;
        state.stage = "Complete".to_string();
        state.result = Some(summary);
        state.error = None;
        state.cancel = None;
    }

    pub fn finish_error(&self, err: &EngineError) {
        let digest = err.stack_digest();
        tracing::error!("ingestion failed [{digest}]: {err}");
        let mut state = self.state.lock();
        state.in_progress = false;
        state.stage = "Error".to_string();
        state.error = Some(JobError {
            kind: err.kind().to_string(),
            message: err.to_string(),
            stack_digest: digest,
        });
        state.result = None;
        state.cancel = None;
    }

    /// Request cancellation of the running job, if any.
    pub fn cancel(&self) {
        let state = self.state.lock();
        if let Some(cancel) = &state.cancel {
            cancel.cancel();
        }
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let state = self.state.lock();
        JobSnapshot {
            in_progress: state.in_progress,
            repo_url: state.repo_url.clone(),
            progress: state.progress,
            stage: state.stage.clone(),
            started_at: state.started_at,
            result: state.result.clone(),
            error: state.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_start_conflicts_and_leaves_state_alone() {
        let tracker = JobTracker::new();
        tracker.try_start("https://example.com/a.git").unwrap();
        tracker.update("Cloning repository", 15);

        let err = tracker.try_start("https://example.com/b.git").unwrap_err();
        assert_eq!(err.kind(), "conflict");

        let snap = tracker.snapshot();
        assert!(snap.in_progress);
        assert_eq!(snap.repo_url.as_deref(), Some("https://example.com/a.git"));
        assert_eq!(snap.progress, 15);
    }

    #[test]
    fn progress_is_monotone() {
        let tracker = JobTracker::new();
        tracker.try_start("url").unwrap();
        tracker.update("a", 40);
        tracker.update("b", 10);
        assert_eq!(tracker.snapshot().progress, 40);
        tracker.update("c", 70);
        assert_eq!(tracker.snapshot().progress, 70);
    }

    #[test]
    fn success_is_terminal_and_restartable() {
        let tracker = JobTracker::new();
        tracker.try_start("url").unwrap();
        tracker.finish_success(IngestSummary {
            success: true,
            file_count: 3,
            chunk_count: 9,
            skipped_count: 0,
        });

        let snap = tracker.snapshot();
        assert!(!snap.in_progress);
        assert_eq!(snap.progress, 100);
        assert_eq!(snap.result.as_ref().unwrap().chunk_count, 9);
        assert!(snap.error.is_none());

        // Terminal state allows a fresh start, which clears the result.
        tracker.try_start("url2").unwrap();
        let snap = tracker.snapshot();
        assert!(snap.result.is_none());
        assert_eq!(snap.progress, 0);
    }

    #[test]
    fn error_captures_kind_and_digest() {
        let tracker = JobTracker::new();
        tracker.try_start("url").unwrap();
        tracker.finish_error(&EngineError::Fetch("host unreachable".into()));

        let snap = tracker.snapshot();
        assert!(!snap.in_progress);
        let error = snap.error.unwrap();
        assert_eq!(error.kind, "fetch");
        assert!(error.message.contains("host unreachable"));
        assert_eq!(error.stack_digest.len(), 12);
    }

    #[test]
    fn cancel_reaches_the_running_flag() {
        let tracker = JobTracker::new();
        let flag = tracker.try_start("url").unwrap();
        assert!(!flag.is_cancelled());
        tracker.cancel();
        assert!(flag.is_cancelled());
        assert!(flag.check().is_err());
    }

    #[test]
    fn update_after_terminal_is_ignored() {
        let tracker = JobTracker::new();
        tracker.try_start("url").unwrap();
        tracker.finish_error(&EngineError::Conflict);
        tracker.update("late", 50);
        assert_eq!(tracker.snapshot().stage, "Error");
    }
}
