use sha2::{Digest, Sha256};

/// Errors produced by the ingestion and query pipelines.
///
/// Library code returns this type directly; the HTTP layer converts to
/// status codes at the boundary. Each variant maps to a stable wire kind
/// via [`EngineError::kind`].
///
/// # Examples
///
/// ```
/// use repo_rag::error::EngineError;
///
/// let err = EngineError::Fetch("host unreachable".into());
/// assert_eq!(err.kind(), "fetch");
/// assert!(err.to_string().contains("host unreachable"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Repository unreachable, auth failure, or revision not found.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Embedding provider failure after retries, or invalid output.
    #[error("embedding error: {0}")]
    Embed(String),

    /// Vector store upsert/query failure after retries.
    #[error("vector store error: {0}")]
    Upsert(String),

    /// Aggregated ingestion failure (e.g. too many consecutive skips).
    #[error("indexing failed: {0}")]
    Index(String),

    /// Malformed filter plan. Queries disable filters and continue.
    #[error("filter error: {0}")]
    Filter(String),

    /// LLM call failed or timed out. No partial answer is emitted.
    #[error("answer error: {0}")]
    Answer(String),

    /// An ingestion job is already running.
    #[error("an ingestion job is already in progress")]
    Conflict,

    /// Cooperative cancellation (shutdown or job timeout).
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Missing or invalid configuration (e.g. an absent secret).
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Stable machine-readable name for this error's class.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Fetch(_) => "fetch",
            EngineError::Embed(_) => "embed",
            EngineError::Upsert(_) => "upsert",
            EngineError::Index(_) => "index",
            EngineError::Filter(_) => "filter",
            EngineError::Answer(_) => "answer",
            EngineError::Conflict => "conflict",
            EngineError::Cancelled(_) => "cancelled",
            EngineError::Config(_) => "config",
            EngineError::Io(_) => "io",
        }
    }

    /// Short hex digest of the error for log correlation. The full message
    /// is logged server-side; clients only ever see `kind` + message.
    pub fn stack_digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.kind().as_bytes());
        hasher.update(self.to_string().as_bytes());
        let digest = hasher.finalize();
        hex_prefix(&digest, 12)
    }
}

fn hex_prefix(bytes: &[u8], chars: usize) -> String {
    let mut out = String::with_capacity(chars);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
        if out.len() >= chars {
            break;
        }
    }
    out.truncate(chars);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_stable() {
        assert_eq!(EngineError::Conflict.kind(), "conflict");
        assert_eq!(EngineError::Answer("timeout".into()).kind(), "answer");
        assert_eq!(EngineError::Cancelled("shutdown".into()).kind(), "cancelled");
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: EngineError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn stack_digest_is_deterministic_and_short() {
        let a = EngineError::Index("too many skips".into());
        let b = EngineError::Index("too many skips".into());
        assert_eq!(a.stack_digest(), b.stack_digest());
        assert_eq!(a.stack_digest().len(), 12);
    }

    #[test]
    fn different_errors_have_different_digests() {
        let a = EngineError::Fetch("x".into());
        let b = EngineError::Embed("x".into());
        assert_ne!(a.stack_digest(), b.stack_digest());
    }
}
