use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse file classification assigned by the walker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Code,
    Test,
    Config,
    Docs,
    Build,
    Other,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Code => "code",
            FileCategory::Test => "test",
            FileCategory::Config => "config",
            FileCategory::Docs => "docs",
            FileCategory::Build => "build",
            FileCategory::Other => "other",
        }
    }
}

/// Word-count bucket for a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeCategory {
    Small,
    Medium,
    Large,
}

impl SizeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeCategory::Small => "small",
            SizeCategory::Medium => "medium",
            SizeCategory::Large => "large",
        }
    }
}

/// A file accepted by the walker. Lives only for the duration of one
/// ingestion; the content is dropped once chunks are built.
#[derive(Debug, Clone)]
pub struct RepoFile {
    /// Path relative to the repo root, forward slashes.
    pub path: String,
    pub language: String,
    pub category: FileCategory,
    pub size_bytes: u64,
    /// Number of path separators from the repo root.
    pub depth: u32,
    pub content: String,
}

/// Per-chunk attributes stored alongside the vector.
///
/// The first four metadata fields (`category`, `language`, `depth`,
/// `size_category`) are indexed in the vector store and usable in
/// pre-filters; the rest are post-filter and display fields. Serialized
/// field names are the canonical key set for the store payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub path: String,
    /// 1-indexed, inclusive.
    pub start_line: usize,
    /// 1-indexed, inclusive.
    pub end_line: usize,
    pub text: String,
    pub category: FileCategory,
    pub language: String,
    pub depth: u32,
    pub size_category: SizeCategory,
    pub has_class_def: bool,
    pub has_fn_def: bool,
    pub has_imports: bool,
    pub has_tests: bool,
    /// Heuristic score in [1, 10].
    pub complexity: u8,
    pub word_count: usize,
}

impl ChunkPayload {
    /// Look up a payload field by its canonical name, as a JSON value.
    /// Used by filter evaluation; returns `None` for unknown fields.
    pub fn field(&self, name: &str) -> Option<serde_json::Value> {
        use serde_json::json;
        let value = match name {
            "category" => json!(self.category.as_str()),
            "language" => json!(self.language),
            "depth" => json!(self.depth),
            "size_category" => json!(self.size_category.as_str()),
            "has_class_def" => json!(self.has_class_def),
            "has_fn_def" => json!(self.has_fn_def),
            "has_imports" => json!(self.has_imports),
            "has_tests" => json!(self.has_tests),
            "complexity" => json!(self.complexity),
            "word_count" => json!(self.word_count),
            "path" => json!(self.path),
            "start_line" => json!(self.start_line),
            "end_line" => json!(self.end_line),
            _ => return None,
        };
        Some(value)
    }
}

/// A fully enriched chunk ready for embedding and upsert.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Content-derived id, stable across re-ingests of identical content.
    pub id: String,
    pub repo_id: String,
    pub payload: ChunkPayload,
}

/// A tracked repository. Created on first successful ingest, counts and
/// `indexed_at` updated on re-ingest. Held in memory only; the vector
/// store namespace is the durable artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoRecord {
    pub id: String,
    pub url: String,
    pub revision: String,
    /// Equals `id`; scopes every chunk in the vector store.
    pub namespace: String,
    pub file_count: usize,
    pub chunk_count: usize,
    pub indexed_at: DateTime<Utc>,
}

/// Derive a stable repository id from its URL: case-folded, scheme and
/// trailing `.git` stripped, every non-alphanumeric run collapsed to `-`.
///
/// # Examples
///
/// ```
/// use repo_rag::models::repo_id_from_url;
///
/// assert_eq!(
///     repo_id_from_url("https://github.com/Tokio-RS/Tokio.git"),
///     "github-com-tokio-rs-tokio"
/// );
/// ```
pub fn repo_id_from_url(url: &str) -> String {
    let lower = url.trim().to_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .or_else(|| lower.strip_prefix("git://"))
        .or_else(|| lower.strip_prefix("ssh://"))
        .unwrap_or(&lower);
    let rest = rest.strip_suffix(".git").unwrap_or(rest);

    let mut id = String::with_capacity(rest.len());
    let mut prev_dash = false;
    for c in rest.chars() {
        if c.is_ascii_alphanumeric() {
            id.push(c);
            prev_dash = false;
        } else if !prev_dash && !id.is_empty() {
            id.push('-');
            prev_dash = true;
        }
    }
    while id.ends_with('-') {
        id.pop();
    }
    id
}

// ─── Job state ───────────────────────────────────────────

/// Terminal result of a successful ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSummary {
    pub success: bool,
    pub file_count: usize,
    pub chunk_count: usize,
    pub skipped_count: usize,
}

/// Captured terminal failure of an ingestion job. The digest is for log
/// correlation; it never reaches clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub kind: String,
    pub message: String,
    pub stack_digest: String,
}

/// Immutable copy of the job state at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub in_progress: bool,
    pub repo_url: Option<String>,
    /// 0..=100, monotone non-decreasing within one job.
    pub progress: u8,
    pub stage: String,
    pub started_at: Option<DateTime<Utc>>,
    pub result: Option<IngestSummary>,
    pub error: Option<JobError>,
}

// ─── API contracts ───────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct IndexRepoRequest {
    pub repo_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexRepoResponse {
    pub message: String,
    pub repo_url: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressResponse {
    pub progress: u8,
    pub stage: String,
    pub in_progress: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<IngestSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<JobSnapshot> for ProgressResponse {
    fn from(snap: JobSnapshot) -> Self {
        Self {
            progress: snap.progress,
            stage: snap.stage,
            in_progress: snap.in_progress,
            repo_url: snap.repo_url,
            result: snap.result,
            error: snap.error.map(|e| format!("{}: {}", e.kind, e.message)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    /// Optional chat-model override forwarded to the LLM call.
    #[serde(default)]
    pub model: Option<String>,
}

/// One cited retrieval source, deduplicated by `(file, lines)`.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub file: String,
    /// `"<start>-<end>"`, 1-indexed inclusive.
    pub lines: String,
    pub score: f32,
    pub category: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Confidence {
    pub score: f32,
    /// `high`, `medium`, `low`, or `none` when nothing was retrieved.
    pub level: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub confidence: Confidence,
    pub intent: String,
}
