//! Chunking: split files into overlapping, line-annotated slices and
//! attach enriched metadata plus a content-derived id.

pub mod splitter;

use sha2::{Digest, Sha256};

use crate::config::IngestConfig;
use crate::enrich;
use crate::models::{Chunk, ChunkPayload, RepoFile};

pub use splitter::{ChunkSpan, SplitConfig};

/// Chunk one walked file. Empty files produce nothing.
pub fn chunk_file(repo_id: &str, file: &RepoFile, cfg: &IngestConfig) -> Vec<Chunk> {
    let split_cfg = SplitConfig {
        min_bytes: cfg.min_chunk_bytes,
        target_bytes: cfg.target_chunk_bytes,
        max_bytes: cfg.max_chunk_bytes,
        overlap_chars: cfg.overlap_chars,
    };

    splitter::split_file(&file.content, &file.language, &split_cfg)
        .into_iter()
        .map(|span| {
            let features = enrich::enrich(&span.text, &file.language);
            let id = chunk_id(repo_id, &file.path, span.start_line, span.end_line, &span.text);
            Chunk {
                id,
                repo_id: repo_id.to_string(),
                payload: ChunkPayload {
                    path: file.path.clone(),
                    start_line: span.start_line,
                    end_line: span.end_line,
                    text: span.text,
                    category: file.category,
                    language: file.language.clone(),
                    depth: file.depth,
                    size_category: features.size_category,
                    has_class_def: features.has_class_def,
                    has_fn_def: features.has_fn_def,
                    has_imports: features.has_imports,
                    has_tests: features.has_tests,
                    complexity: features.complexity,
                    word_count: features.word_count,
                },
            }
        })
        .collect()
}

/// Content-derived chunk id: hex SHA-256 over
/// `repo_id ‖ path ‖ start ‖ end ‖ sha256(text)`. Identical content at the
/// same location always yields the same id, so re-ingesting an unchanged
/// file is a pure overwrite in the store.
pub fn chunk_id(repo_id: &str, path: &str, start_line: usize, end_line: usize, text: &str) -> String {
    let content_hash = hex_sha256(text.as_bytes());

    let mut hasher = Sha256::new();
    hasher.update(repo_id.as_bytes());
    hasher.update(b"\x00");
    hasher.update(path.as_bytes());
    hasher.update(b"\x00");
    hasher.update(start_line.to_le_bytes());
    hasher.update(end_line.to_le_bytes());
    hasher.update(content_hash.as_bytes());
    hex_sha256_finalize(hasher)
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_sha256_finalize(hasher)
}

fn hex_sha256_finalize(hasher: Sha256) -> String {
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
