//! Line-based splitting with overlap.
//!
//! Split points are chosen in order of preference: a top-level declaration
//! boundary (language-aware regex), a blank line, then whatever newline
//! lands closest to the target size. A chunk never ends mid-line.

use std::sync::LazyLock;

use regex::Regex;

/// Byte/char budgets driving the splitter. Byte counts approximate
/// embedder tokens at ~4 bytes per token.
#[derive(Debug, Clone)]
pub struct SplitConfig {
    /// Files at or below this size are always a single chunk.
    pub min_bytes: usize,
    /// Preferred chunk size.
    pub target_bytes: usize,
    /// Hard ceiling; never exceeded except by a single oversize line.
    pub max_bytes: usize,
    /// Context carried into the next chunk, chars (whole lines).
    pub overlap_chars: usize,
}

/// A contiguous slice of one file. Lines are 1-indexed and inclusive.
#[derive(Debug, Clone)]
pub struct ChunkSpan {
    pub text: String,
    pub start_line: usize,
    pub end_line: usize,
}

static DECL_PYTHON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(async\s+def|def|class)\b").unwrap());
static DECL_RUST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(pub(\([a-z:\s]*\))?\s+)?(async\s+)?(unsafe\s+)?(fn|struct|enum|trait|impl|mod)\b")
        .unwrap()
});
static DECL_JS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(export\s+)?(default\s+)?(async\s+)?(function|class|interface|enum|const|type)\b")
        .unwrap()
});
static DECL_GO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(func|type|var|const)\b").unwrap());
static DECL_C_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(public|private|protected|static|final|abstract|class|struct|enum|void|template|namespace)\b")
        .unwrap()
});
static DECL_RUBY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(def|class|module)\b").unwrap());
static DECL_PHP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(public\s+|private\s+|protected\s+)?(function|class|trait|interface)\b").unwrap()
});
static DECL_MARKDOWN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#{1,6}\s").unwrap());

fn declaration_pattern(language: &str) -> Option<&'static Regex> {
    match language {
        "python" => Some(&DECL_PYTHON),
        "rust" => Some(&DECL_RUST),
        "javascript" | "typescript" => Some(&DECL_JS),
        "go" => Some(&DECL_GO),
        "java" | "csharp" | "c" | "cpp" | "kotlin" | "scala" | "swift" => Some(&DECL_C_LIKE),
        "ruby" => Some(&DECL_RUBY),
        "php" => Some(&DECL_PHP),
        "markdown" => Some(&DECL_MARKDOWN),
        _ => None,
    }
}

/// Split `content` into overlapping spans.
///
/// Empty and whitespace-only files produce nothing. Files at or below the
/// target size come back as a single span.
pub fn split_file(content: &str, language: &str, cfg: &SplitConfig) -> Vec<ChunkSpan> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    let lines: Vec<&str> = content.lines().collect();
    if content.len() <= cfg.min_bytes || content.len() <= cfg.target_bytes {
        return vec![make_span(&lines, 0, lines.len() - 1)];
    }

    let decl = declaration_pattern(language);
    let mut spans = Vec::new();
    let mut start = 0usize;

    while start < lines.len() {
        let mut bytes = 0usize;
        let mut soft: Option<usize> = None;
        let mut end = lines.len() - 1;

        for i in start..lines.len() {
            let line_bytes = lines[i].len() + 1;
            if bytes + line_bytes > cfg.max_bytes && i > start {
                end = i - 1;
                break;
            }
            bytes += line_bytes;
            if soft.is_none() && bytes >= cfg.target_bytes {
                soft = Some(i);
            }
            end = i;
        }

        // Tail fits under the target: emit it and stop.
        if soft.is_none() && end == lines.len() - 1 {
            spans.push(make_span(&lines, start, end));
            break;
        }

        let soft = soft.unwrap_or(end);
        let cut = pick_cut(&lines, start, soft, end, decl);
        spans.push(make_span(&lines, start, cut));

        if cut == lines.len() - 1 {
            break;
        }

        // Back up whole lines until roughly `overlap_chars` are carried
        // into the next chunk.
        let mut next = cut + 1;
        let mut carried = 0usize;
        while next > start + 1 && carried + lines[next - 1].len() + 1 <= cfg.overlap_chars {
            carried += lines[next - 1].len() + 1;
            next -= 1;
        }
        start = next;
    }

    spans
}

/// Choose the last line of the current chunk. `soft` is where the target
/// size was reached, `end` the hard ceiling.
fn pick_cut(
    lines: &[&str],
    start: usize,
    soft: usize,
    end: usize,
    decl: Option<&Regex>,
) -> usize {
    // Don't cut below half the target; tiny fragments embed poorly.
    let floor = start + (soft - start) / 2;

    if let Some(decl) = decl {
        let best = (floor..=end)
            .filter(|&c| c + 1 < lines.len() && decl.is_match(lines[c + 1]))
            .min_by_key(|&c| c.abs_diff(soft));
        if let Some(c) = best {
            return c;
        }
    }

    let best_blank = (floor..=end)
        .filter(|&c| lines[c].trim().is_empty())
        .min_by_key(|&c| c.abs_diff(soft));
    if let Some(c) = best_blank {
        return c;
    }

    soft
}

fn make_span(lines: &[&str], start: usize, end: usize) -> ChunkSpan {
    ChunkSpan {
        text: lines[start..=end].join("\n"),
        start_line: start + 1,
        end_line: end + 1,
    }
}
