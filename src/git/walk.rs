//! File enumeration and classification.
//!
//! Walks a checkout, rejects binaries and oversize files, and assigns a
//! language, a category, and a directory depth to everything that remains.

use std::path::Path;

use walkdir::WalkDir;

use crate::models::{FileCategory, RepoFile};

/// How many leading bytes are checked for UTF-8 validity before a file is
/// read in full. Anything that fails the probe is treated as binary.
const UTF8_PROBE_BYTES: usize = 8_192;

/// Walk all indexable files under `root`. `max_file_bytes` caps individual
/// file size (default 1 MiB from config).
pub fn walk_repo(root: &Path, max_file_bytes: u64) -> Vec<RepoFile> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_denied_dir(e))
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();

        let size_bytes = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(_) => continue,
        };
        if size_bytes > max_file_bytes {
            tracing::debug!("skipping oversize file: {}", path.display());
            continue;
        }

        if !passes_utf8_probe(path) {
            continue;
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => continue, // invalid UTF-8 past the probe window
        };

        let relative = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        let language = detect_language(&relative, &content);
        let category = classify(&relative, &language);
        let depth = relative.matches('/').count() as u32;

        files.push(RepoFile {
            path: relative,
            language,
            category,
            size_bytes,
            depth,
            content,
        });
    }

    files
}

fn is_denied_dir(entry: &walkdir::DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') && name.len() > 1 {
        return true;
    }
    matches!(
        name.as_ref(),
        ".git"
            | "node_modules"
            | "dist"
            | "build"
            | "__pycache__"
            | ".venv"
            | "venv"
            | "target"
            | "vendor"
    )
}

fn passes_utf8_probe(path: &Path) -> bool {
    use std::io::Read;
    let Ok(mut file) = std::fs::File::open(path) else {
        return false;
    };
    let mut buf = vec![0u8; UTF8_PROBE_BYTES];
    let Ok(n) = file.read(&mut buf) else {
        return false;
    };
    buf.truncate(n);
    match std::str::from_utf8(&buf) {
        Ok(_) => true,
        // A multi-byte sequence may be cut at the probe boundary; only
        // errors well before the end mean genuinely non-UTF-8 content.
        Err(e) => e.valid_up_to() + 4 >= n,
    }
}

/// Map a path to a language name. Extension first, then a shebang probe
/// for extensionless scripts, else `unknown`.
pub fn detect_language(path: &str, content: &str) -> String {
    let ext = Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let lang = match ext.as_str() {
        "py" => "python",
        "js" | "jsx" | "mjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "java" => "java",
        "go" => "go",
        "rs" => "rust",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" => "cpp",
        "rb" => "ruby",
        "php" => "php",
        "md" | "markdown" => "markdown",
        "rst" => "rst",
        "txt" => "text",
        "yaml" | "yml" => "yaml",
        "json" => "json",
        "toml" => "toml",
        "sh" | "bash" | "zsh" => "shell",
        "cs" => "csharp",
        "kt" | "kts" => "kotlin",
        "swift" => "swift",
        "scala" => "scala",
        "sql" => "sql",
        "html" | "htm" => "html",
        "css" | "scss" | "less" => "css",
        "xml" => "xml",
        _ => "",
    };
    if !lang.is_empty() {
        return lang.to_string();
    }

    if let Some(first) = content.lines().next() {
        if first.starts_with("#!") {
            if first.contains("python") {
                return "python".to_string();
            }
            if first.contains("node") {
                return "javascript".to_string();
            }
            if first.contains("sh") {
                return "shell".to_string();
            }
        }
    }

    "unknown".to_string()
}

/// Assign a category. Checked in order: test, config, docs, build; files
/// in a recognised programming language default to code, everything else
/// to other.
pub fn classify(path: &str, language: &str) -> FileCategory {
    let lower = path.to_lowercase();
    let file_name = lower.rsplit('/').next().unwrap_or(&lower).to_string();
    let stem = file_name.split('.').next().unwrap_or(&file_name);

    if lower.contains("test") || lower.contains("spec") {
        return FileCategory::Test;
    }

    if matches!(language, "yaml" | "json" | "toml" | "xml")
        || file_name.ends_with(".ini")
        || file_name.ends_with(".cfg")
        || file_name.ends_with(".conf")
        || file_name.ends_with(".env")
        || file_name == ".gitignore"
        || file_name == ".editorconfig"
    {
        return FileCategory::Config;
    }

    if matches!(language, "markdown" | "rst" | "text")
        || matches!(
            stem,
            "readme" | "license" | "licence" | "changelog" | "contributing" | "notice" | "authors"
        )
    {
        return FileCategory::Docs;
    }

    if matches!(
        file_name.as_str(),
        "makefile" | "dockerfile" | "justfile" | "rakefile" | "cmakelists.txt" | "build.gradle" | "pom.xml"
    ) || file_name.ends_with(".gradle")
    {
        return FileCategory::Build;
    }

    if language == "unknown" {
        FileCategory::Other
    } else {
        FileCategory::Code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    // ── language detection ───────────────────────────────

    #[test]
    fn detects_common_extensions() {
        assert_eq!(detect_language("src/main.rs", ""), "rust");
        assert_eq!(detect_language("app.py", ""), "python");
        assert_eq!(detect_language("index.tsx", ""), "typescript");
        assert_eq!(detect_language("lib/util.js", ""), "javascript");
        assert_eq!(detect_language("main.go", ""), "go");
        assert_eq!(detect_language("Foo.java", ""), "java");
        assert_eq!(detect_language("native.c", ""), "c");
        assert_eq!(detect_language("engine.cpp", ""), "cpp");
        assert_eq!(detect_language("app.rb", ""), "ruby");
        assert_eq!(detect_language("index.php", ""), "php");
        assert_eq!(detect_language("README.md", ""), "markdown");
        assert_eq!(detect_language("config.yaml", ""), "yaml");
        assert_eq!(detect_language("data.json", ""), "json");
        assert_eq!(detect_language("Cargo.toml", ""), "toml");
        assert_eq!(detect_language("run.sh", ""), "shell");
    }

    #[test]
    fn shebang_fallback_for_extensionless_scripts() {
        assert_eq!(detect_language("bin/deploy", "#!/usr/bin/env python\nprint()"), "python");
        assert_eq!(detect_language("bin/run", "#!/bin/bash\necho hi"), "shell");
    }

    #[test]
    fn unknown_extension_is_unknown() {
        assert_eq!(detect_language("LICENSE", "MIT License"), "unknown");
        assert_eq!(detect_language("data.bin2", ""), "unknown");
    }

    // ── classification ───────────────────────────────────

    #[test]
    fn test_paths_win_over_everything() {
        assert_eq!(classify("tests/test_auth.py", "python"), FileCategory::Test);
        assert_eq!(classify("src/auth.spec.ts", "typescript"), FileCategory::Test);
        assert_eq!(classify("test/config.yaml", "yaml"), FileCategory::Test);
    }

    #[test]
    fn config_docs_build_code_order() {
        assert_eq!(classify("settings.yaml", "yaml"), FileCategory::Config);
        assert_eq!(classify("README.md", "markdown"), FileCategory::Docs);
        assert_eq!(classify("LICENSE", "unknown"), FileCategory::Docs);
        assert_eq!(classify("Makefile", "unknown"), FileCategory::Build);
        assert_eq!(classify("Dockerfile", "unknown"), FileCategory::Build);
        assert_eq!(classify("src/main.rs", "rust"), FileCategory::Code);
    }

    #[test]
    fn unknown_language_without_rule_is_other() {
        assert_eq!(classify("bin/blob", "unknown"), FileCategory::Other);
    }

    // ── walking ──────────────────────────────────────────
    // tempfile creates dot-prefixed dirs, so walk from a subdirectory.

    fn make_repo_dir() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("repo");
        fs::create_dir_all(&root).unwrap();
        (dir, root)
    }

    #[test]
    fn walk_collects_and_annotates_files() {
        let (_dir, root) = make_repo_dir();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(root.join("README.md"), "# Hello").unwrap();

        let mut files = walk_repo(&root, 1_048_576);
        files.sort_by(|a, b| a.path.cmp(&b.path));

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "README.md");
        assert_eq!(files[0].category, FileCategory::Docs);
        assert_eq!(files[0].depth, 0);
        assert_eq!(files[1].path, "src/main.rs");
        assert_eq!(files[1].language, "rust");
        assert_eq!(files[1].category, FileCategory::Code);
        assert_eq!(files[1].depth, 1);
    }

    #[test]
    fn walk_skips_denied_dirs() {
        let (_dir, root) = make_repo_dir();
        for denied in ["node_modules", "target", "__pycache__", ".git", "vendor"] {
            fs::create_dir_all(root.join(denied)).unwrap();
            fs::write(root.join(denied).join("f.js"), "// dep").unwrap();
        }
        fs::write(root.join("index.js"), "// app").unwrap();

        let files = walk_repo(&root, 1_048_576);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "index.js");
    }

    #[test]
    fn walk_skips_oversize_files() {
        let (_dir, root) = make_repo_dir();
        fs::write(root.join("big.txt"), "x".repeat(2_000)).unwrap();
        fs::write(root.join("small.txt"), "tiny").unwrap();

        let files = walk_repo(&root, 1_000);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "small.txt");
    }

    #[test]
    fn walk_skips_binary_files() {
        let (_dir, root) = make_repo_dir();
        fs::write(root.join("app.rs"), "fn main() {}").unwrap();
        fs::write(root.join("blob.dat"), [0u8, 159, 146, 150, 255, 0, 1]).unwrap();

        let files = walk_repo(&root, 1_048_576);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "app.rs");
    }

    #[test]
    fn walk_empty_dir_is_empty() {
        let (_dir, root) = make_repo_dir();
        assert!(walk_repo(&root, 1_048_576).is_empty());
    }
}
