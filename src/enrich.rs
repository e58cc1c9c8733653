//! Metadata enrichment: cheap regex-derived attributes per chunk.
//!
//! These back the staged filters at query time. The pre-filterable size
//! bucket comes from the word count; the boolean flags and the complexity
//! score are post-filter attributes. None of this is exact analysis, just
//! a monotone proxy computed in one pass over the text.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::SizeCategory;

/// Attributes derived from a chunk's text.
#[derive(Debug, Clone)]
pub struct Enrichment {
    pub word_count: usize,
    pub size_category: SizeCategory,
    pub has_class_def: bool,
    pub has_fn_def: bool,
    pub has_imports: bool,
    pub has_tests: bool,
    /// `clip(1 + floor(log2(1 + branches + loops + calls/4)), 1, 10)`.
    pub complexity: u8,
}

struct LanguagePatterns {
    class_def: &'static LazyLock<Regex>,
    fn_def: &'static LazyLock<Regex>,
    imports: &'static LazyLock<Regex>,
    tests: &'static LazyLock<Regex>,
}

macro_rules! lang_regex {
    ($name:ident, $pattern:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($pattern).unwrap());
    };
}

lang_regex!(PY_CLASS, r"(?m)^\s*class\s+\w");
lang_regex!(PY_FN, r"(?m)^\s*(async\s+)?def\s+\w");
lang_regex!(PY_IMPORT, r"(?m)^\s*(import|from)\s");
lang_regex!(PY_TEST, r"\bunittest\b|\bpytest\b|(?m)^\s*def\s+test_");

lang_regex!(JS_CLASS, r"(?m)^\s*(export\s+)?(default\s+)?(abstract\s+)?class\s+\w");
lang_regex!(
    JS_FN,
    r"(?m)^\s*(export\s+)?(default\s+)?(async\s+)?function\b|=>\s*\{|\w+\s*\([^)]*\)\s*\{"
);
lang_regex!(JS_IMPORT, r"(?m)^\s*(import\s|const\s+.*=\s*require\()|\brequire\(");
lang_regex!(JS_TEST, r"\b(describe|it|test|expect)\s*\(|\bjest\b|\bmocha\b|\bvitest\b");

lang_regex!(JAVA_CLASS, r"(?m)^\s*(public\s+|private\s+|protected\s+)?(abstract\s+|final\s+)?(class|interface|enum)\s+\w");
lang_regex!(JAVA_FN, r"(?m)^\s*(public|private|protected|static).*\)\s*(throws\s+\w+\s*)?\{");
lang_regex!(JAVA_IMPORT, r"(?m)^\s*import\s+[\w.]+;");
lang_regex!(JAVA_TEST, r"@Test\b|\bjunit\b|\bassertEquals\b");

lang_regex!(GO_FN, r"(?m)^func\s");
lang_regex!(GO_TYPE, r"(?m)^type\s+\w+\s+(struct|interface)\b");
lang_regex!(GO_IMPORT, r#"(?m)^import\s|^\s+"[\w./-]+"$"#);
lang_regex!(GO_TEST, r"(?m)^func\s+Test\w|\btesting\.T\b");

lang_regex!(RUST_CLASS, r"(?m)^\s*(pub\s+)?(struct|enum|trait)\s+\w");
lang_regex!(RUST_FN, r"(?m)^\s*(pub(\([a-z:\s]*\))?\s+)?(async\s+)?(unsafe\s+)?fn\s+\w");
lang_regex!(RUST_IMPORT, r"(?m)^\s*use\s+[\w:]");
lang_regex!(RUST_TEST, r"#\[test\]|#\[cfg\(test\)\]|#\[tokio::test\]");

lang_regex!(C_CLASS, r"(?m)^\s*(class|struct)\s+\w+\s*[{:]");
lang_regex!(C_FN, r"(?m)^\w[\w\s*&:<>,]*\([^;]*\)\s*(const\s*)?\{");
lang_regex!(C_IMPORT, r"(?m)^\s*#\s*include\s*[<\x22]");
lang_regex!(C_TEST, r"\bTEST(_F|_P)?\s*\(|\bgtest\b|\bassert\s*\(");

lang_regex!(RUBY_CLASS, r"(?m)^\s*(class|module)\s+[A-Z]");
lang_regex!(RUBY_FN, r"(?m)^\s*def\s+\w");
lang_regex!(RUBY_IMPORT, r"(?m)^\s*require(_relative)?\s");
lang_regex!(RUBY_TEST, r"\bRSpec\b|(?m)^\s*(describe|it)\s|\bminitest\b");

lang_regex!(PHP_CLASS, r"(?m)^\s*(abstract\s+|final\s+)?(class|trait|interface)\s+\w");
lang_regex!(PHP_FN, r"(?m)^\s*(public\s+|private\s+|protected\s+|static\s+)*function\s+\w");
lang_regex!(PHP_IMPORT, r"(?m)^\s*(use\s+[\w\\]+;|require|include)");
lang_regex!(PHP_TEST, r"\bPHPUnit\b|extends\s+TestCase\b");

// Generic fallback: catches the obvious shapes in any language.
lang_regex!(ANY_CLASS, r"(?m)^\s*class\s+\w");
lang_regex!(ANY_FN, r"(?m)^\s*(def|function|fn|func)\s+\w");
lang_regex!(ANY_IMPORT, r"(?m)^\s*(import|use|require|include|from)\b");
lang_regex!(ANY_TEST, r"(?i)\btest\b");

static BRANCH_OR_LOOP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(if|for|while|switch|case|catch|match|elif|else if)\b").unwrap());
static CALL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w+\s*\(").unwrap());

fn patterns_for(language: &str) -> LanguagePatterns {
    match language {
        "python" => LanguagePatterns {
            class_def: &PY_CLASS,
            fn_def: &PY_FN,
            imports: &PY_IMPORT,
            tests: &PY_TEST,
        },
        "javascript" | "typescript" => LanguagePatterns {
            class_def: &JS_CLASS,
            fn_def: &JS_FN,
            imports: &JS_IMPORT,
            tests: &JS_TEST,
        },
        "java" | "csharp" | "kotlin" | "scala" => LanguagePatterns {
            class_def: &JAVA_CLASS,
            fn_def: &JAVA_FN,
            imports: &JAVA_IMPORT,
            tests: &JAVA_TEST,
        },
        "go" => LanguagePatterns {
            class_def: &GO_TYPE,
            fn_def: &GO_FN,
            imports: &GO_IMPORT,
            tests: &GO_TEST,
        },
        "rust" => LanguagePatterns {
            class_def: &RUST_CLASS,
            fn_def: &RUST_FN,
            imports: &RUST_IMPORT,
            tests: &RUST_TEST,
        },
        "c" | "cpp" => LanguagePatterns {
            class_def: &C_CLASS,
            fn_def: &C_FN,
            imports: &C_IMPORT,
            tests: &C_TEST,
        },
        "ruby" => LanguagePatterns {
            class_def: &RUBY_CLASS,
            fn_def: &RUBY_FN,
            imports: &RUBY_IMPORT,
            tests: &RUBY_TEST,
        },
        "php" => LanguagePatterns {
            class_def: &PHP_CLASS,
            fn_def: &PHP_FN,
            imports: &PHP_IMPORT,
            tests: &PHP_TEST,
        },
        _ => LanguagePatterns {
            class_def: &ANY_CLASS,
            fn_def: &ANY_FN,
            imports: &ANY_IMPORT,
            tests: &ANY_TEST,
        },
    }
}

/// Derive all chunk attributes from its text.
pub fn enrich(text: &str, language: &str) -> Enrichment {
    let word_count = text.split_whitespace().count();
    let size_category = if word_count < 200 {
        SizeCategory::Small
    } else if word_count <= 800 {
        SizeCategory::Medium
    } else {
        SizeCategory::Large
    };

    let patterns = patterns_for(language);

    Enrichment {
        word_count,
        size_category,
        has_class_def: patterns.class_def.is_match(text),
        has_fn_def: patterns.fn_def.is_match(text),
        has_imports: patterns.imports.is_match(text),
        has_tests: patterns.tests.is_match(text),
        complexity: complexity_score(text),
    }
}

/// Branch/loop/call counting folded through a log curve into [1, 10].
fn complexity_score(text: &str) -> u8 {
    let branches_and_loops = BRANCH_OR_LOOP.find_iter(text).count();
    let calls = CALL.find_iter(text).count();
    let signal = 1.0 + branches_and_loops as f64 + calls as f64 / 4.0;
    let score = 1 + signal.log2().floor() as i64;
    score.clamp(1, 10) as u8
}
