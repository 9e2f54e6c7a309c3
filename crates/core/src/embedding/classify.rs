//! Content-type classification: code, natural language, or a mix of both.
//!
//! Two independent scores in \[0, 1\] are computed. The code score looks at the
//! non-prose part of the input (keyword density, punctuation density, indentation,
//! identifier shapes) and is discounted by the share of the input that is prose
//! (comments and docstrings). The natural-language score looks at stopword density,
//! sentence structure and the share of alphabetic text, discounted by the code score.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

/// Docstrings, block comments and line comments.
static PROSE_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)""".*?"""|'''.*?'''|/\*.*?\*/|//[^\n]*|#[ \t][^\n]*"#)
        .expect("prose segment pattern is valid")
});

static CODE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:def|fn|function|class|return|import|const|let|var|pub|impl|struct|enum|async|await|self|lambda|elif|println|console|int|str|bool|void|null|None|True|False)\b|->|=>|::|==|!=|&&|\|\||\+=",
    )
    .expect("code token pattern is valid")
});

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("word pattern is valid"));

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z][A-Za-z0-9]*(?:_[A-Za-z0-9]+)+|[a-z][a-z0-9]*[A-Z][A-Za-z0-9]*)$")
        .expect("identifier pattern is valid")
});

static SENTENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^.!?\n]+[.!?]*").expect("sentence pattern is valid"));

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "do", "does", "for",
        "from", "has", "have", "how", "i", "if", "in", "into", "is", "it", "its", "of", "on",
        "or", "our", "so", "such", "that", "the", "their", "then", "there", "these", "they",
        "this", "to", "was", "we", "were", "what", "when", "where", "which", "who", "why",
        "will", "with", "would", "you", "your",
    ]
    .into_iter()
    .collect()
});

const CODE_SYMBOLS: &str = "{}()[];:=<>_'\"`";

/// Which embedding route a piece of content takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Code,
    NaturalLanguage,
    Mixed,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Code => "code",
            ContentType::NaturalLanguage => "natural_language",
            ContentType::Mixed => "mixed",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationScores {
    pub code: f32,
    pub natural_language: f32,
}

impl ClassificationScores {
    /// Code wins if it clears the threshold and is not outscored; otherwise
    /// natural language if it clears the threshold; otherwise mixed.
    pub fn decide(&self, threshold: f32) -> ContentType {
        if self.code >= threshold && self.code >= self.natural_language {
            ContentType::Code
        } else if self.natural_language >= threshold {
            ContentType::NaturalLanguage
        } else {
            ContentType::Mixed
        }
    }
}

pub fn classify(text: &str, threshold: f32) -> ContentType {
    scores(text).decide(threshold)
}

pub fn scores(text: &str) -> ClassificationScores {
    let total_chars = non_whitespace(text);
    if total_chars == 0 {
        return ClassificationScores {
            code: 0.0,
            natural_language: 0.0,
        };
    }
    let prose_chars: usize = PROSE_SEGMENT
        .find_iter(text)
        .map(|m| non_whitespace(m.as_str()))
        .sum();
    let prose_ratio = prose_chars as f32 / total_chars as f32;
    let code_part = PROSE_SEGMENT.replace_all(text, "");

    let code = (code_structure(&code_part) * (1.0 - prose_ratio)).clamp(0.0, 1.0);
    let natural_language = (language_structure(text) * (1.0 - code)).clamp(0.0, 1.0);
    ClassificationScores {
        code,
        natural_language,
    }
}

fn non_whitespace(s: &str) -> usize {
    s.chars().filter(|c| !c.is_whitespace()).count()
}

fn code_structure(code: &str) -> f32 {
    let lines: Vec<&str> = code.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return 0.0;
    }
    let line_count = lines.len() as f32;

    let keyword_hits = CODE_TOKEN.find_iter(code).count() as f32;
    let keyword = (keyword_hits / line_count).min(1.0);

    let chars = non_whitespace(code).max(1) as f32;
    let symbols = code.chars().filter(|c| CODE_SYMBOLS.contains(*c)).count() as f32;
    let symbol = (symbols / chars / 0.15).min(1.0);

    let indented = lines
        .iter()
        .filter(|l| l.starts_with(' ') || l.starts_with('\t'))
        .count() as f32;
    let indent = (2.0 * indented / line_count).min(1.0);

    let words: Vec<&str> = WORD.find_iter(code).map(|m| m.as_str()).collect();
    let identifier = if words.is_empty() {
        0.0
    } else {
        let shaped = words.iter().filter(|w| IDENTIFIER.is_match(w)).count() as f32;
        (4.0 * shaped / words.len() as f32).min(1.0)
    };

    0.35 * keyword + 0.25 * symbol + 0.2 * indent + 0.2 * identifier
}

fn language_structure(text: &str) -> f32 {
    let words: Vec<String> = text
        .split(|c: char| !c.is_ascii_alphabetic() && c != '\'')
        .filter(|w| w.chars().any(|c| c.is_ascii_alphabetic()))
        .map(|w| w.trim_matches('\'').to_ascii_lowercase())
        .collect();
    if words.is_empty() {
        return 0.0;
    }
    let stop = words.iter().filter(|w| STOP_WORDS.contains(w.as_str())).count() as f32;
    let stopword = (stop / words.len() as f32 / 0.4).min(1.0);

    let mut chunks = 0usize;
    let mut proper = 0usize;
    for m in SENTENCE.find_iter(text) {
        let chunk = m.as_str().trim();
        let Some(first_alpha) = chunk.chars().find(|c| c.is_alphabetic()) else {
            continue;
        };
        chunks += 1;
        let word_count = chunk.split_whitespace().count();
        if first_alpha.is_uppercase() && word_count >= 3 && chunk.ends_with(['.', '!', '?']) {
            proper += 1;
        }
    }
    let sentence = if chunks == 0 {
        0.0
    } else {
        proper as f32 / chunks as f32
    };

    let total = text.chars().count().max(1) as f32;
    let alpha = text
        .chars()
        .filter(|c| c.is_alphabetic() || c.is_whitespace())
        .count() as f32;
    let alphabetic = alpha / total;

    0.4 * stopword + 0.35 * sentence + 0.25 * alphabetic
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CLASSIFY_THRESHOLD as T;

    const DOCSTRING_FN: &str = "def normalize(values):\n    \"\"\"Scale the values so they sum to one.\"\"\"\n    total = sum(values)\n    return [v / total for v in values]";

    #[test]
    fn test_python_signature_is_code() {
        let text = "def validate_email(x: str) -> bool:\n    return '@' in x";
        let s = scores(text);
        assert!(s.code > 0.85, "code score {}", s.code);
        assert_eq!(classify(text, T), ContentType::Code);
    }

    #[test]
    fn test_question_is_natural_language() {
        let text = "What is the capital of France?";
        let s = scores(text);
        assert!(s.natural_language > 0.9, "nl score {}", s.natural_language);
        assert_eq!(s.code, 0.0);
        assert_eq!(classify(text, T), ContentType::NaturalLanguage);
    }

    #[test]
    fn test_docstring_function_is_mixed() {
        let s = scores(DOCSTRING_FN);
        assert!(s.code < T && s.natural_language < T, "{s:?}");
        assert_eq!(classify(DOCSTRING_FN, T), ContentType::Mixed);
    }

    #[test]
    fn test_rust_snippet_is_code() {
        let text = "fn main() {\n    let x = compute_total(&items);\n    println!(\"{x}\");\n}";
        assert_eq!(classify(text, T), ContentType::Code);
    }

    #[test]
    fn test_paragraph_is_natural_language() {
        let text = "The cache keeps recently used entries in memory. When it is full, the oldest entry is removed.";
        assert_eq!(classify(text, T), ContentType::NaturalLanguage);
    }

    #[test]
    fn test_empty_is_mixed() {
        assert_eq!(classify("", T), ContentType::Mixed);
        assert_eq!(classify("   \n\t", T), ContentType::Mixed);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let a = scores(DOCSTRING_FN);
        for _ in 0..5 {
            assert_eq!(scores(DOCSTRING_FN), a);
        }
    }

    #[test]
    fn test_scores_in_unit_range() {
        for text in [
            "}}}}{{{{;;;;",
            "the the the the",
            "x",
            "// only a comment",
            "SELECT * FROM users WHERE id = 1;",
        ] {
            let s = scores(text);
            assert!((0.0..=1.0).contains(&s.code), "{text}: {s:?}");
            assert!((0.0..=1.0).contains(&s.natural_language), "{text}: {s:?}");
        }
    }
}
