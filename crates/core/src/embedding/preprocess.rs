//! Light text normalization applied before embedding.
//!
//! Queries get common programming abbreviations expanded so that "db auth fn"
//! lands near "database authentication function". Code gets its identifiers split
//! on snake_case and camelCase boundaries so the embedder sees words, not blobs.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z][A-Za-z0-9]*\b").expect("word pattern is valid"));

static IDENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z_][A-Za-z0-9_]*\b").expect("identifier pattern is valid")
});

static ABBREVIATIONS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    [
        ("fn", "function"),
        ("func", "function"),
        ("db", "database"),
        ("config", "configuration"),
        ("cfg", "configuration"),
        ("auth", "authentication"),
        ("impl", "implementation"),
        ("err", "error"),
        ("args", "arguments"),
        ("param", "parameter"),
        ("params", "parameters"),
        ("repo", "repository"),
        ("dir", "directory"),
        ("env", "environment"),
        ("msg", "message"),
        ("req", "request"),
        ("res", "response"),
        ("init", "initialize"),
        ("util", "utility"),
        ("utils", "utilities"),
        ("lib", "library"),
        ("pkg", "package"),
        ("deps", "dependencies"),
        ("async", "asynchronous"),
        ("str", "string"),
        ("int", "integer"),
        ("var", "variable"),
    ]
    .into_iter()
    .collect()
});

/// Expands abbreviations (whole words, case-insensitive) and collapses whitespace.
pub fn preprocess_query(text: &str) -> String {
    let expanded = WORD.replace_all(text, |caps: &Captures| {
        let word = &caps[0];
        match ABBREVIATIONS.get(word.to_ascii_lowercase().as_str()) {
            Some(full) => (*full).to_string(),
            None => word.to_string(),
        }
    });
    collapse_whitespace(&expanded)
}

/// Splits snake_case and camelCase identifiers into lowercase words in place.
/// Line structure is kept; other punctuation is left alone.
pub fn preprocess_code(text: &str) -> String {
    IDENT
        .replace_all(text, |caps: &Captures| {
            let ident = &caps[0];
            let parts = split_identifier(ident);
            if parts.len() <= 1 {
                ident.to_string()
            } else {
                parts.join(" ")
            }
        })
        .into_owned()
}

/// `parseHTTPResponse_v2` → `["parse", "http", "response", "v2"]`.
pub fn split_identifier(ident: &str) -> Vec<String> {
    let mut parts = Vec::new();
    for piece in ident.split('_').filter(|p| !p.is_empty()) {
        let chars: Vec<char> = piece.chars().collect();
        let mut current = String::new();
        for (i, &c) in chars.iter().enumerate() {
            let boundary = i > 0 && c.is_uppercase() && {
                let prev = chars[i - 1];
                let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
                prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower)
            };
            if boundary && !current.is_empty() {
                parts.push(std::mem::take(&mut current).to_lowercase());
            }
            current.push(c);
        }
        if !current.is_empty() {
            parts.push(current.to_lowercase());
        }
    }
    parts
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_expands_abbreviations() {
        assert_eq!(
            preprocess_query("how does the  DB auth fn\twork"),
            "how does the database authentication function work"
        );
        assert_eq!(preprocess_query("config   loader"), "configuration loader");
    }

    #[test]
    fn test_query_leaves_partial_words() {
        assert_eq!(preprocess_query("dbase author"), "dbase author");
    }

    #[test]
    fn test_split_identifier() {
        assert_eq!(split_identifier("get_user_name"), vec!["get", "user", "name"]);
        assert_eq!(split_identifier("getUserName"), vec!["get", "user", "name"]);
        assert_eq!(
            split_identifier("parseHTTPResponse_v2"),
            vec!["parse", "http", "response", "v2"]
        );
        assert_eq!(split_identifier("__init__"), vec!["init"]);
        assert_eq!(split_identifier("x"), vec!["x"]);
    }

    #[test]
    fn test_code_splits_in_place() {
        assert_eq!(
            preprocess_code("let userCount = load_users(dbPath);"),
            "let user count = load users(db path);"
        );
        assert_eq!(preprocess_code("a\n  b"), "a\n  b");
    }
}
