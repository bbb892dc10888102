//! Query parser for power-user search syntax.
//!
//! Supported fragments, extracted greedily in this order:
//!
//! 1. `field:"value"` where field is `title` or `author`. Unknown fields are
//!    dropped with a warning. Repeated `author:` keeps the last value.
//! 2. Remaining `"quoted runs"` become exact phrases.
//! 3. Remaining whitespace-separated tokens become semantic terms.
//!
//! Every extracted value is sanitized (null bytes stripped, trimmed,
//! truncated to 500 chars) and never interpolated into SQL — downstream
//! matching is whole-word regex or parameterized `LIKE`. The parser is total
//! apart from the hard length cap.

use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

use crate::error::SearchError;
use crate::models::ParsedQuerySummary;

/// Hard cap on raw query length.
pub const MAX_QUERY_LENGTH: usize = 1000;

/// Cap on any single extracted value.
const MAX_VALUE_LENGTH: usize = 500;

fn field_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"(\w+):"([^"]*)""#).expect("static field pattern"))
}

fn phrase_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#""([^"]*)""#).expect("static phrase pattern"))
}

/// Structured plan for one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    /// Free tokens driving vector recall.
    pub semantic_terms: Vec<String>,
    /// Quoted phrases that must match whole-word in title + body.
    pub exact_phrases: Vec<String>,
    /// `title:"…"` phrases matched as substrings of the title.
    pub title_phrases: Vec<String>,
    /// `author:"…"` filter; last one wins.
    pub author_filter: Option<String>,
}

impl ParsedQuery {
    /// True if anything searchable was extracted.
    pub fn has_content(&self) -> bool {
        !self.semantic_terms.is_empty()
            || !self.exact_phrases.is_empty()
            || !self.title_phrases.is_empty()
            || self.author_filter.is_some()
    }

    /// The text handed to the vector store: semantic terms plus all phrase
    /// text, so phrase vocabulary still contributes to the embedding.
    pub fn semantic_query(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        parts.extend(self.semantic_terms.iter().map(String::as_str));
        parts.extend(self.exact_phrases.iter().map(String::as_str));
        parts.extend(self.title_phrases.iter().map(String::as_str));
        parts.join(" ")
    }

    pub fn summary(&self) -> ParsedQuerySummary {
        ParsedQuerySummary {
            semantic_terms: self.semantic_terms.clone(),
            exact_phrases: self.exact_phrases.clone(),
            title_phrases: self.title_phrases.clone(),
            author_filter: self.author_filter.clone(),
        }
    }
}

/// Strip null bytes, trim, and cap length.
fn sanitize(value: &str) -> String {
    let cleaned = value.replace('\0', "");
    let truncated: String = cleaned.trim().chars().take(MAX_VALUE_LENGTH).collect();
    truncated.trim().to_string()
}

/// Parse a raw query string into a [`ParsedQuery`].
///
/// # Errors
///
/// [`SearchError::QueryTooLong`] when the raw string exceeds
/// [`MAX_QUERY_LENGTH`]. All other inputs parse (possibly to an empty plan).
pub fn parse_query(query: &str) -> Result<ParsedQuery, SearchError> {
    if query.chars().count() > MAX_QUERY_LENGTH {
        return Err(SearchError::QueryTooLong {
            max: MAX_QUERY_LENGTH,
        });
    }

    let query = query.trim();
    if query.is_empty() {
        return Ok(ParsedQuery::default());
    }

    let mut title_phrases = Vec::new();
    let mut author_filter = None;
    let mut remaining = query.to_string();

    for caps in field_pattern().captures_iter(query) {
        let field = caps[1].to_lowercase();
        let value = sanitize(&caps[2]);

        // The whole fragment leaves the query either way; only recognized
        // fields contribute to the plan.
        remaining = remaining.replacen(&caps[0], " ", 1);

        match field.as_str() {
            "title" | "author" => {}
            other => {
                warn!(field = other, "dropping unknown query field");
                continue;
            }
        }

        if value.is_empty() {
            continue;
        }

        if field == "title" {
            title_phrases.push(value);
        } else {
            author_filter = Some(value);
        }
    }

    let mut exact_phrases = Vec::new();
    loop {
        let captured = phrase_pattern()
            .captures(&remaining)
            .map(|caps| (caps[0].to_string(), caps[1].to_string()));
        let Some((whole, inner)) = captured else {
            break;
        };
        let phrase = sanitize(&inner);
        if !phrase.is_empty() {
            exact_phrases.push(phrase);
        }
        remaining = remaining.replacen(&whole, " ", 1);
    }

    let semantic_terms: Vec<String> = remaining
        .split_whitespace()
        .map(sanitize)
        .filter(|t| !t.is_empty())
        .collect();

    Ok(ParsedQuery {
        semantic_terms,
        exact_phrases,
        title_phrases,
        author_filter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_terms() {
        let parsed = parse_query("capitalism imperialism").unwrap();
        assert_eq!(parsed.semantic_terms, vec!["capitalism", "imperialism"]);
        assert!(parsed.exact_phrases.is_empty());
        assert!(parsed.has_content());
    }

    #[test]
    fn exact_phrase() {
        let parsed = parse_query(r#"capitalism "permanent revolution""#).unwrap();
        assert_eq!(parsed.semantic_terms, vec!["capitalism"]);
        assert_eq!(parsed.exact_phrases, vec!["permanent revolution"]);
    }

    #[test]
    fn author_field() {
        let parsed = parse_query(r#"author:"Alan Woods" capitalism"#).unwrap();
        assert_eq!(parsed.author_filter.as_deref(), Some("Alan Woods"));
        assert_eq!(parsed.semantic_terms, vec!["capitalism"]);
    }

    #[test]
    fn last_author_wins() {
        let parsed = parse_query(r#"author:"Woods" author:"Grant""#).unwrap();
        assert_eq!(parsed.author_filter.as_deref(), Some("Grant"));
    }

    #[test]
    fn title_field() {
        let parsed = parse_query(r#"title:"Labour Theory" value"#).unwrap();
        assert_eq!(parsed.title_phrases, vec!["Labour Theory"]);
        assert_eq!(parsed.semantic_terms, vec!["value"]);
    }

    #[test]
    fn combined_syntax() {
        let parsed =
            parse_query(r#"title:"Theory" author:"Woods" "dialectical materialism" USSR"#).unwrap();
        assert_eq!(parsed.title_phrases, vec!["Theory"]);
        assert_eq!(parsed.author_filter.as_deref(), Some("Woods"));
        assert_eq!(parsed.exact_phrases, vec!["dialectical materialism"]);
        assert_eq!(parsed.semantic_terms, vec!["USSR"]);
    }

    #[test]
    fn unknown_field_dropped() {
        let parsed = parse_query(r#"tag:"economics" value"#).unwrap();
        assert!(parsed.title_phrases.is_empty());
        assert!(parsed.author_filter.is_none());
        assert!(parsed.exact_phrases.is_empty());
        assert_eq!(parsed.semantic_terms, vec!["value"]);
    }

    #[test]
    fn empty_query_is_not_an_error() {
        let parsed = parse_query("").unwrap();
        assert!(!parsed.has_content());
        let parsed = parse_query("   ").unwrap();
        assert!(!parsed.has_content());
    }

    #[test]
    fn empty_quotes_ignored() {
        let parsed = parse_query(r#""" value"#).unwrap();
        assert!(parsed.exact_phrases.is_empty());
        assert_eq!(parsed.semantic_terms, vec!["value"]);
    }

    #[test]
    fn too_long_rejected() {
        let long = "a".repeat(MAX_QUERY_LENGTH + 1);
        assert!(matches!(
            parse_query(&long),
            Err(SearchError::QueryTooLong { .. })
        ));
        let at_limit = "a".repeat(MAX_QUERY_LENGTH);
        assert!(parse_query(&at_limit).is_ok());
    }

    #[test]
    fn null_bytes_stripped() {
        let parsed = parse_query("capi\0talism").unwrap();
        assert_eq!(parsed.semantic_terms, vec!["capitalism"]);
    }

    #[test]
    fn semantic_query_includes_phrases() {
        let parsed = parse_query(r#"title:"Theory" "surplus value" labour"#).unwrap();
        let semantic = parsed.semantic_query();
        assert!(semantic.contains("labour"));
        assert!(semantic.contains("surplus value"));
        assert!(semantic.contains("Theory"));
    }
}
