//! Query expansion with the controlled vocabulary.
//!
//! Two passes over the semantic query, in order:
//!
//! 1. Canonical multi-word terms mentioned in the query are replaced by an
//!    OR-group of the canonical spelling and its aliases
//!    (`Soviet Union` → `("Soviet Union" OR "USSR")`).
//! 2. Remaining single tokens not already inside a group are expanded with
//!    their synonym set (plus the canonical term when the token is an
//!    alias), capped at 5 variants per group.
//!
//! The expanded string goes to the vector store as-is: a hybrid store treats
//! the OR-groups lexically, and even a pure-dense embedder benefits from the
//! extra vocabulary tokens.

use crate::vocab::Vocabulary;

/// Maximum variants inside one OR-group.
const MAX_VARIANTS: usize = 5;

fn or_group(variants: &[String]) -> String {
    let quoted: Vec<String> = variants.iter().map(|v| format!("\"{v}\"")).collect();
    format!("({})", quoted.join(" OR "))
}

/// Case-insensitive replacement of `needle` with `replacement`, everywhere.
fn replace_ignore_case(haystack: &str, needle: &str, replacement: &str) -> String {
    let lower_haystack = haystack.to_lowercase();
    let lower_needle = needle.to_lowercase();
    if lower_needle.is_empty() {
        return haystack.to_string();
    }

    let mut out = String::with_capacity(haystack.len());
    let mut cursor = 0;
    while let Some(found) = lower_haystack[cursor..].find(&lower_needle) {
        let start = cursor + found;
        out.push_str(&haystack[cursor..start]);
        out.push_str(replacement);
        cursor = start + needle.len();
    }
    out.push_str(&haystack[cursor..]);
    out
}

/// Expand a semantic query with synonyms and aliases.
///
/// Returns the input unchanged when the vocabulary has nothing to add.
pub fn expand_query(vocab: &Vocabulary, query: &str) -> String {
    let mut expanded = query.to_string();

    // Pass 1: canonical multi-word terms anywhere in the query.
    let query_lower = expanded.to_lowercase();
    for (canonical, aliases) in vocab.canonical_aliases() {
        if !canonical.contains(' ') {
            continue;
        }
        if !query_lower.contains(canonical) {
            continue;
        }
        let original = vocab.original_term(canonical);
        let mut variants: Vec<String> = vec![original.to_string()];
        variants.extend(aliases.iter().cloned());
        variants.truncate(MAX_VARIANTS);
        expanded = replace_ignore_case(&expanded, canonical, &or_group(&variants));
    }

    // Pass 2: per-token synonym groups for everything not already grouped.
    let mut parts: Vec<String> = Vec::new();
    for word in expanded.split_whitespace() {
        if word.contains('(') || word.contains(')') || word.contains('"') {
            parts.push(word.to_string());
            continue;
        }

        let clean = word.trim_matches(|c: char| ".,!?;:".contains(c));
        if clean.is_empty() {
            parts.push(word.to_string());
            continue;
        }

        let mut variants = vocab.synonyms_for(clean);

        if let Some(canonical) = vocab.canonical_for_alias(clean) {
            let original = vocab.original_term(canonical).to_string();
            if !variants.iter().any(|v| v.eq_ignore_ascii_case(&original)) {
                variants.push(original);
            }
        }

        if variants.len() > 1 {
            variants.dedup();
            variants.truncate(MAX_VARIANTS);
            parts.push(or_group(&variants));
        } else {
            parts.push(word.to_string());
        }
    }

    parts.join(" ")
}
