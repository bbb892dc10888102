//! Controlled vocabulary: synonyms, categorized terms, and aliases.
//!
//! Loaded once at startup from a JSON file of the shape:
//!
//! ```json
//! {
//!   "synonyms": { "proletariat": ["working class", "workers"] },
//!   "terms": { "people": ["Karl Marx"], "organizations": ["United Nations"] },
//!   "aliases": { "USSR": "Soviet Union", "UN": "United Nations" }
//! }
//! ```
//!
//! All matching is case-insensitive and whole-word. Per-term regexes are
//! compiled here, once, and reused by ingestion (term extraction) and by the
//! query expander.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
struct VocabularyFile {
    #[serde(default)]
    synonyms: HashMap<String, Vec<String>>,
    #[serde(default)]
    terms: HashMap<String, Vec<String>>,
    #[serde(default)]
    aliases: HashMap<String, String>,
}

/// A compiled whole-word matcher for one vocabulary entry.
#[derive(Debug)]
struct TermPattern {
    /// Lowercased term.
    key: String,
    category: String,
    regex: Regex,
}

#[derive(Debug)]
struct AliasPattern {
    /// Lowercased canonical term this alias resolves to.
    canonical: String,
    regex: Regex,
}

#[derive(Debug)]
pub struct Vocabulary {
    /// Lowercased base term -> variant list (original case).
    synonyms: HashMap<String, Vec<String>>,
    /// Lowercased alias -> lowercased canonical.
    aliases: HashMap<String, String>,
    /// Lowercased canonical -> alias list (original case).
    reverse_aliases: HashMap<String, Vec<String>>,
    /// Lowercased term -> original case from the config file.
    original_case: HashMap<String, String>,
    term_patterns: Vec<TermPattern>,
    alias_patterns: Vec<AliasPattern>,
}

/// One extracted term occurrence, flattened for storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermMention {
    pub term: String,
    pub category: String,
    pub count: usize,
}

fn whole_word(term: &str) -> Result<Regex> {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(term)))
        .with_context(|| format!("invalid vocabulary term: {term}"))
}

impl Vocabulary {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read vocabulary file: {}", path.display()))?;
        let file: VocabularyFile =
            serde_json::from_str(&content).with_context(|| "Failed to parse vocabulary file")?;
        Self::from_parts(file.synonyms, file.terms, file.aliases)
    }

    /// Build an empty vocabulary (expansion and extraction become no-ops).
    pub fn empty() -> Self {
        Self::from_parts(HashMap::new(), HashMap::new(), HashMap::new())
            .expect("empty vocabulary is always valid")
    }

    fn from_parts(
        synonyms: HashMap<String, Vec<String>>,
        terms: HashMap<String, Vec<String>>,
        aliases: HashMap<String, String>,
    ) -> Result<Self> {
        let mut original_case = HashMap::new();
        let mut term_patterns = Vec::new();

        for (category, term_list) in &terms {
            for term in term_list {
                let key = term.to_lowercase();
                original_case.insert(key.clone(), term.clone());
                term_patterns.push(TermPattern {
                    key,
                    category: category.clone(),
                    regex: whole_word(term)?,
                });
            }
        }

        let alias_map: HashMap<String, String> = aliases
            .iter()
            .map(|(alias, canonical)| (alias.to_lowercase(), canonical.to_lowercase()))
            .collect();

        let mut reverse_aliases: HashMap<String, Vec<String>> = HashMap::new();
        let mut alias_patterns = Vec::new();
        for (alias, canonical) in &aliases {
            reverse_aliases
                .entry(canonical.to_lowercase())
                .or_default()
                .push(alias.clone());
            alias_patterns.push(AliasPattern {
                canonical: canonical.to_lowercase(),
                regex: whole_word(alias)?,
            });
        }

        let synonyms = synonyms
            .into_iter()
            .map(|(base, variants)| (base.to_lowercase(), variants))
            .collect();

        Ok(Self {
            synonyms,
            aliases: alias_map,
            reverse_aliases,
            original_case,
            term_patterns,
            alias_patterns,
        })
    }

    pub fn term_count(&self) -> usize {
        self.term_patterns.len()
    }

    /// Synonym set for a query token, always including the token itself.
    ///
    /// Checks both directions: the token may be a base term or one of a base
    /// term's variants.
    pub fn synonyms_for(&self, word: &str) -> Vec<String> {
        let lower = word.to_lowercase();

        if let Some(variants) = self.synonyms.get(&lower) {
            let mut out = vec![word.to_string()];
            out.extend(variants.iter().cloned());
            return out;
        }

        for (base, variants) in &self.synonyms {
            if variants.iter().any(|v| v.to_lowercase() == lower) {
                let mut out = vec![base.clone()];
                out.extend(variants.iter().cloned());
                return out;
            }
        }

        vec![word.to_string()]
    }

    /// Lowercased canonical term for an alias, if the token is one.
    pub fn canonical_for_alias(&self, word: &str) -> Option<&str> {
        self.aliases.get(&word.to_lowercase()).map(|s| s.as_str())
    }

    /// Original-case spelling of a lowercased term, falling back to the input.
    pub fn original_term<'a>(&'a self, lower: &'a str) -> &'a str {
        self.original_case.get(lower).map(|s| s.as_str()).unwrap_or(lower)
    }

    /// Canonical terms that have aliases, with their alias lists.
    /// The expander scans these for multi-word canonical mentions.
    pub fn canonical_aliases(&self) -> impl Iterator<Item = (&str, &[String])> + '_ {
        self.reverse_aliases
            .iter()
            .map(|(canonical, aliases)| (canonical.as_str(), aliases.as_slice()))
    }

    /// Extract vocabulary terms from an article, with alias resolution.
    ///
    /// The title is counted twice so title mentions weigh heavier, matching
    /// how the index itself is title-weighted.
    pub fn extract_terms(&self, title: &str, content: &str) -> Vec<TermMention> {
        let combined = format!("{title} {title} {content}");

        let mut counts: HashMap<&str, (String, usize)> = HashMap::new();

        for pattern in &self.term_patterns {
            let count = pattern.regex.find_iter(&combined).count();
            if count > 0 {
                counts.insert(&pattern.key, (pattern.category.clone(), count));
            }
        }

        // Alias occurrences accrue to their canonical term, when that term
        // is part of the vocabulary.
        for alias in &self.alias_patterns {
            let count = alias.regex.find_iter(&combined).count();
            if count == 0 {
                continue;
            }
            if let Some(pattern) = self.term_patterns.iter().find(|p| p.key == alias.canonical) {
                counts
                    .entry(&pattern.key)
                    .and_modify(|(_, c)| *c += count)
                    .or_insert((pattern.category.clone(), count));
            }
        }

        let mut mentions: Vec<TermMention> = counts
            .into_iter()
            .map(|(key, (category, count))| TermMention {
                term: self.original_term(key).to_string(),
                category,
                count,
            })
            .collect();

        mentions.sort_by(|a, b| b.count.cmp(&a.count).then(a.term.cmp(&b.term)));
        mentions
    }

    /// Flattened distinct term list for the `terms_json` column.
    pub fn extract_term_list(&self, title: &str, content: &str) -> Vec<String> {
        self.extract_terms(title, content)
            .into_iter()
            .map(|m| m.term)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vocab() -> Vocabulary {
        let mut synonyms = HashMap::new();
        synonyms.insert(
            "proletariat".to_string(),
            vec!["working class".to_string(), "workers".to_string()],
        );

        let mut terms = HashMap::new();
        terms.insert(
            "people".to_string(),
            vec!["Karl Marx".to_string(), "Lenin".to_string()],
        );
        terms.insert(
            "organizations".to_string(),
            vec!["Soviet Union".to_string(), "United Nations".to_string()],
        );

        let mut aliases = HashMap::new();
        aliases.insert("USSR".to_string(), "Soviet Union".to_string());
        aliases.insert("UN".to_string(), "United Nations".to_string());

        Vocabulary::from_parts(synonyms, terms, aliases).unwrap()
    }

    #[test]
    fn synonyms_include_the_word_itself() {
        let vocab = test_vocab();
        let syn = vocab.synonyms_for("proletariat");
        assert!(syn.iter().any(|s| s == "proletariat"));
        assert!(syn.iter().any(|s| s == "working class"));
        assert!(syn.len() >= 3);
    }

    #[test]
    fn synonyms_resolve_from_variant_side() {
        let vocab = test_vocab();
        let syn = vocab.synonyms_for("workers");
        assert!(syn.iter().any(|s| s == "proletariat"));
    }

    #[test]
    fn unknown_word_has_no_synonyms() {
        let vocab = test_vocab();
        assert_eq!(vocab.synonyms_for("capitalism"), vec!["capitalism"]);
    }

    #[test]
    fn alias_resolves_case_insensitively() {
        let vocab = test_vocab();
        assert_eq!(vocab.canonical_for_alias("ussr"), Some("soviet union"));
        assert_eq!(vocab.canonical_for_alias("nothing"), None);
    }

    #[test]
    fn extracts_whole_word_terms_only() {
        let vocab = test_vocab();
        let mentions = vocab.extract_terms("On Lenin", "Lenin wrote. Leninism is not matched.");
        let lenin = mentions.iter().find(|m| m.term == "Lenin").unwrap();
        // Twice from the doubled title, once from content.
        assert_eq!(lenin.count, 3);
        assert_eq!(lenin.category, "people");
    }

    #[test]
    fn alias_mentions_count_toward_canonical() {
        let vocab = test_vocab();
        let mentions = vocab.extract_terms("", "The USSR dissolved. The Soviet Union was vast.");
        let su = mentions.iter().find(|m| m.term == "Soviet Union").unwrap();
        assert_eq!(su.count, 2);
    }

    #[test]
    fn empty_vocabulary_extracts_nothing() {
        let vocab = Vocabulary::empty();
        assert!(vocab.extract_terms("Lenin", "Karl Marx").is_empty());
        assert_eq!(vocab.synonyms_for("x"), vec!["x"]);
    }
}
