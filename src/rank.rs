//! Multi-signal reranking.
//!
//! Semantic recall gets the candidate set roughly right; these signals fix
//! the ordering within it. All lexical signals are scaled by the
//! query-length multiplier `m` so long conceptual queries stay
//! semantics-driven, while the recency tiers are applied unscaled at the
//! end. Every signal records its contribution on the candidate for debug
//! output.
//!
//! Regexes are the hot path here: one compiled set per query, reused across
//! the whole candidate list.

use chrono::NaiveDateTime;
use regex::Regex;

use crate::config::{RecencyBoostConfig, RerankingConfig};
use crate::models::Candidate;

/// Compile a case-insensitive whole-word matcher for a term or phrase.
/// Returns `None` for degenerate input (empty after escaping).
pub fn whole_word_regex(text: &str) -> Option<Regex> {
    if text.trim().is_empty() {
        return None;
    }
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(text))).ok()
}

/// Per-query compiled regexes for the semantic terms.
pub struct TermRegexes {
    terms: Vec<(String, Regex)>,
}

impl TermRegexes {
    pub fn compile(terms: &[String]) -> Self {
        let terms = terms
            .iter()
            .filter_map(|t| whole_word_regex(t).map(|re| (t.clone(), re)))
            .collect();
        Self { terms }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// How many distinct terms appear (whole-word) in `text`.
    pub fn count_present(&self, text: &str) -> usize {
        self.terms.iter().filter(|(_, re)| re.is_match(text)).count()
    }

    pub fn all_present(&self, text: &str) -> bool {
        !self.terms.is_empty() && self.terms.iter().all(|(_, re)| re.is_match(text))
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Regex)> {
        self.terms.iter()
    }
}

/// Per-query compiled regexes for phrase-presence checks.
pub struct PhraseRegexes {
    phrases: Vec<(String, Regex)>,
}

impl PhraseRegexes {
    /// The explicit exact phrases plus, for multi-term queries, the whole
    /// query as one phrase.
    pub fn compile(exact_phrases: &[String], query_terms: &[String]) -> Self {
        let mut texts: Vec<String> = exact_phrases.to_vec();
        if query_terms.len() >= 2 {
            let joined = query_terms.join(" ");
            if !texts.contains(&joined) {
                texts.push(joined);
            }
        }
        let phrases = texts
            .into_iter()
            .filter_map(|p| whole_word_regex(&p).map(|re| (p, re)))
            .collect();
        Self { phrases }
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    pub fn any_match(&self, text: &str) -> bool {
        self.phrases.iter().any(|(_, re)| re.is_match(text))
    }
}

/// Boost attenuation by query length: 1.0 for short queries, 0.5 at the
/// medium threshold, 0.25 beyond it.
pub fn query_length_multiplier(config: &RerankingConfig, num_terms: usize) -> f64 {
    let scaling = &config.query_length_scaling;
    if !scaling.enabled {
        return 1.0;
    }

    if num_terms <= scaling.short_query_terms {
        1.0
    } else if num_terms == scaling.medium_query_terms {
        scaling.medium_query_multiplier
    } else {
        scaling.long_query_multiplier
    }
}

/// Title-term boost: `title_boost_max * m * (terms in title / total terms)`.
/// Free — the title is already in the filter projection.
pub fn apply_title_term_boost(
    config: &RerankingConfig,
    multiplier: f64,
    terms: &TermRegexes,
    candidates: &mut [Candidate],
) {
    if terms.is_empty() {
        return;
    }

    let scaled_max = config.title_boost_max * multiplier;

    for candidate in candidates.iter_mut() {
        let present = terms.count_present(&candidate.row.title);
        if present > 0 {
            let coverage = present as f64 / terms.len() as f64;
            let boost = scaled_max * coverage;
            candidate.title_boost = Some(round4(boost));
            candidate.score += boost;
        }
    }
}

/// Phrase-presence boost, strongest tier only:
/// phrase in title > phrase in body > all terms in title.
///
/// The body tier reads `candidate.text` and is limited to the first
/// `keyword_rerank_top_n` candidates that missed the title tiers; content
/// for those was fetched by the engine beforehand.
pub fn apply_phrase_presence_boost(
    config: &RerankingConfig,
    multiplier: f64,
    terms: &TermRegexes,
    phrases: &PhraseRegexes,
    candidates: &mut [Candidate],
) {
    if phrases.is_empty() {
        return;
    }

    let in_title = config.phrase_in_title * multiplier;
    let in_content = config.phrase_in_content * multiplier;
    let all_terms_title = config.all_terms_in_title * multiplier;

    let mut needs_content: Vec<usize> = Vec::new();

    for (idx, candidate) in candidates.iter_mut().enumerate() {
        if phrases.any_match(&candidate.row.title) {
            candidate.phrase_presence_boost = Some(round4(in_title));
            candidate.score += in_title;
            continue;
        }

        if terms.all_present(&candidate.row.title) {
            candidate.phrase_presence_boost = Some(round4(all_terms_title));
            candidate.score += all_terms_title;
            continue;
        }

        needs_content.push(idx);
    }

    for idx in needs_content.into_iter().take(config.keyword_rerank_top_n) {
        let candidate = &mut candidates[idx];
        let Some(text) = candidate.text.as_deref() else {
            continue;
        };
        if phrases.any_match(text) {
            candidate.phrase_presence_boost = Some(round4(in_content));
            candidate.score += in_content;
        }
    }
}

/// Length-normalized keyword density boost over the current top N.
///
/// Density rewards focused short documents over long documents with
/// scattered mentions:
///
/// ```text
/// density = occurrences / word_count * density_scale      (linear)
///         = occurrences / ln(word_count + offset) * scale (log)
/// tf      = 1 + ln(1 + density)
/// boost   = min(max * m, mean(tf) * boost_scale)
/// ```
///
/// The boosted head is re-sorted; the tail keeps its order.
pub fn apply_keyword_boost(
    config: &RerankingConfig,
    multiplier: f64,
    terms: &TermRegexes,
    candidates: &mut Vec<Candidate>,
) {
    if terms.is_empty() || candidates.is_empty() {
        return;
    }

    let scaled_max = config.keyword_boost_max * multiplier;
    let top_n = config.keyword_rerank_top_n.min(candidates.len());

    for candidate in candidates[..top_n].iter_mut() {
        let Some(text) = candidate.text.as_deref() else {
            continue;
        };
        let word_count = candidate.row.word_count;
        if text.is_empty() || word_count < 1 {
            continue;
        }

        let mut total_tf = 0.0;
        for (_, re) in terms.iter() {
            let occurrences = re.find_iter(text).count();
            if occurrences == 0 {
                continue;
            }

            let density = if config.keyword_length_normalization == "log" {
                occurrences as f64 / (word_count as f64 + config.keyword_log_base_offset).ln()
                    * config.keyword_density_scale
            } else {
                occurrences as f64 / word_count as f64 * config.keyword_density_scale
            };

            total_tf += 1.0 + (1.0 + density).ln();
        }

        let avg_tf = total_tf / terms.len() as f64;
        let boost = (avg_tf * config.keyword_boost_scale).min(scaled_max);
        if boost > 0.0 {
            candidate.keyword_boost = Some(round4(boost));
            candidate.score += boost;
        }
    }

    candidates[..top_n].sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Semantic-discovery boost: a strong semantic match with negligible
/// keyword signal is a conceptual find, not a miss.
pub fn apply_semantic_discovery_boost(
    config: &RerankingConfig,
    multiplier: f64,
    terms: &TermRegexes,
    candidates: &mut [Candidate],
) {
    let discovery = &config.semantic_discovery;
    if !discovery.enabled || terms.is_empty() {
        return;
    }

    let boost = discovery.boost * multiplier;

    for candidate in candidates.iter_mut() {
        if candidate.base_semantic_score < discovery.min_semantic_score {
            continue;
        }

        let keyword_signal = candidate.keyword_boost.unwrap_or(0.0);
        let title_hits = terms.count_present(&candidate.row.title);

        if keyword_signal <= 0.01 && title_hits <= discovery.max_keyword_hits {
            candidate.semantic_discovery_boost = Some(round4(boost));
            candidate.score += boost;
        }
    }
}

/// Additive recency tiers. Deliberately not scaled by the query-length
/// multiplier: freshness matters equally for every query shape.
pub fn apply_recency_boost(
    config: &RecencyBoostConfig,
    now: NaiveDateTime,
    candidates: &mut [Candidate],
) {
    for candidate in candidates.iter_mut() {
        let Some(published) = candidate.row.published_date else {
            continue;
        };

        let age_days = (now - published).num_days();
        if age_days < 0 {
            continue;
        }

        let boost = if age_days < 7 {
            config.days_7
        } else if age_days < 30 {
            config.days_30
        } else if age_days < 90 {
            config.days_90
        } else if age_days < 365 {
            config.year_1
        } else if age_days < 365 * 3 {
            config.years_3
        } else {
            0.0
        };

        if boost > 0.0 {
            candidate.recency_boost = Some(boost);
            candidate.score += boost;
        }
    }
}

pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
