//! The retrieval engine.
//!
//! One engine instance is built at startup and shared (behind `Arc`) by
//! every search worker; it is immutable apart from the swap-only vector
//! handle. A query runs the stages strictly in order:
//!
//! ```text
//! parse → (expand) → recall → light hydration → semantic cutoff
//!   → attribute filters → phrase filters → dedup → rerank
//!   → sort → paginate → heavy hydration → excerpt → response
//! ```
//!
//! Queries without free semantic terms (author-only, phrase-only,
//! title-only) skip the vector store entirely and run against the metadata
//! store, where `LIKE` recall guarantees every literal match is found; the
//! later stages still apply so ordering stays consistent across paths.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::cutoff;
use crate::error::SearchError;
use crate::excerpt::smart_excerpt;
use crate::expand::expand_query;
use crate::filters::{FilterMatcher, SearchFilters};
use crate::ids::UnitId;
use crate::models::{
    AuthorInfo, Candidate, ReloadStats, SearchHit, SearchResponse, SourceInfo, StatsInfo,
};
use crate::query::{parse_query, ParsedQuery};
use crate::rank::{
    self, whole_word_regex, PhraseRegexes, TermRegexes,
};
use crate::store::MetadataStore;
use crate::vector::VectorStore;
use crate::vocab::Vocabulary;

pub struct SearchEngine {
    config: Config,
    store: MetadataStore,
    vector: VectorStore,
    vocab: Vocabulary,
}

impl SearchEngine {
    pub fn new(
        config: Config,
        store: MetadataStore,
        vector: VectorStore,
        vocab: Vocabulary,
    ) -> Self {
        Self {
            config,
            store,
            vector,
            vocab,
        }
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn vector(&self) -> &VectorStore {
        &self.vector
    }

    /// Load the vector index from disk. Required before vector-path search.
    pub fn load_index(&self) -> Result<(), SearchError> {
        self.vector.load()
    }

    /// Swap in a freshly loaded index; see [`VectorStore::reload`].
    pub fn reload_index(&self) -> Result<ReloadStats, SearchError> {
        self.vector.reload()
    }

    /// Execute one search request.
    ///
    /// Parse failures are not errors at this boundary: they produce an empty
    /// response carrying an `error` field, matching the HTTP contract.
    pub async fn search(
        &self,
        raw_query: &str,
        ui_filters: SearchFilters,
        limit: usize,
        offset: usize,
    ) -> Result<SearchResponse, SearchError> {
        let started = Instant::now();
        let limit = limit.max(1);

        let parsed = match parse_query(raw_query) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "query parse failed");
                return Ok(SearchResponse::empty(
                    raw_query,
                    limit,
                    offset,
                    Some(e.to_string()),
                ));
            }
        };

        // Query syntax takes precedence over UI filters.
        let mut filters = ui_filters;
        if parsed.author_filter.is_some() {
            filters.author = parsed.author_filter.clone();
        }

        if !parsed.has_content() && filters.is_empty() {
            debug!("empty query after parsing");
            return Ok(SearchResponse::empty(raw_query, limit, offset, None));
        }

        info!(
            query = raw_query,
            semantic_terms = ?parsed.semantic_terms,
            exact_phrases = ?parsed.exact_phrases,
            title_phrases = ?parsed.title_phrases,
            author = ?filters.author,
            "executing search"
        );

        let now = Utc::now().naive_utc();
        let has_semantic = !parsed.semantic_terms.is_empty();

        let mut candidates = if has_semantic {
            self.vector_path(&parsed, &filters, now).await?
        } else if self.config.search.phrase_vector_recall
            && (!parsed.exact_phrases.is_empty() || !parsed.title_phrases.is_empty())
        {
            // Alternate routing: phrase queries through the vector store
            // with exhaustive recall, for relevance-ordered phrase results.
            self.vector_phrase_path(&parsed, &filters, now).await?
        } else {
            self.database_path(&parsed, &filters, now).await?
        };

        // Exact phrases must match as whole word sequences; SQL `LIKE`
        // recall (and vector recall) are both looser than that.
        if !parsed.exact_phrases.is_empty() {
            candidates = self
                .filter_by_exact_phrases(candidates, &parsed.exact_phrases)
                .await?;
        }

        if !parsed.title_phrases.is_empty() {
            candidates = filter_by_title_phrases(candidates, &parsed.title_phrases);
        }

        let mut deduplicated = deduplicate(candidates);
        let total = deduplicated.len();

        // Rerank. Order within the head matters for the content fetch, so
        // start from semantic order.
        deduplicated.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let reranking = &self.config.search.reranking;
        let terms = TermRegexes::compile(&parsed.semantic_terms);
        let multiplier = rank::query_length_multiplier(reranking, parsed.semantic_terms.len());

        rank::apply_title_term_boost(reranking, multiplier, &terms, &mut deduplicated);

        let keyword_boost_applies =
            !terms.is_empty() && parsed.semantic_terms.len() <= reranking.keyword_max_query_terms;
        let phrase_boost_needs_content =
            !parsed.exact_phrases.is_empty() || parsed.semantic_terms.len() >= 2;

        if keyword_boost_applies || phrase_boost_needs_content {
            let top_n = reranking.keyword_rerank_top_n.min(deduplicated.len());
            self.hydrate_content(&mut deduplicated[..top_n]).await?;
        }

        let phrases = PhraseRegexes::compile(&parsed.exact_phrases, &parsed.semantic_terms);
        rank::apply_phrase_presence_boost(reranking, multiplier, &terms, &phrases, &mut deduplicated);

        if keyword_boost_applies {
            rank::apply_keyword_boost(reranking, multiplier, &terms, &mut deduplicated);
        }

        rank::apply_semantic_discovery_boost(reranking, multiplier, &terms, &mut deduplicated);
        rank::apply_recency_boost(&self.config.search.recency_boost, now, &mut deduplicated);

        // Final order: score, then recency, then ID for determinism.
        deduplicated.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.row.published_date.cmp(&a.row.published_date))
                .then(a.row.article_id.cmp(&b.row.article_id))
        });

        let mut page: Vec<Candidate> = deduplicated
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect();

        // Heavy hydration: bodies for the final page only. Anything that
        // already fetched content upstream is reused.
        self.hydrate_content(&mut page).await?;

        let results: Vec<SearchHit> = page
            .into_iter()
            .map(|candidate| format_hit(candidate, &parsed.exact_phrases))
            .collect();

        let query_time_ms = started.elapsed().as_millis() as u64;
        info!(
            returned = results.len(),
            total,
            query_time_ms,
            "search completed"
        );

        Ok(SearchResponse {
            results,
            total,
            page: offset / limit + 1,
            limit,
            offset,
            query_time_ms,
            query: raw_query.to_string(),
            parsed_query: parsed.summary(),
            filters,
            error: None,
        })
    }

    // ============ Recall paths ============

    /// Vector path: expansion → dense recall → light hydration → cutoff →
    /// attribute filters.
    async fn vector_path(
        &self,
        parsed: &ParsedQuery,
        filters: &SearchFilters,
        now: chrono::NaiveDateTime,
    ) -> Result<Vec<Candidate>, SearchError> {
        let mut semantic_query = parsed.semantic_query();

        if self.config.search.query_expansion {
            let expanded = expand_query(&self.vocab, &semantic_query);
            if expanded != semantic_query {
                info!(original = %semantic_query, expanded = %expanded, "query expanded");
                semantic_query = expanded;
            }
        }

        let recall = self
            .vector
            .search(&semantic_query, self.config.search.recall_limit)
            .await?;
        debug!(candidates = recall.len(), "vector recall");

        let mut candidates = self.hydrate_filter_metadata(&recall).await?;

        candidates = self
            .apply_semantic_cutoff(candidates, &parsed.semantic_terms)
            .await?;

        if !filters.is_empty() {
            let matcher = FilterMatcher::new(filters.clone(), now);
            let before = candidates.len();
            candidates.retain(|c| matcher.matches(&c.row));
            debug!(before, after = candidates.len(), "attribute filters");
        }

        Ok(candidates)
    }

    /// Phrase queries routed through the vector store: recall everything
    /// the index knows so no literal match can be missed, then filter.
    async fn vector_phrase_path(
        &self,
        parsed: &ParsedQuery,
        filters: &SearchFilters,
        now: chrono::NaiveDateTime,
    ) -> Result<Vec<Candidate>, SearchError> {
        let semantic_query = parsed.semantic_query();
        let recall_limit = self.vector.count().max(1);

        let recall = self.vector.search(&semantic_query, recall_limit).await?;
        let mut candidates = self.hydrate_filter_metadata(&recall).await?;

        if !filters.is_empty() {
            let matcher = FilterMatcher::new(filters.clone(), now);
            candidates.retain(|c| matcher.matches(&c.row));
        }

        Ok(candidates)
    }

    /// Database path for queries without semantic terms; filters are
    /// materialized in SQL and rows carry a uniform score of 1.0.
    async fn database_path(
        &self,
        parsed: &ParsedQuery,
        filters: &SearchFilters,
        now: chrono::NaiveDateTime,
    ) -> Result<Vec<Candidate>, SearchError> {
        let rows = self
            .store
            .search_by_content(
                &parsed.exact_phrases,
                &parsed.title_phrases,
                filters,
                now,
                self.config.search.recall_limit,
            )
            .await?;

        info!(matches = rows.len(), "database search");
        Ok(rows.into_iter().map(|row| Candidate::new(row, 1.0)).collect())
    }

    /// Light hydration: filter projections for the recall set, dropping
    /// malformed IDs and orphans.
    async fn hydrate_filter_metadata(
        &self,
        recall: &[(String, f64)],
    ) -> Result<Vec<Candidate>, SearchError> {
        let mut ids: Vec<UnitId> = Vec::with_capacity(recall.len());
        let mut scores: HashMap<String, f64> = HashMap::with_capacity(recall.len());

        for (id_str, score) in recall {
            match UnitId::from_str(id_str) {
                Ok(id) => {
                    ids.push(id);
                    scores.insert(id_str.clone(), *score);
                }
                Err(e) => {
                    // Bad row in the index; drop it and keep going.
                    warn!(id = id_str.as_str(), error = %e, "dropping malformed unit id");
                }
            }
        }

        let rows = self.store.lookup_by_ids(&ids).await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                scores
                    .get(&row.id)
                    .map(|&score| Candidate::new(row, score))
            })
            .collect())
    }

    /// Adaptive semantic cutoff with the keyword-aware bypass.
    ///
    /// Candidates at or above the threshold survive outright. Candidates in
    /// the bypass band survive if a meaningful query term appears
    /// whole-word in their title, or — after one batched probe — anywhere
    /// in their body.
    async fn apply_semantic_cutoff(
        &self,
        candidates: Vec<Candidate>,
        query_terms: &[String],
    ) -> Result<Vec<Candidate>, SearchError> {
        let filter_config = &self.config.search.semantic_filter;
        if !filter_config.enabled || candidates.is_empty() {
            return Ok(candidates);
        }

        let scores: Vec<f64> = candidates.iter().map(|c| c.score).collect();
        let Some(decision) = cutoff::compute_threshold(filter_config, &scores) else {
            return Ok(candidates);
        };

        info!(
            threshold = decision.threshold,
            mean = decision.mean,
            median = decision.median,
            std_dev = decision.std_dev,
            strategy = filter_config.strategy.as_str(),
            "semantic cutoff"
        );

        let keyword_aware = &filter_config.keyword_aware;
        let meaningful_terms: Vec<String> = if keyword_aware.enabled {
            query_terms
                .iter()
                .filter(|t| t.chars().count() >= keyword_aware.min_term_length)
                .map(|t| t.to_lowercase())
                .collect()
        } else {
            Vec::new()
        };
        let term_regexes: Vec<regex::Regex> = meaningful_terms
            .iter()
            .filter_map(|t| whole_word_regex(t))
            .collect();

        let before = candidates.len();
        let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
        let mut probe: Vec<Candidate> = Vec::new();

        for candidate in candidates {
            if candidate.score >= decision.threshold {
                kept.push(candidate);
                continue;
            }

            if term_regexes.is_empty()
                || candidate.score < keyword_aware.keyword_match_threshold
            {
                continue;
            }

            // Title check is free; bodies get one batched probe below.
            if term_regexes.iter().any(|re| re.is_match(&candidate.row.title)) {
                kept.push(candidate);
            } else {
                probe.push(candidate);
            }
        }

        if !probe.is_empty() {
            let ids: Vec<UnitId> = probe
                .iter()
                .filter_map(|c| UnitId::from_str(&c.row.id).ok())
                .collect();
            let matches: HashSet<String> = self
                .store
                .content_contains_any(&ids, &meaningful_terms)
                .await?;

            let bypassed = probe
                .into_iter()
                .filter(|c| matches.contains(&c.row.id));
            let mut count = 0;
            for candidate in bypassed {
                kept.push(candidate);
                count += 1;
            }
            if count > 0 {
                info!(
                    bypassed = count,
                    band_floor = keyword_aware.keyword_match_threshold,
                    "keyword-aware bypass kept literal matches"
                );
            }
        }

        info!(kept = kept.len(), dropped = before - kept.len(), "semantic cutoff applied");
        Ok(kept)
    }

    /// Conjunctive whole-word filter over `title + body` for every exact
    /// phrase. Bodies fetched here stay on the candidate for reuse.
    async fn filter_by_exact_phrases(
        &self,
        mut candidates: Vec<Candidate>,
        exact_phrases: &[String],
    ) -> Result<Vec<Candidate>, SearchError> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let patterns: Vec<regex::Regex> = exact_phrases
            .iter()
            .filter_map(|p| whole_word_regex(p))
            .collect();
        if patterns.is_empty() {
            return Ok(candidates);
        }

        self.hydrate_content(&mut candidates).await?;

        let before = candidates.len();
        candidates.retain(|candidate| {
            let Some(body) = candidate.text.as_deref() else {
                // No content row; drop, matching the orphan policy.
                return false;
            };
            let haystack = format!("{} {}", candidate.row.title, body);
            patterns.iter().all(|re| re.is_match(&haystack))
        });

        debug!(before, after = candidates.len(), "exact phrase filter");
        Ok(candidates)
    }

    /// Fetch bodies for candidates that don't have one yet.
    async fn hydrate_content(&self, candidates: &mut [Candidate]) -> Result<(), SearchError> {
        let missing: Vec<UnitId> = candidates
            .iter()
            .filter(|c| c.text.is_none())
            .filter_map(|c| UnitId::from_str(&c.row.id).ok())
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        let content = self.store.fetch_content(&missing).await?;
        for candidate in candidates.iter_mut() {
            if candidate.text.is_none() {
                if let Some(body) = content.get(&candidate.row.id) {
                    candidate.text = Some(body.clone());
                }
            }
        }
        Ok(())
    }

    // ============ Aggregates ============

    pub async fn sources(&self) -> Result<Vec<SourceInfo>, SearchError> {
        crate::aggregates::sources(&self.store).await
    }

    pub async fn top_authors(
        &self,
        min_articles: i64,
        limit: i64,
    ) -> Result<Vec<AuthorInfo>, SearchError> {
        crate::aggregates::top_authors(&self.store, min_articles, limit).await
    }

    pub async fn stats(&self) -> Result<StatsInfo, SearchError> {
        crate::aggregates::stats(&self.store, self.vector.count(), self.vector.is_loaded()).await
    }
}

/// Substring (case-insensitive) title filter, conjunctive across phrases.
fn filter_by_title_phrases(mut candidates: Vec<Candidate>, title_phrases: &[String]) -> Vec<Candidate> {
    let needles: Vec<String> = title_phrases.iter().map(|p| p.to_lowercase()).collect();
    candidates.retain(|candidate| {
        let title = candidate.row.title.to_lowercase();
        needles.iter().all(|needle| title.contains(needle))
    });
    candidates
}

/// Collapse chunks of the same article to the single highest-scoring unit,
/// recording how many units matched.
fn deduplicate(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut groups: HashMap<i64, Candidate> = HashMap::new();
    let mut counts: HashMap<i64, usize> = HashMap::new();

    for candidate in candidates {
        let article_id = candidate.row.article_id;
        *counts.entry(article_id).or_insert(0) += 1;

        match groups.get_mut(&article_id) {
            Some(best) => {
                if candidate.score > best.score {
                    *best = candidate;
                }
            }
            None => {
                groups.insert(article_id, candidate);
            }
        }
    }

    let mut deduplicated: Vec<Candidate> = groups
        .into_values()
        .map(|mut candidate| {
            candidate.matched_sections = counts
                .get(&candidate.row.article_id)
                .copied()
                .unwrap_or(1);
            candidate
        })
        .collect();

    // Deterministic order regardless of map iteration.
    deduplicated.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.row.article_id.cmp(&b.row.article_id))
    });
    deduplicated
}

/// Assemble the outgoing hit for one paginated candidate.
fn format_hit(candidate: Candidate, exact_phrases: &[String]) -> SearchHit {
    let body = candidate.text.as_deref().unwrap_or("");
    let (excerpt, matched_phrase) = smart_excerpt(body, &candidate.row.title, exact_phrases);

    let row = candidate.row;
    SearchHit {
        id: row.id,
        article_id: row.article_id,
        title: if row.title.is_empty() {
            "Untitled".to_string()
        } else {
            row.title
        },
        url: row.url,
        source: row.source,
        author: row.author.unwrap_or_else(|| "Unknown".to_string()),
        published_date: row
            .published_date
            .map(|d| d.format("%Y-%m-%dT%H:%M:%S").to_string())
            .unwrap_or_default(),
        excerpt,
        matched_phrase,
        score: rank::round4(candidate.score),
        matched_sections: candidate.matched_sections,
        word_count: row.word_count,
        tags: row.tags,
        terms: row.terms,
        base_semantic_score: Some(rank::round4(candidate.base_semantic_score)),
        title_boost: candidate.title_boost,
        phrase_presence_boost: candidate.phrase_presence_boost,
        keyword_boost: candidate.keyword_boost,
        semantic_discovery_boost: candidate.semantic_discovery_boost,
        recency_boost: candidate.recency_boost,
    }
}

/// CLI entry point — runs a search and prints results to stdout.
pub async fn run_search(
    engine: &SearchEngine,
    query: &str,
    filters: SearchFilters,
    limit: usize,
    offset: usize,
) -> anyhow::Result<()> {
    let response = engine.search(query, filters, limit, offset).await?;

    if let Some(error) = &response.error {
        println!("Query error: {error}");
        return Ok(());
    }

    if response.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!(
        "{} of {} results ({} ms)",
        response.results.len(),
        response.total,
        response.query_time_ms
    );
    println!();

    for (i, hit) in response.results.iter().enumerate() {
        println!(
            "{}. [{:.4}] {} — {}",
            response.offset + i + 1,
            hit.score,
            hit.title,
            hit.author
        );
        println!("    source: {} | published: {}", hit.source, hit.published_date);
        if hit.matched_sections > 1 {
            println!("    matched sections: {}", hit.matched_sections);
        }
        if !hit.url.is_empty() {
            println!("    url: {}", hit.url);
        }
        println!("    excerpt: \"{}\"", hit.excerpt.replace('\n', " "));
        println!();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UnitRow;

    fn row(id: &str, article_id: i64, title: &str) -> UnitRow {
        UnitRow {
            id: id.to_string(),
            article_id,
            title: title.to_string(),
            url: String::new(),
            source: "test".to_string(),
            author: None,
            published_date: None,
            published_year: None,
            published_month: None,
            word_count: 100,
            is_chunk: id.starts_with("c_"),
            chunk_index: 0,
            tags: Vec::new(),
            terms: Vec::new(),
        }
    }

    #[test]
    fn dedup_keeps_best_chunk_and_counts_sections() {
        let candidates = vec![
            Candidate::new(row("c_1_0", 1, "t"), 0.6),
            Candidate::new(row("c_1_1", 1, "t"), 0.9),
            Candidate::new(row("c_1_2", 1, "t"), 0.7),
            Candidate::new(row("a_2", 2, "u"), 0.8),
        ];
        let deduplicated = deduplicate(candidates);
        assert_eq!(deduplicated.len(), 2);

        let article_one = deduplicated.iter().find(|c| c.row.article_id == 1).unwrap();
        assert_eq!(article_one.row.id, "c_1_1");
        assert!((article_one.score - 0.9).abs() < 1e-9);
        assert_eq!(article_one.matched_sections, 3);

        let article_two = deduplicated.iter().find(|c| c.row.article_id == 2).unwrap();
        assert_eq!(article_two.matched_sections, 1);
    }

    #[test]
    fn dedup_is_ordered_by_score() {
        let candidates = vec![
            Candidate::new(row("a_1", 1, "t"), 0.2),
            Candidate::new(row("a_2", 2, "t"), 0.9),
            Candidate::new(row("a_3", 3, "t"), 0.5),
        ];
        let deduplicated = deduplicate(candidates);
        let ids: Vec<i64> = deduplicated.iter().map(|c| c.row.article_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn title_phrase_filter_is_substring() {
        let candidates = vec![
            Candidate::new(row("a_1", 1, "The Labour Theory of Value"), 1.0),
            Candidate::new(row("a_2", 2, "Labour Markets"), 1.0),
        ];
        let filtered =
            filter_by_title_phrases(candidates, &["labour theory".to_string()]);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].row.article_id, 1);
    }

    #[test]
    fn format_hit_defaults() {
        let mut candidate = Candidate::new(row("a_1", 1, ""), 0.123456);
        candidate.text = Some("Some body content for the excerpt.".to_string());
        let hit = format_hit(candidate, &[]);
        assert_eq!(hit.title, "Untitled");
        assert_eq!(hit.author, "Unknown");
        assert_eq!(hit.score, 0.1235);
        assert!(hit.excerpt.starts_with("Some body"));
        assert!(hit.matched_phrase.is_none());
    }
}
