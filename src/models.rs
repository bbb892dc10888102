//! Core data types flowing through ingestion and retrieval.
//!
//! The retrieval pipeline deliberately works with two projections of a unit:
//! the body-less [`UnitRow`] used by every filtering and ranking stage, and
//! the final [`SearchHit`] assembled only for the paginated page after heavy
//! content hydration. Keeping bodies out of the hot path is what makes an
//! 8,000-candidate recall tractable.

use chrono::NaiveDateTime;
use serde::Serialize;

/// A normalized article as stored in the metadata store.
#[derive(Debug, Clone)]
pub struct Article {
    pub id: i64,
    pub url: String,
    pub guid: String,
    pub title: String,
    pub content: String,
    pub summary: String,
    pub source: String,
    pub author: Option<String>,
    /// ISO 8601; compared as naive UTC internally.
    pub published_date: Option<NaiveDateTime>,
    pub fetched_date: Option<NaiveDateTime>,
    pub word_count: i64,
    pub is_chunked: bool,
    pub indexed: bool,
    pub tags: Vec<String>,
    pub terms: Vec<String>,
}

/// A segment of a long article, embedded on its own.
#[derive(Debug, Clone)]
pub struct ArticleChunk {
    pub article_id: i64,
    /// Zero-based; contiguous per article.
    pub chunk_index: i64,
    pub content: String,
    pub word_count: i64,
    /// Approximate character offset of the chunk in the parent body.
    pub start_position: i64,
}

/// Filter projection of an indexed unit: everything the filtering and
/// ranking stages need, body excluded.
#[derive(Debug, Clone)]
pub struct UnitRow {
    /// Unit ID string (`a_<n>` or `c_<n>_<k>`).
    pub id: String,
    pub article_id: i64,
    pub title: String,
    pub url: String,
    pub source: String,
    pub author: Option<String>,
    pub published_date: Option<NaiveDateTime>,
    pub published_year: Option<i32>,
    pub published_month: Option<u32>,
    pub word_count: i64,
    pub is_chunk: bool,
    pub chunk_index: i64,
    pub tags: Vec<String>,
    pub terms: Vec<String>,
}

/// A candidate moving through the retrieval pipeline: the filter projection
/// plus the evolving score and any body text fetched along the way.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub row: UnitRow,
    /// Current score; starts as the raw semantic score (or 1.0 on the
    /// database path) and accumulates boosts.
    pub score: f64,
    /// Semantic score before any boost, preserved for the discovery signal
    /// and debug output.
    pub base_semantic_score: f64,
    /// Body text, present only once some stage needed it. Later stages reuse
    /// it instead of re-fetching.
    pub text: Option<String>,
    /// Units of this article that matched before deduplication.
    pub matched_sections: usize,
    pub title_boost: Option<f64>,
    pub phrase_presence_boost: Option<f64>,
    pub keyword_boost: Option<f64>,
    pub semantic_discovery_boost: Option<f64>,
    pub recency_boost: Option<f64>,
}

impl Candidate {
    pub fn new(row: UnitRow, score: f64) -> Self {
        Self {
            row,
            score,
            base_semantic_score: score,
            text: None,
            matched_sections: 1,
            title_boost: None,
            phrase_presence_boost: None,
            keyword_boost: None,
            semantic_discovery_boost: None,
            recency_boost: None,
        }
    }
}

/// One formatted search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub article_id: i64,
    pub title: String,
    pub url: String,
    pub source: String,
    /// `"Unknown"` when the article carries no author.
    pub author: String,
    pub published_date: String,
    pub excerpt: String,
    /// The phrase the excerpt is centered on, for highlighting.
    pub matched_phrase: Option<String>,
    /// Final score, rounded to 4 decimal places.
    pub score: f64,
    /// How many units of this article survived to deduplication.
    pub matched_sections: usize,
    pub word_count: i64,
    pub tags: Vec<String>,
    pub terms: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_semantic_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_boost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phrase_presence_boost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_boost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_discovery_boost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recency_boost: Option<f64>,
}

/// Parsed-query echo included in every search response.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParsedQuerySummary {
    pub semantic_terms: Vec<String>,
    pub exact_phrases: Vec<String>,
    pub title_phrases: Vec<String>,
    pub author_filter: Option<String>,
}

/// Full search response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    /// Deduplicated match count before pagination.
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub offset: usize,
    pub query_time_ms: u64,
    pub query: String,
    pub parsed_query: ParsedQuerySummary,
    pub filters: crate::filters::SearchFilters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchResponse {
    /// Empty response for queries that parse to nothing (or fail to parse).
    pub fn empty(query: &str, limit: usize, offset: usize, error: Option<String>) -> Self {
        Self {
            results: Vec::new(),
            total: 0,
            page: 1,
            limit,
            offset,
            query_time_ms: 0,
            query: query.to_string(),
            parsed_query: ParsedQuerySummary::default(),
            filters: crate::filters::SearchFilters::default(),
            error,
        }
    }
}

/// Per-source aggregate row.
#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub name: String,
    pub article_count: i64,
    pub earliest_article: Option<String>,
    pub latest_article: Option<String>,
}

/// Per-author aggregate row.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorInfo {
    pub name: String,
    pub article_count: i64,
    pub earliest_article: Option<String>,
    pub latest_article: Option<String>,
}

/// Corpus and index statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StatsInfo {
    pub total_articles: i64,
    pub indexed_articles: i64,
    pub total_chunks: i64,
    pub earliest_article: Option<String>,
    pub latest_article: Option<String>,
    pub sources_count: i64,
    pub index_document_count: usize,
    pub index_loaded: bool,
}

/// Outcome of an index reload.
#[derive(Debug, Clone, Serialize)]
pub struct ReloadStats {
    pub old_count: usize,
    pub new_count: usize,
    pub documents_added: i64,
    pub index_path: String,
}
