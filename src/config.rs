//! Configuration parsing and validation.
//!
//! The engine is configured via a TOML file (default: `config/arx.toml`).
//! The config defines store paths, feed sources, chunking parameters,
//! embedding provider settings, search tuning (semantic cutoff, reranking
//! boosts, recency tiers), server bind address, and concurrency limits.
//!
//! All tunables live in one immutable [`Config`] value built at startup;
//! nothing reads the file again after [`load_config`] returns.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub vocabulary: VocabularyConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    /// Path to the SQLite metadata store (`articles.db`).
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Directory holding the vector index (config + id map + shards).
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct VocabularyConfig {
    /// Path to the synonyms/terms/aliases JSON file. Optional: without it,
    /// query expansion and term extraction are disabled.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Task prefix prepended to queries before embedding. The store owns
    /// prefixing; callers pass the query verbatim.
    #[serde(default = "default_query_prefix")]
    pub query_prefix: String,
    /// Matching prefix used for documents at index time.
    #[serde(default = "default_document_prefix")]
    pub document_prefix: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
            query_prefix: default_query_prefix(),
            document_prefix: default_document_prefix(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_query_prefix() -> String {
    "search_query: ".to_string()
}
fn default_document_prefix() -> String {
    "search_document: ".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Articles above this word count are chunked instead of embedded whole.
    #[serde(default = "default_threshold_words")]
    pub threshold_words: usize,
    /// Target words per chunk.
    #[serde(default = "default_chunk_size_words")]
    pub chunk_size_words: usize,
    /// Words of overlap carried between consecutive chunks.
    #[serde(default = "default_overlap_words")]
    pub overlap_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            threshold_words: default_threshold_words(),
            chunk_size_words: default_chunk_size_words(),
            overlap_words: default_overlap_words(),
        }
    }
}

fn default_threshold_words() -> usize {
    3500
}
fn default_chunk_size_words() -> usize {
    1000
}
fn default_overlap_words() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// RSS/Atom feeds to poll.
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Items with less body text than this are dropped.
    #[serde(default = "default_min_content_length")]
    pub min_content_length: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            feeds: Vec::new(),
            user_agent: default_user_agent(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            min_content_length: default_min_content_length(),
        }
    }
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; ArticleSearchBot/1.0)".to_string()
}
fn default_fetch_timeout_secs() -> u64 {
    30
}
fn default_min_content_length() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    /// Source label stored on every article from this feed.
    pub name: String,
    pub url: String,
    /// Pagination dialect: `"paged"` (`?paged=N`), `"page"` (`?page=N`),
    /// or `"none"`.
    #[serde(default = "default_pagination")]
    pub pagination: String,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

fn default_pagination() -> String {
    "none".to_string()
}
fn default_max_pages() -> u32 {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// Vector recall depth. Sized to roughly half the corpus so the rerank
    /// stages see everything plausibly relevant.
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,
    /// Route pure-phrase queries through the vector path with recall =
    /// `count()` instead of the database path.
    #[serde(default)]
    pub phrase_vector_recall: bool,
    #[serde(default = "default_true")]
    pub query_expansion: bool,
    /// How many times the title is prepended to content at index time.
    #[serde(default = "default_title_weight")]
    pub title_weight_multiplier: usize,
    #[serde(default = "default_semantic_weight")]
    #[allow(dead_code)]
    pub semantic_weight: f64,
    /// Reserved. Lexical sidecar scoring is disabled: the index does not
    /// guarantee lossless incremental upsert.
    #[serde(default)]
    #[allow(dead_code)]
    pub bm25_weight: f64,
    #[serde(default)]
    pub semantic_filter: SemanticFilterConfig,
    #[serde(default)]
    pub reranking: RerankingConfig,
    #[serde(default)]
    pub recency_boost: RecencyBoostConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            recall_limit: default_recall_limit(),
            phrase_vector_recall: false,
            query_expansion: true,
            title_weight_multiplier: default_title_weight(),
            semantic_weight: default_semantic_weight(),
            bm25_weight: 0.0,
            semantic_filter: SemanticFilterConfig::default(),
            reranking: RerankingConfig::default(),
            recency_boost: RecencyBoostConfig::default(),
        }
    }
}

fn default_recall_limit() -> usize {
    8000
}
fn default_true() -> bool {
    true
}
fn default_title_weight() -> usize {
    5
}
fn default_semantic_weight() -> f64 {
    0.7
}

/// Adaptive semantic score cutoff (see [`crate::cutoff`]).
#[derive(Debug, Deserialize, Clone)]
pub struct SemanticFilterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// `hybrid`, `statistical`, `percentile`, or `fixed`.
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_min_absolute_threshold")]
    pub min_absolute_threshold: f64,
    #[serde(default = "default_std_multiplier")]
    pub std_multiplier: f64,
    #[serde(default)]
    pub use_median: bool,
    #[serde(default = "default_true")]
    pub distribution_adaptive: bool,
    #[serde(default = "default_tight_cluster_std")]
    pub tight_cluster_std_threshold: f64,
    #[serde(default = "default_wide_spread_std")]
    pub wide_spread_std_threshold: f64,
    #[serde(default = "default_tight_cluster_multiplier")]
    pub tight_cluster_multiplier: f64,
    #[serde(default = "default_wide_spread_multiplier")]
    pub wide_spread_multiplier: f64,
    #[serde(default = "default_keep_top_percent")]
    pub keep_top_percent: f64,
    #[serde(default = "default_fixed_min_score")]
    pub fixed_min_score: f64,
    #[serde(default)]
    pub keyword_aware: KeywordAwareConfig,
}

impl Default for SemanticFilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: default_strategy(),
            min_absolute_threshold: default_min_absolute_threshold(),
            std_multiplier: default_std_multiplier(),
            use_median: false,
            distribution_adaptive: true,
            tight_cluster_std_threshold: default_tight_cluster_std(),
            wide_spread_std_threshold: default_wide_spread_std(),
            tight_cluster_multiplier: default_tight_cluster_multiplier(),
            wide_spread_multiplier: default_wide_spread_multiplier(),
            keep_top_percent: default_keep_top_percent(),
            fixed_min_score: default_fixed_min_score(),
            keyword_aware: KeywordAwareConfig::default(),
        }
    }
}

fn default_strategy() -> String {
    "hybrid".to_string()
}
fn default_min_absolute_threshold() -> f64 {
    0.35
}
fn default_std_multiplier() -> f64 {
    2.0
}
fn default_tight_cluster_std() -> f64 {
    0.05
}
fn default_wide_spread_std() -> f64 {
    0.12
}
fn default_tight_cluster_multiplier() -> f64 {
    1.0
}
fn default_wide_spread_multiplier() -> f64 {
    2.5
}
fn default_keep_top_percent() -> f64 {
    30.0
}
fn default_fixed_min_score() -> f64 {
    0.5
}

/// Keyword-aware bypass for the semantic cutoff: candidates scoring between
/// `keyword_match_threshold` and the cutoff survive if a query term appears
/// literally in their title or body.
#[derive(Debug, Deserialize, Clone)]
pub struct KeywordAwareConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_keyword_match_threshold")]
    pub keyword_match_threshold: f64,
    #[serde(default = "default_min_term_length")]
    pub min_term_length: usize,
}

impl Default for KeywordAwareConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            keyword_match_threshold: default_keyword_match_threshold(),
            min_term_length: default_min_term_length(),
        }
    }
}

fn default_keyword_match_threshold() -> f64 {
    0.40
}
fn default_min_term_length() -> usize {
    3
}

/// Multi-signal reranking knobs (see [`crate::rank`]).
#[derive(Debug, Deserialize, Clone)]
pub struct RerankingConfig {
    #[serde(default = "default_title_boost_max")]
    pub title_boost_max: f64,
    #[serde(default = "default_keyword_rerank_top_n")]
    pub keyword_rerank_top_n: usize,
    #[serde(default = "default_keyword_boost_max")]
    pub keyword_boost_max: f64,
    #[serde(default = "default_keyword_boost_scale")]
    pub keyword_boost_scale: f64,
    #[serde(default = "default_keyword_density_scale")]
    pub keyword_density_scale: f64,
    /// `linear` divides by word count; `log` by `ln(word_count + offset)`.
    #[serde(default = "default_length_normalization")]
    pub keyword_length_normalization: String,
    #[serde(default = "default_log_base_offset")]
    pub keyword_log_base_offset: f64,
    /// Keyword boost only runs for queries with at most this many terms.
    #[serde(default = "default_keyword_max_query_terms")]
    pub keyword_max_query_terms: usize,
    #[serde(default = "default_phrase_in_title")]
    pub phrase_in_title: f64,
    #[serde(default = "default_phrase_in_content")]
    pub phrase_in_content: f64,
    #[serde(default = "default_all_terms_in_title")]
    pub all_terms_in_title: f64,
    #[serde(default)]
    pub semantic_discovery: SemanticDiscoveryConfig,
    #[serde(default)]
    pub query_length_scaling: QueryLengthScalingConfig,
}

impl Default for RerankingConfig {
    fn default() -> Self {
        Self {
            title_boost_max: default_title_boost_max(),
            keyword_rerank_top_n: default_keyword_rerank_top_n(),
            keyword_boost_max: default_keyword_boost_max(),
            keyword_boost_scale: default_keyword_boost_scale(),
            keyword_density_scale: default_keyword_density_scale(),
            keyword_length_normalization: default_length_normalization(),
            keyword_log_base_offset: default_log_base_offset(),
            keyword_max_query_terms: default_keyword_max_query_terms(),
            phrase_in_title: default_phrase_in_title(),
            phrase_in_content: default_phrase_in_content(),
            all_terms_in_title: default_all_terms_in_title(),
            semantic_discovery: SemanticDiscoveryConfig::default(),
            query_length_scaling: QueryLengthScalingConfig::default(),
        }
    }
}

fn default_title_boost_max() -> f64 {
    0.08
}
fn default_keyword_rerank_top_n() -> usize {
    200
}
fn default_keyword_boost_max() -> f64 {
    0.06
}
fn default_keyword_boost_scale() -> f64 {
    0.02
}
fn default_keyword_density_scale() -> f64 {
    1000.0
}
fn default_length_normalization() -> String {
    "linear".to_string()
}
fn default_log_base_offset() -> f64 {
    100.0
}
fn default_keyword_max_query_terms() -> usize {
    5
}
fn default_phrase_in_title() -> f64 {
    0.08
}
fn default_phrase_in_content() -> f64 {
    0.06
}
fn default_all_terms_in_title() -> f64 {
    0.04
}

#[derive(Debug, Deserialize, Clone)]
pub struct SemanticDiscoveryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_min_semantic_score")]
    pub min_semantic_score: f64,
    #[serde(default = "default_max_keyword_hits")]
    pub max_keyword_hits: usize,
    #[serde(default = "default_discovery_boost")]
    pub boost: f64,
}

impl Default for SemanticDiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_semantic_score: default_min_semantic_score(),
            max_keyword_hits: default_max_keyword_hits(),
            boost: default_discovery_boost(),
        }
    }
}

fn default_min_semantic_score() -> f64 {
    0.70
}
fn default_max_keyword_hits() -> usize {
    1
}
fn default_discovery_boost() -> f64 {
    0.025
}

/// Query-length scaling for lexical boosts: short queries keep the full
/// boost, long conceptual queries are attenuated so semantics dominate.
#[derive(Debug, Deserialize, Clone)]
pub struct QueryLengthScalingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_short_query_terms")]
    pub short_query_terms: usize,
    #[serde(default = "default_medium_query_terms")]
    pub medium_query_terms: usize,
    #[serde(default = "default_medium_query_multiplier")]
    pub medium_query_multiplier: f64,
    #[serde(default = "default_long_query_multiplier")]
    pub long_query_multiplier: f64,
}

impl Default for QueryLengthScalingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            short_query_terms: default_short_query_terms(),
            medium_query_terms: default_medium_query_terms(),
            medium_query_multiplier: default_medium_query_multiplier(),
            long_query_multiplier: default_long_query_multiplier(),
        }
    }
}

fn default_short_query_terms() -> usize {
    2
}
fn default_medium_query_terms() -> usize {
    3
}
fn default_medium_query_multiplier() -> f64 {
    0.5
}
fn default_long_query_multiplier() -> f64 {
    0.25
}

/// Additive recency tiers applied after all other signals.
#[derive(Debug, Deserialize, Clone)]
pub struct RecencyBoostConfig {
    #[serde(default = "default_boost_7_days")]
    pub days_7: f64,
    #[serde(default = "default_boost_30_days")]
    pub days_30: f64,
    #[serde(default = "default_boost_90_days")]
    pub days_90: f64,
    #[serde(default = "default_boost_1_year")]
    pub year_1: f64,
    #[serde(default = "default_boost_3_years")]
    pub years_3: f64,
}

impl Default for RecencyBoostConfig {
    fn default() -> Self {
        Self {
            days_7: default_boost_7_days(),
            days_30: default_boost_30_days(),
            days_90: default_boost_90_days(),
            year_1: default_boost_1_year(),
            years_3: default_boost_3_years(),
        }
    }
}

fn default_boost_7_days() -> f64 {
    0.07
}
fn default_boost_30_days() -> f64 {
    0.05
}
fn default_boost_90_days() -> f64 {
    0.03
}
fn default_boost_1_year() -> f64 {
    0.02
}
fn default_boost_3_years() -> f64 {
    0.01
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConcurrencyConfig {
    /// Runtime worker threads for the search pool.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Admission cap on in-flight queries.
    #[serde(default = "default_max_concurrent_searches")]
    pub max_concurrent_searches: usize,
    /// Per-request deadline enforced by the HTTP façade.
    #[serde(default = "default_search_timeout_secs")]
    pub search_timeout_secs: u64,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            max_concurrent_searches: default_max_concurrent_searches(),
            search_timeout_secs: default_search_timeout_secs(),
        }
    }
}

fn default_worker_threads() -> usize {
    4
}
fn default_max_concurrent_searches() -> usize {
    24
}
fn default_search_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Env overrides for deploy-time relocation.
    if let Ok(db_path) = std::env::var("ARX_DB_PATH") {
        config.db.path = PathBuf::from(db_path);
    }
    if let Ok(index_dir) = std::env::var("ARX_INDEX_DIR") {
        config.index.dir = PathBuf::from(index_dir);
    }

    if config.chunking.threshold_words == 0 {
        anyhow::bail!("chunking.threshold_words must be > 0");
    }
    if config.chunking.chunk_size_words == 0 {
        anyhow::bail!("chunking.chunk_size_words must be > 0");
    }
    if config.chunking.overlap_words >= config.chunking.chunk_size_words {
        anyhow::bail!("chunking.overlap_words must be < chunk_size_words");
    }

    if config.search.recall_limit == 0 {
        anyhow::bail!("search.recall_limit must be > 0");
    }
    match config.search.semantic_filter.strategy.as_str() {
        "hybrid" | "statistical" | "percentile" | "fixed" => {}
        other => anyhow::bail!(
            "Unknown semantic_filter.strategy: '{}'. Must be hybrid, statistical, percentile, or fixed.",
            other
        ),
    }
    match config.search.reranking.keyword_length_normalization.as_str() {
        "linear" | "log" => {}
        other => anyhow::bail!(
            "Unknown keyword_length_normalization: '{}'. Must be linear or log.",
            other
        ),
    }
    if !(0.0..=1.0).contains(&config.search.semantic_filter.min_absolute_threshold) {
        anyhow::bail!("semantic_filter.min_absolute_threshold must be in [0.0, 1.0]");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if config.concurrency.worker_threads == 0 {
        anyhow::bail!("concurrency.worker_threads must be > 0");
    }
    if config.concurrency.max_concurrent_searches == 0 {
        anyhow::bail!("concurrency.max_concurrent_searches must be > 0");
    }

    for feed in &config.ingest.feeds {
        match feed.pagination.as_str() {
            "none" | "paged" | "page" => {}
            other => anyhow::bail!(
                "Unknown pagination dialect '{}' for feed '{}'. Must be none, paged, or page.",
                other,
                feed.name
            ),
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
            [db]
            path = "data/articles.db"

            [index]
            dir = "data/index"

            [server]
            bind = "127.0.0.1:8000"
        "#
    }

    #[test]
    fn defaults_fill_in() {
        let config: Config = toml::from_str(minimal_toml()).unwrap();
        assert_eq!(config.search.recall_limit, 8000);
        assert_eq!(config.search.semantic_filter.strategy, "hybrid");
        assert!((config.search.semantic_filter.min_absolute_threshold - 0.35).abs() < 1e-9);
        assert_eq!(config.search.reranking.keyword_rerank_top_n, 200);
        assert_eq!(config.chunking.threshold_words, 3500);
        assert_eq!(config.concurrency.worker_threads, 4);
        assert_eq!(config.concurrency.max_concurrent_searches, 24);
        assert_eq!(config.search.title_weight_multiplier, 5);
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn recency_tier_defaults() {
        let config: Config = toml::from_str(minimal_toml()).unwrap();
        let r = &config.search.recency_boost;
        assert!((r.days_7 - 0.07).abs() < 1e-9);
        assert!((r.days_30 - 0.05).abs() < 1e-9);
        assert!((r.days_90 - 0.03).abs() < 1e-9);
        assert!((r.year_1 - 0.02).abs() < 1e-9);
        assert!((r.years_3 - 0.01).abs() < 1e-9);
    }

    #[test]
    fn query_length_scaling_defaults() {
        let config: Config = toml::from_str(minimal_toml()).unwrap();
        let q = &config.search.reranking.query_length_scaling;
        assert_eq!(q.short_query_terms, 2);
        assert_eq!(q.medium_query_terms, 3);
        assert!((q.medium_query_multiplier - 0.5).abs() < 1e-9);
        assert!((q.long_query_multiplier - 0.25).abs() < 1e-9);
    }
}
