//! End-to-end retrieval pipeline tests over a temporary store and a
//! deterministic embedder.
//!
//! The embedder hashes whitespace tokens into a fixed-dimension bag so
//! related texts overlap and unrelated ones do not; no network, no model,
//! fully reproducible.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use std::path::Path;
use std::sync::Arc;

use article_search::chunking::count_words;
use article_search::config::{ChunkingConfig, Config, DbConfig, IndexConfig, ServerConfig};
use article_search::db;
use article_search::embedding::EmbeddingProvider;
use article_search::engine::SearchEngine;
use article_search::filters::SearchFilters;
use article_search::ids::UnitId;
use article_search::migrate;
use article_search::models::Article;
use article_search::store::MetadataStore;
use article_search::vector::{VectorIndex, VectorStore};
use article_search::vocab::Vocabulary;

const DIMS: usize = 64;

/// Deterministic bag-of-tokens embedder.
struct HashEmbedder;

fn token_slot(token: &str) -> usize {
    // FNV-1a over the lowercased token.
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in token.to_lowercase().bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % DIMS as u64) as usize
}

fn embed_text(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for token in text.split_whitespace() {
        let cleaned: String = token
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>();
        if cleaned.is_empty() {
            continue;
        }
        v[token_slot(&cleaned)] += 1.0;
    }
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-embedder"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| embed_text(t)).collect())
    }
}

fn test_config(dir: &Path) -> Config {
    let mut config = Config {
        db: DbConfig {
            path: dir.join("articles.db"),
        },
        index: IndexConfig {
            dir: dir.join("index"),
        },
        vocabulary: Default::default(),
        embedding: Default::default(),
        chunking: ChunkingConfig {
            threshold_words: 3500,
            chunk_size_words: 1000,
            overlap_words: 200,
        },
        ingest: Default::default(),
        search: Default::default(),
        concurrency: Default::default(),
        server: ServerConfig {
            bind: "127.0.0.1:0".to_string(),
        },
    };
    // The hash embedder's score distribution is not a calibrated surface;
    // cutoff behavior has its own unit tests.
    config.search.semantic_filter.enabled = false;
    config
}

fn article(id: i64, title: &str, body: &str, author: Option<&str>, date: (i32, u32, u32)) -> Article {
    Article {
        id,
        url: format!("https://example.org/{id}"),
        guid: format!("guid-{id}"),
        title: title.to_string(),
        content: body.to_string(),
        summary: String::new(),
        source: "In Defence of Marxism".to_string(),
        author: author.map(|a| a.to_string()),
        published_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .unwrap()
            .and_hms_opt(10, 0, 0),
        fetched_date: None,
        word_count: count_words(body),
        is_chunked: false,
        indexed: false,
        tags: Vec::new(),
        terms: Vec::new(),
    }
}

struct Fixture {
    engine: SearchEngine,
    _dir: tempfile::TempDir,
}

/// Build a corpus: store rows plus a vector index over their embed texts.
async fn fixture(articles: Vec<(Article, Vec<String>)>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let pool = db::connect(&config.db.path).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    let store = MetadataStore::new(pool);

    let mut index = VectorIndex::new("hash-embedder", DIMS, "search_document: ");

    for (article, chunk_bodies) in articles {
        let id = store
            .upsert_article(&article, &format!("hash-{}", article.id))
            .await
            .unwrap()
            .expect("fresh article inserts");
        assert_eq!(id, article.id, "fixture expects explicit rowids to be free");

        if chunk_bodies.is_empty() {
            // Whole article: title-weighted embedding.
            let text = article_search::chunking::title_weighted(&article.title, &article.content, 5);
            index
                .insert(
                    &UnitId::article(article.id).to_string(),
                    &embed_text(&format!("search_document: {text}")),
                )
                .unwrap();
            store.mark_indexed(article.id, false).await.unwrap();
        } else {
            let chunks: Vec<article_search::models::ArticleChunk> = chunk_bodies
                .iter()
                .enumerate()
                .map(|(i, body)| article_search::models::ArticleChunk {
                    article_id: article.id,
                    chunk_index: i as i64,
                    content: body.clone(),
                    word_count: count_words(body),
                    start_position: 0,
                })
                .collect();
            store.replace_chunks(article.id, &chunks).await.unwrap();

            for chunk in &chunks {
                let text = if chunk.chunk_index == 0 {
                    article_search::chunking::title_weighted(&article.title, &chunk.content, 5)
                } else {
                    chunk.content.clone()
                };
                index
                    .insert(
                        &UnitId::chunk(article.id, chunk.chunk_index).to_string(),
                        &embed_text(&format!("search_document: {text}")),
                    )
                    .unwrap();
            }
            store.mark_indexed(article.id, true).await.unwrap();
        }
    }

    let vector = VectorStore::new(&config.index.dir, Arc::new(HashEmbedder), "search_query: ");
    vector.install(index);

    let engine = SearchEngine::new(config, store, vector, Vocabulary::empty());
    Fixture { engine, _dir: dir }
}

fn long_body(seed: &str, words: usize) -> String {
    let mut out = String::new();
    for i in 0..words {
        out.push_str(seed);
        out.push_str(&i.to_string());
        out.push(' ');
        if i % 40 == 39 {
            out.push_str("\n\n");
        }
    }
    out
}

// ============ Phrase queries ============

#[tokio::test]
async fn pure_phrase_query_with_decade_filter() {
    let fixture = fixture(vec![
        (
            article(
                1,
                "Trotsky and the Theory",
                &format!(
                    "The theory of permanent revolution was developed over decades. {}",
                    long_body("filler", 120)
                ),
                Some("Alan Woods"),
                (2015, 3, 1),
            ),
            vec![],
        ),
        (
            // Whole-word trap: contains the words only as a longer token.
            article(
                2,
                "Revolutionary Times",
                &format!(
                    "These permanent revolutionary committees met often. {}",
                    long_body("other", 120)
                ),
                None,
                (2016, 5, 1),
            ),
            vec![],
        ),
        (
            // Right phrase, wrong decade.
            article(
                3,
                "Later Writings",
                "The permanent revolution question returned in new forms throughout the epoch.",
                None,
                (2021, 1, 1),
            ),
            vec![],
        ),
    ])
    .await;

    let filters = SearchFilters {
        date_range: Some("2010s".to_string()),
        ..Default::default()
    };
    let response = fixture
        .engine
        .search("\"permanent revolution\"", filters, 10, 0)
        .await
        .unwrap();

    assert!(response.error.is_none());
    assert_eq!(response.results.len(), 1);
    assert!(response.total >= response.results.len());

    let hit = &response.results[0];
    assert_eq!(hit.article_id, 1);
    assert_eq!(hit.matched_phrase.as_deref(), Some("permanent revolution"));
    assert!(hit
        .excerpt
        .to_lowercase()
        .contains("permanent revolution"));
    // Body longer than the excerpt window: at least one ellipsis.
    assert!(hit.excerpt.contains('…'));
}

#[tokio::test]
async fn exact_phrase_rejects_substring_matches() {
    let fixture = fixture(vec![(
        article(
            1,
            "Labour Matters",
            "An elaborate analysis of labour conditions in elaborate detail.",
            None,
            (2018, 1, 1),
        ),
        vec![],
    )])
    .await;

    let response = fixture
        .engine
        .search("\"labor\"", SearchFilters::default(), 10, 0)
        .await
        .unwrap();
    assert!(response.results.is_empty());

    let response = fixture
        .engine
        .search("\"labour\"", SearchFilters::default(), 10, 0)
        .await
        .unwrap();
    assert_eq!(response.results.len(), 1);
}

// ============ Field syntax ============

#[tokio::test]
async fn author_field_filters_and_echoes() {
    let fixture = fixture(vec![
        (
            article(
                1,
                "Capitalism in Crisis",
                &long_body("capitalism crisis analysis ", 80),
                Some("Alan Woods and Ted Grant"),
                (2019, 1, 1),
            ),
            vec![],
        ),
        (
            article(
                2,
                "Capitalism Observed",
                &long_body("capitalism observation notes ", 80),
                Some("Alan Woodson"),
                (2019, 2, 1),
            ),
            vec![],
        ),
        (
            article(
                3,
                "Capitalism Again",
                &long_body("capitalism repetition ", 80),
                None,
                (2019, 3, 1),
            ),
            vec![],
        ),
    ])
    .await;

    let response = fixture
        .engine
        .search(
            "author:\"Alan Woods\" capitalism",
            SearchFilters::default(),
            10,
            0,
        )
        .await
        .unwrap();

    assert_eq!(
        response.parsed_query.author_filter.as_deref(),
        Some("Alan Woods")
    );
    assert_eq!(response.parsed_query.semantic_terms, vec!["capitalism"]);

    assert!(!response.results.is_empty());
    for hit in &response.results {
        let author = hit.author.to_lowercase();
        assert!(author.contains("alan"));
        // Whole-word: "Woodson" must not qualify.
        assert_ne!(hit.article_id, 2);
    }
}

#[tokio::test]
async fn title_field_restricts_titles() {
    let fixture = fixture(vec![
        (
            article(
                1,
                "The Labour Theory of Value",
                &long_body("value theory labour ", 80),
                None,
                (2012, 1, 1),
            ),
            vec![],
        ),
        (
            article(
                2,
                "Value and Price",
                &long_body("value price labour theory ", 80),
                None,
                (2013, 1, 1),
            ),
            vec![],
        ),
    ])
    .await;

    let response = fixture
        .engine
        .search(
            "title:\"Labour Theory\" value",
            SearchFilters::default(),
            10,
            0,
        )
        .await
        .unwrap();

    assert_eq!(response.parsed_query.title_phrases, vec!["Labour Theory"]);
    assert!(!response.results.is_empty());
    for hit in &response.results {
        assert!(hit.title.to_lowercase().contains("labour theory"));
    }
}

// ============ Deduplication ============

#[tokio::test]
async fn chunks_deduplicate_to_best_scoring_unit() {
    let chunk_a = long_body("dialectics method philosophy ", 60);
    let chunk_b = long_body("unrelated economics statistics ", 60);

    let fixture = fixture(vec![(
        article(
            1,
            "On Dialectics",
            &format!("{chunk_a}\n\n{chunk_b}"),
            None,
            (2017, 1, 1),
        ),
        vec![chunk_a.clone(), chunk_b.clone()],
    )])
    .await;

    let response = fixture
        .engine
        .search("dialectics philosophy", SearchFilters::default(), 10, 0)
        .await
        .unwrap();

    assert_eq!(response.results.len(), 1, "one result per article");
    let hit = &response.results[0];
    assert_eq!(hit.article_id, 1);
    assert_eq!(hit.matched_sections, 2);
    // The dialectics-bearing chunk must be the survivor.
    assert_eq!(hit.id, "c_1_0");
}

// ============ Pagination ============

#[tokio::test]
async fn pagination_is_disjoint_and_consistent() {
    let mut articles = Vec::new();
    for i in 1..=6 {
        articles.push((
            article(
                i,
                &format!("Imperialism Study {i}"),
                &long_body(&format!("imperialism study part{i} "), 60 + i as usize * 10),
                None,
                (2010 + i as i32, 1, 1),
            ),
            vec![],
        ));
    }
    let fixture = fixture(articles).await;

    let all = fixture
        .engine
        .search("imperialism", SearchFilters::default(), 4, 0)
        .await
        .unwrap();
    let first = fixture
        .engine
        .search("imperialism", SearchFilters::default(), 2, 0)
        .await
        .unwrap();
    let second = fixture
        .engine
        .search("imperialism", SearchFilters::default(), 2, 2)
        .await
        .unwrap();

    assert_eq!(first.page, 1);
    assert_eq!(second.page, 2);
    assert_eq!(first.total, second.total);
    assert!(first.total >= 4);

    let first_ids: Vec<i64> = first.results.iter().map(|h| h.article_id).collect();
    let second_ids: Vec<i64> = second.results.iter().map(|h| h.article_id).collect();
    for id in &second_ids {
        assert!(!first_ids.contains(id), "pages must be disjoint");
    }

    let combined: Vec<i64> = first_ids.into_iter().chain(second_ids).collect();
    let all_ids: Vec<i64> = all.results.iter().map(|h| h.article_id).collect();
    assert_eq!(combined, all_ids, "page union must equal the one-shot ranking");
}

// ============ Boundaries ============

#[tokio::test]
async fn empty_query_returns_empty_without_error() {
    let fixture = fixture(vec![]).await;
    let response = fixture
        .engine
        .search("", SearchFilters::default(), 10, 0)
        .await
        .unwrap();
    assert!(response.results.is_empty());
    assert_eq!(response.total, 0);
    assert!(response.error.is_none());
}

#[tokio::test]
async fn overlong_query_reports_error_field() {
    let fixture = fixture(vec![]).await;
    let long_query = "marx ".repeat(300);
    let response = fixture
        .engine
        .search(&long_query, SearchFilters::default(), 10, 0)
        .await
        .unwrap();
    assert!(response.results.is_empty());
    assert!(response.error.is_some());
}

#[tokio::test]
async fn author_only_query_uses_database_path() {
    let fixture = fixture(vec![
        (
            article(
                1,
                "First",
                &long_body("economics ", 60),
                Some("Rob Sewell"),
                (2020, 1, 1),
            ),
            vec![],
        ),
        (
            article(
                2,
                "Second",
                &long_body("economics ", 60),
                Some("Ted Grant"),
                (2020, 2, 1),
            ),
            vec![],
        ),
    ])
    .await;

    let response = fixture
        .engine
        .search("author:\"Rob Sewell\"", SearchFilters::default(), 10, 0)
        .await
        .unwrap();

    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].author, "Rob Sewell");
    // Database-path candidates carry a uniform base score plus boosts.
    assert!(response.results[0].score >= 1.0);
}

#[tokio::test]
async fn recency_orders_equal_content() {
    // Identical titles and bodies: the embeddings tie exactly, so only the
    // recency tier separates the two.
    let body = long_body("socialism program demands ", 80);
    let fixture = fixture(vec![
        (
            article(1, "Socialist Perspectives", &body, None, (2012, 1, 1)),
            vec![],
        ),
        (
            article(
                2,
                "Socialist Perspectives",
                &body,
                None,
                (chrono::Utc::now().date_naive().year(), 1, 1),
            ),
            vec![],
        ),
    ])
    .await;

    let response = fixture
        .engine
        .search("socialism", SearchFilters::default(), 10, 0)
        .await
        .unwrap();

    assert_eq!(response.results.len(), 2);
    assert_eq!(response.results[0].article_id, 2, "recent article first");
    assert!(response.results[0].score >= response.results[1].score);
}
