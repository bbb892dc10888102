//! Metadata store contract tests: upsert idempotence, mixed-ID hydration,
//! content search, the keyword probe, and aggregates.

use chrono::NaiveDate;
use std::collections::HashSet;

use article_search::chunking::count_words;
use article_search::db;
use article_search::filters::SearchFilters;
use article_search::ids::UnitId;
use article_search::ingest::content_hash;
use article_search::migrate;
use article_search::models::{Article, ArticleChunk};
use article_search::store::MetadataStore;
use article_search::aggregates;

async fn fresh_store() -> (MetadataStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let pool = db::connect(&dir.path().join("articles.db")).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    (MetadataStore::new(pool), dir)
}

fn article(url: &str, title: &str, body: &str, source: &str, author: Option<&str>) -> Article {
    Article {
        id: 0,
        url: url.to_string(),
        guid: url.to_string(),
        title: title.to_string(),
        content: body.to_string(),
        summary: String::new(),
        source: source.to_string(),
        author: author.map(|a| a.to_string()),
        published_date: NaiveDate::from_ymd_opt(2021, 6, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0),
        fetched_date: None,
        word_count: count_words(body),
        is_chunked: false,
        indexed: false,
        tags: vec!["theory".to_string()],
        terms: vec!["Lenin".to_string()],
    }
}

#[tokio::test]
async fn upsert_is_idempotent_by_hash() {
    let (store, _dir) = fresh_store().await;
    let a = article("https://example.org/a", "Title", "Body text here.", "src", None);
    let hash = content_hash(&a.title, &a.content);

    let first = store.upsert_article(&a, &hash).await.unwrap();
    assert!(first.is_some());

    // Same URL, same hash: no-op.
    let second = store.upsert_article(&a, &hash).await.unwrap();
    assert!(second.is_none());

    // Same URL, changed content: update in place, flags reset.
    let mut changed = a.clone();
    changed.content = "Body text here, revised.".to_string();
    let new_hash = content_hash(&changed.title, &changed.content);
    let third = store.upsert_article(&changed, &new_hash).await.unwrap();
    assert_eq!(third, first);

    let row = store.get_article(first.unwrap()).await.unwrap().unwrap();
    assert!(row.content.contains("revised"));
    assert!(!row.indexed);
    assert!(!row.is_chunked);
}

#[tokio::test]
async fn mixed_id_lookup_returns_both_projections() {
    let (store, _dir) = fresh_store().await;

    let whole = article(
        "https://example.org/whole",
        "Whole Article",
        "Short body.",
        "src",
        Some("Ted Grant"),
    );
    let whole_id = store
        .upsert_article(&whole, "h1")
        .await
        .unwrap()
        .unwrap();

    let chunked = article(
        "https://example.org/chunked",
        "Chunked Article",
        "Long body to be chunked.",
        "src",
        None,
    );
    let chunked_id = store
        .upsert_article(&chunked, "h2")
        .await
        .unwrap()
        .unwrap();
    store
        .replace_chunks(
            chunked_id,
            &[
                ArticleChunk {
                    article_id: chunked_id,
                    chunk_index: 0,
                    content: "First chunk text.".to_string(),
                    word_count: 3,
                    start_position: 0,
                },
                ArticleChunk {
                    article_id: chunked_id,
                    chunk_index: 1,
                    content: "Second chunk text.".to_string(),
                    word_count: 3,
                    start_position: 18,
                },
            ],
        )
        .await
        .unwrap();

    let ids = vec![
        UnitId::article(whole_id),
        UnitId::chunk(chunked_id, 1),
        // Orphan: silently dropped.
        UnitId::article(9999),
    ];
    let rows = store.lookup_by_ids(&ids).await.unwrap();
    assert_eq!(rows.len(), 2);

    let whole_row = rows.iter().find(|r| !r.is_chunk).unwrap();
    assert_eq!(whole_row.article_id, whole_id);
    assert_eq!(whole_row.author.as_deref(), Some("Ted Grant"));
    assert_eq!(whole_row.published_year, Some(2021));
    assert_eq!(whole_row.tags, vec!["theory"]);
    assert_eq!(whole_row.terms, vec!["Lenin"]);

    let chunk_row = rows.iter().find(|r| r.is_chunk).unwrap();
    assert_eq!(chunk_row.chunk_index, 1);
    assert_eq!(chunk_row.title, "Chunked Article");
    assert_eq!(chunk_row.word_count, 3);
}

#[tokio::test]
async fn fetch_content_reads_chunk_bodies() {
    let (store, _dir) = fresh_store().await;
    let a = article("https://example.org/a", "T", "Whole body.", "src", None);
    let id = store.upsert_article(&a, "h").await.unwrap().unwrap();
    store
        .replace_chunks(
            id,
            &[ArticleChunk {
                article_id: id,
                chunk_index: 0,
                content: "Chunk zero body.".to_string(),
                word_count: 3,
                start_position: 0,
            }],
        )
        .await
        .unwrap();

    let content = store
        .fetch_content(&[UnitId::article(id), UnitId::chunk(id, 0)])
        .await
        .unwrap();
    assert_eq!(content[&format!("a_{id}")], "Whole body.");
    assert_eq!(content[&format!("c_{id}_0")], "Chunk zero body.");
}

#[tokio::test]
async fn content_search_escapes_like_metacharacters() {
    let (store, _dir) = fresh_store().await;

    let plain = article(
        "https://example.org/plain",
        "Percentages",
        "Profits rose by 100 percent last year.",
        "src",
        None,
    );
    let tricky = article(
        "https://example.org/tricky",
        "Literal",
        "A literal 100% claim appears here.",
        "src",
        None,
    );
    let plain_id = store.upsert_article(&plain, "h1").await.unwrap().unwrap();
    let tricky_id = store.upsert_article(&tricky, "h2").await.unwrap().unwrap();
    store.mark_indexed(plain_id, false).await.unwrap();
    store.mark_indexed(tricky_id, false).await.unwrap();

    let now = chrono::Utc::now().naive_utc();
    let rows = store
        .search_by_content(
            &["100%".to_string()],
            &[],
            &SearchFilters::default(),
            now,
            100,
        )
        .await
        .unwrap();

    // `%` must not act as a wildcard.
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].article_id, tricky_id);
}

#[tokio::test]
async fn content_search_only_returns_indexed_rows() {
    let (store, _dir) = fresh_store().await;
    let a = article(
        "https://example.org/a",
        "Pending",
        "Waiting for indexing to mention capitalism.",
        "src",
        None,
    );
    store.upsert_article(&a, "h").await.unwrap().unwrap();

    let now = chrono::Utc::now().naive_utc();
    let rows = store
        .search_by_content(
            &["capitalism".to_string()],
            &[],
            &SearchFilters::default(),
            now,
            100,
        )
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn keyword_probe_finds_bodies_with_terms() {
    let (store, _dir) = fresh_store().await;
    let with = article(
        "https://example.org/with",
        "A",
        "This body discusses imperialism at length.",
        "src",
        None,
    );
    let without = article(
        "https://example.org/without",
        "B",
        "Nothing relevant in this one.",
        "src",
        None,
    );
    let with_id = store.upsert_article(&with, "h1").await.unwrap().unwrap();
    let without_id = store.upsert_article(&without, "h2").await.unwrap().unwrap();

    let matched: HashSet<String> = store
        .content_contains_any(
            &[UnitId::article(with_id), UnitId::article(without_id)],
            &["imperialism".to_string()],
        )
        .await
        .unwrap();

    assert!(matched.contains(&format!("a_{with_id}")));
    assert!(!matched.contains(&format!("a_{without_id}")));
}

#[tokio::test]
async fn pending_articles_and_flags() {
    let (store, _dir) = fresh_store().await;
    let a = article("https://example.org/a", "A", "Body one.", "src", None);
    let b = article("https://example.org/b", "B", "Body two.", "src", None);
    let a_id = store.upsert_article(&a, "h1").await.unwrap().unwrap();
    store.upsert_article(&b, "h2").await.unwrap().unwrap();

    assert_eq!(store.pending_articles(None).await.unwrap().len(), 2);

    store.mark_indexed(a_id, true).await.unwrap();
    let pending = store.pending_articles(None).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].title, "B");

    let indexed = store.get_article(a_id).await.unwrap().unwrap();
    assert!(indexed.indexed);
    assert!(indexed.is_chunked);
}

#[tokio::test]
async fn aggregates_count_indexed_articles() {
    let (store, _dir) = fresh_store().await;

    for (i, source) in ["Alpha", "Alpha", "Beta"].iter().enumerate() {
        let a = article(
            &format!("https://example.org/{i}"),
            &format!("Title {i}"),
            "Body text for aggregate counting.",
            source,
            Some("Alan Woods"),
        );
        let id = store
            .upsert_article(&a, &format!("h{i}"))
            .await
            .unwrap()
            .unwrap();
        store.mark_indexed(id, false).await.unwrap();
    }

    let sources = aggregates::sources(&store).await.unwrap();
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0].name, "Alpha");
    assert_eq!(sources[0].article_count, 2);

    let authors = aggregates::top_authors(&store, 1, 10).await.unwrap();
    assert_eq!(authors.len(), 1);
    assert_eq!(authors[0].name, "Alan Woods");
    assert_eq!(authors[0].article_count, 3);

    let stats = aggregates::stats(&store, 3, true).await.unwrap();
    assert_eq!(stats.total_articles, 3);
    assert_eq!(stats.indexed_articles, 3);
    assert_eq!(stats.sources_count, 2);
    assert_eq!(stats.index_document_count, 3);
    assert!(stats.index_loaded);
}
