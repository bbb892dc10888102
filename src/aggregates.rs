//! Read-only analytics over the metadata store.
//!
//! Sources, top authors, and corpus statistics. These queries never touch
//! the vector store; the index document count is passed in by the engine.

use sqlx::Row;

use crate::error::Result;
use crate::models::{AuthorInfo, SourceInfo, StatsInfo};
use crate::store::MetadataStore;

/// Indexed sources ordered by article count descending.
pub async fn sources(store: &MetadataStore) -> Result<Vec<SourceInfo>> {
    let rows = sqlx::query(
        r#"
        SELECT source,
               COUNT(*) AS article_count,
               MIN(published_date) AS earliest_article,
               MAX(published_date) AS latest_article
        FROM articles
        WHERE indexed = 1
        GROUP BY source
        ORDER BY article_count DESC
        "#,
    )
    .fetch_all(store.pool())
    .await?;

    Ok(rows
        .iter()
        .map(|row| SourceInfo {
            name: row.get("source"),
            article_count: row.get("article_count"),
            earliest_article: row.get("earliest_article"),
            latest_article: row.get("latest_article"),
        })
        .collect())
}

/// Authors with at least `min_articles` indexed articles.
pub async fn top_authors(
    store: &MetadataStore,
    min_articles: i64,
    limit: i64,
) -> Result<Vec<AuthorInfo>> {
    let rows = sqlx::query(
        r#"
        SELECT author,
               COUNT(*) AS article_count,
               MIN(published_date) AS earliest_article,
               MAX(published_date) AS latest_article
        FROM articles
        WHERE indexed = 1
          AND author IS NOT NULL
          AND author != ''
        GROUP BY author
        HAVING article_count >= ?
        ORDER BY article_count DESC
        LIMIT ?
        "#,
    )
    .bind(min_articles)
    .bind(limit)
    .fetch_all(store.pool())
    .await?;

    Ok(rows
        .iter()
        .map(|row| AuthorInfo {
            name: row.get("author"),
            article_count: row.get("article_count"),
            earliest_article: row.get("earliest_article"),
            latest_article: row.get("latest_article"),
        })
        .collect())
}

/// Corpus counts, date range, and index size.
pub async fn stats(
    store: &MetadataStore,
    index_document_count: usize,
    index_loaded: bool,
) -> Result<StatsInfo> {
    let total_articles: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles")
        .fetch_one(store.pool())
        .await?;

    let indexed_articles: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE indexed = 1")
            .fetch_one(store.pool())
            .await?;

    let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM article_chunks")
        .fetch_one(store.pool())
        .await?;

    let date_row = sqlx::query(
        r#"
        SELECT MIN(published_date) AS earliest, MAX(published_date) AS latest
        FROM articles
        WHERE indexed = 1
        "#,
    )
    .fetch_one(store.pool())
    .await?;

    let sources_count: i64 =
        sqlx::query_scalar("SELECT COUNT(DISTINCT source) FROM articles WHERE indexed = 1")
            .fetch_one(store.pool())
            .await?;

    Ok(StatsInfo {
        total_articles,
        indexed_articles,
        total_chunks,
        earliest_article: date_row.get("earliest"),
        latest_article: date_row.get("latest"),
        sources_count,
        index_document_count,
        index_loaded,
    })
}

// ============ CLI printers ============

pub fn print_sources(sources: &[SourceInfo]) {
    if sources.is_empty() {
        println!("No indexed sources.");
        return;
    }

    println!("{:<36} {:>8}   {:<12} {}", "SOURCE", "ARTICLES", "EARLIEST", "LATEST");
    println!("{}", "-".repeat(76));
    for source in sources {
        println!(
            "{:<36} {:>8}   {:<12} {}",
            source.name,
            source.article_count,
            source.earliest_article.as_deref().unwrap_or("-"),
            source.latest_article.as_deref().unwrap_or("-"),
        );
    }
}

pub fn print_authors(authors: &[AuthorInfo]) {
    if authors.is_empty() {
        println!("No authors above the threshold.");
        return;
    }

    println!("{:<36} {:>8}   {:<12} {}", "AUTHOR", "ARTICLES", "EARLIEST", "LATEST");
    println!("{}", "-".repeat(76));
    for author in authors {
        println!(
            "{:<36} {:>8}   {:<12} {}",
            author.name,
            author.article_count,
            author.earliest_article.as_deref().unwrap_or("-"),
            author.latest_article.as_deref().unwrap_or("-"),
        );
    }
}

pub fn print_stats(stats: &StatsInfo) {
    println!("Article Search — Corpus Stats");
    println!("=============================");
    println!();
    println!("  Articles:       {}", stats.total_articles);
    println!("  Indexed:        {}", stats.indexed_articles);
    println!("  Chunks:         {}", stats.total_chunks);
    println!("  Sources:        {}", stats.sources_count);
    println!(
        "  Date range:     {} — {}",
        stats.earliest_article.as_deref().unwrap_or("-"),
        stats.latest_article.as_deref().unwrap_or("-"),
    );
    println!(
        "  Vector index:   {} documents ({})",
        stats.index_document_count,
        if stats.index_loaded { "loaded" } else { "not loaded" }
    );
    println!();
}
