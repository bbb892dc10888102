//! Metadata store: articles and chunks in SQLite.
//!
//! The store owns every article and chunk row; the vector index knows only
//! unit IDs. Read access comes in two weights: the filter projection
//! ([`MetadataStore::lookup_by_ids`], no body text) used across the whole
//! recall set, and body fetches ([`MetadataStore::fetch_content`]) reserved
//! for the handful of rows that survive to phrase checks, keyword scoring,
//! or the final page.
//!
//! Batched `IN`/pair predicates stay under SQLite's bind-variable limit;
//! every user value is bound, and `LIKE` patterns are escaped with
//! [`crate::filters::escape_like`].

use chrono::{Datelike, NaiveDateTime};
use sqlx::{Row, SqlitePool};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::Result;
use crate::filters::{escape_like, push_sql_predicates, SearchFilters};
use crate::ids::UnitId;
use crate::models::{Article, ArticleChunk, UnitRow};

/// Keep batched statements comfortably under SQLite's default 999 binds.
const MAX_BINDS: usize = 900;

pub struct MetadataStore {
    pool: SqlitePool,
}

fn parse_json_list(raw: Option<String>) -> Vec<String> {
    raw.as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default()
}

/// Parse the stored ISO datetime, tolerating date-only values and a
/// trailing `Z`. Timezone-aware inputs are compared as naive UTC.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim().trim_end_matches('Z');
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn format_datetime(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S").to_string()
}

impl MetadataStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn unit_row_from_article_row(row: &sqlx::sqlite::SqliteRow) -> UnitRow {
        let article_id: i64 = row.get("article_id");
        let published_date: Option<String> = row.get("published_date");
        let published = published_date.as_deref().and_then(parse_datetime);

        UnitRow {
            id: UnitId::article(article_id).to_string(),
            article_id,
            title: row.get("title"),
            url: row.get("url"),
            source: row.get("source"),
            author: row.get("author"),
            published_date: published,
            published_year: published.map(|d| d.year()),
            published_month: published.map(|d| d.month()),
            word_count: row.get("word_count"),
            is_chunk: false,
            chunk_index: 0,
            tags: parse_json_list(row.get("tags_json")),
            terms: parse_json_list(row.get("terms_json")),
        }
    }

    /// Filter projection for a mixed batch of article and chunk IDs.
    ///
    /// IDs with no backing row (orphans left behind by a stale index) are
    /// silently dropped; the pipeline continues without them.
    pub async fn lookup_by_ids(&self, ids: &[UnitId]) -> Result<Vec<UnitRow>> {
        let mut article_ids: Vec<i64> = Vec::new();
        let mut chunk_pairs: Vec<(i64, i64)> = Vec::new();

        for id in ids {
            match id {
                UnitId::Article { article_id } => article_ids.push(*article_id),
                UnitId::Chunk {
                    article_id,
                    chunk_index,
                } => chunk_pairs.push((*article_id, *chunk_index)),
            }
        }

        let mut rows: Vec<UnitRow> = Vec::with_capacity(ids.len());

        for batch in article_ids.chunks(MAX_BINDS) {
            let placeholders = vec!["?"; batch.len()].join(",");
            let sql = format!(
                r#"
                SELECT a.id AS article_id, a.title, a.url, a.source, a.author,
                       a.published_date, a.word_count, a.tags_json, a.terms_json
                FROM articles a
                WHERE a.id IN ({placeholders})
                "#
            );
            let mut query = sqlx::query(&sql);
            for id in batch {
                query = query.bind(id);
            }
            for row in query.fetch_all(&self.pool).await? {
                rows.push(Self::unit_row_from_article_row(&row));
            }
        }

        for batch in chunk_pairs.chunks(MAX_BINDS / 2) {
            let pairs = vec!["(ac.article_id = ? AND ac.chunk_index = ?)"; batch.len()]
                .join(" OR ");
            let sql = format!(
                r#"
                SELECT a.id AS article_id, a.title, a.url, a.source, a.author,
                       a.published_date, a.tags_json, a.terms_json,
                       ac.word_count, ac.chunk_index
                FROM articles a
                JOIN article_chunks ac ON ac.article_id = a.id
                WHERE {pairs}
                "#
            );
            let mut query = sqlx::query(&sql);
            for (article_id, chunk_index) in batch {
                query = query.bind(article_id).bind(chunk_index);
            }
            for row in query.fetch_all(&self.pool).await? {
                let article_id: i64 = row.get("article_id");
                let chunk_index: i64 = row.get("chunk_index");
                let published_date: Option<String> = row.get("published_date");
                let published = published_date.as_deref().and_then(parse_datetime);

                rows.push(UnitRow {
                    id: UnitId::chunk(article_id, chunk_index).to_string(),
                    article_id,
                    title: row.get("title"),
                    url: row.get("url"),
                    source: row.get("source"),
                    author: row.get("author"),
                    published_date: published,
                    published_year: published.map(|d| d.year()),
                    published_month: published.map(|d| d.month()),
                    word_count: row.get("word_count"),
                    is_chunk: true,
                    chunk_index,
                    tags: parse_json_list(row.get("tags_json")),
                    terms: parse_json_list(row.get("terms_json")),
                });
            }
        }

        debug!(requested = ids.len(), found = rows.len(), "hydrated filter metadata");
        Ok(rows)
    }

    /// Body text for a batch of units, keyed by unit ID string.
    pub async fn fetch_content(&self, ids: &[UnitId]) -> Result<HashMap<String, String>> {
        let mut article_ids: Vec<i64> = Vec::new();
        let mut chunk_pairs: Vec<(i64, i64)> = Vec::new();

        for id in ids {
            match id {
                UnitId::Article { article_id } => article_ids.push(*article_id),
                UnitId::Chunk {
                    article_id,
                    chunk_index,
                } => chunk_pairs.push((*article_id, *chunk_index)),
            }
        }

        let mut content: HashMap<String, String> = HashMap::with_capacity(ids.len());

        for batch in article_ids.chunks(MAX_BINDS) {
            let placeholders = vec!["?"; batch.len()].join(",");
            let sql = format!("SELECT id, content FROM articles WHERE id IN ({placeholders})");
            let mut query = sqlx::query(&sql);
            for id in batch {
                query = query.bind(id);
            }
            for row in query.fetch_all(&self.pool).await? {
                let article_id: i64 = row.get("id");
                content.insert(UnitId::article(article_id).to_string(), row.get("content"));
            }
        }

        for batch in chunk_pairs.chunks(MAX_BINDS / 2) {
            let pairs =
                vec!["(article_id = ? AND chunk_index = ?)"; batch.len()].join(" OR ");
            let sql = format!(
                "SELECT article_id, chunk_index, content FROM article_chunks WHERE {pairs}"
            );
            let mut query = sqlx::query(&sql);
            for (article_id, chunk_index) in batch {
                query = query.bind(article_id).bind(chunk_index);
            }
            for row in query.fetch_all(&self.pool).await? {
                let article_id: i64 = row.get("article_id");
                let chunk_index: i64 = row.get("chunk_index");
                content.insert(
                    UnitId::chunk(article_id, chunk_index).to_string(),
                    row.get("content"),
                );
            }
        }

        Ok(content)
    }

    /// Batched keyword probe for the cutoff bypass: which of these units
    /// contain any of the given terms in their body?
    ///
    /// One `LIKE` pass per batch; whole-word accuracy is not needed here
    /// because surviving candidates still face the whole-word filters.
    pub async fn content_contains_any(
        &self,
        ids: &[UnitId],
        terms: &[String],
    ) -> Result<HashSet<String>> {
        if ids.is_empty() || terms.is_empty() {
            return Ok(HashSet::new());
        }

        let term_conditions = vec!["LOWER(content) LIKE ? ESCAPE '\\'"; terms.len()].join(" OR ");
        let patterns: Vec<String> = terms
            .iter()
            .map(|t| format!("%{}%", escape_like(&t.to_lowercase())))
            .collect();

        let mut article_ids: Vec<i64> = Vec::new();
        let mut chunk_pairs: Vec<(i64, i64)> = Vec::new();
        for id in ids {
            match id {
                UnitId::Article { article_id } => article_ids.push(*article_id),
                UnitId::Chunk {
                    article_id,
                    chunk_index,
                } => chunk_pairs.push((*article_id, *chunk_index)),
            }
        }

        let mut matches: HashSet<String> = HashSet::new();

        let id_budget = MAX_BINDS.saturating_sub(terms.len()).max(1);
        for batch in article_ids.chunks(id_budget) {
            let placeholders = vec!["?"; batch.len()].join(",");
            let sql = format!(
                "SELECT id FROM articles WHERE id IN ({placeholders}) AND ({term_conditions})"
            );
            let mut query = sqlx::query(&sql);
            for id in batch {
                query = query.bind(id);
            }
            for pattern in &patterns {
                query = query.bind(pattern);
            }
            for row in query.fetch_all(&self.pool).await? {
                let article_id: i64 = row.get("id");
                matches.insert(UnitId::article(article_id).to_string());
            }
        }

        for batch in chunk_pairs.chunks((id_budget / 2).max(1)) {
            let pairs =
                vec!["(article_id = ? AND chunk_index = ?)"; batch.len()].join(" OR ");
            let sql = format!(
                "SELECT article_id, chunk_index FROM article_chunks WHERE ({pairs}) AND ({term_conditions})"
            );
            let mut query = sqlx::query(&sql);
            for (article_id, chunk_index) in batch {
                query = query.bind(article_id).bind(chunk_index);
            }
            for pattern in &patterns {
                query = query.bind(pattern);
            }
            for row in query.fetch_all(&self.pool).await? {
                let article_id: i64 = row.get("article_id");
                let chunk_index: i64 = row.get("chunk_index");
                matches.insert(UnitId::chunk(article_id, chunk_index).to_string());
            }
        }

        Ok(matches)
    }

    /// Database path: attribute + substring search over indexed articles.
    ///
    /// Every matching document is found regardless of semantic similarity,
    /// ordered by publication date descending. Rows come back as
    /// article-level units with no content.
    pub async fn search_by_content(
        &self,
        exact_phrases: &[String],
        title_phrases: &[String],
        filters: &SearchFilters,
        now: NaiveDateTime,
        limit: usize,
    ) -> Result<Vec<UnitRow>> {
        let mut conditions: Vec<String> = Vec::new();
        let mut binds: Vec<String> = Vec::new();

        for phrase in exact_phrases {
            conditions.push(
                "(LOWER(a.content) LIKE ? ESCAPE '\\' OR LOWER(a.title) LIKE ? ESCAPE '\\')"
                    .to_string(),
            );
            let pattern = format!("%{}%", escape_like(&phrase.to_lowercase()));
            binds.push(pattern.clone());
            binds.push(pattern);
        }

        for phrase in title_phrases {
            conditions.push("LOWER(a.title) LIKE ? ESCAPE '\\'".to_string());
            binds.push(format!("%{}%", escape_like(&phrase.to_lowercase())));
        }

        push_sql_predicates(filters, now, &mut conditions, &mut binds);

        let where_clause = if conditions.is_empty() {
            "1 = 1".to_string()
        } else {
            conditions.join(" AND ")
        };

        let sql = format!(
            r#"
            SELECT a.id AS article_id, a.title, a.url, a.source, a.author,
                   a.published_date, a.word_count, a.tags_json, a.terms_json
            FROM articles a
            WHERE {where_clause} AND a.indexed = 1
            ORDER BY a.published_date DESC
            LIMIT ?
            "#
        );

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        query = query.bind(limit as i64);

        let rows = query.fetch_all(&self.pool).await?;
        let results = rows.iter().map(Self::unit_row_from_article_row).collect();
        Ok(results)
    }

    // ============ Ingestion-side writes ============

    /// Upsert an article keyed by URL. Returns `Some(id)` when a row was
    /// inserted or its content changed (hash mismatch); `None` for an
    /// unchanged re-ingest, which is a no-op.
    pub async fn upsert_article(&self, article: &Article, content_hash: &str) -> Result<Option<i64>> {
        let existing = sqlx::query("SELECT id, content_hash FROM articles WHERE url = ?")
            .bind(&article.url)
            .fetch_optional(&self.pool)
            .await?;

        let tags_json = serde_json::to_string(&article.tags).unwrap_or_else(|_| "[]".into());
        let terms_json = serde_json::to_string(&article.terms).unwrap_or_else(|_| "[]".into());
        let published = article.published_date.map(format_datetime);
        let fetched = article.fetched_date.map(format_datetime);

        if let Some(row) = existing {
            let id: i64 = row.get("id");
            let old_hash: String = row.get("content_hash");
            if old_hash == content_hash {
                return Ok(None);
            }

            sqlx::query(
                r#"
                UPDATE articles
                SET guid = ?, title = ?, content = ?, summary = ?, author = ?,
                    published_date = ?, fetched_date = ?, word_count = ?,
                    tags_json = ?, terms_json = ?, content_hash = ?,
                    is_chunked = 0, indexed = 0
                WHERE id = ?
                "#,
            )
            .bind(&article.guid)
            .bind(&article.title)
            .bind(&article.content)
            .bind(&article.summary)
            .bind(&article.author)
            .bind(&published)
            .bind(&fetched)
            .bind(article.word_count)
            .bind(&tags_json)
            .bind(&terms_json)
            .bind(content_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;

            return Ok(Some(id));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO articles (
                url, guid, title, content, summary, source, author,
                published_date, fetched_date, word_count, tags_json,
                terms_json, content_hash
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&article.url)
        .bind(&article.guid)
        .bind(&article.title)
        .bind(&article.content)
        .bind(&article.summary)
        .bind(&article.source)
        .bind(&article.author)
        .bind(&published)
        .bind(&fetched)
        .bind(article.word_count)
        .bind(&tags_json)
        .bind(&terms_json)
        .bind(content_hash)
        .execute(&self.pool)
        .await?;

        Ok(Some(result.last_insert_rowid()))
    }

    /// Replace all chunks for an article (re-chunking path).
    pub async fn replace_chunks(&self, article_id: i64, chunks: &[ArticleChunk]) -> Result<()> {
        sqlx::query("DELETE FROM article_chunks WHERE article_id = ?")
            .bind(article_id)
            .execute(&self.pool)
            .await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO article_chunks (article_id, chunk_index, content, word_count, start_position)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(chunk.article_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(chunk.word_count)
            .bind(chunk.start_position)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    /// Flip the lifecycle flags once a unit's embeddings are in the index.
    pub async fn mark_indexed(&self, article_id: i64, chunked: bool) -> Result<()> {
        sqlx::query("UPDATE articles SET indexed = 1, is_chunked = ? WHERE id = ?")
            .bind(chunked)
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Articles awaiting indexing, oldest first.
    pub async fn pending_articles(&self, limit: Option<usize>) -> Result<Vec<Article>> {
        let sql = match limit {
            Some(_) => {
                "SELECT * FROM articles WHERE indexed = 0 ORDER BY id ASC LIMIT ?".to_string()
            }
            None => "SELECT * FROM articles WHERE indexed = 0 ORDER BY id ASC".to_string(),
        };

        let mut query = sqlx::query(&sql);
        if let Some(limit) = limit {
            query = query.bind(limit as i64);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(Self::article_from_row).collect())
    }

    pub async fn get_article(&self, article_id: i64) -> Result<Option<Article>> {
        let row = sqlx::query("SELECT * FROM articles WHERE id = ?")
            .bind(article_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(Self::article_from_row))
    }

    pub async fn chunks_for_article(&self, article_id: i64) -> Result<Vec<ArticleChunk>> {
        let rows = sqlx::query(
            "SELECT * FROM article_chunks WHERE article_id = ? ORDER BY chunk_index ASC",
        )
        .bind(article_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ArticleChunk {
                article_id: row.get("article_id"),
                chunk_index: row.get("chunk_index"),
                content: row.get("content"),
                word_count: row.get("word_count"),
                start_position: row.get("start_position"),
            })
            .collect())
    }

    fn article_from_row(row: &sqlx::sqlite::SqliteRow) -> Article {
        let published: Option<String> = row.get("published_date");
        let fetched: Option<String> = row.get("fetched_date");
        Article {
            id: row.get("id"),
            url: row.get("url"),
            guid: row.get("guid"),
            title: row.get("title"),
            content: row.get("content"),
            summary: row.get("summary"),
            source: row.get("source"),
            author: row.get("author"),
            published_date: published.as_deref().and_then(parse_datetime),
            fetched_date: fetched.as_deref().and_then(parse_datetime),
            word_count: row.get("word_count"),
            is_chunked: row.get("is_chunked"),
            indexed: row.get("indexed"),
            tags: parse_json_list(row.get("tags_json")),
            terms: parse_json_list(row.get("terms_json")),
        }
    }
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datetime_parsing_variants() {
        assert!(parse_datetime("2020-05-01T12:30:00").is_some());
        assert!(parse_datetime("2020-05-01 12:30:00").is_some());
        assert!(parse_datetime("2020-05-01T12:30:00Z").is_some());
        assert!(parse_datetime("2020-05-01").is_some());
        assert!(parse_datetime("yesterday").is_none());
    }

    #[test]
    fn date_only_is_midnight() {
        let dt = parse_datetime("2020-05-01").unwrap();
        assert_eq!(dt.format("%H:%M:%S").to_string(), "00:00:00");
    }

    #[test]
    fn json_list_parsing_tolerates_garbage() {
        assert_eq!(parse_json_list(Some("[\"a\",\"b\"]".into())), vec!["a", "b"]);
        assert!(parse_json_list(Some("not json".into())).is_empty());
        assert!(parse_json_list(None).is_empty());
    }
}
