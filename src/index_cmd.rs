//! Indexing service: pending articles → chunks → embeddings → vector index.
//!
//! Walks articles with `indexed = 0`, chunks the ones over the threshold
//! (replacing any stale chunks), embeds each unit with the document task
//! prefix, and upserts into the on-disk vector index. Title weighting is
//! applied to whole articles and to chunk 0 only; later chunks are pure
//! content. The index is persisted once at the end so a crashed run leaves
//! the previous index intact, and flags are flipped per article only after
//! its vectors are in.

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::chunking::{chunk_text, should_chunk, title_weighted};
use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::ids::UnitId;
use crate::models::Article;
use crate::store::MetadataStore;
use crate::vector::VectorIndex;

#[derive(Debug, Default, Clone, Copy)]
pub struct IndexStats {
    pub articles_indexed: usize,
    pub chunks_created: usize,
    pub units_embedded: usize,
}

/// One unit of embeddable text plus its index ID.
struct EmbedUnit {
    id: UnitId,
    text: String,
}

fn units_for_article(
    article: &Article,
    config: &Config,
) -> (Vec<EmbedUnit>, Option<Vec<crate::models::ArticleChunk>>) {
    let title_weight = config.search.title_weight_multiplier;

    if should_chunk(article.word_count, &config.chunking) {
        let chunks = chunk_text(article.id, &article.content, &config.chunking);
        let units = chunks
            .iter()
            .map(|chunk| {
                // Only the first chunk carries the title signal.
                let text = if chunk.chunk_index == 0 {
                    title_weighted(&article.title, &chunk.content, title_weight)
                } else {
                    chunk.content.clone()
                };
                EmbedUnit {
                    id: UnitId::chunk(article.id, chunk.chunk_index),
                    text,
                }
            })
            .collect();
        (units, Some(chunks))
    } else {
        let units = vec![EmbedUnit {
            id: UnitId::article(article.id),
            text: title_weighted(&article.title, &article.content, title_weight),
        }];
        (units, None)
    }
}

/// Index all pending articles. `limit` bounds the batch; `rebuild` starts
/// from an empty index and re-indexes everything.
pub async fn run_index(
    config: &Config,
    store: &MetadataStore,
    limit: Option<usize>,
    rebuild: bool,
) -> Result<IndexStats> {
    if !config.embedding.is_enabled() {
        anyhow::bail!("Indexing requires embeddings. Set [embedding] provider in config.");
    }

    let provider = create_provider(&config.embedding)?;
    let dims = provider.dims();

    let mut index = if !rebuild && VectorIndex::exists(&config.index.dir) {
        VectorIndex::load(&config.index.dir).context("loading existing vector index")?
    } else {
        VectorIndex::new(
            provider.model_name(),
            dims,
            &config.embedding.document_prefix,
        )
    };

    if rebuild {
        sqlx::query("UPDATE articles SET indexed = 0")
            .execute(store.pool())
            .await?;
    }

    let pending = store.pending_articles(limit).await?;
    if pending.is_empty() {
        info!("nothing to index");
        return Ok(IndexStats::default());
    }

    info!(articles = pending.len(), "indexing pending articles");
    let mut stats = IndexStats::default();

    for article in &pending {
        let (units, chunks) = units_for_article(article, config);
        let chunked = chunks.is_some();

        if let Some(chunks) = &chunks {
            store.replace_chunks(article.id, chunks).await?;
            stats.chunks_created += chunks.len();
            debug!(article_id = article.id, chunks = chunks.len(), "article chunked");
        }

        embed_units(provider.as_ref(), config, &mut index, &units).await?;
        stats.units_embedded += units.len();

        store.mark_indexed(article.id, chunked).await?;
        stats.articles_indexed += 1;

        if stats.articles_indexed % 100 == 0 {
            info!(
                indexed = stats.articles_indexed,
                total = pending.len(),
                "indexing progress"
            );
        }
    }

    index
        .save(&config.index.dir)
        .context("persisting vector index")?;

    info!(
        articles = stats.articles_indexed,
        chunks = stats.chunks_created,
        units = stats.units_embedded,
        index_size = index.count(),
        "indexing complete"
    );

    Ok(stats)
}

async fn embed_units(
    provider: &dyn EmbeddingProvider,
    config: &Config,
    index: &mut VectorIndex,
    units: &[EmbedUnit],
) -> Result<()> {
    let prefix = &config.embedding.document_prefix;

    for batch in units.chunks(config.embedding.batch_size.max(1)) {
        let texts: Vec<String> = batch
            .iter()
            .map(|unit| format!("{prefix}{}", unit.text))
            .collect();

        let vectors = provider.embed(&texts).await?;
        if vectors.len() != batch.len() {
            anyhow::bail!(
                "embedding batch returned {} vectors for {} inputs",
                vectors.len(),
                batch.len()
            );
        }

        for (unit, vector) in batch.iter().zip(vectors.iter()) {
            index.upsert(&unit.id.to_string(), vector)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChunkingConfig, Config, DbConfig, IndexConfig, ServerConfig};

    fn test_config() -> Config {
        Config {
            db: DbConfig {
                path: "unused.db".into(),
            },
            index: IndexConfig {
                dir: "unused".into(),
            },
            vocabulary: Default::default(),
            embedding: Default::default(),
            chunking: ChunkingConfig {
                threshold_words: 10,
                chunk_size_words: 8,
                overlap_words: 2,
            },
            ingest: Default::default(),
            search: Default::default(),
            concurrency: Default::default(),
            server: ServerConfig {
                bind: "127.0.0.1:0".to_string(),
            },
        }
    }

    fn article(id: i64, title: &str, content: &str) -> Article {
        Article {
            id,
            url: format!("https://example.org/{id}"),
            guid: String::new(),
            title: title.to_string(),
            content: content.to_string(),
            summary: String::new(),
            source: "test".to_string(),
            author: None,
            published_date: None,
            fetched_date: None,
            word_count: crate::chunking::count_words(content),
            is_chunked: false,
            indexed: false,
            tags: Vec::new(),
            terms: Vec::new(),
        }
    }

    #[test]
    fn short_article_is_one_title_weighted_unit() {
        let config = test_config();
        let article = article(5, "The Title", "short body text");
        let (units, chunks) = units_for_article(&article, &config);

        assert!(chunks.is_none());
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].id, UnitId::article(5));
        assert_eq!(units[0].text.matches("The Title").count(), 5);
    }

    #[test]
    fn long_article_chunks_with_title_on_first_only() {
        let config = test_config();
        let body = (0..8)
            .map(|i| format!("para{i}a para{i}b para{i}c"))
            .collect::<Vec<_>>()
            .join("\n\n");
        let article = article(9, "Unique Title", &body);
        let (units, chunks) = units_for_article(&article, &config);

        let chunks = chunks.expect("article over threshold must chunk");
        assert!(chunks.len() >= 2);
        assert_eq!(units.len(), chunks.len());
        assert_eq!(units[0].id, UnitId::chunk(9, 0));
        assert!(units[0].text.contains("Unique Title"));
        for unit in &units[1..] {
            assert!(!unit.text.contains("Unique Title"));
        }
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as i64);
        }
    }
}
