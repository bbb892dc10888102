//! `arx` — semantic article search over a curated RSS corpus.
//!
//! Startup sequence:
//!   1. Init tracing from `RUST_LOG` (default `info`)
//!   2. Parse CLI, load config
//!   3. Build the runtime with the configured worker pool
//!   4. Dispatch the subcommand

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use article_search::config::{self, Config};
use article_search::embedding::create_provider;
use article_search::engine::{self, SearchEngine};
use article_search::filters::SearchFilters;
use article_search::store::MetadataStore;
use article_search::vector::VectorStore;
use article_search::vocab::Vocabulary;
use article_search::{aggregates, db, index_cmd, ingest, migrate, server};

#[derive(Parser)]
#[command(
    name = "arx",
    about = "Article Search — semantic search over a curated RSS corpus",
    version
)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./config/arx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema
    Init,

    /// Fetch configured feeds and store new articles
    Sync,

    /// Chunk, embed, and index pending articles
    Index {
        /// Maximum number of articles to index
        #[arg(long)]
        limit: Option<usize>,

        /// Discard the existing index and re-index everything
        #[arg(long)]
        rebuild: bool,
    },

    /// Search indexed articles
    Search {
        /// Search query (supports "phrases", title:"…", author:"…")
        query: String,

        /// Maximum number of results
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Result offset for pagination
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Filter by source label
        #[arg(long)]
        source: Option<String>,

        /// Filter by author (whole-word tokens)
        #[arg(long)]
        author: Option<String>,

        /// Filter by publication year
        #[arg(long)]
        year: Option<i32>,

        /// Date range preset (past_week, past_month, past_3months,
        /// past_year, 2020s, 2010s, 2000s, 1990s)
        #[arg(long)]
        date_range: Option<String>,
    },

    /// List indexed sources
    Sources,

    /// List top authors by article count
    Authors {
        /// Minimum indexed articles per author
        #[arg(long, default_value_t = 10)]
        min_articles: i64,

        /// Maximum authors to list
        #[arg(long, default_value_t = 15)]
        limit: i64,
    },

    /// Show corpus and index statistics
    Stats,

    /// Reload the vector index from disk
    Reload,

    /// Start the HTTP API server
    Serve,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cfg.concurrency.worker_threads)
        .enable_all()
        .build()?;

    runtime.block_on(run(cli, cfg))
}

fn load_vocabulary(cfg: &Config) -> Result<Vocabulary> {
    match &cfg.vocabulary.path {
        Some(path) => Vocabulary::load(path),
        None => Ok(Vocabulary::empty()),
    }
}

/// Build the read-side engine (query paths, aggregates, serve).
async fn open_engine(cfg: &Config) -> Result<SearchEngine> {
    let pool = db::connect_read_only(&cfg.db.path).await?;
    let store = MetadataStore::new(pool);
    let provider = create_provider(&cfg.embedding)?;
    let vector = VectorStore::new(&cfg.index.dir, provider, &cfg.embedding.query_prefix);
    let vocab = load_vocabulary(cfg)?;
    Ok(SearchEngine::new(cfg.clone(), store, vector, vocab))
}

async fn run(cli: Cli, cfg: Config) -> Result<()> {
    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Sync => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            let store = MetadataStore::new(pool);
            let vocab = load_vocabulary(&cfg)?;
            let stats = ingest::run_sync(&cfg, &store, &vocab).await?;
            println!(
                "Sync complete — saved: {}, unchanged: {}, skipped: {}, errors: {}",
                stats.saved, stats.unchanged, stats.skipped, stats.errors
            );
        }
        Commands::Index { limit, rebuild } => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            let store = MetadataStore::new(pool);
            let stats = index_cmd::run_index(&cfg, &store, limit, rebuild).await?;
            println!(
                "Indexing complete — articles: {}, chunks: {}, embedded units: {}",
                stats.articles_indexed, stats.chunks_created, stats.units_embedded
            );
        }
        Commands::Search {
            query,
            limit,
            offset,
            source,
            author,
            year,
            date_range,
        } => {
            let engine = open_engine(&cfg).await?;
            engine.load_index()?;
            let filters = SearchFilters {
                source,
                author,
                published_year: year,
                date_range,
                ..Default::default()
            };
            engine::run_search(&engine, &query, filters, limit.clamp(1, 100), offset).await?;
        }
        Commands::Sources => {
            let engine = open_engine(&cfg).await?;
            aggregates::print_sources(&engine.sources().await?);
        }
        Commands::Authors {
            min_articles,
            limit,
        } => {
            let engine = open_engine(&cfg).await?;
            aggregates::print_authors(&engine.top_authors(min_articles, limit).await?);
        }
        Commands::Stats => {
            let engine = open_engine(&cfg).await?;
            // Stats report the index size when one is present on disk.
            let _ = engine.load_index();
            aggregates::print_stats(&engine.stats().await?);
        }
        Commands::Reload => {
            let engine = open_engine(&cfg).await?;
            engine.load_index()?;
            let stats = engine.reload_index()?;
            println!(
                "Index reloaded — {} -> {} documents ({:+})",
                stats.old_count, stats.new_count, stats.documents_added
            );
        }
        Commands::Serve => {
            let engine = Arc::new(open_engine(&cfg).await?);
            engine.load_index()?;
            server::run_server(&cfg, engine).await?;
        }
    }

    Ok(())
}
