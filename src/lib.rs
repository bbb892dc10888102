//! # Article Search
//!
//! **A semantic article search engine over a curated RSS corpus.**
//!
//! Article Search ingests long-form articles from heterogeneous RSS feeds,
//! normalizes them into a canonical SQLite store, builds a dense-vector
//! index over whole articles and length-bounded chunks, and serves hybrid
//! (semantic + lexical + recency) ranked search through a thread-safe query
//! engine, a CLI, and an HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────┐   ┌──────────────┐
//! │ RSS/Atom │──▶│   Ingestion  │──▶│  SQLite   │──▶│ Vector index │
//! │  feeds   │   │ normalize +  │   │ articles  │   │  (f32 shards │
//! └──────────┘   │ terms + hash │   │ + chunks  │   │   + cosine)  │
//!                └──────────────┘   └─────┬─────┘   └──────┬───────┘
//!                                         │                │
//!                                         ▼                ▼
//!                                   ┌──────────────────────────┐
//!                                   │      Search engine       │
//!                                   │ parse → recall → filter  │
//!                                   │ → dedup → rerank → page  │
//!                                   └─────┬──────────────┬─────┘
//!                                         ▼              ▼
//!                                    ┌─────────┐    ┌─────────┐
//!                                    │   CLI   │    │  HTTP   │
//!                                    │  (arx)  │    │ (axum)  │
//!                                    └─────────┘    └─────────┘
//! ```
//!
//! ## Query pipeline
//!
//! 1. The **parser** ([`query`]) extracts `title:"…"`/`author:"…"` fields,
//!    quoted exact phrases, and free semantic terms.
//! 2. The **expander** ([`expand`]) rewrites tokens into synonym/alias
//!    OR-groups from the controlled vocabulary ([`vocab`]).
//! 3. **Recall** hits the vector store ([`vector`]) — or the metadata store
//!    directly for queries without semantic terms.
//! 4. **Light hydration** ([`store`]) attaches the body-less filter
//!    projection to every candidate.
//! 5. The **semantic cutoff** ([`cutoff`]) trims the weak tail, with a
//!    keyword-aware bypass for literal matches.
//! 6. **Filters** ([`filters`]), whole-word **phrase filters**, and
//!    per-article **deduplication** shrink the set.
//! 7. **Reranking** ([`rank`]) layers title, phrase, keyword-density,
//!    discovery, and recency signals over the semantic score.
//! 8. Pagination, **heavy hydration**, and the **excerpt builder**
//!    ([`excerpt`]) produce the final page.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`error`] | Typed error kinds surfaced by the core |
//! | [`ids`] | `a_<id>` / `c_<id>_<k>` unit identifier scheme |
//! | [`models`] | Articles, chunks, filter projections, search hits |
//! | [`db`] | SQLite connections (WAL; read-only for the query side) |
//! | [`migrate`] | Idempotent schema migrations |
//! | [`store`] | Metadata store: hydration, content search, writes |
//! | [`vector`] | Dense index, on-disk shards, reloadable handle |
//! | [`embedding`] | Embedding provider trait and implementations |
//! | [`vocab`] | Synonyms, categorized terms, aliases |
//! | [`query`] | Power-user query parser |
//! | [`expand`] | Synonym/alias query expansion |
//! | [`filters`] | Attribute filters (app predicates + SQL) |
//! | [`cutoff`] | Adaptive semantic score cutoff |
//! | [`rank`] | Multi-signal reranking |
//! | [`excerpt`] | Phrase-centered excerpts |
//! | [`engine`] | The retrieval pipeline |
//! | [`chunking`] | Word-budget chunker and title weighting |
//! | [`feed`] | RSS/Atom fetching and parsing |
//! | [`ingest`] | Feed → store ingestion pipeline |
//! | [`index_cmd`] | Chunk + embed + index pending articles |
//! | [`aggregates`] | Sources, top authors, stats |
//! | [`server`] | Axum HTTP façade |

pub mod aggregates;
pub mod chunking;
pub mod config;
pub mod cutoff;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod excerpt;
pub mod expand;
pub mod feed;
pub mod filters;
pub mod ids;
pub mod index_cmd;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod query;
pub mod rank;
pub mod server;
pub mod store;
pub mod vector;
pub mod vocab;
