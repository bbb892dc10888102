//! HTTP façade for the search engine.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/v1/search` | Execute a search query |
//! | `GET`  | `/api/v1/top-authors` | Authors by indexed article count |
//! | `GET`  | `/api/v1/sources` | Indexed sources with counts and date ranges |
//! | `GET`  | `/api/v1/stats` | Corpus and index statistics |
//! | `GET`  | `/api/v1/health` | Liveness check |
//! | `POST` | `/api/v1/reload-index` | Swap in the on-disk index |
//!
//! # Error Contract
//!
//! Errors are JSON `{ "error": "...", "code": "...", "details": ... }` with
//! a 4xx/5xx status. Query *parse* problems are not transport errors: they
//! come back as an empty result set with an `error` field, status 200.
//!
//! # Concurrency
//!
//! An admission semaphore caps in-flight searches and each request gets a
//! deadline; exceeding it returns 504. Reloads swap the index atomically,
//! so searches admitted before the swap finish against their snapshot.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::engine::SearchEngine;
use crate::error::SearchError;
use crate::filters::SearchFilters;
use crate::models::{ReloadStats, SearchResponse};

/// Hard cap on query length at the HTTP boundary (the parser allows more
/// for internal callers).
const MAX_HTTP_QUERY_LENGTH: usize = 500;
const MAX_LIMIT: usize = 100;

#[derive(Clone)]
struct AppState {
    engine: Arc<SearchEngine>,
    /// Admission control for in-flight searches.
    search_permits: Arc<Semaphore>,
    search_timeout: Duration,
}

/// Start the HTTP server; runs until the process is terminated.
pub async fn run_server(config: &Config, engine: Arc<SearchEngine>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let state = AppState {
        engine,
        search_permits: Arc::new(Semaphore::new(config.concurrency.max_concurrent_searches)),
        search_timeout: Duration::from_secs(config.concurrency.search_timeout_secs),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/v1/search", post(handle_search))
        .route("/api/v1/top-authors", get(handle_top_authors))
        .route("/api/v1/sources", get(handle_sources))
        .route("/api/v1/stats", get(handle_stats))
        .route("/api/v1/health", get(handle_health))
        .route("/api/v1/reload-index", post(handle_reload))
        .layer(cors)
        .with_state(state);

    info!(bind = bind_addr.as_str(), "search API listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error responses ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<String>,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            code: self.code.to_string(),
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

impl From<SearchError> for AppError {
    fn from(e: SearchError) -> Self {
        match &e {
            SearchError::IndexNotLoaded => AppError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "index_not_loaded",
                e.to_string(),
            ),
            SearchError::VectorStoreUnavailable(_) => {
                error!(error = %e, "vector store failure");
                AppError::new(StatusCode::BAD_GATEWAY, "vector_store_unavailable", e.to_string())
            }
            SearchError::Timeout(_) => {
                AppError::new(StatusCode::GATEWAY_TIMEOUT, "timeout", e.to_string())
            }
            SearchError::QueryTooLong { .. } | SearchError::InvalidDate(_) => {
                AppError::new(StatusCode::BAD_REQUEST, "bad_request", e.to_string())
            }
            SearchError::MalformedId(_) | SearchError::Storage(_) | SearchError::Io(_) => {
                error!(error = %e, "internal search failure");
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string())
            }
        }
    }
}

// ============ POST /api/v1/search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    filters: Option<SearchFilters>,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_limit() -> usize {
    50
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.query.chars().count() > MAX_HTTP_QUERY_LENGTH {
        return Err(bad_request(format!(
            "query too long (max {MAX_HTTP_QUERY_LENGTH} characters)"
        )));
    }
    if req.limit < 1 || req.limit > MAX_LIMIT {
        return Err(bad_request(format!("limit must be in [1, {MAX_LIMIT}]")));
    }

    let _permit = state
        .search_permits
        .acquire()
        .await
        .map_err(|_| AppError::new(StatusCode::SERVICE_UNAVAILABLE, "shutting_down", "server shutting down"))?;

    let filters = req.filters.unwrap_or_default();
    let search = state
        .engine
        .search(&req.query, filters, req.limit, req.offset);

    match tokio::time::timeout(state.search_timeout, search).await {
        Ok(result) => Ok(Json(result?)),
        Err(_) => Err(SearchError::Timeout(state.search_timeout.as_secs()).into()),
    }
}

// ============ GET /api/v1/top-authors ============

#[derive(Deserialize)]
struct TopAuthorsParams {
    #[serde(default = "default_min_articles")]
    min_articles: i64,
    #[serde(default = "default_authors_limit")]
    limit: i64,
}

fn default_min_articles() -> i64 {
    10
}

fn default_authors_limit() -> i64 {
    15
}

#[derive(Serialize)]
struct TopAuthorsResponse {
    authors: Vec<crate::models::AuthorInfo>,
}

async fn handle_top_authors(
    State(state): State<AppState>,
    Query(params): Query<TopAuthorsParams>,
) -> Result<Json<TopAuthorsResponse>, AppError> {
    let authors = state
        .engine
        .top_authors(params.min_articles.max(1), params.limit.clamp(1, 100))
        .await?;
    Ok(Json(TopAuthorsResponse { authors }))
}

// ============ GET /api/v1/sources ============

#[derive(Serialize)]
struct SourcesResponse {
    sources: Vec<crate::models::SourceInfo>,
}

async fn handle_sources(
    State(state): State<AppState>,
) -> Result<Json<SourcesResponse>, AppError> {
    let sources = state.engine.sources().await?;
    Ok(Json(SourcesResponse { sources }))
}

// ============ GET /api/v1/stats ============

async fn handle_stats(
    State(state): State<AppState>,
) -> Result<Json<crate::models::StatsInfo>, AppError> {
    Ok(Json(state.engine.stats().await?))
}

// ============ GET /api/v1/health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    index_loaded: bool,
    index_document_count: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        index_loaded: state.engine.vector().is_loaded(),
        index_document_count: state.engine.vector().count(),
    })
}

// ============ POST /api/v1/reload-index ============

#[derive(Serialize)]
struct ReloadResponse {
    success: bool,
    #[serde(flatten)]
    stats: ReloadStats,
}

async fn handle_reload(
    State(state): State<AppState>,
) -> Result<Json<ReloadResponse>, AppError> {
    let stats = state.engine.reload_index()?;
    Ok(Json(ReloadResponse {
        success: true,
        stats,
    }))
}
