//! Error types surfaced by the retrieval core.
//!
//! The pipeline itself never retries: a malformed ID or a failed metadata
//! read drops the offending candidate and continues, while index-level
//! failures (not loaded, unreachable) propagate to the caller. The HTTP
//! façade maps these kinds onto status codes in [`crate::server`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    /// An ID string from the vector store did not match `a_<n>` or `c_<n>_<k>`.
    #[error("malformed unit id: {0}")]
    MalformedId(String),

    /// Query exceeded the parser's hard length cap.
    #[error("query too long (max {max} characters)")]
    QueryTooLong { max: usize },

    /// A `start_date` / `end_date` filter value was not a valid ISO date.
    #[error("invalid date: {0}")]
    InvalidDate(String),

    /// Search was attempted before the vector index was loaded.
    #[error("vector index not loaded")]
    IndexNotLoaded,

    /// The vector store failed mid-search or mid-reload.
    #[error("vector store unavailable: {0}")]
    VectorStoreUnavailable(String),

    /// The per-request deadline elapsed.
    #[error("search timed out after {0} seconds")]
    Timeout(u64),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_id_display() {
        let e = SearchError::MalformedId("x_12".into());
        assert!(e.to_string().contains("x_12"));
    }

    #[test]
    fn query_too_long_display() {
        let e = SearchError::QueryTooLong { max: 1000 };
        assert!(e.to_string().contains("1000"));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let e: SearchError = io.into();
        assert!(e.to_string().contains("io error"));
    }
}
