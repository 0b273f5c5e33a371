use async_trait::async_trait;

use crate::options::{SearchOptions, SearchResponse};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The request never produced a response
    #[error("search request failed: {0}")]
    Request(String),

    /// The backend answered with `ok: false`
    #[error("search backend rejected the query: {0}")]
    Rejected(String),
}

/// Transport to the paged search backend
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Request one page
    async fn search(&self, options: &SearchOptions) -> Result<SearchResponse, BackendError>;

    /// Release a session handle. Best-effort: callers log failures and move on.
    async fn close_session(&self, session: &str) -> Result<(), BackendError>;
}
