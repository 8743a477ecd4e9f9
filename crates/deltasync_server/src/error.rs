//! Error types for the exchange server.

use deltasync_engine::SyncError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while serving an exchange.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The request is missing required fields or exceeds limits.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The requested dataset is not registered.
    #[error("unknown dataset: {0}")]
    UnknownDataset(String),

    /// A sync-core failure (store, extraction, application).
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if the caller is at fault (4xx-class).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_) | ServerError::UnknownDataset(_)
        )
    }

    /// Returns true if the server is at fault (5xx-class).
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}
