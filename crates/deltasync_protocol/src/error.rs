//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding, decoding, or validating
/// protocol payloads.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A required field is missing or empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A change-log row carried an unknown operation code.
    #[error("invalid operation code: {0:?}")]
    InvalidOperation(String),

    /// A change-log row carried an unparseable timestamp.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
