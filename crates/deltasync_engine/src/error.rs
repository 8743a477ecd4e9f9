//! Error types for the sync engine.

use deltasync_protocol::ProtocolError;
use deltasync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during synchronization.
///
/// Store errors propagate unchanged through extraction, application, and
/// the synchronizer; only the exchange boundary wraps them into a
/// protocol-level payload.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Row store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Payload encoding, decoding, or validation failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Network or transport failure.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the round can be retried.
        retryable: bool,
    },

    /// The peer answered with an application-level error payload.
    #[error("peer error: {0}")]
    Peer(String),

    /// A batch apply failed partway through.
    ///
    /// Carries the partial success count and every table that failed, so
    /// a mid-batch failure is never silent about the remainder.
    #[error("applied {applied} rows; failed tables: {failed:?}")]
    PartialApply {
        /// Rows applied before and around the failures.
        applied: u64,
        /// `table: cause` description per failed table.
        failed: Vec<String>,
    },

    /// Operation not allowed in the current phase.
    #[error("invalid state transition from {from} to {to}")]
    InvalidState {
        /// Current phase.
        from: String,
        /// Attempted target phase.
        to: String,
    },

    /// The round was cancelled by the caller.
    #[error("synchronization cancelled")]
    Cancelled,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if retrying the round may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Peer(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection reset").is_retryable());
        assert!(!SyncError::transport_fatal("bad certificate").is_retryable());
        assert!(SyncError::Peer("busy".into()).is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
    }

    #[test]
    fn partial_apply_names_failed_tables() {
        let err = SyncError::PartialApply {
            applied: 3,
            failed: vec!["Task: store is closed".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains('3'));
        assert!(msg.contains("Task"));
    }
}
