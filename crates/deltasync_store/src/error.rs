//! Error types for row stores.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in row store operations.
///
/// Integrity anomalies (duplicate-id insert, zero-row update or delete)
/// are deliberately *not* errors: they are logged as warnings and the
/// operation reports its nominal result, since idempotent apply treats
/// "nothing to do" as success.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store has been closed or was never opened.
    #[error("store is closed")]
    Closed,

    /// The backend is unreachable or rejected the connection.
    #[error("store unreachable: {0}")]
    Unreachable(String),

    /// A mutation was given a row without its primary key.
    #[error("row for table {table} is missing its primary key")]
    MissingPrimaryKey {
        /// Table the mutation targeted.
        table: String,
    },

    /// More than one row shares an id that should be unique.
    ///
    /// Signals a correctness bug in the store rather than a transient
    /// condition; reported alongside the first matching row by
    /// `find_by_id`.
    #[error("{count} rows in table {table} share id {id}")]
    DuplicateRows {
        /// Table containing the duplicates.
        table: String,
        /// The shared id.
        id: String,
        /// How many rows share it.
        count: usize,
    },

    /// A backend-specific failure.
    #[error("backend error: {0}")]
    Backend(String),

    /// I/O error from the underlying backend.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StoreError::DuplicateRows {
            table: "Task".into(),
            id: "a1".into(),
            count: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("Task"));
        assert!(msg.contains("a1"));
        assert!(msg.contains('2'));
    }
}
