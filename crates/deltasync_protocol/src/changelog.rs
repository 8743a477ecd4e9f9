//! Change-log records.

use crate::error::{ProtocolError, ProtocolResult};
use crate::row::{Row, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the table holding change-log entries.
///
/// The log is an ordinary table reachable through the Row Store contract,
/// and is always excluded from tracking and extraction.
pub const CHANGELOG_TABLE: &str = "ChangeLog";

/// The net operation recorded for an object since the last checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Object was created.
    #[serde(rename = "I")]
    Insert,
    /// Object was modified.
    #[serde(rename = "U")]
    Update,
    /// Object was deleted.
    #[serde(rename = "D")]
    Delete,
}

impl Operation {
    /// Returns the single-letter wire code.
    pub fn code(&self) -> &'static str {
        match self {
            Operation::Insert => "I",
            Operation::Update => "U",
            Operation::Delete => "D",
        }
    }

    /// Parses a single-letter wire code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "I" => Some(Operation::Insert),
            "U" => Some(Operation::Update),
            "D" => Some(Operation::Delete),
            _ => None,
        }
    }
}

/// A change-log entry: the net mutation applied to one object since the
/// last checkpoint commit.
///
/// # Invariants
///
/// - At most one live entry exists per `(object_id, tablename)` between
///   two checkpoint commits.
/// - `timestamp` reflects the most recent mutation folded into the entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    /// Primary key of the log row itself.
    pub id: String,
    /// Primary key of the changed object.
    pub object_id: String,
    /// Table the object lives in.
    pub tablename: String,
    /// Net operation.
    pub operation: Operation,
    /// Time of the most recent mutation.
    pub timestamp: DateTime<Utc>,
}

impl ChangeEntry {
    /// Creates a new entry with a fresh log-row id.
    pub fn new(
        object_id: impl Into<String>,
        tablename: impl Into<String>,
        operation: Operation,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            object_id: object_id.into(),
            tablename: tablename.into(),
            operation,
            timestamp,
        }
    }

    /// Renders the entry as a row for the `ChangeLog` table.
    pub fn to_row(&self) -> Row {
        Row::new()
            .with("id", self.id.clone())
            .with("object_id", self.object_id.clone())
            .with("tablename", self.tablename.clone())
            .with("operation", self.operation.code())
            .with("timestamp", self.timestamp.to_rfc3339())
    }

    /// Reads an entry back from a `ChangeLog` row.
    pub fn from_row(row: &Row) -> ProtocolResult<Self> {
        let text = |field: &'static str| -> ProtocolResult<String> {
            row.get(field)
                .and_then(Value::as_text)
                .map(str::to_string)
                .ok_or(ProtocolError::MissingField(field))
        };

        let op_code = text("operation")?;
        let operation = Operation::from_code(&op_code)
            .ok_or_else(|| ProtocolError::InvalidOperation(op_code.clone()))?;

        let ts_text = text("timestamp")?;
        let timestamp = DateTime::parse_from_rfc3339(&ts_text)
            .map_err(|_| ProtocolError::InvalidTimestamp(ts_text.clone()))?
            .with_timezone(&Utc);

        Ok(Self {
            id: text("id")?,
            object_id: text("object_id")?,
            tablename: text("tablename")?,
            operation,
            timestamp,
        })
    }
}
