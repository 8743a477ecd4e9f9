//! Row payloads and scalar values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A scalar cell value.
///
/// Rows carry only scalars; dates are formatted as text at the row level
/// (the schema still declares a `date` field type for table creation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// An absent value. Stores strip null columns on read, so a fetched
    /// row contains only populated fields.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Integer(i64),
    /// A floating point number.
    Float(f64),
    /// A text value.
    Text(String),
}

impl Value {
    /// Returns the text content, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer content, if this is an integer value.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the boolean content, if this is a boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns true if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// An ordered mapping of column name to scalar value.
///
/// Exactly one column (named by the dataset schema, default `id`) is the
/// primary key. It is globally unique within a table, assigned by the
/// writer if absent, and never reassigned.
///
/// A row with exactly one populated field, that field being the primary
/// key, is a **tombstone**: a deletion marker inside a delta payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    columns: BTreeMap<String, Value>,
}

impl Row {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tombstone: a row carrying only the primary key.
    pub fn tombstone(pk_field: &str, id: impl Into<String>) -> Self {
        let mut row = Self::new();
        row.set(pk_field, Value::Text(id.into()));
        row
    }

    /// Builder-style column insertion.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Sets a column value, replacing any previous value.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.insert(column.into(), value.into());
    }

    /// Returns a column value.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Removes a column, returning its value.
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.columns.remove(column)
    }

    /// Returns the primary-key value as text.
    ///
    /// Integer keys (autoincrement backends) are rendered in decimal so
    /// callers can treat identifiers uniformly as opaque strings.
    pub fn id(&self, pk_field: &str) -> Option<String> {
        match self.columns.get(pk_field)? {
            Value::Text(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            _ => None,
        }
    }

    /// Returns true if this row is a deletion marker: exactly one
    /// populated (non-null) field, and that field is the primary key.
    pub fn is_tombstone(&self, pk_field: &str) -> bool {
        let mut populated = self.columns.iter().filter(|(_, v)| !v.is_null());
        match (populated.next(), populated.next()) {
            (Some((name, _)), None) => name == pk_field,
            _ => false,
        }
    }

    /// Iterates over `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.columns.iter()
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Drops all null-valued columns.
    ///
    /// Stores call this after a read so that absent data never surfaces
    /// as an explicit null; the tombstone rule depends on it.
    pub fn strip_nulls(&mut self) {
        self.columns.retain(|_, v| !v.is_null());
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}
