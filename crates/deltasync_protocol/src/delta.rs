//! Per-table groupings of changed rows.

use crate::row::Row;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A set of rows and tombstones changed since a checkpoint, grouped by
/// table.
///
/// Tables with zero entries are omitted from the grouping; an empty delta
/// is a normal result, not an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Delta {
    tables: BTreeMap<String, Vec<Row>>,
}

impl Delta {
    /// Creates an empty delta.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a row (or tombstone) for a table.
    pub fn push(&mut self, table: impl Into<String>, row: Row) {
        self.tables.entry(table.into()).or_default().push(row);
    }

    /// Replaces the row list for a table. Empty lists are dropped.
    pub fn insert_table(&mut self, table: impl Into<String>, rows: Vec<Row>) {
        if rows.is_empty() {
            return;
        }
        self.tables.insert(table.into(), rows);
    }

    /// Returns the rows for a table.
    pub fn rows(&self, table: &str) -> Option<&[Row]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    /// Iterates over `(table, rows)` groups in table order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<Row>)> {
        self.tables.iter()
    }

    /// Returns the table names present in the grouping.
    pub fn table_names(&self) -> impl Iterator<Item = &String> {
        self.tables.keys()
    }

    /// Returns the total number of rows across all tables.
    pub fn len(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }

    /// Returns true if the grouping carries no rows.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Counts the tombstones in one table's group.
    pub fn tombstone_count(&self, table: &str, pk_field: &str) -> usize {
        self.rows(table)
            .map(|rows| rows.iter().filter(|r| r.is_tombstone(pk_field)).count())
            .unwrap_or(0)
    }
}

impl FromIterator<(String, Vec<Row>)> for Delta {
    fn from_iter<I: IntoIterator<Item = (String, Vec<Row>)>>(iter: I) -> Self {
        let mut delta = Self::new();
        for (table, rows) in iter {
            delta.insert_table(table, rows);
        }
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_delta() {
        let delta = Delta::new();
        assert!(delta.is_empty());
        assert_eq!(delta.len(), 0);
        assert!(delta.rows("Task").is_none());
    }

    #[test]
    fn push_groups_by_table() {
        let mut delta = Delta::new();
        delta.push("Task", Row::new().with("id", "a"));
        delta.push("Task", Row::tombstone("id", "b"));
        delta.push("Project", Row::new().with("id", "p"));

        assert_eq!(delta.len(), 3);
        assert_eq!(delta.rows("Task").unwrap().len(), 2);
        assert_eq!(delta.tombstone_count("Task", "id"), 1);
        assert_eq!(delta.table_names().count(), 2);
    }

    #[test]
    fn empty_table_groups_are_dropped() {
        let mut delta = Delta::new();
        delta.insert_table("Task", vec![]);
        assert!(delta.is_empty());
    }

    #[test]
    fn json_shape_is_table_map() {
        let mut delta = Delta::new();
        delta.push("Task", Row::new().with("id", "a").with("name", "x"));

        let json = serde_json::to_value(&delta).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"Task": [{"id": "a", "name": "x"}]})
        );
    }
}
