//! In-memory row store.

use crate::error::{StoreError, StoreResult};
use crate::schema::Schema;
use crate::store::RowStore;
use deltasync_protocol::Row;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;
use uuid::Uuid;

/// An in-memory row store.
///
/// Holds every table as a map of id → row. Suitable for:
/// - Unit and integration tests
/// - In-process server datasets
/// - Ephemeral stores that don't need persistence
///
/// # Thread Safety
///
/// The store is thread-safe and can be shared across threads. `save` is
/// atomic: the existence check and the write happen under one lock.
pub struct MemoryStore {
    schema: Schema,
    tables: RwLock<BTreeMap<String, BTreeMap<String, Row>>>,
    open: AtomicBool,
}

impl MemoryStore {
    /// Creates an open, empty store for the given schema.
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            tables: RwLock::new(BTreeMap::new()),
            open: AtomicBool::new(true),
        }
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Closed)
        }
    }

    /// Assigns a fresh primary key when the row carries none; returns
    /// the effective id. The row's null columns are stripped so stored
    /// rows contain only populated fields.
    fn prepare(&self, table: &str, row: &mut Row) -> String {
        let pk = self.schema.primary_key(table);
        row.strip_nulls();
        match row.id(pk) {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                row.set(pk, id.clone());
                id
            }
        }
    }

    fn required_id(&self, table: &str, row: &Row) -> StoreResult<String> {
        let pk = self.schema.primary_key(table);
        row.id(pk).ok_or_else(|| StoreError::MissingPrimaryKey {
            table: table.to_string(),
        })
    }
}

impl RowStore for MemoryStore {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn exists(&self, table: &str, id: &str) -> StoreResult<bool> {
        self.ensure_open()?;
        Ok(self
            .tables
            .read()
            .get(table)
            .is_some_and(|rows| rows.contains_key(id)))
    }

    fn find_by_id(&self, table: &str, id: &str) -> StoreResult<Option<Row>> {
        self.ensure_open()?;
        Ok(self
            .tables
            .read()
            .get(table)
            .and_then(|rows| rows.get(id))
            .cloned())
    }

    fn find_all(&self, table: &str) -> StoreResult<Vec<Row>> {
        self.ensure_open()?;
        Ok(self
            .tables
            .read()
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    fn find(&self, table: &str, predicate: &dyn Fn(&Row) -> bool) -> StoreResult<Vec<Row>> {
        self.ensure_open()?;
        Ok(self
            .tables
            .read()
            .get(table)
            .map(|rows| rows.values().filter(|r| predicate(r)).cloned().collect())
            .unwrap_or_default())
    }

    fn add(&self, table: &str, mut row: Row) -> StoreResult<String> {
        self.ensure_open()?;
        let id = self.prepare(table, &mut row);

        let mut tables = self.tables.write();
        let rows = tables.entry(table.to_string()).or_default();
        if rows.contains_key(&id) {
            warn!(table, %id, "insert affected no rows: id already present");
            return Ok(id);
        }
        rows.insert(id.clone(), row);
        Ok(id)
    }

    fn update(&self, table: &str, mut row: Row) -> StoreResult<String> {
        self.ensure_open()?;
        let id = self.required_id(table, &row)?;
        row.strip_nulls();

        let mut tables = self.tables.write();
        let rows = tables.entry(table.to_string()).or_default();
        if let Some(existing) = rows.get_mut(&id) {
            *existing = row;
        } else {
            warn!(table, %id, "update affected no rows");
        }
        Ok(id)
    }

    fn remove(&self, table: &str, row: &Row) -> StoreResult<u64> {
        self.ensure_open()?;
        let id = self.required_id(table, row)?;

        let mut tables = self.tables.write();
        let affected = tables
            .get_mut(table)
            .and_then(|rows| rows.remove(&id))
            .map(|_| 1)
            .unwrap_or(0);
        if affected == 0 {
            warn!(table, %id, "delete affected no rows");
        }
        Ok(affected)
    }

    fn save(&self, table: &str, mut row: Row) -> StoreResult<String> {
        self.ensure_open()?;
        let id = self.prepare(table, &mut row);

        // Check-then-write under a single lock, so the race-checked
        // contract holds even against concurrent savers.
        let mut tables = self.tables.write();
        tables.entry(table.to_string()).or_default().insert(id.clone(), row);
        Ok(id)
    }

    fn clear_table(&self, table: &str) -> StoreResult<()> {
        self.ensure_open()?;
        if let Some(rows) = self.tables.write().get_mut(table) {
            rows.clear();
        }
        Ok(())
    }

    fn count(&self, table: &str) -> StoreResult<usize> {
        self.ensure_open()?;
        Ok(self
            .tables
            .read()
            .get(table)
            .map(BTreeMap::len)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, FieldType, TableDef};
    use deltasync_protocol::Value;

    fn task_store() -> MemoryStore {
        let schema = Schema::new().with_table(
            "Task",
            TableDef::new(vec![
                FieldDef::new("id", FieldType::String),
                FieldDef::new("name", FieldType::String),
            ]),
        );
        MemoryStore::new(schema)
    }

    #[test]
    fn add_assigns_id_when_absent() {
        let store = task_store();
        let id = store.add("Task", Row::new().with("name", "Test1")).unwrap();

        assert!(!id.is_empty());
        let row = store.find_by_id("Task", &id).unwrap().unwrap();
        assert_eq!(row.id("id"), Some(id));
        assert_eq!(row.get("name").and_then(Value::as_text), Some("Test1"));
    }

    #[test]
    fn add_keeps_caller_id() {
        let store = task_store();
        let id = store
            .add("Task", Row::new().with("id", "t1").with("name", "x"))
            .unwrap();
        assert_eq!(id, "t1");
    }

    #[test]
    fn duplicate_add_leaves_existing_row() {
        let store = task_store();
        store
            .add("Task", Row::new().with("id", "t1").with("name", "first"))
            .unwrap();
        let id = store
            .add("Task", Row::new().with("id", "t1").with("name", "second"))
            .unwrap();

        assert_eq!(id, "t1");
        let row = store.find_by_id("Task", "t1").unwrap().unwrap();
        assert_eq!(row.get("name").and_then(Value::as_text), Some("first"));
        assert_eq!(store.count("Task").unwrap(), 1);
    }

    #[test]
    fn update_replaces_row() {
        let store = task_store();
        store
            .add("Task", Row::new().with("id", "t1").with("name", "old"))
            .unwrap();
        store
            .update("Task", Row::new().with("id", "t1").with("name", "Updated"))
            .unwrap();

        let row = store.find_by_id("Task", "t1").unwrap().unwrap();
        assert_eq!(row.get("name").and_then(Value::as_text), Some("Updated"));
    }

    #[test]
    fn update_missing_row_is_nominal() {
        let store = task_store();
        let id = store
            .update("Task", Row::new().with("id", "ghost").with("name", "x"))
            .unwrap();
        assert_eq!(id, "ghost");
        assert_eq!(store.count("Task").unwrap(), 0);
    }

    #[test]
    fn update_without_id_fails() {
        let store = task_store();
        let err = store
            .update("Task", Row::new().with("name", "x"))
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingPrimaryKey { .. }));
    }

    #[test]
    fn remove_reports_affected_count() {
        let store = task_store();
        store
            .add("Task", Row::new().with("id", "t1").with("name", "x"))
            .unwrap();

        let tomb = Row::tombstone("id", "t1");
        assert_eq!(store.remove("Task", &tomb).unwrap(), 1);
        assert_eq!(store.remove("Task", &tomb).unwrap(), 0);
        assert!(store.find_by_id("Task", "t1").unwrap().is_none());
    }

    #[test]
    fn save_adds_then_updates() {
        let store = task_store();

        let id = store.save("Task", Row::new().with("name", "v1")).unwrap();
        let saved = store
            .save(
                "Task",
                Row::new().with("id", id.clone()).with("name", "v2"),
            )
            .unwrap();

        assert_eq!(saved, id);
        assert_eq!(store.count("Task").unwrap(), 1);
        let row = store.find_by_id("Task", &id).unwrap().unwrap();
        assert_eq!(row.get("name").and_then(Value::as_text), Some("v2"));
    }

    #[test]
    fn save_readds_deleted_row() {
        let store = task_store();
        store
            .add("Task", Row::new().with("id", "t1").with("name", "x"))
            .unwrap();
        store.remove("Task", &Row::tombstone("id", "t1")).unwrap();

        // Same row saved again: existence is re-checked, so it reappears.
        store
            .save("Task", Row::new().with("id", "t1").with("name", "x"))
            .unwrap();
        assert!(store.exists("Task", "t1").unwrap());
    }

    #[test]
    fn null_columns_are_stripped_on_write() {
        let store = task_store();
        let id = store
            .add(
                "Task",
                Row::new().with("name", "x").with("note", Value::Null),
            )
            .unwrap();

        let row = store.find_by_id("Task", &id).unwrap().unwrap();
        assert!(row.get("note").is_none());
    }

    #[test]
    fn closed_store_rejects_operations() {
        let store = task_store();
        store.close();
        assert!(!store.is_open());

        let err = store.find_all("Task").unwrap_err();
        assert!(matches!(err, StoreError::Closed));
        let err = store.add("Task", Row::new().with("name", "x")).unwrap_err();
        assert!(matches!(err, StoreError::Closed));
    }

    #[test]
    fn clear_table_and_count() {
        let store = task_store();
        store.add("Task", Row::new().with("name", "a")).unwrap();
        store.add("Task", Row::new().with("name", "b")).unwrap();
        assert_eq!(store.count("Task").unwrap(), 2);

        store.clear_table("Task").unwrap();
        assert_eq!(store.count("Task").unwrap(), 0);
    }

    #[test]
    fn find_with_predicate() {
        let store = task_store();
        store
            .add("Task", Row::new().with("id", "a").with("name", "keep"))
            .unwrap();
        store
            .add("Task", Row::new().with("id", "b").with("name", "drop"))
            .unwrap();

        let hits = store
            .find("Task", &|row| {
                row.get("name").and_then(Value::as_text) == Some("keep")
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id("id"), Some("a".into()));
    }
}
