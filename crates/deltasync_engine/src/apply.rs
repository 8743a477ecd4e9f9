//! Idempotent batch application of incoming deltas.

use crate::error::{SyncError, SyncResult};
use deltasync_protocol::Delta;
use deltasync_store::RowStore;
use tracing::{debug, warn};

/// Applies a delta to a store, returning the number of rows applied.
///
/// Tombstones are removed by primary key; everything else is upserted
/// via `save`. The whole operation is idempotent: re-deleting an
/// already-deleted row and re-saving an already-current row are both
/// no-ops, so replaying a delta (after a lost response, a retry, or an
/// at-least-once transport) leaves the store unchanged.
///
/// The `RowStore` contract carries no multi-statement transaction, so
/// entries apply independently. A failure stops the affected table but
/// the remaining tables are still attempted, and the error reports the
/// partial success count together with every failed table.
pub fn apply_batch<S: RowStore>(store: &S, delta: &Delta) -> SyncResult<u64> {
    if delta.is_empty() {
        return Ok(0);
    }

    let mut applied = 0u64;
    let mut failed: Vec<String> = Vec::new();

    for (table, rows) in delta.iter() {
        let pk = store.schema().primary_key(table).to_string();
        for row in rows {
            let result = if row.is_tombstone(&pk) {
                store.remove(table, row).map(|_| ())
            } else {
                store.save(table, row.clone()).map(|_| ())
            };

            match result {
                Ok(()) => applied += 1,
                Err(e) => {
                    warn!(table = %table, error = %e, "apply failed, skipping rest of table");
                    failed.push(format!("{table}: {e}"));
                    break;
                }
            }
        }
    }

    if failed.is_empty() {
        debug!(applied, "batch applied");
        Ok(applied)
    } else {
        Err(SyncError::PartialApply { applied, failed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deltasync_protocol::{Row, Value};
    use deltasync_store::{FieldDef, FieldType, MemoryStore, Schema, TableDef};

    fn store() -> MemoryStore {
        let schema = Schema::new()
            .with_table(
                "Task",
                TableDef::new(vec![
                    FieldDef::new("id", FieldType::String),
                    FieldDef::new("name", FieldType::String),
                ]),
            )
            .with_table(
                "Project",
                TableDef::new(vec![FieldDef::new("id", FieldType::String)]),
            );
        MemoryStore::new(schema)
    }

    fn sample_delta() -> Delta {
        let mut delta = Delta::new();
        delta.push("Task", Row::new().with("id", "t1").with("name", "one"));
        delta.push("Task", Row::new().with("id", "t2").with("name", "two"));
        delta.push("Task", Row::tombstone("id", "t3"));
        delta.push("Project", Row::new().with("id", "p1"));
        delta
    }

    #[test]
    fn empty_delta_applies_nothing() {
        let store = store();
        assert_eq!(apply_batch(&store, &Delta::new()).unwrap(), 0);
    }

    #[test]
    fn rows_upsert_and_tombstones_remove() {
        let store = store();
        store
            .add("Task", Row::new().with("id", "t3").with("name", "doomed"))
            .unwrap();

        let applied = apply_batch(&store, &sample_delta()).unwrap();
        assert_eq!(applied, 4);

        assert!(store.exists("Task", "t1").unwrap());
        assert!(store.exists("Task", "t2").unwrap());
        assert!(!store.exists("Task", "t3").unwrap());
        assert!(store.exists("Project", "p1").unwrap());
    }

    #[test]
    fn reapplying_a_delta_is_a_no_op() {
        let store = store();
        let delta = sample_delta();

        apply_batch(&store, &delta).unwrap();
        let count_after_first = store.count("Task").unwrap();

        // Second application: re-save current rows, re-delete a missing
        // row. Neither may error.
        let applied = apply_batch(&store, &delta).unwrap();
        assert_eq!(applied, 4);
        assert_eq!(store.count("Task").unwrap(), count_after_first);
        let row = store.find_by_id("Task", "t1").unwrap().unwrap();
        assert_eq!(row.get("name").and_then(Value::as_text), Some("one"));
    }

    #[test]
    fn later_write_wins_on_replay() {
        let store = store();
        apply_batch(&store, &sample_delta()).unwrap();

        let mut newer = Delta::new();
        newer.push("Task", Row::new().with("id", "t1").with("name", "newer"));
        apply_batch(&store, &newer).unwrap();

        let row = store.find_by_id("Task", "t1").unwrap().unwrap();
        assert_eq!(row.get("name").and_then(Value::as_text), Some("newer"));
    }

    #[test]
    fn failure_reports_every_failed_table() {
        let store = store();
        store.close();

        let err = apply_batch(&store, &sample_delta()).unwrap_err();
        match err {
            SyncError::PartialApply { applied, failed } => {
                assert_eq!(applied, 0);
                assert_eq!(failed.len(), 2);
                assert!(failed.iter().any(|f| f.starts_with("Task:")));
                assert!(failed.iter().any(|f| f.starts_with("Project:")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
