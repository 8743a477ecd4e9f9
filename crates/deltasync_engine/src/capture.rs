//! Change capture.

use chrono::{DateTime, Utc};
use deltasync_protocol::{ChangeEntry, Operation, Row, Value, CHANGELOG_TABLE};
use deltasync_store::{RowStore, Schema, StoreError, StoreResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// How successive operations on one object fold into the log.
///
/// A capture instance holds one policy for its whole life; the two
/// variants have different cancellation semantics and must not be
/// blended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePolicy {
    /// Net-effect folding for a log that is cleared on commit:
    /// insert+update stays insert, insert+delete cancels out entirely
    /// (the object never ships).
    ///
    /// Correct only when every live entry is unshipped — i.e. for a
    /// store whose log is owned by a single syncing identity.
    Coalescing,
    /// Trigger-style folding for a shared log consumed through
    /// per-identity markers: any existing entry is replaced by the
    /// latest operation. An object created and deleted within one
    /// window ships a phantom tombstone, which applies as a harmless
    /// zero-row delete.
    Replace,
}

/// Maintains the change log so that it always reflects the net
/// operation per object: at most one live entry per `(object, table)`.
pub struct ChangeCapture<S> {
    store: Arc<S>,
    policy: CapturePolicy,
    enabled: AtomicBool,
}

impl<S: RowStore> ChangeCapture<S> {
    /// Creates a coalescing capture writing to the store's `ChangeLog`
    /// table.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_policy(store, CapturePolicy::Coalescing)
    }

    /// Creates a capture with an explicit folding policy.
    pub fn with_policy(store: Arc<S>, policy: CapturePolicy) -> Self {
        Self {
            store,
            policy,
            enabled: AtomicBool::new(true),
        }
    }

    /// Returns the folding policy.
    pub fn policy(&self) -> CapturePolicy {
        self.policy
    }

    /// Returns true while mutations are being logged.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Enables or disables logging.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Disables logging until the returned guard is dropped.
    ///
    /// Used while applying a remote delta, so already-synchronized
    /// changes are not re-logged as new local changes. The guard restores
    /// the previous state on every exit path.
    pub fn pause(&self) -> CaptureGuard<'_, S> {
        let was_enabled = self.enabled.swap(false, Ordering::SeqCst);
        CaptureGuard {
            capture: self,
            was_enabled,
        }
    }

    /// Records a mutation, folding it into any live entry for the same
    /// object per the capture policy.
    ///
    /// Untracked tables (the change log itself, local bookkeeping) and
    /// paused capture are no-ops.
    pub fn record(
        &self,
        table: &str,
        object_id: &str,
        operation: Operation,
        timestamp: DateTime<Utc>,
    ) -> StoreResult<()> {
        if !self.is_enabled() || !self.store.schema().is_tracked(table) {
            return Ok(());
        }

        let existing = self.entry_for(table, object_id)?;
        match (self.policy, existing) {
            (_, None) => {
                let entry = ChangeEntry::new(object_id, table, operation, timestamp);
                self.store.add(CHANGELOG_TABLE, entry.to_row())?;
            }
            (CapturePolicy::Replace, Some(entry)) => {
                self.store.remove(CHANGELOG_TABLE, &entry.to_row())?;
                let entry = ChangeEntry::new(object_id, table, operation, timestamp);
                self.store.add(CHANGELOG_TABLE, entry.to_row())?;
            }
            (CapturePolicy::Coalescing, Some(mut entry)) => match (entry.operation, operation) {
                (Operation::Insert, Operation::Update) => {
                    // Not yet shipped: from the peer's perspective this
                    // is still a pure insert.
                    entry.timestamp = timestamp;
                    self.store.update(CHANGELOG_TABLE, entry.to_row())?;
                }
                (Operation::Insert, Operation::Delete) => {
                    debug!(table, object_id, "created and deleted in one window, dropping entry");
                    self.store.remove(CHANGELOG_TABLE, &entry.to_row())?;
                }
                _ => {
                    entry.operation = operation;
                    entry.timestamp = timestamp;
                    self.store.update(CHANGELOG_TABLE, entry.to_row())?;
                }
            },
        }
        Ok(())
    }

    /// Returns the live entry for one object, if any.
    ///
    /// # Errors
    ///
    /// Reports a consistency anomaly when more than one live entry
    /// exists for the object.
    pub fn entry_for(&self, table: &str, object_id: &str) -> StoreResult<Option<ChangeEntry>> {
        let rows = self.store.find(CHANGELOG_TABLE, &|row: &Row| {
            row.get("object_id").and_then(Value::as_text) == Some(object_id)
                && row.get("tablename").and_then(Value::as_text) == Some(table)
        })?;

        if rows.len() > 1 {
            return Err(StoreError::DuplicateRows {
                table: CHANGELOG_TABLE.to_string(),
                id: object_id.to_string(),
                count: rows.len(),
            });
        }

        rows.first()
            .map(ChangeEntry::from_row)
            .transpose()
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    /// Returns every live entry.
    pub fn entries(&self) -> StoreResult<Vec<ChangeEntry>> {
        self.store
            .find_all(CHANGELOG_TABLE)?
            .iter()
            .map(|row| ChangeEntry::from_row(row).map_err(|e| StoreError::Backend(e.to_string())))
            .collect()
    }

    /// Clears the log. Called by checkpoint commit.
    pub fn clear(&self) -> StoreResult<()> {
        self.store.clear_table(CHANGELOG_TABLE)
    }

    /// Removes every entry with `timestamp <= cutoff`.
    ///
    /// Commit uses this instead of a full clear so entries recorded
    /// while a round was in flight survive and ship next round.
    pub fn clear_through(&self, cutoff: DateTime<Utc>) -> StoreResult<()> {
        for entry in self.entries()? {
            if entry.timestamp <= cutoff {
                self.store.remove(CHANGELOG_TABLE, &entry.to_row())?;
            }
        }
        Ok(())
    }
}

/// Restores a capture's enabled state when dropped.
pub struct CaptureGuard<'a, S> {
    capture: &'a ChangeCapture<S>,
    was_enabled: bool,
}

impl<S> Drop for CaptureGuard<'_, S> {
    fn drop(&mut self) {
        self.capture
            .enabled
            .store(self.was_enabled, Ordering::SeqCst);
    }
}

/// A row store wrapper that records every effective mutation to tracked
/// tables.
///
/// The business mutation runs first; a capture failure never rolls it
/// back, it surfaces to the caller of the original mutation. Mutations
/// that affect zero rows record nothing.
pub struct TrackedStore<S> {
    inner: Arc<S>,
    capture: ChangeCapture<S>,
}

impl<S: RowStore> TrackedStore<S> {
    /// Wraps a store with coalescing capture.
    pub fn new(store: S) -> Self {
        Self::from_arc(Arc::new(store))
    }

    /// Wraps a store with an explicit capture policy.
    pub fn with_policy(store: S, policy: CapturePolicy) -> Self {
        let store = Arc::new(store);
        Self {
            capture: ChangeCapture::with_policy(Arc::clone(&store), policy),
            inner: store,
        }
    }

    /// Wraps a shared store with coalescing capture.
    pub fn from_arc(store: Arc<S>) -> Self {
        Self {
            capture: ChangeCapture::new(Arc::clone(&store)),
            inner: store,
        }
    }

    /// Returns the capture handle.
    pub fn capture(&self) -> &ChangeCapture<S> {
        &self.capture
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }
}

impl<S: RowStore> RowStore for TrackedStore<S> {
    fn schema(&self) -> &Schema {
        self.inner.schema()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn close(&self) {
        self.inner.close();
    }

    fn exists(&self, table: &str, id: &str) -> StoreResult<bool> {
        self.inner.exists(table, id)
    }

    fn find_by_id(&self, table: &str, id: &str) -> StoreResult<Option<Row>> {
        self.inner.find_by_id(table, id)
    }

    fn find_all(&self, table: &str) -> StoreResult<Vec<Row>> {
        self.inner.find_all(table)
    }

    fn find(&self, table: &str, predicate: &dyn Fn(&Row) -> bool) -> StoreResult<Vec<Row>> {
        self.inner.find(table, predicate)
    }

    fn add(&self, table: &str, row: Row) -> StoreResult<String> {
        let pk = self.inner.schema().primary_key(table);
        let pre_existing = match row.id(pk) {
            Some(id) => self.inner.exists(table, &id)?,
            None => false,
        };

        let id = self.inner.add(table, row)?;
        if !pre_existing {
            self.capture
                .record(table, &id, Operation::Insert, Utc::now())?;
        }
        Ok(id)
    }

    fn update(&self, table: &str, row: Row) -> StoreResult<String> {
        let id = self.inner.update(table, row)?;
        // A zero-row update changed nothing; only log when the row is
        // actually there.
        if self.inner.exists(table, &id)? {
            self.capture
                .record(table, &id, Operation::Update, Utc::now())?;
        }
        Ok(id)
    }

    fn remove(&self, table: &str, row: &Row) -> StoreResult<u64> {
        let affected = self.inner.remove(table, row)?;
        if affected > 0 {
            let pk = self.inner.schema().primary_key(table);
            if let Some(id) = row.id(pk) {
                self.capture
                    .record(table, &id, Operation::Delete, Utc::now())?;
            }
        }
        Ok(affected)
    }

    fn clear_table(&self, table: &str) -> StoreResult<()> {
        self.inner.clear_table(table)
    }

    fn count(&self, table: &str) -> StoreResult<usize> {
        self.inner.count(table)
    }
}
