//! Row store trait definition.

use crate::error::StoreResult;
use crate::schema::Schema;
use deltasync_protocol::Row;

/// A row-oriented CRUD backend.
///
/// Row stores hold named tables of rows keyed by a primary-key column
/// (declared by the dataset [`Schema`]). The synchronization core depends
/// only on this trait, never on which backing variant is active.
///
/// # Invariants
///
/// - Every operation fails with a connectivity error when the store is
///   closed or unreachable.
/// - A mutation that affects zero rows is a logged warning, not a
///   failure; the call still reports its nominal result.
/// - `find_by_id` reports a consistency anomaly when more than one row
///   shares an id.
/// - Implementations must be `Send + Sync` for concurrent access.
///
/// # Implementors
///
/// - [`crate::MemoryStore`] - in-memory, for tests and in-process
///   server datasets
pub trait RowStore: Send + Sync {
    /// Returns the dataset schema this store serves.
    fn schema(&self) -> &Schema;

    /// Returns true while the store accepts operations.
    fn is_open(&self) -> bool;

    /// Closes the store. Subsequent operations fail with a connectivity
    /// error.
    fn close(&self);

    /// Returns true if a row with the given id exists.
    fn exists(&self, table: &str, id: &str) -> StoreResult<bool>;

    /// Fetches a row by primary key.
    ///
    /// # Errors
    ///
    /// Returns a consistency-anomaly error if more than one row shares
    /// the id.
    fn find_by_id(&self, table: &str, id: &str) -> StoreResult<Option<Row>>;

    /// Fetches every row of a table.
    fn find_all(&self, table: &str) -> StoreResult<Vec<Row>>;

    /// Fetches the rows matching a predicate.
    fn find(&self, table: &str, predicate: &dyn Fn(&Row) -> bool) -> StoreResult<Vec<Row>>;

    /// Inserts a row, assigning a fresh primary key when absent.
    ///
    /// Returns the row's id. Inserting an id that already exists is a
    /// logged warning; the existing row is left untouched.
    fn add(&self, table: &str, row: Row) -> StoreResult<String>;

    /// Replaces the stored row with the same primary key.
    ///
    /// Returns the row's id. Updating a missing row is a logged warning.
    ///
    /// # Errors
    ///
    /// Fails when the row carries no primary key.
    fn update(&self, table: &str, row: Row) -> StoreResult<String>;

    /// Removes the row with the same primary key, returning the number
    /// of rows affected. Removing a missing row is a logged warning.
    ///
    /// # Errors
    ///
    /// Fails when the row carries no primary key.
    fn remove(&self, table: &str, row: &Row) -> StoreResult<u64>;

    /// Upserts a row: add when the primary key is absent or unknown,
    /// update otherwise.
    ///
    /// Existence is re-verified immediately before choosing the path, so
    /// a row deleted between two saves is re-added rather than silently
    /// skipped. Implementations with interior locking may override this
    /// with an atomic variant.
    fn save(&self, table: &str, row: Row) -> StoreResult<String> {
        let pk = self.schema().primary_key(table).to_string();
        match row.id(&pk) {
            None => self.add(table, row),
            Some(id) => {
                if self.exists(table, &id)? {
                    self.update(table, row)
                } else {
                    self.add(table, row)
                }
            }
        }
    }

    /// Deletes every row of a table.
    fn clear_table(&self, table: &str) -> StoreResult<()>;

    /// Returns the number of rows in a table.
    fn count(&self, table: &str) -> StoreResult<usize>;
}
