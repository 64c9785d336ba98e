use bibsync_types::RecordKey;

use crate::error::StoreResult;
use crate::filter::RecordFilter;
use crate::record::Record;

/// Durable keyed record storage.
///
/// All implementations must satisfy these invariants:
/// - Reads outside a transaction observe only committed state.
/// - Writes happen inside a [`RecordTxn`]; nothing is visible to other
///   readers until `commit` returns `Ok`.
/// - A transaction dropped without `commit` is rolled back.
/// - Every write is a single-key upsert or delete.
pub trait RecordStore: Send + Sync {
    /// Read a record by key.
    ///
    /// Returns `Ok(None)` if the record does not exist.
    fn read(&self, key: &RecordKey) -> StoreResult<Option<Record>>;

    /// Read multiple records, one slot per requested key.
    ///
    /// Default implementation calls `read()` for each key.
    fn read_batch(&self, keys: &[RecordKey]) -> StoreResult<Vec<Option<Record>>> {
        keys.iter().map(|key| self.read(key)).collect()
    }

    /// Records matching `filter`, ordered by `id`.
    fn scan(&self, filter: &RecordFilter) -> StoreResult<Vec<Record>>;

    /// Number of stored records.
    fn count(&self) -> StoreResult<usize>;

    /// Open a write transaction.
    fn begin(&self) -> StoreResult<Box<dyn RecordTxn + '_>>;
}

/// A scoped write transaction.
///
/// Reads through the transaction see its own staged writes.
pub trait RecordTxn {
    fn get(&self, key: &RecordKey) -> StoreResult<Option<Record>>;

    /// Insert or replace the record stored under `record.key`.
    fn upsert(&mut self, record: Record) -> StoreResult<()>;

    /// Remove a record. Returns `true` if it existed.
    fn remove(&mut self, key: &RecordKey) -> StoreResult<bool>;

    /// Reserve the next row id for a record created in this transaction.
    fn allocate_id(&mut self) -> u64;

    /// Publish every staged write.
    fn commit(self: Box<Self>) -> StoreResult<()>;
}
