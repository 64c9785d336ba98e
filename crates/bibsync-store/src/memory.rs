use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bibsync_types::RecordKey;

use crate::error::StoreResult;
use crate::filter::RecordFilter;
use crate::record::Record;
use crate::traits::{RecordStore, RecordTxn};

#[derive(Debug, Default)]
struct MemoryState {
    records: HashMap<RecordKey, Record>,
    last_id: u64,
}

/// In-memory, HashMap-based record store.
///
/// Intended for tests and embedding. A write transaction holds the store's
/// write lock for its whole lifetime, so transactions are serialized and
/// readers never observe a half-applied one. Staged writes only touch the
/// shared map inside `commit`, so a guard poisoned by a panicking writer
/// still protects consistent data and is recovered rather than reported.
pub struct InMemoryRecordStore {
    state: RwLock<MemoryState>,
}

impl InMemoryRecordStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
        }
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.read_state().records.len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.read_state().records.is_empty()
    }

    /// Remove all records. Row ids keep increasing.
    pub fn clear(&self) {
        self.write_state().records.clear();
    }

    /// Sorted list of all stored keys.
    pub fn all_keys(&self) -> Vec<RecordKey> {
        let state = self.read_state();
        let mut keys: Vec<RecordKey> = state.records.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn read_state(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn read(&self, key: &RecordKey) -> StoreResult<Option<Record>> {
        Ok(self.read_state().records.get(key).cloned())
    }

    fn scan(&self, filter: &RecordFilter) -> StoreResult<Vec<Record>> {
        let state = self.read_state();
        let mut matched: Vec<Record> = state
            .records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        matched.sort_by_key(|r| r.id);
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    fn count(&self) -> StoreResult<usize> {
        Ok(self.len())
    }

    fn begin(&self) -> StoreResult<Box<dyn RecordTxn + '_>> {
        let guard = self.write_state();
        let last_id = guard.last_id;
        Ok(Box::new(MemoryTxn {
            guard,
            staged: HashMap::new(),
            last_id,
        }))
    }
}

impl std::fmt::Debug for InMemoryRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len();
        f.debug_struct("InMemoryRecordStore")
            .field("record_count", &count)
            .finish()
    }
}

/// Write transaction over [`InMemoryRecordStore`].
///
/// `staged` maps a key to its pending value: `Some` for an upsert, `None`
/// for a delete.
struct MemoryTxn<'a> {
    guard: RwLockWriteGuard<'a, MemoryState>,
    staged: HashMap<RecordKey, Option<Record>>,
    last_id: u64,
}

impl RecordTxn for MemoryTxn<'_> {
    fn get(&self, key: &RecordKey) -> StoreResult<Option<Record>> {
        match self.staged.get(key) {
            Some(pending) => Ok(pending.clone()),
            None => Ok(self.guard.records.get(key).cloned()),
        }
    }

    fn upsert(&mut self, record: Record) -> StoreResult<()> {
        self.staged.insert(record.key.clone(), Some(record));
        Ok(())
    }

    fn remove(&mut self, key: &RecordKey) -> StoreResult<bool> {
        let existed = self.get(key)?.is_some();
        if existed {
            self.staged.insert(key.clone(), None);
        }
        Ok(existed)
    }

    fn allocate_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTxn {
            mut guard,
            staged,
            last_id,
        } = *self;
        for (key, pending) in staged {
            match pending {
                Some(record) => {
                    guard.records.insert(key, record);
                }
                None => {
                    guard.records.remove(&key);
                }
            }
        }
        guard.last_id = guard.last_id.max(last_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::with_transaction;
    use crate::StoreError;
    use bibsync_types::{FragmentKind, MonotonicClock, Target};
    use serde_json::json;

    fn put(store: &InMemoryRecordStore, clock: &MonotonicClock, key: &str) -> Record {
        with_transaction(store, |txn| -> Result<Record, StoreError> {
            let id = txn.allocate_id();
            let mut r = Record::new(id, RecordKey::from(key), clock.now());
            r.set_fragment(FragmentKind::CoreMetadata, json!({"bibcode": key}), clock.now());
            txn.upsert(r.clone())?;
            Ok(r)
        })
        .unwrap()
    }

    // -----------------------------------------------------------------------
    // Core CRUD
    // -----------------------------------------------------------------------

    #[test]
    fn write_and_read_record() {
        let store = InMemoryRecordStore::new();
        let clock = MonotonicClock::new();
        let written = put(&store, &clock, "abc");

        let read_back = store.read(&RecordKey::from("abc")).unwrap().expect("should exist");
        assert_eq!(read_back, written);
        assert_eq!(read_back.id, 1);
    }

    #[test]
    fn read_missing_record_returns_none() {
        let store = InMemoryRecordStore::new();
        assert!(store.read(&RecordKey::from("missing")).unwrap().is_none());
    }

    #[test]
    fn ids_increase_in_creation_order() {
        let store = InMemoryRecordStore::new();
        let clock = MonotonicClock::new();
        let a = put(&store, &clock, "a");
        let b = put(&store, &clock, "b");
        assert!(a.id < b.id);
    }

    #[test]
    fn remove_present_and_missing() {
        let store = InMemoryRecordStore::new();
        let clock = MonotonicClock::new();
        put(&store, &clock, "gone");

        let removed = with_transaction(&store, |txn| -> Result<(bool, bool), StoreError> {
            let first = txn.remove(&RecordKey::from("gone"))?;
            let second = txn.remove(&RecordKey::from("gone"))?;
            Ok((first, second))
        })
        .unwrap();
        assert_eq!(removed, (true, false));
        assert!(store.is_empty());
    }

    #[test]
    fn ids_survive_clear() {
        let store = InMemoryRecordStore::new();
        let clock = MonotonicClock::new();
        put(&store, &clock, "a");
        store.clear();
        let b = put(&store, &clock, "b");
        assert_eq!(b.id, 2);
    }

    // -----------------------------------------------------------------------
    // Transaction visibility
    // -----------------------------------------------------------------------

    #[test]
    fn txn_sees_its_own_writes() {
        let store = InMemoryRecordStore::new();
        let clock = MonotonicClock::new();
        with_transaction(&store, |txn| -> Result<(), StoreError> {
            let id = txn.allocate_id();
            txn.upsert(Record::new(id, RecordKey::from("k"), clock.now()))?;
            assert!(txn.get(&RecordKey::from("k"))?.is_some());
            txn.remove(&RecordKey::from("k"))?;
            assert!(txn.get(&RecordKey::from("k"))?.is_none());
            Ok(())
        })
        .unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn dropped_txn_discards_writes() {
        let store = InMemoryRecordStore::new();
        let clock = MonotonicClock::new();
        {
            let mut txn = store.begin().unwrap();
            let id = txn.allocate_id();
            txn.upsert(Record::new(id, RecordKey::from("k"), clock.now())).unwrap();
        }
        assert!(store.is_empty());
    }

    // -----------------------------------------------------------------------
    // Batch reads and scans
    // -----------------------------------------------------------------------

    #[test]
    fn read_batch_with_missing() {
        let store = InMemoryRecordStore::new();
        let clock = MonotonicClock::new();
        put(&store, &clock, "exists");
        let results = store
            .read_batch(&[RecordKey::from("exists"), RecordKey::from("missing")])
            .unwrap();
        assert!(results[0].is_some());
        assert!(results[1].is_none());
    }

    #[test]
    fn scan_orders_by_id_and_limits() {
        let store = InMemoryRecordStore::new();
        let clock = MonotonicClock::new();
        for key in ["c", "a", "b"] {
            put(&store, &clock, key);
        }
        let all = store.scan(&RecordFilter::new()).unwrap();
        let keys: Vec<&str> = all.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["c", "a", "b"]);

        let first_two = store.scan(&RecordFilter::new().limit(2)).unwrap();
        assert_eq!(first_two.len(), 2);
    }

    #[test]
    fn scan_pending_target() {
        let store = InMemoryRecordStore::new();
        let clock = MonotonicClock::new();
        put(&store, &clock, "a");
        let mut b = put(&store, &clock, "b");
        b.stamp_target(Target::Solr, clock.now());
        with_transaction(&store, |txn| -> Result<(), StoreError> { txn.upsert(b) }).unwrap();

        let pending = store.scan(&RecordFilter::new().pending(Target::Solr)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].key, "a");
    }

    #[test]
    fn all_keys_is_sorted() {
        let store = InMemoryRecordStore::new();
        let clock = MonotonicClock::new();
        for key in ["ccc", "aaa", "bbb"] {
            put(&store, &clock, key);
        }
        let keys = store.all_keys();
        for w in keys.windows(2) {
            assert!(w[0] <= w[1]);
        }
        assert_eq!(store.count().unwrap(), 3);
    }

    // -----------------------------------------------------------------------
    // Concurrency
    // -----------------------------------------------------------------------

    #[test]
    fn concurrent_writers_on_disjoint_keys() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InMemoryRecordStore::new());
        let clock = Arc::new(MonotonicClock::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let clock = Arc::clone(&clock);
                thread::spawn(move || {
                    put(&store, &clock, &format!("key-{i}"));
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }
        assert_eq!(store.len(), 8);
        let mut ids: Vec<u64> = store.scan(&RecordFilter::new()).unwrap().iter().map(|r| r.id).collect();
        ids.dedup();
        assert_eq!(ids.len(), 8);
    }

    #[test]
    fn debug_format() {
        let store = InMemoryRecordStore::new();
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryRecordStore"));
        assert!(debug.contains("record_count"));
    }
}
