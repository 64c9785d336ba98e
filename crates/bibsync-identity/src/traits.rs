//! The [`IdentityLog`] trait defining the identity storage interface.

use bibsync_types::RecordKey;

use crate::error::Result;
use crate::types::{ChangeLogEntry, IdentityMapping};

/// Storage backend for identity mappings and the change log.
///
/// Implementations must be thread-safe (`Send + Sync`). Appends rely only on
/// single-entry atomicity: an entry is either fully in the log or absent.
pub trait IdentityLog: Send + Sync {
    /// Retire `old` in favour of `new`.
    ///
    /// Inserts or overwrites the mapping `old -> new` and appends a rename
    /// entry with subject `old` and detail `new`. Mappings that point *at*
    /// `old` are not re-pointed.
    fn rename(&self, old: &RecordKey, new: &RecordKey) -> Result<ChangeLogEntry>;

    /// Append a deletion entry for `key`, optionally carrying the record's
    /// last view as JSON.
    fn record_deletion(&self, key: &RecordKey, last_view: Option<String>) -> Result<ChangeLogEntry>;

    /// The active mapping for a retired key.
    fn mapping(&self, key: &RecordKey) -> Result<Option<IdentityMapping>>;

    /// The `index`-th change log entry for `key`, in insertion order.
    fn entry_at(&self, key: &RecordKey, index: usize) -> Result<Option<ChangeLogEntry>>;

    /// Total number of entries across all keys.
    fn len(&self) -> Result<usize>;

    /// Returns `true` if no entry has been appended.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Single-hop resolution: the successor if `key` is retired, else `key`.
    fn resolve(&self, key: &RecordKey) -> Result<RecordKey> {
        Ok(self
            .mapping(key)?
            .map(|m| m.successor)
            .unwrap_or_else(|| key.clone()))
    }

    /// All change log entries for `key`, collected eagerly.
    fn entries_for(&self, key: &RecordKey) -> Result<Vec<ChangeLogEntry>> {
        ChangeLogIter::new(self, key.clone()).collect()
    }
}

/// Lazy, finite, restartable walk over one key's change log.
///
/// Each step fetches a single entry from the backing log, so entries
/// appended while iterating are picked up. [`ChangeLogIter::restart`]
/// starts over from the first entry; a clone walks on independently.
pub struct ChangeLogIter<'a, L: IdentityLog + ?Sized> {
    log: &'a L,
    key: RecordKey,
    next: usize,
    done: bool,
}

impl<'a, L: IdentityLog + ?Sized> ChangeLogIter<'a, L> {
    pub fn new(log: &'a L, key: RecordKey) -> Self {
        Self {
            log,
            key,
            next: 0,
            done: false,
        }
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    pub fn restart(&mut self) {
        self.next = 0;
        self.done = false;
    }
}

impl<L: IdentityLog + ?Sized> Clone for ChangeLogIter<'_, L> {
    fn clone(&self) -> Self {
        Self {
            log: self.log,
            key: self.key.clone(),
            next: self.next,
            done: self.done,
        }
    }
}

impl<L: IdentityLog + ?Sized> Iterator for ChangeLogIter<'_, L> {
    type Item = Result<ChangeLogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.log.entry_at(&self.key, self.next) {
            Ok(Some(entry)) => {
                self.next += 1;
                Some(Ok(entry))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
