//! In-memory identity log for testing and ephemeral use.
//!
//! [`InMemoryIdentityLog`] keeps the change log and mappings behind a
//! `RwLock`. Data is lost when the log is dropped.

use std::sync::{Arc, RwLock};

use tracing::debug;

use bibsync_types::{MonotonicClock, RecordKey};

use crate::error::{IdentityError, Result};
use crate::state::LogState;
use crate::traits::IdentityLog;
use crate::types::{ChangeLogEntry, IdentityMapping};

/// An in-memory implementation of [`IdentityLog`].
#[derive(Debug)]
pub struct InMemoryIdentityLog {
    state: RwLock<LogState>,
    clock: Arc<MonotonicClock>,
}

impl InMemoryIdentityLog {
    /// Create a new empty log with its own clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock::new()))
    }

    /// Create a log that stamps entries from a shared clock.
    pub fn with_clock(clock: Arc<MonotonicClock>) -> Self {
        Self {
            state: RwLock::new(LogState::default()),
            clock,
        }
    }

    /// Every entry in global insertion order.
    pub fn all_entries(&self) -> Result<Vec<ChangeLogEntry>> {
        let state = self.state.read().map_err(|_| IdentityError::LockPoisoned)?;
        Ok(state.entries.clone())
    }

    /// Number of active mappings.
    pub fn mapping_count(&self) -> Result<usize> {
        let state = self.state.read().map_err(|_| IdentityError::LockPoisoned)?;
        Ok(state.mapping_count())
    }

    fn append(&self, entry: ChangeLogEntry) -> Result<ChangeLogEntry> {
        let mut state = self.state.write().map_err(|_| IdentityError::LockPoisoned)?;
        state.apply(entry.clone());
        Ok(entry)
    }
}

impl Default for InMemoryIdentityLog {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityLog for InMemoryIdentityLog {
    fn rename(&self, old: &RecordKey, new: &RecordKey) -> Result<ChangeLogEntry> {
        if old == new {
            return Err(IdentityError::SelfRename(old.clone()));
        }
        let entry = self.append(ChangeLogEntry::renamed(old.clone(), new, self.clock.now()))?;
        debug!(old = %old, new = %new, "identity mapping written");
        Ok(entry)
    }

    fn record_deletion(&self, key: &RecordKey, last_view: Option<String>) -> Result<ChangeLogEntry> {
        self.append(ChangeLogEntry::deleted(key.clone(), last_view, self.clock.now()))
    }

    fn mapping(&self, key: &RecordKey) -> Result<Option<IdentityMapping>> {
        let state = self.state.read().map_err(|_| IdentityError::LockPoisoned)?;
        Ok(state.mapping(key).cloned())
    }

    fn entry_at(&self, key: &RecordKey, index: usize) -> Result<Option<ChangeLogEntry>> {
        let state = self.state.read().map_err(|_| IdentityError::LockPoisoned)?;
        Ok(state.entry_at(key, index).cloned())
    }

    fn len(&self) -> Result<usize> {
        let state = self.state.read().map_err(|_| IdentityError::LockPoisoned)?;
        Ok(state.entries.len())
    }
}
