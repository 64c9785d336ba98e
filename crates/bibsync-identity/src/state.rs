use std::collections::HashMap;

use bibsync_types::RecordKey;

use crate::types::{ChangeLogEntry, IdentityMapping};

/// Materialized log state shared by every backend.
///
/// `entries` is the log in insertion order; `by_subject` indexes it per
/// key; `mappings` holds the active redirect for each retired key.
#[derive(Debug, Default)]
pub(crate) struct LogState {
    pub(crate) entries: Vec<ChangeLogEntry>,
    by_subject: HashMap<RecordKey, Vec<usize>>,
    mappings: HashMap<RecordKey, IdentityMapping>,
}

impl LogState {
    /// Fold one entry into the state. Rename entries replace any existing
    /// mapping for the subject; other mappings are left untouched.
    pub(crate) fn apply(&mut self, entry: ChangeLogEntry) {
        if let Some(mapping) = IdentityMapping::from_entry(&entry) {
            self.mappings.insert(mapping.retired.clone(), mapping);
        }
        self.by_subject
            .entry(entry.subject.clone())
            .or_default()
            .push(self.entries.len());
        self.entries.push(entry);
    }

    pub(crate) fn mapping(&self, key: &RecordKey) -> Option<&IdentityMapping> {
        self.mappings.get(key)
    }

    pub(crate) fn entry_at(&self, key: &RecordKey, index: usize) -> Option<&ChangeLogEntry> {
        self.by_subject
            .get(key)
            .and_then(|positions| positions.get(index))
            .and_then(|&pos| self.entries.get(pos))
    }

    pub(crate) fn mapping_count(&self) -> usize {
        self.mappings.len()
    }
}
