//! Change log and identity mapping types.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bibsync_types::{RecordKey, Timestamp};

/// What happened to the subject key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeEvent {
    /// The key was retired in favour of the key in `detail`.
    Renamed,
    /// The record was removed; `detail` holds its last view as JSON.
    Deleted,
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Renamed => f.write_str("renamed"),
            Self::Deleted => f.write_str("deleted"),
        }
    }
}

/// One immutable change log row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    /// Time-ordered unique id (UUID v7).
    pub id: Uuid,
    pub subject: RecordKey,
    pub event: ChangeEvent,
    pub timestamp: Timestamp,
    pub detail: Option<String>,
}

impl ChangeLogEntry {
    pub fn renamed(subject: RecordKey, successor: &RecordKey, timestamp: Timestamp) -> Self {
        Self {
            id: Uuid::now_v7(),
            subject,
            event: ChangeEvent::Renamed,
            timestamp,
            detail: Some(successor.to_string()),
        }
    }

    pub fn deleted(subject: RecordKey, last_view: Option<String>, timestamp: Timestamp) -> Self {
        Self {
            id: Uuid::now_v7(),
            subject,
            event: ChangeEvent::Deleted,
            timestamp,
            detail: last_view,
        }
    }

    /// For a rename entry, the successor key.
    pub fn successor(&self) -> Option<RecordKey> {
        match self.event {
            ChangeEvent::Renamed => self.detail.as_deref().map(RecordKey::from),
            ChangeEvent::Deleted => None,
        }
    }
}

/// Active redirect from a retired key to its successor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityMapping {
    pub retired: RecordKey,
    pub successor: RecordKey,
    pub since: Timestamp,
}

impl IdentityMapping {
    /// The mapping a rename entry establishes, if it is one.
    pub fn from_entry(entry: &ChangeLogEntry) -> Option<Self> {
        entry.successor().map(|successor| Self {
            retired: entry.subject.clone(),
            successor,
            since: entry.timestamp,
        })
    }
}
