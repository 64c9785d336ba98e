use bibsync_types::{Target, Timestamp};

use crate::record::Record;

/// Predicate for multi-key eligibility scans.
///
/// The common scan is "records updated since X that are not yet
/// processed"; `pending_target` narrows it to records still missing one
/// target's stamp.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// Only records whose `updated` is strictly after this instant.
    pub updated_since: Option<Timestamp>,
    /// Only records with no overall `processed` stamp.
    pub unprocessed_only: bool,
    /// Only records missing this target's processed stamp.
    pub pending_target: Option<Target>,
    /// Cap on returned rows (applied after ordering by `id`).
    pub limit: Option<usize>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The retry scan: updated since `since` and not processed.
    pub fn unprocessed_since(since: Timestamp) -> Self {
        Self {
            updated_since: Some(since),
            unprocessed_only: true,
            ..Self::default()
        }
    }

    pub fn pending(mut self, target: Target) -> Self {
        self.pending_target = Some(target);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        if let Some(since) = self.updated_since {
            match record.updated {
                Some(updated) if updated > since => {}
                _ => return false,
            }
        }
        if self.unprocessed_only && record.processed.is_some() {
            return false;
        }
        if let Some(target) = self.pending_target {
            if record.target_processed(target).is_some() {
                return false;
            }
        }
        true
    }
}
