use serde::{Deserialize, Serialize};

/// Tuning for the sync orchestrator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Sub-batches dispatched concurrently per endpoint. `0` counts as `1`.
    pub parallelism: usize,
    /// Prefix of the status written for terminally failed records.
    pub failure_status_prefix: String,
    /// Records per top-level submission; larger inputs are chunked first.
    pub max_batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            parallelism: 1,
            failure_status_prefix: "solr-failed".into(),
            max_batch_size: 100,
        }
    }
}

impl SyncConfig {
    pub(crate) fn effective_parallelism(&self) -> usize {
        self.parallelism.max(1)
    }

    pub(crate) fn effective_batch_size(&self) -> usize {
        self.max_batch_size.max(1)
    }
}
