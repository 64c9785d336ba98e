use std::fmt;

use serde::{Deserialize, Serialize};

use crate::target::Target;

/// Derived synchronization state of a record.
///
/// Stored records only carry timestamps and a free-text status; this enum is
/// the typed view over them. `FullyProcessed` is reached either when every
/// target has confirmed delivery or when completion was asserted out of
/// band. `Failed` is terminal: the record is excluded from retry scans until
/// its status is cleared.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum Completion {
    Pending,
    SolrDone,
    MetricsDone,
    FullyProcessed,
    Failed(String),
}

impl Completion {
    /// Derive the completion state from a record's stored markers.
    ///
    /// A status is only terminal together with a `processed` stamp; that is
    /// the shape the terminal-failure path writes.
    pub fn derive(
        solr_done: bool,
        metrics_done: bool,
        processed: bool,
        status: Option<&str>,
    ) -> Self {
        match (status, processed) {
            (Some(reason), true) => return Self::Failed(reason.to_string()),
            (None, true) => return Self::FullyProcessed,
            _ => {}
        }
        match (solr_done, metrics_done) {
            (true, true) => Self::FullyProcessed,
            (true, false) => Self::SolrDone,
            (false, true) => Self::MetricsDone,
            (false, false) => Self::Pending,
        }
    }

    /// Whether `target` has confirmed delivery in this state.
    pub fn has_target(&self, target: Target) -> bool {
        match (self, target) {
            (Self::FullyProcessed, _) => true,
            (Self::SolrDone, Target::Solr) => true,
            (Self::MetricsDone, Target::Metrics) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FullyProcessed | Self::Failed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Records in a non-terminal state are picked up by retry scans.
    pub fn is_retry_eligible(&self) -> bool {
        !self.is_terminal()
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::SolrDone => f.write_str("solr-done"),
            Self::MetricsDone => f.write_str("metrics-done"),
            Self::FullyProcessed => f.write_str("fully-processed"),
            Self::Failed(reason) => write!(f, "failed({reason})"),
        }
    }
}
