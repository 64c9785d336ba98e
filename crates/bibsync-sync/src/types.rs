use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use bibsync_store::RecordView;
use bibsync_types::{FragmentKind, RecordKey};

/// Flags forwarded to the search transport with every call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOptions {
    pub commit: bool,
    pub ignore_errors: bool,
}

/// A record that could not be delivered after bisection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedRecord {
    pub key: RecordKey,
    pub endpoint: String,
    pub reason: String,
}

/// Outcome of one `reindex` call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReindexReport {
    /// Keys delivered to every endpoint, in input order.
    pub succeeded: Vec<RecordKey>,
    /// Keys that failed on at least one endpoint, in input order.
    pub failed: Vec<RecordKey>,
    /// One entry per (key, endpoint) failure.
    pub failures: Vec<FailedRecord>,
    /// Transport calls issued, bisection retries included.
    pub calls: usize,
}

impl ReindexReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// One row of the metrics database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricsRow {
    pub key: RecordKey,
    pub values: Value,
}

impl MetricsRow {
    pub fn new(key: RecordKey, values: Value) -> Self {
        Self { key, values }
    }

    /// The row carried by a record view's metrics fragment, if any.
    pub fn from_view(view: &RecordView) -> Option<Self> {
        let key = view.key()?;
        let values = view.fragment(FragmentKind::Metrics)?.clone();
        Some(Self { key, values })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricsOp {
    Insert,
    Update,
}

impl fmt::Display for MetricsOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => f.write_str("insert"),
            Self::Update => f.write_str("update"),
        }
    }
}

/// Per-row answer from the metrics collaborator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RowStatus {
    Ok,
    Failed(String),
}

impl RowStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// A metrics row that failed, with enough detail to retry it alone.
#[derive(Clone, Debug, PartialEq)]
pub struct RowError {
    pub op: MetricsOp,
    pub row: MetricsRow,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricsSyncReport {
    /// Inserted keys then updated keys, each in input order.
    pub succeeded: Vec<RecordKey>,
    pub errors: Vec<RowError>,
    /// Bulk calls that failed and were retried row by row.
    pub fallbacks: usize,
}

/// True for HTTP-style 2xx codes.
pub fn is_success(code: u16) -> bool {
    (200..300).contains(&code)
}
