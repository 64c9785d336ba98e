//! In-process collaborators for tests and embedding.
//!
//! [`ScriptedSearchTransport`] answers search updates from a script and
//! records every call; [`InMemoryMetricsSink`] keeps metrics rows in a map.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use bibsync_store::RecordView;
use bibsync_types::RecordKey;

use crate::error::{SyncError, SyncResult};
use crate::transport::{MetricsSink, SearchTransport};
use crate::types::{IndexOptions, MetricsOp, MetricsRow, RowStatus};

/// One recorded search transport call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchCall {
    pub endpoint: String,
    pub keys: Vec<RecordKey>,
    pub options: IndexOptions,
}

#[derive(Debug)]
struct KeyRule {
    key: RecordKey,
    endpoint: Option<String>,
    code: u16,
}

#[derive(Debug, Default)]
struct Script {
    canned: VecDeque<Vec<u16>>,
    always: Option<Vec<u16>>,
    rules: Vec<KeyRule>,
    unreachable: HashSet<String>,
    calls: Vec<SearchCall>,
}

/// A [`SearchTransport`] driven by a script.
///
/// Resolution order for each call: an unreachable endpoint errors; else the
/// next canned response is returned verbatim; else the fixed response set
/// by [`always_respond`](Self::always_respond); else each record gets the
/// code of the first matching key rule, or `200`.
#[derive(Debug, Default)]
pub struct ScriptedSearchTransport {
    script: Mutex<Script>,
}

impl ScriptedSearchTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a verbatim response for the next unanswered call.
    pub fn respond_with(&self, statuses: Vec<u16>) -> &Self {
        self.lock().canned.push_back(statuses);
        self
    }

    /// Answer every call not covered by a canned response with `statuses`.
    pub fn always_respond(&self, statuses: Vec<u16>) -> &Self {
        self.lock().always = Some(statuses);
        self
    }

    /// Return `code` for `key` on every endpoint.
    pub fn fail_key(&self, key: impl Into<RecordKey>, code: u16) -> &Self {
        self.lock().rules.push(KeyRule {
            key: key.into(),
            endpoint: None,
            code,
        });
        self
    }

    /// Return `code` for `key` on `endpoint` only.
    pub fn fail_key_on(&self, endpoint: &str, key: impl Into<RecordKey>, code: u16) -> &Self {
        self.lock().rules.push(KeyRule {
            key: key.into(),
            endpoint: Some(endpoint.to_string()),
            code,
        });
        self
    }

    pub fn set_unreachable(&self, endpoint: &str) -> &Self {
        self.lock().unreachable.insert(endpoint.to_string());
        self
    }

    pub fn calls(&self) -> Vec<SearchCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SearchTransport for ScriptedSearchTransport {
    async fn update(
        &self,
        batch: &[RecordView],
        endpoint: &str,
        options: IndexOptions,
    ) -> SyncResult<Vec<u16>> {
        let mut script = self.lock();
        script.calls.push(SearchCall {
            endpoint: endpoint.to_string(),
            keys: batch.iter().filter_map(RecordView::key).collect(),
            options,
        });

        if script.unreachable.contains(endpoint) {
            return Err(SyncError::unreachable(endpoint, "connection refused"));
        }
        if let Some(statuses) = script.canned.pop_front() {
            return Ok(statuses);
        }
        if let Some(statuses) = &script.always {
            return Ok(statuses.clone());
        }

        Ok(batch
            .iter()
            .map(|view| match view.key() {
                Some(key) => script
                    .rules
                    .iter()
                    .find(|r| {
                        r.key == key && r.endpoint.as_deref().map_or(true, |e| e == endpoint)
                    })
                    .map_or(200, |r| r.code),
                None => 400,
            })
            .collect())
    }
}

#[derive(Debug, Default)]
struct SinkState {
    rows: BTreeMap<RecordKey, Value>,
    rejected: HashSet<RecordKey>,
    bulk_down: bool,
    calls: Vec<(MetricsOp, Vec<RecordKey>)>,
}

/// A [`MetricsSink`] backed by an ordered map.
///
/// Inserting an existing key fails that row; updating a missing key
/// creates it. Keys passed to [`reject`](Self::reject) fail on every call.
/// With [`fail_bulk`](Self::fail_bulk) set, any call carrying more than one
/// row errors as a whole.
#[derive(Debug, Default)]
pub struct InMemoryMetricsSink {
    state: Mutex<SinkState>,
}

impl InMemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject(&self, key: impl Into<RecordKey>) -> &Self {
        self.lock().rejected.insert(key.into());
        self
    }

    pub fn fail_bulk(&self, down: bool) -> &Self {
        self.lock().bulk_down = down;
        self
    }

    pub fn row(&self, key: &RecordKey) -> Option<Value> {
        self.lock().rows.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().rows.is_empty()
    }

    pub fn calls(&self) -> Vec<(MetricsOp, Vec<RecordKey>)> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, op: MetricsOp, rows: &[MetricsRow]) -> SyncResult<Vec<RowStatus>> {
        let mut state = self.lock();
        state
            .calls
            .push((op, rows.iter().map(|r| r.key.clone()).collect()));
        if state.bulk_down && rows.len() > 1 {
            return Err(SyncError::Transport(format!("bulk {op} rejected")));
        }

        Ok(rows
            .iter()
            .map(|row| {
                if state.rejected.contains(&row.key) {
                    return RowStatus::Failed(format!("row {} rejected", row.key));
                }
                match op {
                    MetricsOp::Insert if state.rows.contains_key(&row.key) => {
                        RowStatus::Failed(format!("duplicate key {}", row.key))
                    }
                    _ => {
                        state.rows.insert(row.key.clone(), row.values.clone());
                        RowStatus::Ok
                    }
                }
            })
            .collect())
    }
}

#[async_trait]
impl MetricsSink for InMemoryMetricsSink {
    async fn insert(&self, rows: &[MetricsRow]) -> SyncResult<Vec<RowStatus>> {
        self.apply(MetricsOp::Insert, rows)
    }

    async fn update(&self, rows: &[MetricsRow]) -> SyncResult<Vec<RowStatus>> {
        self.apply(MetricsOp::Update, rows)
    }
}
