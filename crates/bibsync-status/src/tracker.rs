use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use bibsync_identity::{ChangeLogEntry, IdentityLog};
use bibsync_store::{with_transaction, Projection, Record, RecordFilter, RecordStore, RecordView};
use bibsync_types::{Completion, FragmentKind, MonotonicClock, RecordKey, Target, Timestamp};

use crate::error::{StatusError, StatusResult};

/// Writes fragments and completion stamps for records.
///
/// Every mutating call runs inside one store transaction. Batch calls are
/// keyed-batch upserts: keys that do not exist are skipped, never created.
pub struct StatusTracker {
    store: Arc<dyn RecordStore>,
    log: Arc<dyn IdentityLog>,
    clock: Arc<MonotonicClock>,
}

impl StatusTracker {
    pub fn new(store: Arc<dyn RecordStore>, log: Arc<dyn IdentityLog>) -> Self {
        Self::with_clock(store, log, Arc::new(MonotonicClock::new()))
    }

    /// Share a clock with other writers so their stamps interleave strictly.
    pub fn with_clock(
        store: Arc<dyn RecordStore>,
        log: Arc<dyn IdentityLog>,
        clock: Arc<MonotonicClock>,
    ) -> Self {
        Self { store, log, clock }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn identity_log(&self) -> &Arc<dyn IdentityLog> {
        &self.log
    }

    pub fn clock(&self) -> &Arc<MonotonicClock> {
        &self.clock
    }

    // ---- Ingestion ----

    /// Upsert one fragment payload, creating the record if absent.
    ///
    /// The fragment stamp and the record's `updated` both move to the same
    /// fresh instant. Returns the stored record.
    pub fn put_fragment(
        &self,
        key: &RecordKey,
        kind: FragmentKind,
        payload: Value,
    ) -> StatusResult<Record> {
        let record = with_transaction(self.store.as_ref(), |txn| -> StatusResult<Record> {
            // Stamped under the transaction so stamp order is commit order.
            let now = self.clock.now();
            let mut record = match txn.get(key)? {
                Some(existing) => existing,
                None => {
                    let id = txn.allocate_id();
                    debug!(key = %key, id, "creating record");
                    Record::new(id, key.clone(), now)
                }
            };
            record.set_fragment(kind, payload, now);
            txn.upsert(record.clone())?;
            Ok(record)
        })?;
        debug!(key = %key, kind = %kind, "fragment stored");
        Ok(record)
    }

    /// Like [`put_fragment`](Self::put_fragment), with the kind given by its
    /// stored name (`"bib_data"`, `"metrics"`, ...). Unknown names fail with
    /// [`StatusError::InvalidFragmentKind`] before anything is written.
    pub fn put_fragment_named(
        &self,
        key: &RecordKey,
        kind: &str,
        payload: Value,
    ) -> StatusResult<Record> {
        let kind: FragmentKind = kind.parse()?;
        self.put_fragment(key, kind, payload)
    }

    // ---- Completion ----

    /// Stamp `target` as delivered for each key, or stamp the overall
    /// `processed` directly when `target` is `None`.
    ///
    /// Returns how many existing records were stamped.
    pub fn mark_target_processed(
        &self,
        keys: &[RecordKey],
        target: Option<Target>,
    ) -> StatusResult<usize> {
        self.mark_processed(keys, target, None)
    }

    /// [`mark_target_processed`](Self::mark_target_processed) plus an
    /// optional terminal status.
    ///
    /// With a status, the overall `processed` stamp is always set and the
    /// status recorded, whatever the per-target state. This is the path for
    /// records that will never complete and must leave the retry scan.
    pub fn mark_processed(
        &self,
        keys: &[RecordKey],
        target: Option<Target>,
        status: Option<&str>,
    ) -> StatusResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let stamped = with_transaction(self.store.as_ref(), |txn| -> StatusResult<usize> {
            let now = self.clock.now();
            let mut stamped = 0;
            for key in keys {
                let Some(mut record) = txn.get(key)? else {
                    continue;
                };
                apply_mark(&mut record, target, status, now);
                txn.upsert(record)?;
                stamped += 1;
            }
            Ok(stamped)
        })?;

        debug!(
            requested = keys.len(),
            stamped,
            target = target.as_ref().map(Target::as_str).unwrap_or("overall"),
            status = status.unwrap_or(""),
            "completion marked"
        );
        Ok(stamped)
    }

    /// Drop a terminal status so the record becomes retry-eligible again.
    ///
    /// Clears both `status` and `processed`; per-target stamps are kept.
    /// Records without a status are left alone.
    pub fn clear_status(&self, keys: &[RecordKey]) -> StatusResult<usize> {
        let cleared = with_transaction(self.store.as_ref(), |txn| -> StatusResult<usize> {
            let mut cleared = 0;
            for key in keys {
                let Some(mut record) = txn.get(key)? else {
                    continue;
                };
                if record.status.take().is_none() {
                    continue;
                }
                record.processed = None;
                txn.upsert(record)?;
                cleared += 1;
            }
            Ok(cleared)
        })?;
        info!(cleared, "terminal status cleared");
        Ok(cleared)
    }

    // ---- Reads ----

    pub fn get_record(
        &self,
        key: &RecordKey,
        projection: &Projection,
    ) -> StatusResult<Option<RecordView>> {
        Ok(self.store.read(key)?.map(|r| r.to_view(projection)))
    }

    /// Views for every key that exists, in request order. Missing keys are
    /// omitted.
    pub fn get_records(
        &self,
        keys: &[RecordKey],
        projection: &Projection,
    ) -> StatusResult<Vec<RecordView>> {
        Ok(self
            .store
            .read_batch(keys)?
            .into_iter()
            .flatten()
            .map(|r| r.to_view(projection))
            .collect())
    }

    pub fn completion(&self, key: &RecordKey) -> StatusResult<Option<Completion>> {
        Ok(self.store.read(key)?.map(|r| r.completion()))
    }

    /// Keys matching `filter`, in creation order.
    pub fn eligible(&self, filter: &RecordFilter) -> StatusResult<Vec<RecordKey>> {
        Ok(self
            .store
            .scan(filter)?
            .into_iter()
            .map(|r| r.key)
            .collect())
    }

    /// The usual retry scan: updated after `since` and not yet processed.
    pub fn pending_since(&self, since: Timestamp) -> StatusResult<Vec<RecordKey>> {
        self.eligible(&RecordFilter::unprocessed_since(since))
    }

    // ---- Deletion ----

    /// Remove the record and append a deletion entry carrying its last view.
    ///
    /// Returns `Ok(None)` without writing anything when the key does not
    /// exist. The log entry is appended inside the store transaction, so a
    /// failed append leaves the record in place.
    pub fn delete_by_key(&self, key: &RecordKey) -> StatusResult<Option<ChangeLogEntry>> {
        let entry = with_transaction(
            self.store.as_ref(),
            |txn| -> StatusResult<Option<ChangeLogEntry>> {
                let Some(record) = txn.get(key)? else {
                    return Ok(None);
                };
                let last_view = serde_json::to_string(&record.to_view(&Projection::All))
                    .map_err(|e| StatusError::Serialization(e.to_string()))?;
                txn.remove(key)?;
                let entry = self.log.record_deletion(key, Some(last_view))?;
                Ok(Some(entry))
            },
        )?;
        match &entry {
            Some(_) => info!(key = %key, "record deleted"),
            None => debug!(key = %key, "delete of unknown key ignored"),
        }
        Ok(entry)
    }
}

impl std::fmt::Debug for StatusTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusTracker")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

fn apply_mark(record: &mut Record, target: Option<Target>, status: Option<&str>, now: Timestamp) {
    match target {
        Some(target) => {
            record.stamp_target(target, now);
        }
        None => record.processed = Some(now),
    }
    if let Some(status) = status {
        record.processed = Some(now);
        record.status = Some(status.to_string());
    }
}
