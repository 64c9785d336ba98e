use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use bibsync_identity::{ChangeLogEntry, FileIdentityLog, IdentityLog, InMemoryIdentityLog};
use bibsync_status::StatusTracker;
use bibsync_store::{InMemoryRecordStore, Projection, Record, RecordStore, RecordView};
use bibsync_sync::{
    IndexOptions, MetricsRow, MetricsSink, MetricsSyncReport, MetricsSynchronizer, ReindexReport,
    Reindexer, SearchTransport,
};
use bibsync_types::{MonotonicClock, RecordKey, Target, Timestamp};

use crate::config::PipelineConfig;
use crate::error::{SdkError, SdkResult};
use crate::query::QueryFacade;

/// The assembled system: store, identity log, tracker, orchestrator and
/// query path, wired to one shared clock.
pub struct Pipeline {
    config: PipelineConfig,
    tracker: Arc<StatusTracker>,
    log: Arc<dyn IdentityLog>,
    reindexer: Reindexer,
    metrics: MetricsSynchronizer,
    query: QueryFacade,
}

impl Pipeline {
    /// Build over an in-memory record store. The change log is durable when
    /// `config.change_log_path` is set.
    pub fn open(
        config: PipelineConfig,
        transport: Arc<dyn SearchTransport>,
        sink: Arc<dyn MetricsSink>,
    ) -> SdkResult<Self> {
        config.validate()?;
        let log: Arc<dyn IdentityLog>;
        let clock: Arc<MonotonicClock>;
        match &config.change_log_path {
            Some(path) => {
                // The replayed log decides where the shared clock starts.
                let file_log = FileIdentityLog::open(path, config.change_log())?;
                clock = file_log.clock().clone();
                log = Arc::new(file_log);
            }
            None => {
                clock = Arc::new(MonotonicClock::new());
                log = Arc::new(InMemoryIdentityLog::with_clock(clock.clone()));
            }
        }
        Self::with_parts(config, Arc::new(InMemoryRecordStore::new()), log, clock, transport, sink)
    }

    /// Build over caller-supplied backends.
    pub fn with_parts(
        config: PipelineConfig,
        store: Arc<dyn RecordStore>,
        log: Arc<dyn IdentityLog>,
        clock: Arc<MonotonicClock>,
        transport: Arc<dyn SearchTransport>,
        sink: Arc<dyn MetricsSink>,
    ) -> SdkResult<Self> {
        config.validate()?;
        let tracker = Arc::new(StatusTracker::with_clock(store, log.clone(), clock));
        let reindexer = Reindexer::new(transport, tracker.clone(), config.sync.clone());
        let metrics = MetricsSynchronizer::new(sink);
        let query = QueryFacade::new(tracker.clone(), log.clone(), config.resolve());
        info!(
            endpoints = config.search_endpoints.len(),
            durable_log = config.change_log_path.is_some(),
            "pipeline ready"
        );
        Ok(Self {
            config,
            tracker,
            log,
            reindexer,
            metrics,
            query,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn tracker(&self) -> &Arc<StatusTracker> {
        &self.tracker
    }

    pub fn identity_log(&self) -> &Arc<dyn IdentityLog> {
        &self.log
    }

    pub fn query(&self) -> &QueryFacade {
        &self.query
    }

    // ---- Ingestion and marking ----

    /// Store a fragment by its stored name (`"bib_data"`, `"fulltext"`, ...).
    pub fn update_storage(&self, key: &RecordKey, kind: &str, payload: Value) -> SdkResult<Record> {
        Ok(self.tracker.put_fragment_named(key, kind, payload)?)
    }

    pub fn mark_target_processed(&self, keys: &[RecordKey], target: Option<Target>) -> SdkResult<usize> {
        Ok(self.tracker.mark_target_processed(keys, target)?)
    }

    pub fn mark_processed(
        &self,
        keys: &[RecordKey],
        target: Option<Target>,
        status: Option<&str>,
    ) -> SdkResult<usize> {
        Ok(self.tracker.mark_processed(keys, target, status)?)
    }

    pub fn clear_status(&self, keys: &[RecordKey]) -> SdkResult<usize> {
        Ok(self.tracker.clear_status(keys)?)
    }

    // ---- Reads ----

    /// Direct read by key; identity mappings are not consulted. Use
    /// [`query`](Self::query) for redirect-aware lookups.
    pub fn get_record(&self, key: &RecordKey, projection: &Projection) -> SdkResult<Option<RecordView>> {
        Ok(self.tracker.get_record(key, projection)?)
    }

    pub fn get_records(&self, keys: &[RecordKey], projection: &Projection) -> SdkResult<Vec<RecordView>> {
        Ok(self.tracker.get_records(keys, projection)?)
    }

    /// Keys updated after `since` that are not yet processed.
    pub fn pending_since(&self, since: Timestamp) -> SdkResult<Vec<RecordKey>> {
        Ok(self.tracker.pending_since(since)?)
    }

    // ---- Identity ----

    pub fn rename(&self, old: &RecordKey, new: &RecordKey) -> SdkResult<ChangeLogEntry> {
        let entry = self.log.rename(old, new)?;
        info!(old = %old, new = %new, "record key renamed");
        Ok(entry)
    }

    pub fn delete_by_key(&self, key: &RecordKey) -> SdkResult<Option<ChangeLogEntry>> {
        Ok(self.tracker.delete_by_key(key)?)
    }

    pub fn change_log(&self, key: &RecordKey) -> SdkResult<Vec<ChangeLogEntry>> {
        Ok(self.log.entries_for(key)?)
    }

    // ---- Synchronization ----

    /// Reindex to the configured endpoints with the configured flags.
    pub async fn reindex(&self, records: &[RecordView]) -> SdkResult<ReindexReport> {
        if self.config.search_endpoints.is_empty() {
            return Err(SdkError::NoEndpoints);
        }
        self.reindex_to(records, &self.config.search_endpoints, self.config.index_options())
            .await
    }

    pub async fn reindex_to(
        &self,
        records: &[RecordView],
        endpoints: &[String],
        options: IndexOptions,
    ) -> SdkResult<ReindexReport> {
        Ok(self.reindexer.reindex(records, endpoints, options).await?)
    }

    /// Load the stored views for `keys` and reindex them.
    pub async fn reindex_keys(&self, keys: &[RecordKey]) -> SdkResult<ReindexReport> {
        let views = self.tracker.get_records(keys, &Projection::All)?;
        self.reindex(&views).await
    }

    /// Push metrics rows and stamp the metrics target for every row that
    /// landed.
    pub async fn update_metrics_db(
        &self,
        batch_insert: &[MetricsRow],
        batch_update: &[MetricsRow],
    ) -> SdkResult<MetricsSyncReport> {
        let report = self.metrics.sync(batch_insert, batch_update).await?;
        self.tracker
            .mark_target_processed(&report.succeeded, Some(Target::Metrics))?;
        Ok(report)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
