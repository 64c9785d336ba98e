use async_trait::async_trait;

use bibsync_store::RecordView;

use crate::error::SyncResult;
use crate::types::{IndexOptions, MetricsRow, RowStatus};

/// Client for one or more search endpoints.
#[async_trait]
pub trait SearchTransport: Send + Sync {
    /// Submit `batch` to `endpoint`. Returns one HTTP-style status per
    /// record, in submission order.
    async fn update(
        &self,
        batch: &[RecordView],
        endpoint: &str,
        options: IndexOptions,
    ) -> SyncResult<Vec<u16>>;
}

/// Client for the metrics database.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Insert rows that have no metrics entry yet.
    async fn insert(&self, rows: &[MetricsRow]) -> SyncResult<Vec<RowStatus>>;
    /// Overwrite rows that already exist.
    async fn update(&self, rows: &[MetricsRow]) -> SyncResult<Vec<RowStatus>>;
}
