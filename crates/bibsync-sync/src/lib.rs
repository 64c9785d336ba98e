//! Multi-target synchronization for bibsync.
//!
//! Pushes record views to search endpoints and metrics rows to the metrics
//! database, and folds the outcome back into the [`StatusTracker`].
//!
//! - [`Reindexer`] sends a batch once per endpoint and isolates failing
//!   records by bisection.
//! - [`MetricsSynchronizer`] issues bulk insert and update calls, falling
//!   back to per-row calls when a bulk call fails.
//!
//! Failures of individual records never abort a batch. They come back in
//! the report and either stay retry-eligible or, when the caller asks for
//! it, get a terminal status.
//!
//! [`StatusTracker`]: bibsync_status::StatusTracker

pub mod config;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod reindex;
pub mod transport;
pub mod types;

pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use memory::{InMemoryMetricsSink, ScriptedSearchTransport, SearchCall};
pub use metrics::MetricsSynchronizer;
pub use reindex::Reindexer;
pub use transport::{MetricsSink, SearchTransport};
pub use types::{
    is_success, FailedRecord, IndexOptions, MetricsOp, MetricsRow, MetricsSyncReport,
    ReindexReport, RowError, RowStatus,
};
