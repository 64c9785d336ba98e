//! High-level API for bibsync.
//!
//! [`Pipeline`] wires the record store, identity log, status tracker and
//! sync orchestrator together behind one shared clock, configured from a
//! [`PipelineConfig`]. [`QueryFacade`] is the read path that follows
//! identity mappings before reading a record.
//!
//! ```no_run
//! # async fn run() -> bibsync_sdk::SdkResult<()> {
//! use std::sync::Arc;
//! use bibsync_sdk::{Pipeline, PipelineConfig, RecordKey};
//! use bibsync_sync::{InMemoryMetricsSink, ScriptedSearchTransport};
//!
//! let config = PipelineConfig::from_toml_str(r#"search_endpoints = ["http://solr1"]"#)?;
//! let pipeline = Pipeline::open(
//!     config,
//!     Arc::new(ScriptedSearchTransport::new()),
//!     Arc::new(InMemoryMetricsSink::new()),
//! )?;
//! let key = RecordKey::from("2019ApJ...001A");
//! pipeline.update_storage(&key, "bib_data", serde_json::json!({"title": "x"}))?;
//! let report = pipeline.reindex_keys(&[key]).await?;
//! assert!(report.failed.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod query;

pub use config::{PipelineConfig, ResolveMode};
pub use error::{SdkError, SdkResult};
pub use pipeline::Pipeline;
pub use query::QueryFacade;

// Re-export the types callers need most often.
pub use bibsync_identity::{ChangeEvent, ChangeLogEntry, Resolution, ResolvePolicy};
pub use bibsync_store::{Projection, RecordFilter, RecordView};
pub use bibsync_sync::{IndexOptions, MetricsRow, MetricsSyncReport, ReindexReport};
pub use bibsync_types::{Completion, FragmentKind, RecordKey, Target};
