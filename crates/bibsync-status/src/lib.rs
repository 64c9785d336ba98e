//! Record state tracking for bibsync.
//!
//! The [`StatusTracker`] is the only writer of record rows. It merges
//! fragment payloads as they arrive from independent sources, stamps
//! per-target and overall completion, records terminal failures, and
//! deletes records together with a change log entry.
//!
//! Completion tracking and payload ingestion are independent: writing a
//! fragment never clears a processed stamp. Re-marking completion is always
//! an explicit call.

pub mod error;
pub mod tracker;

pub use error::{StatusError, StatusResult};
pub use tracker::StatusTracker;
