//! Foundation types for bibsync.
//!
//! This crate provides the vocabulary shared by every other bibsync crate:
//! how a bibliographic record is named, which payload fragments it is
//! assembled from, which downstream targets it is synchronized to, and how
//! its overall completion is derived.
//!
//! # Key Types
//!
//! - [`RecordKey`]: Immutable record identifier (e.g. a bibcode)
//! - [`FragmentKind`]: The fixed set of payload categories a record carries
//! - [`Target`]: A downstream system a record must reach (search, metrics)
//! - [`Completion`]: Tagged completion state derived from per-target stamps
//! - [`MonotonicClock`]: Strictly increasing UTC timestamps for stamping

pub mod clock;
pub mod completion;
pub mod error;
pub mod fragment;
pub mod key;
pub mod target;

pub use clock::{MonotonicClock, Timestamp};
pub use completion::Completion;
pub use error::TypeError;
pub use fragment::FragmentKind;
pub use key::RecordKey;
pub use target::Target;
