//! Identity log for bibsync.
//!
//! Record keys are immutable, so a renamed or merged record gets a new key
//! and the old one is retired. This crate keeps the two structures that make
//! that safe:
//!
//! - **Identity mappings** redirect a retired key to its successor. There is
//!   at most one active mapping per retired key; a second rename of the same
//!   key overwrites it. Mappings are not transitive.
//! - **The change log** is an append-only sequence of immutable
//!   [`ChangeLogEntry`] values, one per rename or deletion. Entries are never
//!   updated or removed.
//!
//! # Modules
//!
//! - [`error`]: Error types for identity operations
//! - [`types`]: [`ChangeLogEntry`], [`ChangeEvent`], [`IdentityMapping`]
//! - [`traits`]: The [`IdentityLog`] trait and [`ChangeLogIter`]
//! - [`memory`]: In-memory [`InMemoryIdentityLog`] for tests
//! - [`file`]: Durable [`FileIdentityLog`] backed by a CRC-framed log file
//! - [`resolve`]: Single-hop and chase-to-fixpoint resolution policies

pub mod error;
pub mod file;
pub mod memory;
pub mod resolve;
mod state;
pub mod traits;
pub mod types;

pub use error::{IdentityError, Result};
pub use file::{corrupt_tail_path, FileIdentityLog, FileLogConfig, SyncMode};
pub use memory::InMemoryIdentityLog;
pub use resolve::{resolve_with, Resolution, ResolvePolicy};
pub use traits::{ChangeLogIter, IdentityLog};
pub use types::{ChangeEvent, ChangeLogEntry, IdentityMapping};
