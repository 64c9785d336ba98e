//! Keyed record storage for bibsync.
//!
//! Every bibliographic record is a row keyed by its [`RecordKey`]. A row
//! holds one optional payload per [`FragmentKind`] together with that
//! fragment's last-updated timestamp, an overall `updated` timestamp, the
//! per-target and overall processed stamps, and a free-text status.
//!
//! # Storage Backends
//!
//! All backends implement the [`RecordStore`] trait:
//!
//! - [`InMemoryRecordStore`] -- `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Writes go through a [`RecordTxn`] obtained from [`RecordStore::begin`].
//!    A transaction that is dropped without `commit` leaves no trace.
//! 2. [`with_transaction`] is the only sanctioned way to write: it commits on
//!    `Ok` and rolls back on every other exit path.
//! 3. Every write is a single-key upsert. Concurrent writers on disjoint keys
//!    never conflict; on the same key each field is last-write-wins.
//! 4. The store never interprets fragment payloads.
//! 5. All backend errors are propagated, never silently ignored.
//!
//! [`RecordKey`]: bibsync_types::RecordKey
//! [`FragmentKind`]: bibsync_types::FragmentKind

pub mod error;
pub mod filter;
pub mod memory;
pub mod record;
pub mod traits;
pub mod txn;
pub mod view;

pub use error::{StoreError, StoreResult};
pub use filter::RecordFilter;
pub use memory::InMemoryRecordStore;
pub use record::{FragmentSlot, Record};
pub use traits::{RecordStore, RecordTxn};
pub use txn::with_transaction;
pub use view::{Projection, RecordField, RecordView};
