//! Error types for identity log operations.

use thiserror::Error;

use bibsync_types::RecordKey;

/// Errors that can occur during identity log operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// A key cannot be renamed to itself.
    #[error("cannot rename {0} to itself")]
    SelfRename(RecordKey),

    /// Log state lock was poisoned by a panicking writer.
    #[error("identity log lock poisoned")]
    LockPoisoned,

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error on the durable log file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for identity operations.
pub type Result<T> = std::result::Result<T, IdentityError>;
