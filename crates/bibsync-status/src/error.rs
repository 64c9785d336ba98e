use thiserror::Error;

use bibsync_identity::IdentityError;
use bibsync_store::StoreError;
use bibsync_types::TypeError;

/// Errors from status tracker operations.
#[derive(Debug, Error)]
pub enum StatusError {
    /// The fragment kind is not one of the fixed set. Not retried.
    #[error("invalid fragment kind: {0}")]
    InvalidFragmentKind(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("identity log error: {0}")]
    Identity(#[from] IdentityError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Type(TypeError),
}

impl From<TypeError> for StatusError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidFragmentKind(kind) => Self::InvalidFragmentKind(kind),
            TypeError::InvalidTarget(target) => Self::InvalidTarget(target),
            other => Self::Type(other),
        }
    }
}

pub type StatusResult<T> = Result<T, StatusError>;
