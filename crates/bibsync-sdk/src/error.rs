use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no search endpoints configured")]
    NoEndpoints,

    #[error("store error: {0}")]
    Store(#[from] bibsync_store::StoreError),

    #[error("identity log error: {0}")]
    Identity(#[from] bibsync_identity::IdentityError),

    #[error("status error: {0}")]
    Status(#[from] bibsync_status::StatusError),

    #[error("sync error: {0}")]
    Sync(#[from] bibsync_sync::SyncError),
}

pub type SdkResult<T> = Result<T, SdkError>;
