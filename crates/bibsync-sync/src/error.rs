use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The endpoint could not be reached at all. Transient: the affected
    /// records stay retry-eligible.
    #[error("target unreachable: {target}: {reason}")]
    TargetUnreachable { target: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("dispatch task failed: {0}")]
    Dispatch(String),

    #[error("status error: {0}")]
    Status(#[from] bibsync_status::StatusError),
}

impl SyncError {
    pub fn unreachable(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TargetUnreachable {
            target: target.into(),
            reason: reason.into(),
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
