use thiserror::Error;

/// Errors produced by type parsing and validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid fragment kind: {0}")]
    InvalidFragmentKind(String),

    #[error("invalid sync target: {0}")]
    InvalidTarget(String),

    #[error("invalid record key: {0:?}")]
    InvalidKey(String),
}
