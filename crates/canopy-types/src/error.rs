use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("missing block id")]
    MissingId,

    #[error("invalid root id")]
    InvalidRootId,

    #[error("block {0} cannot be its own parent")]
    SelfParent(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
