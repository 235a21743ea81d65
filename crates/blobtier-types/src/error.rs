use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("content hash is empty")]
    EmptyHash,

    #[error("content hash too long: at most {max} bytes, got {actual}")]
    HashTooLong { max: usize, actual: usize },

    #[error("invalid character {ch:?} at position {position} in content hash")]
    InvalidHashChar { ch: char, position: usize },

    #[error("invalid block key: {0}")]
    InvalidBlockKey(String),
}
