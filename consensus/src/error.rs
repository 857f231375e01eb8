//! Error types for blocks, engines and the chain store.

use {ranger_primitives::Hash, ranger_storage::StorageError, thiserror::Error};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("unknown ancestor {0}")]
    UnknownAncestor(Hash),

    #[error("invalid block number: expected {expected}, got {got}")]
    InvalidNumber { expected: u64, got: u64 },

    #[error("block timestamp older than its parent")]
    InvalidTimestamp,

    #[error("invalid block score")]
    InvalidBlockScore,

    #[error("header carries no author")]
    MissingAuthor,

    #[error("transaction root mismatch")]
    InvalidTxRoot,

    #[error("no genesis block")]
    MissingGenesis,

    #[error("genesis mismatch: stored {stored}, given {given}")]
    GenesisMismatch { stored: Hash, given: Hash },

    #[error("invalid consensus message: {0}")]
    InvalidMessage(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("codec error: {0}")]
    Codec(String),
}

impl From<bincode::Error> for ChainError {
    fn from(err: bincode::Error) -> Self {
        ChainError::Codec(err.to_string())
    }
}

/// Convenience result type for chain operations.
pub type Result<T> = std::result::Result<T, ChainError>;
