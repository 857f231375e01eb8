//! Error types for the transaction pools.

use {ranger_transaction::TxError, thiserror::Error};

#[derive(Error, Debug)]
pub enum TxPoolError {
    /// A transaction with the same hash is already pooled.
    #[error("known transaction")]
    KnownTx,

    /// The sender already has a pooled transaction with this nonce.
    #[error("duplicated nonce transaction")]
    DuplicatedNonceTx,

    /// The pool holds its configured maximum number of transactions.
    #[error("transaction pool is full")]
    TxPoolFull,

    /// The sender already holds its per-account maximum.
    #[error("account queue is full")]
    AccountFull,

    /// The sender could not be recovered.
    #[error("invalid sender: {0}")]
    InvalidSender(TxError),

    /// The transaction failed pool-time validation.
    #[error(transparent)]
    Tx(#[from] TxError),

    #[error("transaction not found in pool")]
    UnknownTx,

    /// A journal record is truncated or does not decode.
    #[error("journal corrupted at byte {offset}: {reason}")]
    JournalCorrupted { offset: u64, reason: String },

    /// The journal has no open writer.
    #[error("no active journal")]
    NoActiveJournal,

    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for pool operations.
pub type Result<T> = std::result::Result<T, TxPoolError>;
