//! Transaction-level errors.
//!
//! A [`TxError`] means the transaction is not admitted to a pool or not
//! includable in a block. Failures discovered while executing an otherwise
//! valid transaction are reported as a [`crate::ReceiptStatus`] instead.

use {crate::tx::TxValueKey, thiserror::Error};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    #[error("nonce too low")]
    NonceTooLow,

    #[error("nonce too high")]
    NonceTooHigh,

    #[error("invalid unit price")]
    InvalidUnitPrice,

    #[error("oversized data: {size} bytes (max {max} bytes)")]
    OversizedData { size: usize, max: usize },

    /// A value transfer targets a program account.
    #[error("not a program account")]
    NotForProgramAccount,

    /// A contract execution targets an account without code.
    #[error("not a program account for contract execution")]
    NotProgramAccount,

    #[error("account already exists")]
    AccountAlreadyExists,

    #[error("invalid code format")]
    InvalidCodeFormat,

    #[error("insufficient funds of the sender for gas * price + value")]
    InsufficientFundsFrom,

    #[error("insufficient funds of the fee payer for gas * price")]
    InsufficientFundsFeePayer,

    /// Pool-time fee payer signature failure.
    #[error("invalid fee payer")]
    InvalidFeePayer,

    #[error("invalid transaction v, r, s values of the sender")]
    InvalidSigSender,

    /// Block-time fee payer signature failure.
    #[error("invalid transaction v, r, s values of the fee payer")]
    InvalidSigFeePayer,

    #[error("fee ratio exceeds the maximum of 100")]
    MaxFeeRatioExceeded,

    #[error("fee ratio out of range [1, 100]")]
    FeeRatioOutOfRange,

    #[error("value key {0:?} is missing")]
    ValueKeyMissing(TxValueKey),

    #[error("value key {0:?} has an unexpected type")]
    ValueKeyTypeMismatch(TxValueKey),

    #[error("undefined tx type {0:#04x}")]
    UndefinedTxType(u8),

    #[error("tx type not supported: {0}")]
    TxTypeNotSupported(String),

    #[error("intrinsic gas too low")]
    IntrinsicGas,

    #[error("gas uint64 overflow")]
    GasUintOverflow,

    #[error("gas limit reached")]
    GasLimitReached,

    #[error("invalid chain id")]
    InvalidChainId,

    #[error("a legacy transaction must be with a legacy account key")]
    LegacyTransactionMustBeWithLegacyKey,

    #[error("the number of signatures exceeds the limit")]
    MaxKeysExceed,

    #[error("codec error: {0}")]
    Codec(String),
}

impl From<bincode::Error> for TxError {
    fn from(err: bincode::Error) -> Self {
        TxError::Codec(err.to_string())
    }
}

/// Convenience result type for transaction operations.
pub type Result<T> = std::result::Result<T, TxError>;
