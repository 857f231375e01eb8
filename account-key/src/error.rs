//! Error types for account-key validation.

use thiserror::Error;

/// Errors raised while installing or validating an account key.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyError {
    /// A composite key has no sub-keys.
    #[error("zero length key")]
    ZeroLength,

    /// A role-based key has more slots than there are roles.
    #[error("key length too long")]
    LengthTooLong,

    /// A weighted multisig key (or signature set) exceeds the key limit.
    #[error("the number of keys exceeds the limit")]
    MaxKeysExceed,

    /// The same public key appears twice in a weighted multisig key.
    #[error("duplicated key")]
    DuplicatedKey,

    /// Summing the key weights overflows.
    #[error("weighted sum overflow")]
    WeightedSumOverflow,

    /// The threshold cannot be reached even if every key signs.
    #[error("unsatisfiable threshold")]
    UnsatisfiableThreshold,

    /// A weighted key carries weight zero.
    #[error("zero key weight")]
    ZeroKeyWeight,

    /// A role-based key contains another role-based key.
    #[error("nested role-based key")]
    NestedRoleBasedKey,

    /// `Nil` cannot be installed as an account key or role slot.
    #[error("account key nil cannot be initialized")]
    AccountKeyNilUninitializable,

    /// The supplied signatures do not satisfy the key.
    #[error("invalid signature")]
    InvalidSignature,

    /// Bytes that do not decode to a secp256k1 point.
    #[error("invalid public key")]
    InvalidPublicKey,
}

/// Convenience result type for account-key operations.
pub type Result<T> = std::result::Result<T, KeyError>;
