//! Ranger account keys.
//!
//! An account key is the authorization policy bound to an address. It is
//! a closed sum type ([`AccountKey`]) so that every place that validates
//! or installs a key is an exhaustive `match` over [`KeyKind`]:
//!
//! | Kind | Authorizes when |
//! |------|-----------------|
//! | `Legacy`           | one signature recovers to the account address |
//! | `Public`           | one signature recovers to the stored key |
//! | `Fail`             | never |
//! | `Nil`              | never installable; only a placeholder |
//! | `WeightedMultiSig` | weights of distinct valid signers reach the threshold |
//! | `RoleBased`        | the sub-key for the requested [`RoleType`] authorizes |
//!
//! Structural invariants (threshold satisfiable, no duplicate keys, no
//! nested role-based keys, ...) are checked by
//! [`AccountKey::check_installable`] when a key is created or replaced.
//! Signature checks go through [`AccountKey::validate`], which works on
//! public keys already recovered from the transaction's signatures.

pub mod crypto;
pub mod error;
pub mod gas;
pub mod key;
pub mod role;

pub use {
    crypto::{recover, PublicKey, RecoverableSignature, SecretKey},
    error::{KeyError, Result},
    key::{AccountKey, KeyKind, WeightedMultiSig, WeightedPublicKey},
    role::RoleType,
};

/// Maximum number of keys in a weighted multisig key, and maximum number
/// of signatures accepted for one role.
pub const MAX_NUM_KEYS_FOR_MULTI_SIG: usize = 10;
