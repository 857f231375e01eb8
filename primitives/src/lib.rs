//! Fixed-size primitives shared by every ranger crate.
//!
//! | Type | Width | Purpose |
//! |------|-------|---------|
//! | [`Hash`]    | 32 bytes | keccak-256 digests: transaction, block and state-node ids |
//! | [`Address`] | 20 bytes | account and node addresses derived from secp256k1 keys |
//!
//! Values that need a stable identity are hashed over their canonical
//! encoding (bincode, fixed-int little-endian) with [`hash_of`].

pub mod address;
pub mod hash;

pub use {
    address::Address,
    hash::{encode_canonical, hash_of, keccak256, keccak256_concat, Hash},
};

/// Error returned when parsing a hex string or byte slice into a primitive.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}
