//! 32-byte keccak-256 digests.

use {
    crate::ParseError,
    serde::{Deserialize, Serialize},
    sha3::{Digest, Keccak256},
    std::{fmt, str::FromStr},
};

/// A 32-byte hash value.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    pub const LEN: usize = 32;

    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, ParseError> {
        let array: [u8; 32] = bytes.try_into().map_err(|_| ParseError::InvalidLength {
            expected: Self::LEN,
            got: bytes.len(),
        })?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({self})")
    }
}

impl FromStr for Hash {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|e| ParseError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

/// keccak-256 of `data`.
pub fn keccak256(data: &[u8]) -> Hash {
    keccak256_concat(&[data])
}

/// keccak-256 over the concatenation of `parts`, without allocating.
pub fn keccak256_concat(parts: &[&[u8]]) -> Hash {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    Hash(hasher.finalize().into())
}

/// Canonical byte encoding used for hashing and persistence.
///
/// Encoding plain derived structs into a `Vec` has no failure mode in
/// bincode (every sequence carries its length), so this is infallible.
pub fn encode_canonical<T: Serialize + ?Sized>(value: &T) -> Vec<u8> {
    bincode::serialize(value).expect("bincode encoding of in-memory values is infallible")
}

/// keccak-256 of the canonical encoding of `value`.
pub fn hash_of<T: Serialize + ?Sized>(value: &T) -> Hash {
    keccak256(&encode_canonical(value))
}
