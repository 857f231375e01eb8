//! secp256k1 keys, signing and public-key recovery.
//!
//! Keys are compared and serialized in their 33-byte compressed form, so
//! two `PublicKey`s are equal exactly when they encode the same point.

use {
    crate::error::{KeyError, Result},
    libsecp256k1 as secp,
    ranger_primitives::{keccak256, Address, Hash},
    serde::{de, Deserialize, Deserializer, Serialize, Serializer},
    std::{cmp::Ordering, fmt, hash},
};

/// A validated secp256k1 public key.
#[derive(Clone, Copy)]
pub struct PublicKey {
    inner: secp::PublicKey,
    compressed: [u8; 33],
}

impl PublicKey {
    pub const COMPRESSED_LEN: usize = 33;

    /// Parse a compressed (33-byte) or uncompressed (65-byte) key.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let inner = match bytes.len() {
            33 => {
                let array: &[u8; 33] = bytes.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
                secp::PublicKey::parse_compressed(array)
            }
            65 => {
                let array: &[u8; 65] = bytes.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
                secp::PublicKey::parse(array)
            }
            _ => return Err(KeyError::InvalidPublicKey),
        }
        .map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self::from_secp(inner))
    }

    fn from_secp(inner: secp::PublicKey) -> Self {
        Self {
            inner,
            compressed: inner.serialize_compressed(),
        }
    }

    pub fn to_compressed(&self) -> [u8; 33] {
        self.compressed
    }

    pub fn to_uncompressed(&self) -> [u8; 65] {
        self.inner.serialize()
    }

    /// The account address controlled by this key under a legacy key.
    pub fn to_address(&self) -> Address {
        Address::from_uncompressed_public_key(&self.to_uncompressed())
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.compressed == other.compressed
    }
}

impl Eq for PublicKey {}

impl hash::Hash for PublicKey {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.compressed.hash(state)
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compressed.cmp(&other.compressed)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey(0x")?;
        for b in &self.compressed {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.compressed)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        PublicKey::from_slice(&bytes).map_err(de::Error::custom)
    }
}

/// A secp256k1 signature split into its wire components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    /// 0 or 1.
    pub recovery_id: u8,
}

/// A secp256k1 secret key.
#[derive(Clone)]
pub struct SecretKey(secp::SecretKey);

impl SecretKey {
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        secp::SecretKey::parse(bytes)
            .map(Self)
            .map_err(|_| KeyError::InvalidPublicKey)
    }

    /// Deterministically derive a key from arbitrary seed bytes by hashing
    /// until the digest is a valid scalar.
    pub fn from_seed(seed: &[u8]) -> Self {
        let mut digest = keccak256(seed);
        loop {
            if let Ok(key) = secp::SecretKey::parse(digest.as_bytes()) {
                return Self(key);
            }
            digest = keccak256(digest.as_ref());
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_secp(secp::PublicKey::from_secret_key(&self.0))
    }

    pub fn address(&self) -> Address {
        self.public_key().to_address()
    }

    /// Sign a 32-byte digest.
    pub fn sign_hash(&self, hash: &Hash) -> RecoverableSignature {
        let message = secp::Message::parse(hash.as_bytes());
        let (signature, recovery_id) = secp::sign(&message, &self.0);
        let bytes = signature.serialize();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        RecoverableSignature {
            r,
            s,
            recovery_id: recovery_id.serialize(),
        }
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey({})", self.address())
    }
}

/// Recover the public key that produced `signature` over `hash`.
pub fn recover(hash: &Hash, signature: &RecoverableSignature) -> Result<PublicKey> {
    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(&signature.r);
    bytes[32..].copy_from_slice(&signature.s);
    let sig = secp::Signature::parse_standard(&bytes).map_err(|_| KeyError::InvalidSignature)?;
    let recovery_id =
        secp::RecoveryId::parse(signature.recovery_id).map_err(|_| KeyError::InvalidSignature)?;
    let message = secp::Message::parse(hash.as_bytes());
    secp::recover(&message, &sig, &recovery_id)
        .map(PublicKey::from_secp)
        .map_err(|_| KeyError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use {super::*, assert_matches::assert_matches};

    #[test]
    fn test_sign_and_recover() {
        let key = SecretKey::from_seed(b"alice");
        let hash = keccak256(b"payload");
        let sig = key.sign_hash(&hash);
        assert_eq!(recover(&hash, &sig).unwrap(), key.public_key());
    }

    #[test]
    fn test_recover_other_hash_yields_other_key() {
        let key = SecretKey::from_seed(b"alice");
        let sig = key.sign_hash(&keccak256(b"one"));
        let recovered = recover(&keccak256(b"two"), &sig);
        assert!(recovered.map_or(true, |pk| pk != key.public_key()));
    }

    #[test]
    fn test_invalid_recovery_id() {
        let key = SecretKey::from_seed(b"alice");
        let hash = keccak256(b"payload");
        let mut sig = key.sign_hash(&hash);
        sig.recovery_id = 7;
        assert_matches!(recover(&hash, &sig), Err(KeyError::InvalidSignature));
    }

    #[test]
    fn test_public_key_serde_roundtrip() {
        let pk = SecretKey::from_seed(b"bob").public_key();
        let bytes = bincode::serialize(&pk).unwrap();
        let decoded: PublicKey = bincode::deserialize(&bytes).unwrap();
        assert_eq!(pk, decoded);
        assert_eq!(
            PublicKey::from_slice(&pk.to_uncompressed()).unwrap(),
            pk,
            "uncompressed form parses to the same key"
        );
    }

    #[test]
    fn test_rejects_garbage_key_bytes() {
        assert_matches!(
            PublicKey::from_slice(&[0u8; 33]),
            Err(KeyError::InvalidPublicKey)
        );
        assert_matches!(
            PublicKey::from_slice(&[2u8; 12]),
            Err(KeyError::InvalidPublicKey)
        );
    }
}
