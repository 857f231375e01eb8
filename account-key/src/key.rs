//! The account key sum type and its validation rules.

use {
    crate::{
        crypto::PublicKey,
        error::{KeyError, Result},
        role::RoleType,
        MAX_NUM_KEYS_FOR_MULTI_SIG,
    },
    num_enum::{IntoPrimitive, TryFromPrimitive},
    ranger_primitives::Address,
    serde::{Deserialize, Serialize},
    std::collections::HashSet,
};

/// Discriminant of [`AccountKey`], stable on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, IntoPrimitive, TryFromPrimitive,
)]
#[repr(u8)]
pub enum KeyKind {
    Nil = 0,
    Legacy = 1,
    Public = 2,
    Fail = 3,
    WeightedMultiSig = 4,
    RoleBased = 5,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedPublicKey {
    pub weight: u32,
    pub key: PublicKey,
}

impl WeightedPublicKey {
    pub fn new(weight: u32, key: PublicKey) -> Self {
        Self { weight, key }
    }
}

/// A threshold policy over a list of weighted keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedMultiSig {
    pub threshold: u32,
    pub keys: Vec<WeightedPublicKey>,
}

impl WeightedMultiSig {
    pub fn new(threshold: u32, keys: Vec<WeightedPublicKey>) -> Self {
        Self { threshold, keys }
    }

    /// Sum of all key weights, or `None` on overflow.
    pub fn total_weight(&self) -> Option<u32> {
        self.keys
            .iter()
            .try_fold(0u32, |sum, k| sum.checked_add(k.weight))
    }

    fn check_installable(&self) -> Result<()> {
        if self.keys.is_empty() {
            return Err(KeyError::ZeroLength);
        }
        if self.keys.len() > MAX_NUM_KEYS_FOR_MULTI_SIG {
            return Err(KeyError::MaxKeysExceed);
        }
        if self.keys.iter().any(|k| k.weight == 0) {
            return Err(KeyError::ZeroKeyWeight);
        }
        let mut seen = HashSet::with_capacity(self.keys.len());
        if !self.keys.iter().all(|k| seen.insert(k.key)) {
            return Err(KeyError::DuplicatedKey);
        }
        let total = self.total_weight().ok_or(KeyError::WeightedSumOverflow)?;
        if self.threshold == 0 || self.threshold > total {
            return Err(KeyError::UnsatisfiableThreshold);
        }
        Ok(())
    }

    fn validate(&self, signers: &[PublicKey]) -> Result<()> {
        if signers.len() > MAX_NUM_KEYS_FOR_MULTI_SIG {
            return Err(KeyError::MaxKeysExceed);
        }
        let mut used = HashSet::with_capacity(signers.len());
        let mut weight = 0u32;
        for signer in signers {
            let entry = self
                .keys
                .iter()
                .find(|k| &k.key == signer)
                .ok_or(KeyError::InvalidSignature)?;
            if !used.insert(*signer) {
                return Err(KeyError::InvalidSignature);
            }
            weight = weight.saturating_add(entry.weight);
        }
        if weight < self.threshold {
            return Err(KeyError::InvalidSignature);
        }
        Ok(())
    }
}

/// The authorization policy bound to an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountKey {
    /// Placeholder meaning "no key given"; never installable.
    Nil,
    /// The address is derived from the signing key.
    #[default]
    Legacy,
    Public(PublicKey),
    /// Rejects every signature.
    Fail,
    WeightedMultiSig(WeightedMultiSig),
    /// Slots indexed by [`RoleType`].
    RoleBased(Vec<AccountKey>),
}

impl AccountKey {
    pub fn kind(&self) -> KeyKind {
        match self {
            AccountKey::Nil => KeyKind::Nil,
            AccountKey::Legacy => KeyKind::Legacy,
            AccountKey::Public(_) => KeyKind::Public,
            AccountKey::Fail => KeyKind::Fail,
            AccountKey::WeightedMultiSig(_) => KeyKind::WeightedMultiSig,
            AccountKey::RoleBased(_) => KeyKind::RoleBased,
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, AccountKey::Legacy)
    }

    /// The key that authorizes `role`.
    ///
    /// Non-role-based keys authorize every role. A role-based key with
    /// fewer slots than roles falls back to its first slot.
    pub fn role_key(&self, role: RoleType) -> &AccountKey {
        match self {
            AccountKey::RoleBased(slots) => slots
                .get(role.index())
                .or_else(|| slots.first())
                .unwrap_or(self),
            _ => self,
        }
    }

    /// Structural checks run when the key is created or replaces another.
    pub fn check_installable(&self) -> Result<()> {
        match self {
            AccountKey::Nil => Err(KeyError::AccountKeyNilUninitializable),
            AccountKey::Legacy | AccountKey::Public(_) | AccountKey::Fail => Ok(()),
            AccountKey::WeightedMultiSig(multisig) => multisig.check_installable(),
            AccountKey::RoleBased(slots) => {
                if slots.is_empty() {
                    return Err(KeyError::ZeroLength);
                }
                if slots.len() > RoleType::COUNT {
                    return Err(KeyError::LengthTooLong);
                }
                if slots.iter().any(|s| s.kind() == KeyKind::RoleBased) {
                    return Err(KeyError::NestedRoleBasedKey);
                }
                if slots.iter().any(|s| s.kind() == KeyKind::Nil) {
                    return Err(KeyError::AccountKeyNilUninitializable);
                }
                slots.iter().try_for_each(AccountKey::check_installable)
            }
        }
    }

    /// Check that `signers`, the keys recovered from a transaction's
    /// signatures, authorize `role` on the account at `from`.
    pub fn validate(&self, from: &Address, role: RoleType, signers: &[PublicKey]) -> Result<()> {
        match self {
            AccountKey::RoleBased(slots) if slots.is_empty() => Err(KeyError::ZeroLength),
            AccountKey::RoleBased(_) => match self.role_key(role) {
                AccountKey::RoleBased(_) => Err(KeyError::NestedRoleBasedKey),
                slot => slot.validate_leaf(from, signers),
            },
            _ => self.validate_leaf(from, signers),
        }
    }

    fn validate_leaf(&self, from: &Address, signers: &[PublicKey]) -> Result<()> {
        match self {
            AccountKey::Nil => Err(KeyError::AccountKeyNilUninitializable),
            AccountKey::Fail => Err(KeyError::InvalidSignature),
            AccountKey::Legacy => match signers {
                [signer] if signer.to_address() == *from => Ok(()),
                _ => Err(KeyError::InvalidSignature),
            },
            AccountKey::Public(key) => match signers {
                [signer] if signer == key => Ok(()),
                _ => Err(KeyError::InvalidSignature),
            },
            AccountKey::WeightedMultiSig(multisig) => multisig.validate(signers),
            AccountKey::RoleBased(_) => Err(KeyError::NestedRoleBasedKey),
        }
    }
}
