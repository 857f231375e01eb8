//! Gas charged for installing and validating account keys.
//!
//! Validating the first signature is covered by a transaction's intrinsic
//! gas; each further signature costs [`TX_VALIDATION_GAS_PER_KEY`]. Every
//! public key installed costs [`TX_ACCOUNT_CREATION_GAS_PER_KEY`].

use crate::{key::AccountKey, role::RoleType};

pub const TX_VALIDATION_GAS_DEFAULT: u64 = 0;
pub const TX_VALIDATION_GAS_PER_KEY: u64 = 15_000;
pub const TX_ACCOUNT_CREATION_GAS_DEFAULT: u64 = 0;
pub const TX_ACCOUNT_CREATION_GAS_PER_KEY: u64 = 20_000;

impl AccountKey {
    /// Gas for validating `num_sigs` signatures against the key for `role`.
    pub fn sig_validation_gas(&self, role: RoleType, num_sigs: usize) -> u64 {
        let extra = (num_sigs as u64).saturating_sub(1);
        match self.role_key(role) {
            AccountKey::WeightedMultiSig(_) => TX_VALIDATION_GAS_DEFAULT
                .saturating_add(extra.saturating_mul(TX_VALIDATION_GAS_PER_KEY)),
            _ => TX_VALIDATION_GAS_DEFAULT,
        }
    }

    /// Gas for installing this key on an account.
    pub fn account_creation_gas(&self) -> u64 {
        match self {
            AccountKey::Nil | AccountKey::Legacy | AccountKey::Fail => {
                TX_ACCOUNT_CREATION_GAS_DEFAULT
            }
            AccountKey::Public(_) => {
                TX_ACCOUNT_CREATION_GAS_DEFAULT.saturating_add(TX_ACCOUNT_CREATION_GAS_PER_KEY)
            }
            AccountKey::WeightedMultiSig(multisig) => TX_ACCOUNT_CREATION_GAS_DEFAULT
                .saturating_add(
                    (multisig.keys.len() as u64).saturating_mul(TX_ACCOUNT_CREATION_GAS_PER_KEY),
                ),
            AccountKey::RoleBased(slots) => slots
                .iter()
                .fold(0u64, |sum, slot| sum.saturating_add(slot.account_creation_gas())),
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::key::{tests::pk, WeightedMultiSig, WeightedPublicKey},
        test_case::test_case,
    };

    fn three_of(threshold: u32) -> AccountKey {
        AccountKey::WeightedMultiSig(WeightedMultiSig::new(
            threshold,
            ["a", "b", "c"]
                .iter()
                .map(|s| WeightedPublicKey::new(1, pk(s)))
                .collect(),
        ))
    }

    #[test_case(1, 0; "one signature is free")]
    #[test_case(2, 15_000; "two signatures")]
    #[test_case(3, 30_000; "three signatures")]
    #[test_case(0, 0; "no signatures")]
    fn test_weighted_validation_gas(num_sigs: usize, expected: u64) {
        assert_eq!(
            three_of(1).sig_validation_gas(RoleType::Transaction, num_sigs),
            expected
        );
    }

    #[test]
    fn test_role_based_validation_gas_follows_role() {
        let key = AccountKey::RoleBased(vec![
            AccountKey::Public(pk("a")),
            three_of(2),
            AccountKey::Fail,
        ]);
        assert_eq!(key.sig_validation_gas(RoleType::Transaction, 2), 0);
        assert_eq!(key.sig_validation_gas(RoleType::AccountUpdate, 2), 15_000);
    }

    #[test]
    fn test_creation_gas() {
        assert_eq!(AccountKey::Legacy.account_creation_gas(), 0);
        assert_eq!(AccountKey::Public(pk("a")).account_creation_gas(), 20_000);
        assert_eq!(three_of(2).account_creation_gas(), 60_000);
        let role_based =
            AccountKey::RoleBased(vec![AccountKey::Public(pk("a")), three_of(2), AccountKey::Fail]);
        assert_eq!(role_based.account_creation_gas(), 80_000);
    }
}
