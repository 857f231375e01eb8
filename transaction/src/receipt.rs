//! Execution receipts.

use {
    num_enum::{IntoPrimitive, TryFromPrimitive},
    ranger_account_key::KeyError,
    ranger_primitives::{Address, Hash},
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Outcome of executing a transaction that was included in a block.
///
/// Every status other than `Successful` still charges gas.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, IntoPrimitive, TryFromPrimitive,
)]
#[repr(u8)]
pub enum ReceiptStatus {
    Failed = 0x00,
    Successful = 0x01,
    ErrDefault = 0x02,
    ErrInsufficientBalance = 0x03,
    ErrExecutionReverted = 0x04,
    ErrOutOfGas = 0x05,
    ErrContractAddressCollision = 0x06,
    ErrInvalidCodeFormat = 0x07,
    ErrZeroLength = 0x10,
    ErrLengthTooLong = 0x11,
    ErrMaxKeysExceed = 0x12,
    ErrDuplicatedKey = 0x13,
    ErrWeightedSumOverflow = 0x14,
    ErrUnsatisfiableThreshold = 0x15,
    ErrZeroKeyWeight = 0x16,
    ErrNestedRoleBasedKey = 0x17,
    ErrAccountKeyNilUninitializable = 0x18,
}

impl ReceiptStatus {
    pub fn is_successful(self) -> bool {
        self == ReceiptStatus::Successful
    }
}

impl From<KeyError> for ReceiptStatus {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::ZeroLength => ReceiptStatus::ErrZeroLength,
            KeyError::LengthTooLong => ReceiptStatus::ErrLengthTooLong,
            KeyError::MaxKeysExceed => ReceiptStatus::ErrMaxKeysExceed,
            KeyError::DuplicatedKey => ReceiptStatus::ErrDuplicatedKey,
            KeyError::WeightedSumOverflow => ReceiptStatus::ErrWeightedSumOverflow,
            KeyError::UnsatisfiableThreshold => ReceiptStatus::ErrUnsatisfiableThreshold,
            KeyError::ZeroKeyWeight => ReceiptStatus::ErrZeroKeyWeight,
            KeyError::NestedRoleBasedKey => ReceiptStatus::ErrNestedRoleBasedKey,
            KeyError::AccountKeyNilUninitializable => {
                ReceiptStatus::ErrAccountKeyNilUninitializable
            }
            KeyError::InvalidSignature | KeyError::InvalidPublicKey => ReceiptStatus::ErrDefault,
        }
    }
}

impl fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReceiptStatus{self:?}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub status: ReceiptStatus,
    pub gas_used: u64,
    pub tx_hash: Hash,
    /// Set for successful contract deployments.
    pub contract_address: Option<Address>,
}

#[cfg(test)]
mod tests {
    use {super::*, test_case::test_case};

    #[test_case(KeyError::UnsatisfiableThreshold, ReceiptStatus::ErrUnsatisfiableThreshold)]
    #[test_case(KeyError::WeightedSumOverflow, ReceiptStatus::ErrWeightedSumOverflow)]
    #[test_case(KeyError::NestedRoleBasedKey, ReceiptStatus::ErrNestedRoleBasedKey)]
    #[test_case(KeyError::DuplicatedKey, ReceiptStatus::ErrDuplicatedKey)]
    #[test_case(KeyError::ZeroLength, ReceiptStatus::ErrZeroLength)]
    #[test_case(KeyError::LengthTooLong, ReceiptStatus::ErrLengthTooLong)]
    fn test_key_error_maps_to_status(err: KeyError, status: ReceiptStatus) {
        assert_eq!(ReceiptStatus::from(err), status);
        assert!(!status.is_successful());
    }

    #[test]
    fn test_status_codes_are_stable() {
        assert_eq!(u8::from(ReceiptStatus::Successful), 1);
        assert_eq!(
            ReceiptStatus::try_from(0x15u8).unwrap(),
            ReceiptStatus::ErrUnsatisfiableThreshold
        );
    }
}
