//! Transaction type codes and fee-delegation parameters.
//!
//! A type code is a basic type in the high bits combined with a fee mode
//! in the low three bits, so `0x30 | 0x02` is a fee-delegated contract
//! execution with a fee ratio.

use {
    crate::error::{Result, TxError},
    num_enum::{IntoPrimitive, TryFromPrimitive},
    ranger_primitives::Address,
    serde::{Deserialize, Serialize},
};

const FEE_MODE_MASK: u8 = 0x07;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, IntoPrimitive, TryFromPrimitive,
)]
#[repr(u8)]
pub enum TxType {
    Legacy = 0x00,
    ValueTransfer = 0x08,
    FeeDelegatedValueTransfer = 0x09,
    FeeDelegatedValueTransferWithRatio = 0x0a,
    ValueTransferMemo = 0x10,
    FeeDelegatedValueTransferMemo = 0x11,
    FeeDelegatedValueTransferMemoWithRatio = 0x12,
    AccountCreation = 0x18,
    AccountUpdate = 0x20,
    FeeDelegatedAccountUpdate = 0x21,
    FeeDelegatedAccountUpdateWithRatio = 0x22,
    SmartContractDeploy = 0x28,
    FeeDelegatedSmartContractDeploy = 0x29,
    FeeDelegatedSmartContractDeployWithRatio = 0x2a,
    SmartContractExecution = 0x30,
    FeeDelegatedSmartContractExecution = 0x31,
    FeeDelegatedSmartContractExecutionWithRatio = 0x32,
    Cancel = 0x38,
    FeeDelegatedCancel = 0x39,
    FeeDelegatedCancelWithRatio = 0x3a,
    ChainDataAnchoring = 0x48,
    FeeDelegatedChainDataAnchoring = 0x49,
    FeeDelegatedChainDataAnchoringWithRatio = 0x4a,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum BasicType {
    Legacy = 0x00,
    ValueTransfer = 0x08,
    ValueTransferMemo = 0x10,
    AccountCreation = 0x18,
    AccountUpdate = 0x20,
    SmartContractDeploy = 0x28,
    SmartContractExecution = 0x30,
    Cancel = 0x38,
    ChainDataAnchoring = 0x48,
}

/// Who pays for gas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum FeeMode {
    Sender = 0,
    Delegated = 1,
    DelegatedWithRatio = 2,
}

impl TxType {
    /// Combine a basic type and a fee mode, if that combination exists.
    pub fn from_parts(basic: BasicType, mode: FeeMode) -> Result<Self> {
        let code = u8::from(basic) | u8::from(mode);
        TxType::try_from(code).map_err(|_| {
            TxError::TxTypeNotSupported(format!("{basic:?} with fee mode {mode:?}"))
        })
    }

    pub fn from_code(code: u8) -> Result<Self> {
        TxType::try_from(code).map_err(|_| TxError::UndefinedTxType(code))
    }

    pub fn basic(self) -> BasicType {
        let code = u8::from(self) & !FEE_MODE_MASK;
        // every defined type code masks to a defined basic code
        BasicType::try_from(code).unwrap_or(BasicType::Legacy)
    }

    pub fn fee_mode(self) -> FeeMode {
        FeeMode::try_from(u8::from(self) & FEE_MODE_MASK).unwrap_or(FeeMode::Sender)
    }

    pub fn is_legacy(self) -> bool {
        self == TxType::Legacy
    }

    pub fn is_fee_delegated(self) -> bool {
        self.fee_mode() != FeeMode::Sender
    }
}

/// Percentage of the gas fee charged to the fee payer, in `1..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct FeeRatio(u8);

impl FeeRatio {
    pub const MAX: u8 = 100;

    pub fn new(ratio: u8) -> Result<Self> {
        match ratio {
            0 => Err(TxError::FeeRatioOutOfRange),
            r if r > Self::MAX => Err(TxError::MaxFeeRatioExceeded),
            r => Ok(Self(r)),
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Split `fee` into `(fee_payer_part, sender_part)`.
    pub fn split(self, fee: u128) -> (u128, u128) {
        let payer = fee.saturating_mul(u128::from(self.0)) / u128::from(Self::MAX);
        (payer, fee.saturating_sub(payer))
    }
}

impl TryFrom<u8> for FeeRatio {
    type Error = TxError;

    fn try_from(ratio: u8) -> Result<Self> {
        FeeRatio::new(ratio)
    }
}

impl From<FeeRatio> for u8 {
    fn from(ratio: FeeRatio) -> u8 {
        ratio.0
    }
}

/// The fee payer side of a transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeDelegation {
    #[default]
    None,
    Delegated { fee_payer: Address },
    WithRatio { fee_payer: Address, ratio: FeeRatio },
}

impl FeeDelegation {
    pub fn mode(&self) -> FeeMode {
        match self {
            FeeDelegation::None => FeeMode::Sender,
            FeeDelegation::Delegated { .. } => FeeMode::Delegated,
            FeeDelegation::WithRatio { .. } => FeeMode::DelegatedWithRatio,
        }
    }

    pub fn fee_payer(&self) -> Option<Address> {
        match self {
            FeeDelegation::None => None,
            FeeDelegation::Delegated { fee_payer } | FeeDelegation::WithRatio { fee_payer, .. } => {
                Some(*fee_payer)
            }
        }
    }

    pub fn ratio(&self) -> Option<FeeRatio> {
        match self {
            FeeDelegation::WithRatio { ratio, .. } => Some(*ratio),
            _ => None,
        }
    }

    /// Split `fee` into `(fee_payer_part, sender_part)`.
    pub fn split(&self, fee: u128) -> (u128, u128) {
        match self {
            FeeDelegation::None => (0, fee),
            FeeDelegation::Delegated { .. } => (fee, 0),
            FeeDelegation::WithRatio { ratio, .. } => ratio.split(fee),
        }
    }
}

/// Format of deployed contract code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CodeFormat {
    Evm = 0,
}
