//! Intrinsic gas: the fixed cost charged before any execution.

use {
    crate::{
        error::{Result, TxError},
        tx::{Transaction, TxBody},
        types::FeeMode,
    },
};

pub const TX_GAS: u64 = 21_000;
pub const TX_GAS_CONTRACT_CREATION: u64 = 53_000;
pub const TX_GAS_FEE_DELEGATED: u64 = 10_000;
pub const TX_GAS_FEE_DELEGATED_WITH_RATIO: u64 = 15_000;
pub const TX_DATA_GAS: u64 = 100;

/// Base gas by type, fee-delegation surcharge, per-byte payload gas and,
/// for key-installing transactions, the key's creation gas.
pub fn intrinsic_gas(tx: &Transaction) -> Result<u64> {
    let base = if tx.is_contract_creation() {
        TX_GAS_CONTRACT_CREATION
    } else {
        TX_GAS
    };
    let delegation = match tx.tx_type().fee_mode() {
        FeeMode::Sender => 0,
        FeeMode::Delegated => TX_GAS_FEE_DELEGATED,
        FeeMode::DelegatedWithRatio => TX_GAS_FEE_DELEGATED_WITH_RATIO,
    };
    let payload = (tx.payload().len() as u64)
        .checked_mul(TX_DATA_GAS)
        .ok_or(TxError::GasUintOverflow)?;
    let key_gas = match tx.body() {
        TxBody::AccountCreation { key, .. } | TxBody::AccountUpdate { key } => {
            key.account_creation_gas()
        }
        _ => 0,
    };
    base.checked_add(delegation)
        .and_then(|g| g.checked_add(payload))
        .and_then(|g| g.checked_add(key_gas))
        .ok_or(TxError::GasUintOverflow)
}
