//! Pool-time and block-time transaction validation.
//!
//! Both checkpoints share the structural checks (size, nonce, recipient
//! type, code format, signatures). Pool time additionally checks the unit
//! price, intrinsic gas and worst-case balances; block time requires the
//! exact nonce and leaves balance failures to execution. A bad fee payer
//! signature is [`TxError::InvalidFeePayer`] at pool time and
//! [`TxError::InvalidSigFeePayer`] at block time.

use {
    crate::{
        error::{Result, TxError},
        gas::intrinsic_gas,
        signer::Signer,
        state::StateReader,
        tx::{Transaction, TxBody},
        types::CodeFormat,
    },
    log::{debug, trace},
    ranger_account_key::{PublicKey, RoleType},
    ranger_primitives::Address,
};

/// Default minimum gas price.
pub const DEFAULT_UNIT_PRICE: u64 = 25_000_000_000;
/// Default maximum encoded transaction size.
pub const MAX_TX_DATA_SIZE: usize = 32 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationConfig {
    /// Gas price floor enforced at pool time.
    pub unit_price: u64,
    /// Maximum encoded transaction size, enforced at both checkpoints.
    pub max_tx_data_size: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            unit_price: DEFAULT_UNIT_PRICE,
            max_tx_data_size: MAX_TX_DATA_SIZE,
        }
    }
}

/// Signers of a transaction that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTx {
    pub sender: Address,
    pub sender_keys: Vec<PublicKey>,
    /// Empty unless the transaction is fee-delegated.
    pub fee_payer_keys: Vec<PublicKey>,
}

/// Checks run before a transaction is admitted to a pool.
pub fn validate_for_pool(
    config: &ValidationConfig,
    signer: &Signer,
    state: &dyn StateReader,
    tx: &Transaction,
) -> Result<ValidatedTx> {
    check_size(config, tx)?;
    if tx.gas_price() < config.unit_price {
        return Err(TxError::InvalidUnitPrice);
    }
    if tx.gas_limit() < intrinsic_gas(tx)? {
        return Err(TxError::IntrinsicGas);
    }
    let sender = signer.sender(tx)?;
    if tx.nonce() < state.nonce(&sender) {
        return Err(TxError::NonceTooLow);
    }
    check_recipient(state, tx)?;
    check_code_format(tx)?;
    let sender_keys = check_sender_signatures(signer, state, tx, &sender)?;
    let fee_payer_keys =
        check_fee_payer_signatures(signer, state, tx).map_err(|_| TxError::InvalidFeePayer)?;
    check_balances(state, tx, &sender)?;
    trace!("tx {} from {sender} passed pool validation", tx.hash());
    Ok(ValidatedTx {
        sender,
        sender_keys,
        fee_payer_keys,
    })
}

/// Checks run when a transaction is applied as part of a block.
pub fn validate_for_block(
    config: &ValidationConfig,
    signer: &Signer,
    state: &dyn StateReader,
    tx: &Transaction,
) -> Result<ValidatedTx> {
    check_size(config, tx)?;
    let sender = signer.sender(tx)?;
    let nonce = state.nonce(&sender);
    if tx.nonce() < nonce {
        return Err(TxError::NonceTooLow);
    }
    if tx.nonce() > nonce {
        return Err(TxError::NonceTooHigh);
    }
    check_recipient(state, tx)?;
    check_code_format(tx)?;
    let sender_keys = check_sender_signatures(signer, state, tx, &sender)?;
    let fee_payer_keys = check_fee_payer_signatures(signer, state, tx)?;
    Ok(ValidatedTx {
        sender,
        sender_keys,
        fee_payer_keys,
    })
}

fn check_size(config: &ValidationConfig, tx: &Transaction) -> Result<()> {
    let size = tx.size();
    if size > config.max_tx_data_size {
        return Err(TxError::OversizedData {
            size,
            max: config.max_tx_data_size,
        });
    }
    Ok(())
}

fn check_recipient(state: &dyn StateReader, tx: &Transaction) -> Result<()> {
    match tx.body() {
        TxBody::ValueTransfer { to, .. } | TxBody::ValueTransferMemo { to, .. }
            if state.is_program_account(to) =>
        {
            Err(TxError::NotForProgramAccount)
        }
        TxBody::SmartContractExecution { to, .. } if !state.is_program_account(to) => {
            Err(TxError::NotProgramAccount)
        }
        TxBody::AccountCreation { to, .. } if state.exists(to) => {
            Err(TxError::AccountAlreadyExists)
        }
        _ => Ok(()),
    }
}

fn check_code_format(tx: &Transaction) -> Result<()> {
    match tx.body() {
        TxBody::SmartContractDeploy { code_format, .. } => CodeFormat::try_from(*code_format)
            .map(|_| ())
            .map_err(|_| TxError::InvalidCodeFormat),
        _ => Ok(()),
    }
}

fn check_sender_signatures(
    signer: &Signer,
    state: &dyn StateReader,
    tx: &Transaction,
    sender: &Address,
) -> Result<Vec<PublicKey>> {
    let key = state.account_key(sender);
    if tx.tx_type().is_legacy() && !key.is_legacy() {
        return Err(TxError::LegacyTransactionMustBeWithLegacyKey);
    }
    let keys = signer.sender_public_keys(tx)?;
    key.validate(sender, tx.sender_role(), &keys)
        .map_err(|err| {
            debug!("sender key of {sender} rejected tx {}: {err}", tx.hash());
            TxError::InvalidSigSender
        })?;
    Ok(keys)
}

fn check_fee_payer_signatures(
    signer: &Signer,
    state: &dyn StateReader,
    tx: &Transaction,
) -> Result<Vec<PublicKey>> {
    let Some(fee_payer) = tx.fee_payer() else {
        return Ok(Vec::new());
    };
    let keys = signer
        .fee_payer_public_keys(tx)
        .map_err(|_| TxError::InvalidSigFeePayer)?;
    state
        .account_key(&fee_payer)
        .validate(&fee_payer, RoleType::FeePayer, &keys)
        .map_err(|err| {
            debug!("fee payer key of {fee_payer} rejected tx {}: {err}", tx.hash());
            TxError::InvalidSigFeePayer
        })?;
    Ok(keys)
}

fn check_balances(state: &dyn StateReader, tx: &Transaction, sender: &Address) -> Result<()> {
    let (payer_part, sender_part) = tx.fee_delegation().split(tx.fee());
    let sender_cost = sender_part.saturating_add(tx.value());
    if state.balance(sender) < sender_cost {
        return Err(TxError::InsufficientFundsFrom);
    }
    if let Some(fee_payer) = tx.fee_payer() {
        if state.balance(&fee_payer) < payer_part {
            return Err(TxError::InsufficientFundsFeePayer);
        }
    }
    Ok(())
}
