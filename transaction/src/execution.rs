//! Applying one transaction to account state.

use {
    crate::{
        error::{Result, TxError},
        gas::intrinsic_gas,
        receipt::{Receipt, ReceiptStatus},
        signer::Signer,
        state::StateWriter,
        tx::{Transaction, TxBody},
        validation::{validate_for_block, ValidationConfig},
    },
    log::debug,
    ranger_account_key::RoleType,
    ranger_primitives::{keccak256_concat, Address},
};

/// What running contract code produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionResult {
    pub gas_used: u64,
    pub status: ReceiptStatus,
}

impl ExecutionResult {
    pub fn success(gas_used: u64) -> Self {
        Self {
            gas_used,
            status: ReceiptStatus::Successful,
        }
    }
}

/// The virtual machine behind contract deployment and execution. Value
/// transfers have already been applied when these are called.
pub trait CodeExecutor: Send + Sync {
    fn create(
        &self,
        state: &mut dyn StateWriter,
        caller: &Address,
        address: &Address,
        code: &[u8],
        gas: u64,
    ) -> ExecutionResult;

    fn call(
        &self,
        state: &mut dyn StateWriter,
        caller: &Address,
        to: &Address,
        input: &[u8],
        gas: u64,
    ) -> ExecutionResult;
}

/// Stores deployed code verbatim and treats every call as a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExecutor;

impl CodeExecutor for NoopExecutor {
    fn create(
        &self,
        state: &mut dyn StateWriter,
        _caller: &Address,
        address: &Address,
        code: &[u8],
        _gas: u64,
    ) -> ExecutionResult {
        state.update_account(address, &mut |a| a.code = Some(code.to_vec()));
        ExecutionResult::success(0)
    }

    fn call(
        &self,
        _state: &mut dyn StateWriter,
        _caller: &Address,
        _to: &Address,
        _input: &[u8],
        _gas: u64,
    ) -> ExecutionResult {
        ExecutionResult::success(0)
    }
}

/// Address of a contract deployed by `sender` at `nonce`.
pub fn create_address(sender: &Address, nonce: u64) -> Address {
    let hash = keccak256_concat(&[sender.as_ref(), &nonce.to_le_bytes()]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash.as_bytes()[12..]);
    Address::new(bytes)
}

struct Outcome {
    status: ReceiptStatus,
    gas_used: u64,
    contract_address: Option<Address>,
}

impl Outcome {
    fn status(status: ReceiptStatus) -> Self {
        Self {
            status,
            gas_used: 0,
            contract_address: None,
        }
    }
}

/// Validate and apply `tx`.
///
/// An `Err` means the transaction cannot be included at all. Otherwise
/// gas is bought from the sender and fee payer in the fee-ratio split, the
/// sender nonce is bumped, and the body is executed; a failed body is
/// rolled back but still pays for gas. Unused gas is refunded in the same
/// split.
pub fn apply_transaction<S: StateWriter>(
    config: &ValidationConfig,
    signer: &Signer,
    state: &mut S,
    executor: &dyn CodeExecutor,
    tx: &Transaction,
) -> Result<Receipt> {
    let validated = validate_for_block(config, signer, &*state, tx)?;
    let sender = validated.sender;

    let mut gas = intrinsic_gas(tx)?
        .checked_add(
            state
                .account_key(&sender)
                .sig_validation_gas(tx.sender_role(), validated.sender_keys.len()),
        )
        .ok_or(TxError::GasUintOverflow)?;
    if let Some(fee_payer) = tx.fee_payer() {
        gas = gas
            .checked_add(
                state
                    .account_key(&fee_payer)
                    .sig_validation_gas(RoleType::FeePayer, validated.fee_payer_keys.len()),
            )
            .ok_or(TxError::GasUintOverflow)?;
    }
    if tx.gas_limit() < gas {
        return Err(TxError::IntrinsicGas);
    }

    let (payer_part, sender_part) = tx.fee_delegation().split(tx.fee());
    if state.balance(&sender) < sender_part {
        return Err(TxError::InsufficientFundsFrom);
    }
    if let Some(fee_payer) = tx.fee_payer() {
        if state.balance(&fee_payer) < payer_part {
            return Err(TxError::InsufficientFundsFeePayer);
        }
        state.sub_balance(&fee_payer, payer_part);
    }
    state.sub_balance(&sender, sender_part);

    let nonce = tx.nonce();
    state.increment_nonce(&sender);

    let snapshot = state.snapshot();
    let remaining = tx.gas_limit().saturating_sub(gas);
    let outcome = execute_body(state, executor, tx, &sender, nonce, remaining);
    if !outcome.status.is_successful() {
        debug!("tx {} failed with {}", tx.hash(), outcome.status);
        state.revert_to_snapshot(snapshot);
    }

    let gas_used = gas.saturating_add(outcome.gas_used).min(tx.gas_limit());
    let refund = u128::from(tx.gas_limit().saturating_sub(gas_used))
        .saturating_mul(u128::from(tx.gas_price()));
    let (payer_refund, sender_refund) = tx.fee_delegation().split(refund);
    state.add_balance(&sender, sender_refund);
    if let Some(fee_payer) = tx.fee_payer() {
        state.add_balance(&fee_payer, payer_refund);
    }

    Ok(Receipt {
        status: outcome.status,
        gas_used,
        tx_hash: tx.hash(),
        contract_address: outcome.contract_address,
    })
}

fn transfer(state: &mut dyn StateWriter, from: &Address, to: &Address, amount: u128) -> bool {
    if !state.sub_balance(from, amount) {
        return false;
    }
    state.add_balance(to, amount);
    true
}

fn run(result: ExecutionResult, gas: u64) -> Outcome {
    if result.gas_used > gas {
        return Outcome {
            status: ReceiptStatus::ErrOutOfGas,
            gas_used: gas,
            contract_address: None,
        };
    }
    Outcome {
        status: result.status,
        gas_used: result.gas_used,
        contract_address: None,
    }
}

fn execute_body<S: StateWriter>(
    state: &mut S,
    executor: &dyn CodeExecutor,
    tx: &Transaction,
    sender: &Address,
    nonce: u64,
    gas: u64,
) -> Outcome {
    match tx.body() {
        TxBody::ValueTransfer { to, amount } | TxBody::ValueTransferMemo { to, amount, .. } => {
            if transfer(state, sender, to, *amount) {
                Outcome::status(ReceiptStatus::Successful)
            } else {
                Outcome::status(ReceiptStatus::ErrInsufficientBalance)
            }
        }
        TxBody::Legacy {
            to: Some(to),
            amount,
            data,
        }
        | TxBody::SmartContractExecution { to, amount, data } => {
            if !transfer(state, sender, to, *amount) {
                return Outcome::status(ReceiptStatus::ErrInsufficientBalance);
            }
            if state.is_program_account(to) {
                run(executor.call(state, sender, to, data, gas), gas)
            } else {
                Outcome::status(ReceiptStatus::Successful)
            }
        }
        TxBody::Legacy {
            to: None,
            amount,
            data: code,
        } => deploy(state, executor, sender, &create_address(sender, nonce), *amount, code, gas),
        TxBody::SmartContractDeploy {
            to, amount, code, ..
        } => {
            let address = to.unwrap_or_else(|| create_address(sender, nonce));
            deploy(state, executor, sender, &address, *amount, code, gas)
        }
        TxBody::AccountCreation { to, amount, key } => {
            if let Err(err) = key.check_installable() {
                return Outcome::status(err.into());
            }
            if !transfer(state, sender, to, *amount) {
                return Outcome::status(ReceiptStatus::ErrInsufficientBalance);
            }
            state.update_account(to, &mut |a| a.key = key.clone());
            Outcome::status(ReceiptStatus::Successful)
        }
        TxBody::AccountUpdate { key } => {
            if let Err(err) = key.check_installable() {
                return Outcome::status(err.into());
            }
            state.update_account(sender, &mut |a| a.key = key.clone());
            Outcome::status(ReceiptStatus::Successful)
        }
        TxBody::Cancel | TxBody::ChainDataAnchoring { .. } => {
            Outcome::status(ReceiptStatus::Successful)
        }
    }
}

fn deploy<S: StateWriter>(
    state: &mut S,
    executor: &dyn CodeExecutor,
    sender: &Address,
    address: &Address,
    amount: u128,
    code: &[u8],
    gas: u64,
) -> Outcome {
    if state.is_program_account(address) || state.nonce(address) > 0 {
        return Outcome::status(ReceiptStatus::ErrContractAddressCollision);
    }
    if !transfer(state, sender, address, amount) {
        return Outcome::status(ReceiptStatus::ErrInsufficientBalance);
    }
    let mut outcome = run(executor.create(state, sender, address, code, gas), gas);
    if outcome.status.is_successful() {
        outcome.contract_address = Some(*address);
    }
    outcome
}
