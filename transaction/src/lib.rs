//! Ranger transactions.
//!
//! A [`Transaction`] is a tagged union of basic types (value transfer,
//! account creation/update, contract deploy/execution, cancel, chain data
//! anchoring, legacy), each optionally fee-delegated with or without a
//! [`FeeRatio`]. Transactions are built from a typed field map, signed by
//! a chain-bound [`Signer`], and checked at two points:
//!
//! * [`validate_for_pool`] before admission to a transaction pool;
//! * [`validate_for_block`] when applied, via [`apply_transaction`].
//!
//! Rejections are [`TxError`]s. Failures found while executing an
//! includable transaction are recorded as a [`ReceiptStatus`] instead, and
//! the transaction still pays for gas.

pub mod error;
pub mod execution;
pub mod gas;
pub mod receipt;
pub mod signer;
pub mod state;
pub mod tx;
pub mod types;
pub mod validation;

pub use {
    error::{Result, TxError},
    execution::{apply_transaction, create_address, CodeExecutor, ExecutionResult, NoopExecutor},
    gas::intrinsic_gas,
    receipt::{Receipt, ReceiptStatus},
    signer::{Signer, TxSignature},
    state::{Account, MemoryState, StateReader, StateWriter},
    tx::{Transaction, TxBody, TxData, TxValue, TxValueKey},
    types::{BasicType, CodeFormat, FeeDelegation, FeeMode, FeeRatio, TxType},
    validation::{validate_for_block, validate_for_pool, ValidatedTx, ValidationConfig},
};
