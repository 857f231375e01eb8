//! Ranger transaction pools.
//!
//! * [`BridgeTxPool`] holds locally submitted transactions bound for the
//!   parent chain. It rejects known hashes and duplicate nonces, enforces a
//!   global capacity, and mirrors itself to an on-disk [`TxJournal`] that
//!   is replayed on start, rotated on a timer and rotated once more on
//!   [`BridgeTxPool::stop`].
//! * [`TxPool`] admits transactions from users and peers through
//!   pool-time validation and serves executable (`pending`) and gapped
//!   (`queued`) transactions per account.
//!
//! Both keep each account's transactions in a nonce-ordered
//! [`TxSortedMap`].

pub mod bridge_pool;
pub mod config;
pub mod error;
pub mod journal;
pub mod sorted_map;
pub mod tx_pool;

pub use {
    bridge_pool::{BridgeTxPool, BridgeTxPoolStats, BridgeTxPoolStatsSnapshot},
    config::{BridgeTxPoolConfig, TxPoolConfig, DEFAULT_GLOBAL_QUEUE, MIN_JOURNAL_INTERVAL},
    error::{Result, TxPoolError},
    journal::TxJournal,
    sorted_map::TxSortedMap,
    tx_pool::TxPool,
};
