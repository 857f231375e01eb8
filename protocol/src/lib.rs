//! Ranger protocol manager.
//!
//! Ties peer sessions from `ranger-p2p` to the chain store, the transaction
//! pool and the consensus engine.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`]  | `ProtocolConfig` and validation |
//! | [`manager`] | Session lifecycle, message dispatch, propagation |
//! | [`sync`]    | Hooks for the external block synchronizer |
//! | [`error`]   | Crate-wide error enum |

pub mod config;
pub mod error;
pub mod manager;
pub mod sync;

pub use {
    config::{ConfigError, ProtocolConfig, SUPPORTED_PROTOCOL_VERSIONS},
    error::{ProtocolError, Result},
    manager::{
        accepts_peer, tx_targets, ProtocolManager, ProtocolStats, ProtocolStatsSnapshot,
    },
    sync::{NoopSync, SyncHandler},
};
