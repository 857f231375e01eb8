//! Blocks, the consensus engine interface and the chain store.
//!
//! The BFT round machinery is not part of this crate: it plugs in through
//! [`Engine`] (block preparation, sealing and header verification) and
//! [`Handler`] (consensus wire messages). [`DummyEngine`] stands in when
//! no real engine is configured.

pub mod chain;
pub mod engine;
pub mod error;
pub mod handler;
pub mod types;

pub use {
    chain::{ChainReader, ChainStore},
    engine::{DummyEngine, Engine},
    error::{ChainError, Result},
    handler::{Handler, NoopHandler},
    types::{receipt_root, tx_root, Block, Body, Header},
};
