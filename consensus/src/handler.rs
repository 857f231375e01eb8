//! Hook through which a consensus engine receives its own wire messages.

use {
    crate::{error::Result, types::Block},
    ranger_primitives::Address,
};

/// Consensus message sink. The protocol manager offers every inbound
/// message to the handler before its own dispatch; a message the handler
/// consumes is not processed further.
pub trait Handler: Send + Sync {
    /// Returns `Ok(true)` when the message was consumed.
    fn handle_msg(&self, peer: &Address, code: u64, payload: &[u8]) -> Result<bool>;

    /// Called after a new block has become the chain head.
    fn new_chain_head(&self, block: &Block);
}

/// Handler for nodes without consensus traffic: consumes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl Handler for NoopHandler {
    fn handle_msg(&self, _peer: &Address, _code: u64, _payload: &[u8]) -> Result<bool> {
        Ok(false)
    }

    fn new_chain_head(&self, _block: &Block) {}
}
