//! Configuration for the protocol manager.

use {
    ranger_p2p::{msg::PROTOCOL_VERSION, ConnType, P2pConfig},
    thiserror::Error,
};

/// Protocol versions this node can speak.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[u32] = &[PROTOCOL_VERSION];

#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Must match the remote's network id at handshake.
    pub network_id: u64,
    pub chain_id: u64,
    /// Role of this node; decides which peers receive our transactions.
    pub node_type: ConnType,
    pub protocol_version: u32,
    /// Transactions per batch when syncing the pool to a new peer.
    pub tx_sync_batch: usize,
    pub p2p: P2pConfig,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            network_id: 1,
            chain_id: 1,
            node_type: ConnType::EndpointNode,
            protocol_version: PROTOCOL_VERSION,
            tx_sync_batch: 256,
            p2p: P2pConfig::default(),
        }
    }
}

impl ProtocolConfig {
    #[cfg(any(test, feature = "dev-context-only-utils"))]
    pub fn dev_default(node_type: ConnType) -> Self {
        Self {
            node_type,
            tx_sync_batch: 4,
            p2p: P2pConfig::dev_default(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&self.protocol_version) {
            return Err(ConfigError::UnsupportedProtocolVersion(
                self.protocol_version,
            ));
        }
        if self.p2p.max_peers == 0 {
            return Err(ConfigError::ZeroMaxPeers);
        }
        if self.p2p.workers_per_peer == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.tx_sync_batch == 0 {
            return Err(ConfigError::ZeroTxSyncBatch);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unsupported protocol version {0}")]
    UnsupportedProtocolVersion(u32),
    #[error("max_peers must be > 0")]
    ZeroMaxPeers,
    #[error("workers_per_peer must be > 0")]
    ZeroWorkers,
    #[error("tx_sync_batch must be > 0")]
    ZeroTxSyncBatch,
}
