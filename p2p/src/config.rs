//! Configuration for peer sessions.

use std::time::Duration;

/// Maximum payload of a single wire message.
pub const MAX_MSG_SIZE: usize = 10 * 1024 * 1024;

/// Settings shared by every peer session.
///
/// Queue bounds are counted in queued items, not bytes. A full queue drops
/// the new item rather than blocking the producer.
#[derive(Debug, Clone)]
pub struct P2pConfig {
    /// How long the status exchange may take before the peer is dropped.
    pub handshake_timeout: Duration,

    pub max_msg_size: usize,

    /// Capacity of the per-peer cache of transaction hashes the peer has seen.
    pub known_txs: usize,

    /// Capacity of the per-peer cache of block hashes the peer has seen.
    pub known_blocks: usize,

    /// Transaction batches queued for broadcast to one peer.
    pub max_queued_txs: usize,

    /// Full blocks queued for propagation to one peer.
    pub max_queued_props: usize,

    /// Block announcements queued for one peer.
    pub max_queued_anns: usize,

    /// Inbound buffer per channel; a multi-channel peer's shared inbound
    /// queue holds this many messages per channel.
    pub channel_size_per_peer: usize,

    /// Tasks decoding and dispatching inbound messages of one
    /// multi-channel peer. Single-channel peers always use one.
    pub workers_per_peer: usize,

    pub max_peers: usize,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            max_msg_size: MAX_MSG_SIZE,
            known_txs: 32_768,
            known_blocks: 1_024,
            max_queued_txs: 128,
            max_queued_props: 4,
            max_queued_anns: 4,
            channel_size_per_peer: 20,
            workers_per_peer: 4,
            max_peers: 25,
        }
    }
}

impl P2pConfig {
    /// Small caches and a short handshake timeout for in-process tests.
    #[cfg(any(test, feature = "dev-context-only-utils"))]
    pub fn dev_default() -> Self {
        Self {
            handshake_timeout: Duration::from_millis(500),
            known_txs: 64,
            known_blocks: 16,
            max_peers: 8,
            ..Self::default()
        }
    }
}
