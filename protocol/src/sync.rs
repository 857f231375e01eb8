//! Hooks for the block synchronizer.
//!
//! The synchronizer itself lives outside this crate. The protocol manager
//! tells it about peers coming and going and forwards every response and
//! announcement it does not handle itself. When a peer is unregistered the
//! synchronizer should cancel whatever it still expects from that peer.

use {
    ranger_consensus::{Body, Header},
    ranger_p2p::{msg::BlockAnnouncement, Peer},
    ranger_transaction::Receipt,
    std::sync::Arc,
};

pub trait SyncHandler: Send + Sync {
    fn register_peer(&self, _peer: &Arc<dyn Peer>) {}

    fn unregister_peer(&self, _id: &str) {}

    fn deliver_headers(&self, _peer: &str, _headers: Vec<Header>) {}

    fn deliver_bodies(&self, _peer: &str, _bodies: Vec<Body>) {}

    fn deliver_fetched_header(&self, _peer: &str, _header: Header) {}

    fn deliver_fetched_bodies(&self, _peer: &str, _bodies: Vec<Body>) {}

    fn deliver_node_data(&self, _peer: &str, _data: Vec<Vec<u8>>) {}

    fn deliver_receipts(&self, _peer: &str, _receipts: Vec<Vec<Receipt>>) {}

    /// Blocks announced by `peer` that are not in the local chain, or full
    /// blocks whose parent is unknown.
    fn notify_announcements(&self, _peer: &str, _announcements: Vec<BlockAnnouncement>) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSync;

impl SyncHandler for NoopSync {}
