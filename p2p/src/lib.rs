//! Ranger peer sessions.
//!
//! A session is opened by [`handshake`], registered in the [`PeerSet`]
//! (which starts its broadcast loop) and served by [`dispatch::serve`]
//! until it fails or is closed.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`]     | `P2pConfig` defaults and dev overrides |
//! | [`msg`]        | Message codes, payload types, channel routing |
//! | [`transport`]  | Length-prefixed framing over async streams |
//! | [`peer`]       | Peer state, queues, single/multi-channel variants |
//! | [`handshake`]  | Status exchange and mismatch checks |
//! | [`dispatch`]   | Per-peer reader and worker tasks |
//! | [`peer_set`]   | Role-partitioned registry and gossip queries |
//! | [`error`]      | Crate-wide error enum and protocol error codes |

pub mod config;
pub mod dispatch;
pub mod error;
pub mod handshake;
pub mod known_cache;
pub mod msg;
pub mod peer;
pub mod peer_set;
pub mod transport;

pub use {
    config::P2pConfig,
    dispatch::{serve, MsgHandler},
    error::{ErrCode, P2pError, Result},
    handshake::handshake,
    msg::{ConnType, Msg, MsgCode, StatusData},
    peer::{new_peer, BasePeer, Peer, PeerStats, PeerStatsSnapshot},
    peer_set::{NoopValidator, PeerSet, PeerValidator},
    transport::{Channel, MsgReader, MsgWriter},
};
