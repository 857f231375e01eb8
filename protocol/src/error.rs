//! Error types for the protocol manager.

use {
    crate::config::ConfigError, ranger_consensus::ChainError, ranger_p2p::P2pError,
    thiserror::Error,
};

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),

    /// The peer session failed or ended.
    #[error("peer error: {0}")]
    P2p(#[from] P2pError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("failed to spawn thread: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol manager stopped")]
    Stopped,
}

/// Convenience result type for protocol manager operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
