//! Error types for peer sessions.

use {
    num_enum::{IntoPrimitive, TryFromPrimitive},
    std::fmt,
    thiserror::Error,
};

/// Stable codes for protocol violations. Any of them ends the session
/// with the offending peer and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ErrCode {
    MsgTooLarge = 0,
    Decode = 1,
    InvalidMsgCode = 2,
    ProtocolVersionMismatch = 3,
    NetworkIdMismatch = 4,
    GenesisBlockMismatch = 5,
    NoStatusMsg = 6,
    ExtraStatusMsg = 7,
    ChainIdMismatch = 8,
    UnexpectedNodeType = 9,
}

impl fmt::Display for ErrCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrCode::MsgTooLarge => "message too long",
            ErrCode::Decode => "invalid message",
            ErrCode::InvalidMsgCode => "invalid message code",
            ErrCode::ProtocolVersionMismatch => "protocol version mismatch",
            ErrCode::NetworkIdMismatch => "network id mismatch",
            ErrCode::GenesisBlockMismatch => "genesis block mismatch",
            ErrCode::NoStatusMsg => "no status message",
            ErrCode::ExtraStatusMsg => "extra status message",
            ErrCode::ChainIdMismatch => "chain id mismatch",
            ErrCode::UnexpectedNodeType => "unexpected node type",
        };
        f.write_str(text)
    }
}

#[derive(Error, Debug)]
pub enum P2pError {
    #[error("{code}: {reason}")]
    Protocol { code: ErrCode, reason: String },

    #[error("handshake read timeout")]
    ReadTimeout,

    #[error("peer already registered")]
    AlreadyRegistered,

    #[error("peer not registered")]
    NotRegistered,

    #[error("too many peers (max {0})")]
    TooManyPeers(usize),

    #[error("peer rejected: {0}")]
    Rejected(String),

    /// The peer set or the peer session has been closed.
    #[error("closed")]
    Closed,

    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(String),
}

impl P2pError {
    pub fn protocol(code: ErrCode, reason: impl Into<String>) -> Self {
        P2pError::Protocol {
            code,
            reason: reason.into(),
        }
    }

    /// The protocol error code, if this is a protocol violation.
    pub fn code(&self) -> Option<ErrCode> {
        match self {
            P2pError::Protocol { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Convenience result type for peer session operations.
pub type Result<T> = std::result::Result<T, P2pError>;
