//! Wire messages: codes, payload types and channel routing.
//!
//! A message is a numeric code plus an opaque payload. Payloads of the
//! codes below are bincode encodings of the types in this module; codes
//! outside the table belong to the consensus engine and are passed through
//! untouched.

use {
    crate::error::{ErrCode, P2pError, Result},
    num_bigint::BigUint,
    num_enum::{IntoPrimitive, TryFromPrimitive},
    ranger_consensus::{Block, Header},
    ranger_primitives::Hash,
    serde::{de::DeserializeOwned, Deserialize, Serialize},
};

pub const PROTOCOL_VERSION: u32 = 65;

/// Number of message codes reserved by the protocol, including the
/// anchoring range `0x0c..=0x10`.
pub const PROTOCOL_LENGTH: u64 = 0x15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
pub enum MsgCode {
    Status = 0x00,
    NewBlockHashes = 0x01,
    BlockHeaderFetchRequest = 0x02,
    BlockHeaderFetchResponse = 0x03,
    BlockBodiesFetchRequest = 0x04,
    BlockBodiesFetchResponse = 0x05,
    Tx = 0x06,
    BlockHeadersRequest = 0x07,
    BlockHeaders = 0x08,
    BlockBodiesRequest = 0x09,
    BlockBodies = 0x0a,
    NewBlock = 0x0b,
    NodeDataRequest = 0x11,
    NodeData = 0x12,
    ReceiptsRequest = 0x13,
    Receipts = 0x14,
}

impl MsgCode {
    pub fn from_code(code: u64) -> Result<Self> {
        MsgCode::try_from(code)
            .map_err(|_| P2pError::protocol(ErrCode::InvalidMsgCode, format!("{code:#x}")))
    }
}

/// Channel that carries block data on a multi-channel connection.
pub const BLOCK_CHANNEL: usize = 1;
pub const DEFAULT_CHANNEL: usize = 0;

/// Fixed routing of message codes to channels. Block traffic gets its own
/// channel so large bodies do not delay transactions and status traffic.
pub fn channel_of_message(code: u64) -> usize {
    match MsgCode::try_from(code) {
        Ok(
            MsgCode::BlockHeadersRequest
            | MsgCode::BlockHeaders
            | MsgCode::BlockBodiesRequest
            | MsgCode::BlockBodies
            | MsgCode::NewBlockHashes
            | MsgCode::NewBlock
            | MsgCode::BlockHeaderFetchRequest
            | MsgCode::BlockHeaderFetchResponse
            | MsgCode::BlockBodiesFetchRequest
            | MsgCode::BlockBodiesFetchResponse,
        ) => BLOCK_CHANNEL,
        _ => DEFAULT_CHANNEL,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Msg {
    pub code: u64,
    pub payload: Vec<u8>,
}

impl Msg {
    pub fn new(code: u64, payload: Vec<u8>) -> Self {
        Self { code, payload }
    }

    pub fn encode<T: Serialize + ?Sized>(code: MsgCode, value: &T) -> Result<Self> {
        let payload = bincode::serialize(value).map_err(|err| P2pError::Codec(err.to_string()))?;
        Ok(Self::new(code.into(), payload))
    }

    /// Decode the payload, reporting failures as a protocol violation.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        bincode::deserialize(&self.payload).map_err(|err| {
            P2pError::protocol(ErrCode::Decode, format!("msg {:#x}: {err}", self.code))
        })
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

/// Role a node plays in the network.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    IntoPrimitive,
    TryFromPrimitive,
    Serialize,
    Deserialize,
)]
#[repr(u8)]
pub enum ConnType {
    ConsensusNode = 0,
    ProxyNode = 1,
    EndpointNode = 2,
}

impl ConnType {
    pub const ALL: [ConnType; 3] = [
        ConnType::ConsensusNode,
        ConnType::ProxyNode,
        ConnType::EndpointNode,
    ];
}

/// Payload of [`MsgCode::Status`], exchanged once at handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusData {
    pub protocol_version: u32,
    pub network_id: u64,
    pub total_score: BigUint,
    pub current_block: Hash,
    pub genesis_block: Hash,
    pub chain_id: BigUint,
}

/// One entry of [`MsgCode::NewBlockHashes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockAnnouncement {
    pub hash: Hash,
    pub number: u64,
}

/// Payload of [`MsgCode::NewBlock`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBlockData {
    pub block: Block,
    pub total_score: BigUint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashOrNumber {
    Hash(Hash),
    Number(u64),
}

/// Payload of [`MsgCode::BlockHeadersRequest`]: `amount` headers starting
/// at `origin`, stepping `skip + 1` blocks towards the head, or towards
/// genesis when `reverse` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetBlockHeadersData {
    pub origin: HashOrNumber,
    pub amount: u64,
    pub skip: u64,
    pub reverse: bool,
}

/// Payload of [`MsgCode::BlockHeaderFetchResponse`].
pub type FetchedHeader = Header;

#[cfg(test)]
mod tests {
    use {super::*, assert_matches::assert_matches, test_case::test_case};

    #[test_case(MsgCode::Status, DEFAULT_CHANNEL)]
    #[test_case(MsgCode::Tx, DEFAULT_CHANNEL)]
    #[test_case(MsgCode::NodeDataRequest, DEFAULT_CHANNEL)]
    #[test_case(MsgCode::Receipts, DEFAULT_CHANNEL)]
    #[test_case(MsgCode::BlockHeaders, BLOCK_CHANNEL)]
    #[test_case(MsgCode::BlockBodiesRequest, BLOCK_CHANNEL)]
    #[test_case(MsgCode::NewBlockHashes, BLOCK_CHANNEL)]
    #[test_case(MsgCode::NewBlock, BLOCK_CHANNEL)]
    fn test_channel_of_message(code: MsgCode, channel: usize) {
        assert_eq!(channel_of_message(code.into()), channel);
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(u64::from(MsgCode::Tx), 0x06);
        assert_eq!(u64::from(MsgCode::NewBlock), 0x0b);
        assert_eq!(u64::from(MsgCode::NodeDataRequest), 0x11);
        assert_eq!(u64::from(MsgCode::Receipts), 0x14);
        for reserved in 0x0c..=0x10 {
            assert_matches!(
                MsgCode::from_code(reserved),
                Err(P2pError::Protocol {
                    code: ErrCode::InvalidMsgCode,
                    ..
                })
            );
        }
    }

    #[test]
    fn test_decode_failure_is_protocol_error() {
        let msg = Msg::new(MsgCode::Status.into(), vec![1, 2, 3]);
        let err = msg.decode::<StatusData>().unwrap_err();
        assert_eq!(err.code(), Some(ErrCode::Decode));
    }
}
