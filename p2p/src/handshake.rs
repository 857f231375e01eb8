//! Status exchange that opens every session.

use {
    crate::{
        error::{ErrCode, P2pError, Result},
        msg::{Msg, MsgCode, StatusData},
        peer::Peer,
        transport::MsgReader,
    },
    log::*,
    std::time::Duration,
    tokio::time,
};

/// Send our status on every channel while reading the remote's from every
/// reader. Both sides must finish within `timeout`.
///
/// On success the peer's head is set from the remote status.
pub async fn handshake(
    peer: &dyn Peer,
    readers: &mut [Box<dyn MsgReader>],
    local: &StatusData,
    timeout: Duration,
) -> Result<StatusData> {
    let msg = Msg::encode(MsgCode::Status, local)?;
    let send = async {
        for channel in 0..peer.num_channels() {
            peer.send_on_channel(channel, &msg).await?;
        }
        Ok::<_, P2pError>(())
    };
    let read = async {
        let mut remote = None;
        for reader in readers.iter_mut() {
            let status = read_status(reader.as_mut(), local).await?;
            remote.get_or_insert(status);
        }
        remote.ok_or_else(|| P2pError::protocol(ErrCode::NoStatusMsg, "no channels"))
    };

    let status = match time::timeout(timeout, async { tokio::try_join!(send, read) }).await {
        Ok(Ok(((), status))) => status,
        Ok(Err(err)) => {
            debug!("peer {}: handshake failed: {err}", peer.base().id());
            return Err(err);
        }
        Err(_) => {
            debug!("peer {}: handshake timed out", peer.base().id());
            return Err(P2pError::ReadTimeout);
        }
    };
    peer.base()
        .set_head(status.current_block, status.total_score.clone());
    Ok(status)
}

/// Read one status message and check it against ours. Mismatches are
/// reported most specific first: genesis, network, chain, version.
pub async fn read_status(reader: &mut dyn MsgReader, local: &StatusData) -> Result<StatusData> {
    let msg = reader.read_msg().await?;
    if msg.code != u64::from(MsgCode::Status) {
        return Err(P2pError::protocol(
            ErrCode::NoStatusMsg,
            format!("first msg has code {:#x}", msg.code),
        ));
    }
    let status: StatusData = msg.decode()?;
    if status.genesis_block != local.genesis_block {
        return Err(P2pError::protocol(
            ErrCode::GenesisBlockMismatch,
            format!("{} (!= {})", status.genesis_block, local.genesis_block),
        ));
    }
    if status.network_id != local.network_id {
        return Err(P2pError::protocol(
            ErrCode::NetworkIdMismatch,
            format!("{} (!= {})", status.network_id, local.network_id),
        ));
    }
    if status.chain_id != local.chain_id {
        return Err(P2pError::protocol(
            ErrCode::ChainIdMismatch,
            format!("{} (!= {})", status.chain_id, local.chain_id),
        ));
    }
    if status.protocol_version != local.protocol_version {
        return Err(P2pError::protocol(
            ErrCode::ProtocolVersionMismatch,
            format!("{} (!= {})", status.protocol_version, local.protocol_version),
        ));
    }
    Ok(status)
}
