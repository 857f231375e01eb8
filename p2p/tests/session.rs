use {
    assert_matches::assert_matches,
    async_trait::async_trait,
    num_bigint::BigUint,
    parking_lot::Mutex,
    ranger_p2p::{
        handshake,
        msg::{MsgCode, PROTOCOL_VERSION},
        new_peer, serve,
        transport::channel_pair,
        BasePeer, Channel, ConnType, ErrCode, Msg, MsgHandler, P2pConfig, P2pError, Peer,
        PeerSet, Result, StatusData,
    },
    ranger_primitives::{Address, Hash},
    std::{sync::Arc, time::Duration},
};

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<Msg>>,
}

#[async_trait]
impl MsgHandler for Recorder {
    async fn handle(&self, _peer: &Arc<dyn Peer>, msg: Msg) -> Result<()> {
        if msg.code == u64::from(MsgCode::Status) {
            return Err(P2pError::protocol(ErrCode::ExtraStatusMsg, "status after handshake"));
        }
        self.seen.lock().push(msg);
        Ok(())
    }
}

fn status() -> StatusData {
    StatusData {
        protocol_version: PROTOCOL_VERSION,
        network_id: 1,
        total_score: BigUint::from(1u8),
        current_block: Hash::new([1; 32]),
        genesis_block: Hash::new([1; 32]),
        chain_id: BigUint::from(1u8),
    }
}

fn base(id: &str, addr: u8) -> BasePeer {
    BasePeer::new(
        id,
        Address::new([addr; 20]),
        ConnType::ProxyNode,
        PROTOCOL_VERSION,
        &P2pConfig::dev_default(),
    )
}

fn pairs(n: usize) -> (Vec<Channel>, Vec<Channel>) {
    (0..n).map(|_| channel_pair(1024)).unzip()
}

#[tokio::test]
async fn test_single_channel_session_in_order() {
    let config = P2pConfig::dev_default();
    let (local, remote) = pairs(1);
    let (peer, mut readers) = new_peer(base("local", 1), local);
    let (remote_peer, mut remote_readers) = new_peer(base("remote", 2), remote);

    let local_status = status();
    let remote_status = status();
    let (a, b) = tokio::join!(
        handshake(peer.as_ref(), &mut readers, &local_status, config.handshake_timeout),
        handshake(
            remote_peer.as_ref(),
            &mut remote_readers,
            &remote_status,
            config.handshake_timeout
        ),
    );
    a.unwrap();
    b.unwrap();

    let set = PeerSet::new(config.max_peers);
    set.register(peer.clone()).unwrap();

    let recorder = Arc::new(Recorder::default());
    let session = tokio::spawn({
        let peer = peer.clone();
        let recorder = recorder.clone();
        let config = config.clone();
        async move { serve(peer, readers, recorder, &config).await }
    });

    for i in 0..20u8 {
        remote_peer
            .send(&Msg::new(MsgCode::Tx.into(), vec![i]))
            .await
            .unwrap();
    }
    tokio::time::timeout(Duration::from_secs(2), async {
        while recorder.seen.lock().len() < 20 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    let payloads: Vec<u8> = recorder.seen.lock().iter().map(|m| m.payload[0]).collect();
    assert_eq!(payloads, (0..20).collect::<Vec<u8>>());

    // A second status message is a protocol violation that ends the session.
    remote_peer
        .send(&Msg::encode(MsgCode::Status, &status()).unwrap())
        .await
        .unwrap();
    let err = tokio::time::timeout(Duration::from_secs(2), session)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(err.code(), Some(ErrCode::ExtraStatusMsg));
    set.unregister("local").unwrap();
}

#[tokio::test]
async fn test_multi_channel_reader_error_tears_down_session() {
    let config = P2pConfig::dev_default();
    let (local, remote) = pairs(2);
    let (peer, readers) = new_peer(base("local", 1), local);
    let (remote_peer, remote_readers) = new_peer(base("remote", 2), remote);
    assert_eq!(peer.num_channels(), 2);

    let recorder = Arc::new(Recorder::default());
    let session = tokio::spawn({
        let peer = peer.clone();
        let recorder = recorder.clone();
        let config = config.clone();
        async move { serve(peer, readers, recorder, &config).await }
    });

    remote_peer
        .send(&Msg::new(MsgCode::NewBlock.into(), vec![1]))
        .await
        .unwrap();
    remote_peer
        .send(&Msg::new(MsgCode::Tx.into(), vec![2]))
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while recorder.seen.lock().len() < 2 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    // Dropping the remote end fails both readers; the first error wins.
    drop(remote_peer);
    drop(remote_readers);
    let err = tokio::time::timeout(Duration::from_secs(2), session)
        .await
        .unwrap()
        .unwrap();
    assert_matches!(err, P2pError::Io(_));
}

#[tokio::test]
async fn test_closing_peer_ends_session() {
    let config = P2pConfig::dev_default();
    let (local, _remote) = pairs(1);
    let (peer, readers) = new_peer(base("local", 1), local);
    let session = tokio::spawn({
        let peer = peer.clone();
        let config = config.clone();
        async move { serve(peer, readers, Arc::new(Recorder::default()), &config).await }
    });
    peer.close();
    let err = tokio::time::timeout(Duration::from_secs(2), session)
        .await
        .unwrap()
        .unwrap();
    assert_matches!(err, P2pError::Closed);
}
