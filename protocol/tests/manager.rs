use {
    assert_matches::assert_matches,
    num_bigint::BigUint,
    parking_lot::{Mutex, RwLock},
    ranger_account_key::SecretKey,
    ranger_consensus::{
        Block, ChainReader, ChainStore, DummyEngine, Engine, Handler, Header, NoopHandler,
    },
    ranger_p2p::{
        handshake,
        msg::{MsgCode, PROTOCOL_VERSION},
        new_peer,
        transport::channel_pair,
        BasePeer, ConnType, ErrCode, Msg, MsgReader, P2pConfig, P2pError, Peer, StatusData,
    },
    ranger_primitives::{Address, Hash},
    ranger_protocol::{NoopSync, ProtocolConfig, ProtocolError, ProtocolManager, SyncHandler},
    ranger_storage::MemoryDatabase,
    ranger_transaction::{
        FeeDelegation, MemoryState, Receipt, ReceiptStatus, Signer, StateWriter, Transaction,
        TxBody, TxData,
    },
    ranger_tx_pool::{TxPool, TxPoolConfig},
    std::{sync::Arc, time::Duration},
    tokio::task::JoinHandle,
};

struct Node {
    manager: Arc<ProtocolManager>,
    chain: Arc<ChainStore>,
    pool: Arc<TxPool>,
    engine: DummyEngine,
    address: Address,
}

fn genesis(extra: &[u8]) -> Block {
    Block::new(
        Header {
            time: 1_000,
            extra: extra.to_vec(),
            ..Header::default()
        },
        Vec::new(),
    )
}

fn funded_state() -> Arc<RwLock<MemoryState>> {
    let mut state = MemoryState::new();
    state.add_balance(&SecretKey::from_seed(b"alice").address(), 1_000_000_000);
    Arc::new(RwLock::new(state))
}

fn node_with(
    node_type: ConnType,
    addr: u8,
    genesis_extra: &[u8],
    consensus: Arc<dyn Handler>,
    sync: Arc<dyn SyncHandler>,
) -> Node {
    let chain = Arc::new(ChainStore::new(Arc::new(MemoryDatabase::new())).unwrap());
    chain.init_genesis(&genesis(genesis_extra)).unwrap();
    let pool = Arc::new(TxPool::new(TxPoolConfig::dev_default(), funded_state()));
    let address = Address::new([addr; 20]);
    let manager = ProtocolManager::new(
        ProtocolConfig::dev_default(node_type),
        chain.clone(),
        Arc::new(DummyEngine::new(address)),
        consensus,
        pool.clone(),
        sync,
    )
    .unwrap();
    manager.start().unwrap();
    Node {
        manager: Arc::new(manager),
        chain,
        pool,
        engine: DummyEngine::new(address),
        address,
    }
}

fn node(node_type: ConnType, addr: u8) -> Node {
    node_with(
        node_type,
        addr,
        b"ranger genesis",
        Arc::new(NoopHandler),
        Arc::new(NoopSync),
    )
}

fn base(id: &str, address: Address, conn_type: ConnType) -> BasePeer {
    BasePeer::new(
        id,
        address,
        conn_type,
        PROTOCOL_VERSION,
        &P2pConfig::dev_default(),
    )
}

/// Run `node` against a remote described by (`id`, `address`, `conn_type`)
/// over one side of a fresh channel; returns the other side.
fn spawn_session(
    node: &Node,
    id: &str,
    address: Address,
    conn_type: ConnType,
) -> (JoinHandle<ProtocolError>, ranger_p2p::Channel) {
    let (local, remote) = channel_pair(1 << 20);
    let manager = node.manager.clone();
    let base = base(id, address, conn_type);
    let session = tokio::spawn(async move { manager.handle_peer(base, vec![local]).await });
    (session, remote)
}

fn connect(
    a: &Node,
    a_id: &str,
    b: &Node,
    b_id: &str,
) -> (JoinHandle<ProtocolError>, JoinHandle<ProtocolError>) {
    let (local, remote) = channel_pair(1 << 20);
    let (a_manager, b_manager) = (a.manager.clone(), b.manager.clone());
    let base_of_b = base(b_id, b.address, ConnType::ProxyNode);
    let base_of_a = base(a_id, a.address, ConnType::ProxyNode);
    (
        tokio::spawn(async move { a_manager.handle_peer(base_of_b, vec![local]).await }),
        tokio::spawn(async move { b_manager.handle_peer(base_of_a, vec![remote]).await }),
    )
}

async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

fn status_of(node: &Node) -> StatusData {
    node.manager.local_status().unwrap()
}

/// Handshake a bare peer against `node` and return it with its reader.
async fn raw_peer(
    node: &Node,
    conn_type: ConnType,
) -> (Arc<dyn Peer>, Box<dyn MsgReader>, JoinHandle<ProtocolError>) {
    let remote_address = Address::new([0xee; 20]);
    let (session, channel) = spawn_session(node, "raw", remote_address, conn_type);
    let (peer, mut readers) = new_peer(
        base("node", node.address, ConnType::ProxyNode),
        vec![channel],
    );
    handshake(
        peer.as_ref(),
        &mut readers,
        &status_of(node),
        Duration::from_secs(1),
    )
    .await
    .unwrap();
    let reader = readers.remove(0);
    (peer, reader, session)
}

async fn expect(reader: &mut Box<dyn MsgReader>, code: MsgCode) -> Msg {
    let msg = tokio::time::timeout(Duration::from_secs(1), reader.read_msg())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(msg.code, u64::from(code));
    msg
}

fn signed_cancel(nonce: u64) -> Transaction {
    let alice = SecretKey::from_seed(b"alice");
    let mut tx = Transaction::new(TxData {
        nonce,
        gas_price: 1,
        gas_limit: 21_000,
        from: Some(alice.address()),
        body: TxBody::Cancel,
        fee_delegation: FeeDelegation::None,
    })
    .unwrap();
    Signer::new(1).sign(&mut tx, &[&alice]);
    tx
}

fn produce(node: &Node, receipts: &[Receipt]) -> Block {
    let chain: &ChainStore = &node.chain;
    let parent = chain.current_header().unwrap();
    let mut header = Header {
        parent_hash: parent.hash(),
        time: parent.time.saturating_add(1),
        ..Header::default()
    };
    node.engine.prepare(chain, &mut header).unwrap();
    let block = node
        .engine
        .finalize(chain, header, Vec::new(), receipts)
        .unwrap();
    node.engine.seal(chain, block).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_transactions_relay_between_proxies() {
    let _ = env_logger::builder().is_test(true).try_init();
    let a = node(ConnType::ProxyNode, 1);
    let b = node(ConnType::ProxyNode, 2);
    let (_, _) = connect(&a, "a", &b, "b");
    wait_for("registration", || {
        a.manager.peers().len() == 1 && b.manager.peers().len() == 1
    })
    .await;

    let tx = signed_cancel(0);
    let hash = tx.hash();
    a.pool.add(tx).unwrap();
    wait_for("relay", || b.pool.contains(&hash)).await;

    // Relaying marks the transaction known for the receiving peer.
    let a_view_of_b = a.manager.peers().peer("b").unwrap();
    assert!(a_view_of_b.base().knows_transaction(&hash));
    assert!(b.manager.stats().txs_received >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pending_transactions_synced_to_new_peer() {
    let a = node(ConnType::ProxyNode, 1);
    let b = node(ConnType::ProxyNode, 2);
    let hashes: Vec<Hash> = (0..6)
        .map(|nonce| {
            let tx = signed_cancel(nonce);
            let hash = tx.hash();
            a.pool.add(tx).unwrap();
            hash
        })
        .collect();

    let (_, _) = connect(&a, "a", &b, "b");
    wait_for("pool sync", || hashes.iter().all(|hash| b.pool.contains(hash))).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_committed_block_imported_by_peer() {
    let a = node(ConnType::ProxyNode, 1);
    let b = node(ConnType::ProxyNode, 2);
    let (_, _) = connect(&a, "a", &b, "b");
    wait_for("registration", || b.manager.peers().len() == 1).await;

    let block = produce(&a, &[]);
    let total = a.manager.commit_block(block.clone(), &[]).unwrap();
    assert_eq!(total, BigUint::from(2u8));

    wait_for("import", || {
        b.chain.current_header().map(|head| head.hash()) == Some(block.hash())
    })
    .await;
    assert_eq!(b.chain.total_score(&block.hash()).unwrap(), Some(total));
    assert_eq!(b.manager.stats().blocks_imported, 1);
    assert!(a
        .manager
        .peers()
        .peer("b")
        .unwrap()
        .base()
        .knows_block(&block.hash()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_requests_are_served_from_the_chain() {
    let a = node(ConnType::ProxyNode, 1);
    let receipts = vec![Receipt {
        status: ReceiptStatus::Successful,
        gas_used: 21_000,
        tx_hash: Hash::new([3; 32]),
        contract_address: None,
    }];
    let mut blocks = Vec::new();
    for i in 0..4 {
        let block = produce(&a, if i == 0 { &receipts } else { &[] });
        a.manager
            .commit_block(block.clone(), if i == 0 { &receipts } else { &[] })
            .unwrap();
        blocks.push(block);
    }
    let trie_node = a.chain.put_node_data(b"trie node").unwrap();

    let (peer, mut reader, _session) = raw_peer(&a, ConnType::ProxyNode).await;

    peer.request_headers_by_number(4, 3, 1, true).await.unwrap();
    let headers: Vec<Header> = expect(&mut reader, MsgCode::BlockHeaders).await.decode().unwrap();
    assert_eq!(
        headers.iter().map(|header| header.number).collect::<Vec<_>>(),
        vec![4, 2, 0]
    );

    peer.request_headers_by_hash(blocks[0].hash(), 10, 0, false)
        .await
        .unwrap();
    let headers: Vec<Header> = expect(&mut reader, MsgCode::BlockHeaders).await.decode().unwrap();
    assert_eq!(headers.len(), 4);

    let unknown = Hash::new([0xab; 32]);
    peer.request_bodies(&[blocks[1].hash(), unknown]).await.unwrap();
    let bodies: Vec<ranger_consensus::Body> =
        expect(&mut reader, MsgCode::BlockBodies).await.decode().unwrap();
    assert_eq!(bodies.len(), 1);

    peer.fetch_block_header(blocks[2].hash()).await.unwrap();
    let header: Header = expect(&mut reader, MsgCode::BlockHeaderFetchResponse)
        .await
        .decode()
        .unwrap();
    assert_eq!(header.hash(), blocks[2].hash());

    peer.request_node_data(&[trie_node]).await.unwrap();
    let data: Vec<Vec<u8>> = expect(&mut reader, MsgCode::NodeData).await.decode().unwrap();
    assert_eq!(data, vec![b"trie node".to_vec()]);

    peer.request_receipts(&[blocks[0].hash()]).await.unwrap();
    let served: Vec<Vec<Receipt>> = expect(&mut reader, MsgCode::Receipts).await.decode().unwrap();
    assert_eq!(served, vec![receipts]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_genesis_mismatch_rejected() {
    let a = node(ConnType::ProxyNode, 1);
    let b = node_with(
        ConnType::ProxyNode,
        2,
        b"another network",
        Arc::new(NoopHandler),
        Arc::new(NoopSync),
    );
    let (a_session, b_session) = connect(&a, "a", &b, "b");
    let err = a_session.await.unwrap();
    assert_matches!(
        err,
        ProtocolError::P2p(P2pError::Protocol {
            code: ErrCode::GenesisBlockMismatch,
            ..
        })
    );
    let _ = b_session.await;
    assert!(a.manager.peers().is_empty());
    assert!(b.manager.peers().is_empty());
}

#[tokio::test]
async fn test_consensus_node_refuses_endpoint_node() {
    let cn = node(ConnType::ConsensusNode, 1);
    let (session, _remote) =
        spawn_session(&cn, "en", Address::new([9; 20]), ConnType::EndpointNode);
    assert_matches!(
        session.await.unwrap(),
        ProtocolError::P2p(P2pError::Protocol {
            code: ErrCode::UnexpectedNodeType,
            ..
        })
    );
}

#[derive(Default)]
struct RecordingSync {
    events: Mutex<Vec<String>>,
}

impl SyncHandler for RecordingSync {
    fn register_peer(&self, peer: &Arc<dyn Peer>) {
        self.events.lock().push(format!("register {}", peer.id()));
    }

    fn unregister_peer(&self, id: &str) {
        self.events.lock().push(format!("unregister {id}"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_code_disconnects_and_unregisters() {
    let sync = Arc::new(RecordingSync::default());
    let a = node_with(
        ConnType::ProxyNode,
        1,
        b"ranger genesis",
        Arc::new(NoopHandler),
        sync.clone(),
    );
    let (peer, _reader, session) = raw_peer(&a, ConnType::ProxyNode).await;
    wait_for("registration", || a.manager.peers().len() == 1).await;

    peer.send(&Msg::new(0x0c, Vec::new())).await.unwrap();
    assert_matches!(
        session.await.unwrap(),
        ProtocolError::P2p(P2pError::Protocol {
            code: ErrCode::InvalidMsgCode,
            ..
        })
    );
    assert!(a.manager.peers().is_empty());
    assert_eq!(
        *sync.events.lock(),
        vec!["register raw".to_string(), "unregister raw".to_string()]
    );
    assert_eq!(a.manager.stats().bad_msgs, 1);
}

const VOTE_CODE: u64 = 0x20;

#[derive(Default)]
struct VoteCollector {
    votes: Mutex<Vec<(Address, Vec<u8>)>>,
}

impl Handler for VoteCollector {
    fn handle_msg(
        &self,
        peer: &Address,
        code: u64,
        payload: &[u8],
    ) -> ranger_consensus::Result<bool> {
        if code != VOTE_CODE {
            return Ok(false);
        }
        self.votes.lock().push((*peer, payload.to_vec()));
        Ok(true)
    }

    fn new_chain_head(&self, _block: &Block) {}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_consensus_handler_consumes_its_codes() {
    let votes = Arc::new(VoteCollector::default());
    let cn = node_with(
        ConnType::ConsensusNode,
        1,
        b"ranger genesis",
        votes.clone(),
        Arc::new(NoopSync),
    );
    let (peer, mut reader, _session) = raw_peer(&cn, ConnType::ConsensusNode).await;

    peer.send(&Msg::new(VOTE_CODE, b"vote".to_vec())).await.unwrap();
    let genesis = cn.chain.genesis_hash().unwrap();
    peer.fetch_block_header(genesis).await.unwrap();
    let header: Header = expect(&mut reader, MsgCode::BlockHeaderFetchResponse)
        .await
        .decode()
        .unwrap();
    assert_eq!(header.hash(), genesis);

    wait_for("vote", || !votes.votes.lock().is_empty()).await;
    assert_eq!(
        *votes.votes.lock(),
        vec![(Address::new([0xee; 20]), b"vote".to_vec())]
    );
    assert_eq!(cn.manager.stats().consensus_msgs, 1);
}
