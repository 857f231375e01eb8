//! The protocol manager.
//!
//! Owns the peer set and glues sessions to the chain, the transaction pool
//! and the consensus engine:
//!
//! - [`ProtocolManager::handle_peer`] runs one session from handshake to
//!   removal;
//! - inbound messages go to the consensus [`Handler`] first, then to the
//!   request servers, the pool or the block importer;
//! - a broadcast thread relays newly pooled transactions to peers chosen
//!   by node role;
//! - imported and locally committed blocks are propagated in full to the
//!   square root of the peers lacking them and announced to the rest.

use {
    crate::{
        config::ProtocolConfig,
        error::{ProtocolError, Result},
        sync::SyncHandler,
    },
    async_trait::async_trait,
    crossbeam_channel::{bounded, select, Receiver, Sender},
    log::*,
    num_bigint::BigUint,
    parking_lot::Mutex,
    ranger_consensus::{Block, ChainError, ChainReader, ChainStore, Engine, Handler, Header},
    ranger_p2p::{
        handshake,
        msg::{BlockAnnouncement, GetBlockHeadersData, HashOrNumber, NewBlockData},
        new_peer, serve, BasePeer, Channel, ConnType, ErrCode, Msg, MsgCode, MsgHandler,
        P2pError, Peer, PeerSet, StatusData,
    },
    ranger_primitives::Hash,
    ranger_transaction::{Receipt, Transaction},
    ranger_tx_pool::TxPool,
    std::{
        collections::BTreeMap,
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc,
        },
        thread::{Builder, JoinHandle},
    },
};

/// Most headers served for one request.
pub const MAX_HEADER_FETCH: u64 = 192;
/// Most bodies served for one request.
pub const MAX_BODIES_FETCH: usize = 128;
pub const MAX_NODE_DATA_FETCH: usize = 384;
pub const MAX_RECEIPTS_FETCH: usize = 256;
/// Responses stop growing once their encoded items pass this many bytes.
pub const SOFT_RESPONSE_LIMIT: u64 = 2 * 1024 * 1024;

#[derive(Debug, Default)]
pub struct ProtocolStats {
    pub msgs_handled: AtomicU64,
    pub bad_msgs: AtomicU64,
    pub consensus_msgs: AtomicU64,
    pub txs_received: AtomicU64,
    pub blocks_imported: AtomicU64,
    pub bad_blocks: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProtocolStatsSnapshot {
    pub msgs_handled: u64,
    pub bad_msgs: u64,
    pub consensus_msgs: u64,
    pub txs_received: u64,
    pub blocks_imported: u64,
    pub bad_blocks: u64,
}

impl ProtocolStats {
    pub fn snapshot(&self) -> ProtocolStatsSnapshot {
        ProtocolStatsSnapshot {
            msgs_handled: self.msgs_handled.load(Ordering::Relaxed),
            bad_msgs: self.bad_msgs.load(Ordering::Relaxed),
            consensus_msgs: self.consensus_msgs.load(Ordering::Relaxed),
            txs_received: self.txs_received.load(Ordering::Relaxed),
            blocks_imported: self.blocks_imported.load(Ordering::Relaxed),
            bad_blocks: self.bad_blocks.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Whether a node of role `local` talks to a peer of role `remote`.
/// Endpoint nodes reach consensus nodes only through proxies.
pub fn accepts_peer(local: ConnType, remote: ConnType) -> bool {
    !matches!(
        (local, remote),
        (ConnType::ConsensusNode, ConnType::EndpointNode)
            | (ConnType::EndpointNode, ConnType::ConsensusNode)
    )
}

/// Roles that receive transactions relayed by a node of role `local`.
pub fn tx_targets(local: ConnType) -> &'static [ConnType] {
    match local {
        ConnType::ConsensusNode => &[ConnType::ConsensusNode],
        ConnType::ProxyNode => &[ConnType::ConsensusNode, ConnType::ProxyNode],
        ConnType::EndpointNode => &[ConnType::ProxyNode, ConnType::EndpointNode],
    }
}

fn isqrt(n: usize) -> usize {
    let mut root = 0usize;
    while root
        .checked_add(1)
        .and_then(|next| next.checked_mul(next))
        .is_some_and(|square| square <= n)
    {
        root = root.saturating_add(1);
    }
    root
}

struct Inner {
    config: ProtocolConfig,
    chain: Arc<ChainStore>,
    engine: Arc<dyn Engine>,
    consensus: Arc<dyn Handler>,
    tx_pool: Arc<TxPool>,
    sync: Arc<dyn SyncHandler>,
    peers: PeerSet,
    stats: ProtocolStats,
}

pub struct ProtocolManager {
    inner: Arc<Inner>,
    exit: Mutex<Option<Sender<()>>>,
    tx_broadcast_thread: Mutex<Option<JoinHandle<()>>>,
}

impl ProtocolManager {
    /// The chain must already hold its genesis block.
    pub fn new(
        config: ProtocolConfig,
        chain: Arc<ChainStore>,
        engine: Arc<dyn Engine>,
        consensus: Arc<dyn Handler>,
        tx_pool: Arc<TxPool>,
        sync: Arc<dyn SyncHandler>,
    ) -> Result<Self> {
        config.validate()?;
        chain.genesis_hash().ok_or(ChainError::MissingGenesis)?;
        let peers = PeerSet::new(config.p2p.max_peers);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                chain,
                engine,
                consensus,
                tx_pool,
                sync,
                peers,
                stats: ProtocolStats::default(),
            }),
            exit: Mutex::default(),
            tx_broadcast_thread: Mutex::default(),
        })
    }

    /// Start relaying newly pooled transactions to peers.
    pub fn start(&self) -> Result<()> {
        let mut thread = self.tx_broadcast_thread.lock();
        if thread.is_some() {
            return Ok(());
        }
        let new_txs = self.inner.tx_pool.subscribe_new_txs();
        let (exit_sender, exit_receiver) = bounded(1);
        let inner = self.inner.clone();
        *thread = Some(
            Builder::new()
                .name("rangerTxBroadcast".to_string())
                .spawn(move || inner.tx_broadcast_loop(new_txs, exit_receiver))?,
        );
        *self.exit.lock() = Some(exit_sender);
        info!("protocol manager started as {:?}", self.inner.config.node_type);
        Ok(())
    }

    /// Stop the broadcast thread and close every peer.
    pub fn stop(&self) {
        if let Some(exit) = self.exit.lock().take() {
            let _ = exit.send(());
        }
        if let Some(thread) = self.tx_broadcast_thread.lock().take() {
            if thread.join().is_err() {
                error!("tx broadcast thread panicked");
            }
        }
        self.inner.peers.close();
        info!("protocol manager stopped");
    }

    pub fn peers(&self) -> &PeerSet {
        &self.inner.peers
    }

    pub fn stats(&self) -> ProtocolStatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn local_status(&self) -> Result<StatusData> {
        self.inner.local_status()
    }

    /// Run a session: handshake, register, serve until it ends, remove.
    /// Returns why the session ended.
    pub async fn handle_peer(&self, base: BasePeer, channels: Vec<Channel>) -> ProtocolError {
        let inner = &self.inner;
        if inner.peers.is_closed() {
            return ProtocolError::Stopped;
        }
        if !accepts_peer(inner.config.node_type, base.conn_type()) {
            debug!(
                "rejecting {:?} peer {} as {:?}",
                base.conn_type(),
                base.id(),
                inner.config.node_type
            );
            return P2pError::protocol(
                ErrCode::UnexpectedNodeType,
                format!("{:?}", base.conn_type()),
            )
            .into();
        }
        let local = match inner.local_status() {
            Ok(local) => local,
            Err(err) => return err,
        };

        let (peer, mut readers) = new_peer(base, channels);
        if let Err(err) = handshake(
            peer.as_ref(),
            &mut readers,
            &local,
            inner.config.p2p.handshake_timeout,
        )
        .await
        {
            peer.close();
            return err.into();
        }
        if let Err(err) = inner.peers.register(peer.clone()) {
            debug!("peer {} registration failed: {err}", peer.id());
            peer.close();
            return err.into();
        }
        inner.sync.register_peer(&peer);
        inner.sync_transactions(&peer);

        let err = serve(peer.clone(), readers, inner.clone(), &inner.config.p2p).await;
        self.remove_peer(peer.id());
        err.into()
    }

    /// Drop a peer and tell the synchronizer to forget it.
    pub fn remove_peer(&self, id: &str) {
        if self.inner.peers.unregister(id).is_ok() {
            self.inner.sync.unregister_peer(id);
        }
    }

    /// Store a locally produced block and propagate it.
    pub fn commit_block(&self, block: Block, receipts: &[Receipt]) -> Result<BigUint> {
        let block = Arc::new(block);
        let total_score = self.inner.chain.write_block(&block, receipts)?;
        self.inner.on_block_written(&block);
        self.inner.broadcast_block(&block, true);
        self.inner.broadcast_block(&block, false);
        Ok(total_score)
    }

    /// Relay `txs` according to the node-role policy.
    pub fn broadcast_txs(&self, txs: &[Arc<Transaction>]) {
        self.inner.broadcast_txs(txs)
    }

    pub fn broadcast_block(&self, block: &Arc<Block>, propagate: bool) {
        self.inner.broadcast_block(block, propagate)
    }
}

impl Drop for ProtocolManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Inner {
    fn local_status(&self) -> Result<StatusData> {
        let (head, total_score) = self
            .chain
            .head_status()
            .ok_or(ChainError::MissingGenesis)?;
        let genesis = self.chain.genesis_hash().ok_or(ChainError::MissingGenesis)?;
        Ok(StatusData {
            protocol_version: self.config.protocol_version,
            network_id: self.config.network_id,
            total_score,
            current_block: head,
            genesis_block: genesis,
            chain_id: BigUint::from(self.config.chain_id),
        })
    }

    fn tx_broadcast_loop(&self, new_txs: Receiver<Vec<Arc<Transaction>>>, exit: Receiver<()>) {
        loop {
            select! {
                recv(new_txs) -> txs => match txs {
                    Ok(txs) => self.broadcast_txs(&txs),
                    Err(_) => break,
                },
                recv(exit) -> _ => break,
            }
        }
        debug!("tx broadcast loop stopped");
    }

    fn broadcast_txs(&self, txs: &[Arc<Transaction>]) {
        let mut batches: BTreeMap<String, (Arc<dyn Peer>, Vec<Arc<Transaction>>)> =
            BTreeMap::new();
        for tx in txs {
            let hash = tx.hash();
            for conn_type in tx_targets(self.config.node_type) {
                for peer in self.peers.typed_peers_without_tx(*conn_type, &hash) {
                    batches
                        .entry(peer.id().to_string())
                        .or_insert_with(|| (peer.clone(), Vec::new()))
                        .1
                        .push(tx.clone());
                }
            }
        }
        for (id, (peer, txs)) in batches {
            trace!("relaying {} transactions to {id}", txs.len());
            peer.base().async_send_transactions(txs);
        }
    }

    /// Queue every pending transaction for a newly registered peer.
    fn sync_transactions(&self, peer: &Arc<dyn Peer>) {
        if !tx_targets(self.config.node_type).contains(&peer.conn_type()) {
            return;
        }
        let pending: Vec<Arc<Transaction>> =
            self.tx_pool.pending().into_values().flatten().collect();
        for batch in pending.chunks(self.config.tx_sync_batch.max(1)) {
            peer.base().async_send_transactions(batch.to_vec());
        }
    }

    fn broadcast_block(&self, block: &Arc<Block>, propagate: bool) {
        let hash = block.hash();
        let peers = self.peers.peers_without_block(&hash);
        if propagate {
            let total_score = match self.chain.total_score(&block.parent_hash()) {
                Ok(Some(parent_score)) => parent_score + &block.header.block_score,
                Ok(None) => {
                    error!("propagating block {hash} with unknown parent");
                    return;
                }
                Err(err) => {
                    error!("propagating block {hash}: {err}");
                    return;
                }
            };
            let count = isqrt(peers.len());
            for peer in peers.iter().take(count) {
                peer.base()
                    .async_send_new_block(block.clone(), total_score.clone());
            }
            trace!("propagated block {hash} to {count} peers");
        } else {
            for peer in &peers {
                peer.base().async_send_new_block_hash(block.clone());
            }
            trace!("announced block {hash} to {} peers", peers.len());
        }
    }

    fn on_block_written(&self, block: &Block) {
        let is_head = self
            .chain
            .current_header()
            .is_some_and(|head| head.hash() == block.hash());
        if is_head {
            let dropped = self.tx_pool.reset();
            trace!("new head {}: dropped {dropped} pooled transactions", block.number());
            self.consensus.new_chain_head(block);
        }
    }

    /// Import a block received in full. Blocks with an unknown parent are
    /// left to the synchronizer; a header the engine rejects ends the
    /// session with the sender.
    fn import_block(&self, peer: &Arc<dyn Peer>, block: Block) -> ranger_p2p::Result<()> {
        let hash = block.hash();
        match self.chain.has_block(&hash) {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(err) => {
                warn!("import of {hash}: {err}");
                return Ok(());
            }
        }
        if !block.has_valid_tx_root() {
            bump(&self.stats.bad_blocks);
            return Err(P2pError::Rejected(format!("block {hash}: transaction root mismatch")));
        }
        let parent_known = matches!(self.chain.header(&block.parent_hash()), Ok(Some(_)));
        if !parent_known {
            debug!("block {hash} from {} has unknown parent", peer.id());
            self.sync.notify_announcements(
                peer.id(),
                vec![BlockAnnouncement {
                    hash,
                    number: block.number(),
                }],
            );
            return Ok(());
        }
        if let Err(err) = self.engine.verify_header(&*self.chain, &block.header) {
            bump(&self.stats.bad_blocks);
            return Err(P2pError::Rejected(format!("block {hash}: {err}")));
        }

        let block = Arc::new(block);
        self.broadcast_block(&block, true);
        if let Err(err) = self.chain.write_block(&block, &[]) {
            error!("failed to write block {hash}: {err}");
            return Ok(());
        }
        bump(&self.stats.blocks_imported);
        debug!("imported block {} ({hash}) from {}", block.number(), peer.id());
        self.on_block_written(&block);
        self.broadcast_block(&block, false);
        Ok(())
    }

    fn collect_headers(&self, request: &GetBlockHeadersData) -> Vec<Header> {
        let amount = request.amount.min(MAX_HEADER_FETCH);
        let step = request.skip.saturating_add(1);
        let mut headers = Vec::new();
        let mut bytes = 0u64;
        let mut next = match request.origin {
            HashOrNumber::Hash(hash) => local(self.chain.header(&hash)),
            HashOrNumber::Number(number) => local(self.chain.header_by_number(number)),
        };
        while let Some(header) = next.take() {
            if headers.len() as u64 >= amount || bytes >= SOFT_RESPONSE_LIMIT {
                break;
            }
            bytes = bytes.saturating_add(encoded_size(&header));
            let number = if request.reverse {
                header.number.checked_sub(step)
            } else {
                header.number.checked_add(step)
            };
            headers.push(header);
            next = number.and_then(|number| local(self.chain.header_by_number(number)));
        }
        headers
    }

    fn collect<T: serde::Serialize>(
        &self,
        hashes: &[Hash],
        max: usize,
        lookup: impl Fn(&Hash) -> std::result::Result<Option<T>, ChainError>,
    ) -> Vec<T> {
        let mut items = Vec::new();
        let mut bytes = 0u64;
        for hash in hashes.iter().take(max) {
            if bytes >= SOFT_RESPONSE_LIMIT {
                break;
            }
            if let Some(item) = local(lookup(hash)) {
                bytes = bytes.saturating_add(encoded_size(&item));
                items.push(item);
            }
        }
        items
    }
}

/// Local lookups that fail are logged and treated as missing: a storage
/// problem here is not the requesting peer's fault.
fn local<T>(result: std::result::Result<Option<T>, ChainError>) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(err) => {
            warn!("chain lookup failed: {err}");
            None
        }
    }
}

fn encoded_size<T: serde::Serialize>(value: &T) -> u64 {
    bincode::serialized_size(value).unwrap_or(u64::MAX)
}

#[async_trait]
impl MsgHandler for Inner {
    async fn handle(&self, peer: &Arc<dyn Peer>, msg: Msg) -> ranger_p2p::Result<()> {
        bump(&self.stats.msgs_handled);
        match self
            .consensus
            .handle_msg(peer.base().address(), msg.code, &msg.payload)
        {
            Ok(true) => {
                bump(&self.stats.consensus_msgs);
                return Ok(());
            }
            Ok(false) => {}
            Err(err) => {
                bump(&self.stats.bad_msgs);
                return Err(P2pError::protocol(ErrCode::Decode, err.to_string()));
            }
        }
        let result = self.handle_protocol_msg(peer, &msg).await;
        if let Err(err) = &result {
            bump(&self.stats.bad_msgs);
            debug!("peer {}: msg {:#x} failed: {err}", peer.id(), msg.code);
        }
        result
    }
}

impl Inner {
    async fn handle_protocol_msg(&self, peer: &Arc<dyn Peer>, msg: &Msg) -> ranger_p2p::Result<()> {
        let id = peer.id();
        match MsgCode::from_code(msg.code)? {
            MsgCode::Status => Err(P2pError::protocol(
                ErrCode::ExtraStatusMsg,
                "status after handshake",
            )),

            MsgCode::BlockHeadersRequest => {
                let request: GetBlockHeadersData = msg.decode()?;
                let headers = self.collect_headers(&request);
                peer.send_block_headers(&headers).await
            }
            MsgCode::BlockHeaders => {
                self.sync.deliver_headers(id, msg.decode()?);
                Ok(())
            }
            MsgCode::BlockBodiesRequest => {
                let hashes: Vec<Hash> = msg.decode()?;
                let bodies = self.collect(&hashes, MAX_BODIES_FETCH, |hash| self.chain.body(hash));
                peer.send_block_bodies(&bodies).await
            }
            MsgCode::BlockBodies => {
                self.sync.deliver_bodies(id, msg.decode()?);
                Ok(())
            }
            MsgCode::BlockHeaderFetchRequest => {
                let hash: Hash = msg.decode()?;
                match local(self.chain.header(&hash)) {
                    Some(header) => peer.send_fetched_block_header(&header).await,
                    None => {
                        debug!("peer {id} fetched unknown header {hash}");
                        Ok(())
                    }
                }
            }
            MsgCode::BlockHeaderFetchResponse => {
                self.sync.deliver_fetched_header(id, msg.decode()?);
                Ok(())
            }
            MsgCode::BlockBodiesFetchRequest => {
                let hashes: Vec<Hash> = msg.decode()?;
                let bodies = self.collect(&hashes, MAX_BODIES_FETCH, |hash| self.chain.body(hash));
                peer.send_fetched_block_bodies(&bodies).await
            }
            MsgCode::BlockBodiesFetchResponse => {
                self.sync.deliver_fetched_bodies(id, msg.decode()?);
                Ok(())
            }
            MsgCode::NodeDataRequest => {
                let hashes: Vec<Hash> = msg.decode()?;
                let data = self.collect(&hashes, MAX_NODE_DATA_FETCH, |hash| {
                    self.chain.node_data(hash)
                });
                peer.send_node_data(&data).await
            }
            MsgCode::NodeData => {
                self.sync.deliver_node_data(id, msg.decode()?);
                Ok(())
            }
            MsgCode::ReceiptsRequest => {
                let hashes: Vec<Hash> = msg.decode()?;
                let receipts = self.collect(&hashes, MAX_RECEIPTS_FETCH, |hash| {
                    self.chain.receipts(hash)
                });
                peer.send_receipts(&receipts).await
            }
            MsgCode::Receipts => {
                self.sync.deliver_receipts(id, msg.decode()?);
                Ok(())
            }

            MsgCode::NewBlockHashes => {
                let announcements: Vec<BlockAnnouncement> = msg.decode()?;
                let unknown: Vec<BlockAnnouncement> = announcements
                    .into_iter()
                    .inspect(|announcement| peer.base().mark_block(announcement.hash))
                    .filter(|announcement| {
                        !matches!(self.chain.has_block(&announcement.hash), Ok(true))
                    })
                    .collect();
                if !unknown.is_empty() {
                    self.sync.notify_announcements(id, unknown);
                }
                Ok(())
            }
            MsgCode::NewBlock => {
                let NewBlockData { block, total_score } = msg.decode()?;
                peer.base().mark_block(block.hash());
                if total_score > peer.base().total_score() {
                    peer.base().set_head(block.hash(), total_score);
                }
                self.import_block(peer, block)
            }
            MsgCode::Tx => {
                let txs: Vec<Transaction> = msg.decode()?;
                for tx in &txs {
                    peer.base().mark_transaction(tx.hash());
                }
                let count = txs.len() as u64;
                self.stats.txs_received.fetch_add(count, Ordering::Relaxed);
                for result in self.tx_pool.add_remotes(txs) {
                    if let Err(err) = result {
                        trace!("peer {id}: transaction rejected: {err}");
                    }
                }
                Ok(())
            }
        }
    }
}
