//! Peer sessions.
//!
//! Every peer shares a [`BasePeer`] holding its identity, head, known-item
//! caches and outbound queues. The two [`Peer`] implementations differ only
//! in how a message reaches the wire: [`SingleChannelPeer`] writes
//! everything to one stream, [`MultiChannelPeer`] routes each message code
//! to a fixed channel with [`channel_of_message`].
//!
//! Queued sends (`async_send_*`) never block: when a queue is full the item
//! is dropped, logged and counted in [`PeerStats`].

use {
    crate::{
        config::P2pConfig,
        error::{P2pError, Result},
        known_cache::KnownCache,
        msg::{
            channel_of_message, BlockAnnouncement, ConnType, GetBlockHeadersData, HashOrNumber,
            Msg, MsgCode, NewBlockData,
        },
        transport::{Channel, MsgReader, MsgWriter},
    },
    async_trait::async_trait,
    log::*,
    num_bigint::BigUint,
    parking_lot::{Mutex, RwLock},
    ranger_consensus::{Block, Body, Header},
    ranger_primitives::{Address, Hash},
    ranger_transaction::{Receipt, Transaction},
    std::{
        fmt,
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc,
        },
    },
    tokio::{
        sync::{
            mpsc::{self, error::TrySendError},
            Mutex as AsyncMutex,
        },
        task::JoinHandle,
    },
    tokio_util::sync::CancellationToken,
};

pub type PeerId = String;

#[derive(Debug, Default)]
pub struct PeerStats {
    pub dropped_txs: AtomicU64,
    pub dropped_props: AtomicU64,
    pub dropped_anns: AtomicU64,
    pub write_failures: AtomicU64,
    pub msgs_sent: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerStatsSnapshot {
    pub dropped_txs: u64,
    pub dropped_props: u64,
    pub dropped_anns: u64,
    pub write_failures: u64,
    pub msgs_sent: u64,
}

impl PeerStats {
    pub fn snapshot(&self) -> PeerStatsSnapshot {
        PeerStatsSnapshot {
            dropped_txs: self.dropped_txs.load(Ordering::Relaxed),
            dropped_props: self.dropped_props.load(Ordering::Relaxed),
            dropped_anns: self.dropped_anns.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            msgs_sent: self.msgs_sent.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// A block queued for full propagation.
#[derive(Debug, Clone)]
pub struct PropEvent {
    pub block: Arc<Block>,
    pub total_score: BigUint,
}

/// Receiving ends of a peer's outbound queues, owned by its broadcast loop.
pub struct BroadcastQueues {
    txs: mpsc::Receiver<Vec<Arc<Transaction>>>,
    props: mpsc::Receiver<PropEvent>,
    anns: mpsc::Receiver<Arc<Block>>,
}

/// State shared by both peer variants.
pub struct BasePeer {
    id: PeerId,
    address: Address,
    conn_type: ConnType,
    version: u32,
    /// Head hash and total score, updated by handshake and block messages.
    head: RwLock<(Hash, BigUint)>,
    known_txs: KnownCache,
    known_blocks: KnownCache,
    queued_txs: mpsc::Sender<Vec<Arc<Transaction>>>,
    queued_props: mpsc::Sender<PropEvent>,
    queued_anns: mpsc::Sender<Arc<Block>>,
    queues: Mutex<Option<BroadcastQueues>>,
    term: CancellationToken,
    stats: PeerStats,
}

impl BasePeer {
    pub fn new(
        id: impl Into<PeerId>,
        address: Address,
        conn_type: ConnType,
        version: u32,
        config: &P2pConfig,
    ) -> Self {
        let (queued_txs, txs) = mpsc::channel(config.max_queued_txs.max(1));
        let (queued_props, props) = mpsc::channel(config.max_queued_props.max(1));
        let (queued_anns, anns) = mpsc::channel(config.max_queued_anns.max(1));
        Self {
            id: id.into(),
            address,
            conn_type,
            version,
            head: RwLock::new((Hash::default(), BigUint::default())),
            known_txs: KnownCache::new(config.known_txs),
            known_blocks: KnownCache::new(config.known_blocks),
            queued_txs,
            queued_props,
            queued_anns,
            queues: Mutex::new(Some(BroadcastQueues { txs, props, anns })),
            term: CancellationToken::new(),
            stats: PeerStats::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn conn_type(&self) -> ConnType {
        self.conn_type
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn head(&self) -> (Hash, BigUint) {
        self.head.read().clone()
    }

    pub fn set_head(&self, hash: Hash, total_score: BigUint) {
        *self.head.write() = (hash, total_score);
    }

    pub fn total_score(&self) -> BigUint {
        self.head.read().1.clone()
    }

    pub fn mark_transaction(&self, hash: Hash) {
        self.known_txs.insert(hash);
    }

    pub fn mark_block(&self, hash: Hash) {
        self.known_blocks.insert(hash);
    }

    pub fn knows_transaction(&self, hash: &Hash) -> bool {
        self.known_txs.contains(hash)
    }

    pub fn knows_block(&self, hash: &Hash) -> bool {
        self.known_blocks.contains(hash)
    }

    pub fn stats(&self) -> &PeerStats {
        &self.stats
    }

    /// Queue transactions for broadcast. Drops the batch if the queue is full.
    pub fn async_send_transactions(&self, txs: Vec<Arc<Transaction>>) {
        let hashes: Vec<Hash> = txs.iter().map(|tx| tx.hash()).collect();
        match self.queued_txs.try_send(txs) {
            Ok(()) => hashes.into_iter().for_each(|hash| self.mark_transaction(hash)),
            Err(TrySendError::Full(dropped)) => {
                bump(&self.stats.dropped_txs);
                warn!(
                    "peer {}: tx queue full, dropping {} transactions",
                    self.id,
                    dropped.len()
                );
            }
            Err(TrySendError::Closed(_)) => debug!("peer {}: tx queue closed", self.id),
        }
    }

    /// Queue a full block for propagation. Drops it if the queue is full.
    pub fn async_send_new_block(&self, block: Arc<Block>, total_score: BigUint) {
        let hash = block.hash();
        match self.queued_props.try_send(PropEvent { block, total_score }) {
            Ok(()) => self.mark_block(hash),
            Err(TrySendError::Full(_)) => {
                bump(&self.stats.dropped_props);
                warn!("peer {}: block propagation queue full, dropping {hash}", self.id);
            }
            Err(TrySendError::Closed(_)) => debug!("peer {}: propagation queue closed", self.id),
        }
    }

    /// Queue a block announcement. Drops it if the queue is full.
    pub fn async_send_new_block_hash(&self, block: Arc<Block>) {
        let hash = block.hash();
        match self.queued_anns.try_send(block) {
            Ok(()) => self.mark_block(hash),
            Err(TrySendError::Full(_)) => {
                bump(&self.stats.dropped_anns);
                warn!("peer {}: announcement queue full, dropping {hash}", self.id);
            }
            Err(TrySendError::Closed(_)) => debug!("peer {}: announcement queue closed", self.id),
        }
    }

    fn take_queues(&self) -> Option<BroadcastQueues> {
        self.queues.lock().take()
    }

    /// Token cancelled when the session ends.
    pub fn closed(&self) -> &CancellationToken {
        &self.term
    }

    pub fn close(&self) {
        self.term.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.term.is_cancelled()
    }
}

impl fmt::Debug for BasePeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("conn_type", &self.conn_type)
            .field("version", &self.version)
            .finish()
    }
}

#[async_trait]
pub trait Peer: Send + Sync {
    fn base(&self) -> &BasePeer;

    fn num_channels(&self) -> usize;

    async fn send_on_channel(&self, channel: usize, msg: &Msg) -> Result<()>;

    /// Write `msg` on the channel its code is routed to.
    async fn send(&self, msg: &Msg) -> Result<()> {
        let last = self.num_channels().saturating_sub(1);
        let channel = channel_of_message(msg.code).min(last);
        self.send_on_channel(channel, msg).await?;
        bump(&self.base().stats.msgs_sent);
        Ok(())
    }
}

impl fmt::Debug for dyn Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.base().fmt(f)
    }
}

impl dyn Peer {
    pub fn id(&self) -> &str {
        self.base().id()
    }

    pub fn conn_type(&self) -> ConnType {
        self.base().conn_type()
    }

    pub fn close(&self) {
        self.base().close()
    }

    async fn send_value<T: serde::Serialize + Sync + ?Sized>(
        &self,
        code: MsgCode,
        value: &T,
    ) -> Result<()> {
        self.send(&Msg::encode(code, value)?).await
    }

    pub async fn send_transactions(&self, txs: &[Arc<Transaction>]) -> Result<()> {
        for tx in txs {
            self.base().mark_transaction(tx.hash());
        }
        let txs: Vec<&Transaction> = txs.iter().map(AsRef::as_ref).collect();
        self.send_value(MsgCode::Tx, &txs).await
    }

    pub async fn send_new_block_hashes(&self, announcements: &[BlockAnnouncement]) -> Result<()> {
        for announcement in announcements {
            self.base().mark_block(announcement.hash);
        }
        self.send_value(MsgCode::NewBlockHashes, announcements).await
    }

    pub async fn send_new_block(&self, block: &Block, total_score: &BigUint) -> Result<()> {
        self.base().mark_block(block.hash());
        let data = NewBlockData {
            block: block.clone(),
            total_score: total_score.clone(),
        };
        self.send_value(MsgCode::NewBlock, &data).await
    }

    pub async fn send_block_headers(&self, headers: &[Header]) -> Result<()> {
        self.send_value(MsgCode::BlockHeaders, headers).await
    }

    pub async fn send_block_bodies(&self, bodies: &[Body]) -> Result<()> {
        self.send_value(MsgCode::BlockBodies, bodies).await
    }

    pub async fn send_fetched_block_header(&self, header: &Header) -> Result<()> {
        self.send_value(MsgCode::BlockHeaderFetchResponse, header).await
    }

    pub async fn send_fetched_block_bodies(&self, bodies: &[Body]) -> Result<()> {
        self.send_value(MsgCode::BlockBodiesFetchResponse, bodies).await
    }

    pub async fn send_node_data(&self, data: &[Vec<u8>]) -> Result<()> {
        self.send_value(MsgCode::NodeData, data).await
    }

    pub async fn send_receipts(&self, receipts: &[Vec<Receipt>]) -> Result<()> {
        self.send_value(MsgCode::Receipts, receipts).await
    }

    pub async fn request_headers_by_hash(
        &self,
        origin: Hash,
        amount: u64,
        skip: u64,
        reverse: bool,
    ) -> Result<()> {
        debug!("peer {}: requesting {amount} headers from {origin}", self.id());
        let request = GetBlockHeadersData {
            origin: HashOrNumber::Hash(origin),
            amount,
            skip,
            reverse,
        };
        self.send_value(MsgCode::BlockHeadersRequest, &request).await
    }

    pub async fn request_headers_by_number(
        &self,
        origin: u64,
        amount: u64,
        skip: u64,
        reverse: bool,
    ) -> Result<()> {
        debug!("peer {}: requesting {amount} headers from #{origin}", self.id());
        let request = GetBlockHeadersData {
            origin: HashOrNumber::Number(origin),
            amount,
            skip,
            reverse,
        };
        self.send_value(MsgCode::BlockHeadersRequest, &request).await
    }

    pub async fn request_bodies(&self, hashes: &[Hash]) -> Result<()> {
        self.send_value(MsgCode::BlockBodiesRequest, hashes).await
    }

    pub async fn fetch_block_header(&self, hash: Hash) -> Result<()> {
        self.send_value(MsgCode::BlockHeaderFetchRequest, &hash).await
    }

    pub async fn fetch_block_bodies(&self, hashes: &[Hash]) -> Result<()> {
        self.send_value(MsgCode::BlockBodiesFetchRequest, hashes).await
    }

    pub async fn request_node_data(&self, hashes: &[Hash]) -> Result<()> {
        self.send_value(MsgCode::NodeDataRequest, hashes).await
    }

    pub async fn request_receipts(&self, hashes: &[Hash]) -> Result<()> {
        self.send_value(MsgCode::ReceiptsRequest, hashes).await
    }
}

pub struct SingleChannelPeer {
    base: BasePeer,
    writer: AsyncMutex<Box<dyn MsgWriter>>,
}

impl SingleChannelPeer {
    pub fn new(base: BasePeer, writer: Box<dyn MsgWriter>) -> Self {
        Self {
            base,
            writer: AsyncMutex::new(writer),
        }
    }
}

#[async_trait]
impl Peer for SingleChannelPeer {
    fn base(&self) -> &BasePeer {
        &self.base
    }

    fn num_channels(&self) -> usize {
        1
    }

    async fn send_on_channel(&self, _channel: usize, msg: &Msg) -> Result<()> {
        if self.base.is_closed() {
            return Err(P2pError::Closed);
        }
        self.writer.lock().await.write_msg(msg).await
    }
}

pub struct MultiChannelPeer {
    base: BasePeer,
    writers: Vec<AsyncMutex<Box<dyn MsgWriter>>>,
}

impl MultiChannelPeer {
    pub fn new(base: BasePeer, writers: Vec<Box<dyn MsgWriter>>) -> Self {
        Self {
            base,
            writers: writers.into_iter().map(AsyncMutex::new).collect(),
        }
    }
}

#[async_trait]
impl Peer for MultiChannelPeer {
    fn base(&self) -> &BasePeer {
        &self.base
    }

    fn num_channels(&self) -> usize {
        self.writers.len()
    }

    async fn send_on_channel(&self, channel: usize, msg: &Msg) -> Result<()> {
        if self.base.is_closed() {
            return Err(P2pError::Closed);
        }
        let writer = self.writers.get(channel).ok_or_else(|| {
            P2pError::Codec(format!("peer {}: no channel {channel}", self.base.id))
        })?;
        writer.lock().await.write_msg(msg).await
    }
}

/// Build the peer variant matching the number of channels, returning it
/// together with the readers for [`crate::dispatch::serve`].
pub fn new_peer(
    base: BasePeer,
    channels: Vec<Channel>,
) -> (Arc<dyn Peer>, Vec<Box<dyn MsgReader>>) {
    let (readers, mut writers): (Vec<_>, Vec<_>) = channels
        .into_iter()
        .map(|channel| (channel.reader, channel.writer))
        .unzip();
    let peer: Arc<dyn Peer> = if writers.len() == 1 {
        Arc::new(SingleChannelPeer::new(base, writers.remove(0)))
    } else {
        Arc::new(MultiChannelPeer::new(base, writers))
    };
    (peer, readers)
}

/// Start the peer's broadcast loop. Returns `None` if it already runs.
pub fn start_broadcast(peer: Arc<dyn Peer>) -> Option<JoinHandle<()>> {
    let queues = peer.base().take_queues()?;
    Some(tokio::spawn(broadcast_loop(peer, queues)))
}

/// Drain the peer's queues until it is closed. A failed write is logged
/// and counted; read errors end the session through the read path.
async fn broadcast_loop(peer: Arc<dyn Peer>, mut queues: BroadcastQueues) {
    let term = peer.base().closed().clone();
    loop {
        let result = tokio::select! {
            _ = term.cancelled() => break,
            Some(txs) = queues.txs.recv() => peer.send_transactions(&txs).await,
            Some(prop) = queues.props.recv() => {
                peer.send_new_block(&prop.block, &prop.total_score).await
            }
            Some(block) = queues.anns.recv() => {
                let announcement = BlockAnnouncement {
                    hash: block.hash(),
                    number: block.number(),
                };
                peer.send_new_block_hashes(&[announcement]).await
            }
            else => break,
        };
        if let Err(err) = result {
            bump(&peer.base().stats.write_failures);
            debug!("peer {}: broadcast failed: {err}", peer.id());
        }
    }
    trace!("peer {}: broadcast loop stopped", peer.id());
}
