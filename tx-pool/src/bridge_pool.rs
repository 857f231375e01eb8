//! Journaled pool of transactions bound for the parent chain.
//!
//! Lock order is pool state before journal. Both are taken per call and
//! never held across calls. Rotation keeps the state read lock until the
//! rewritten journal is in place, so the file always matches a state the
//! pool was actually in.

use {
    crate::{
        config::BridgeTxPoolConfig,
        error::{Result, TxPoolError},
        journal::TxJournal,
        sorted_map::TxSortedMap,
    },
    crossbeam_channel::{bounded, select, tick, Receiver, Sender},
    log::{debug, error, info, warn},
    parking_lot::{Mutex, RwLock},
    ranger_primitives::{Address, Hash},
    ranger_transaction::{Signer, Transaction},
    std::{
        collections::HashMap,
        fmt,
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc,
        },
        thread::{Builder, JoinHandle},
    },
};

/// Counters for the pool's log-and-continue paths.
#[derive(Debug, Default)]
pub struct BridgeTxPoolStats {
    pub pool_full_rejections: AtomicU64,
    pub known_tx_rejections: AtomicU64,
    pub journal_write_failures: AtomicU64,
    pub journal_rotations: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeTxPoolStatsSnapshot {
    pub queued: usize,
    pub pool_full_rejections: u64,
    pub known_tx_rejections: u64,
    pub journal_write_failures: u64,
    pub journal_rotations: u64,
}

#[derive(Default)]
struct PoolState {
    queue: HashMap<Address, TxSortedMap>,
    all: HashMap<Hash, Arc<Transaction>>,
}

impl PoolState {
    fn pending(&self) -> HashMap<Address, Vec<Arc<Transaction>>> {
        self.queue
            .iter()
            .map(|(addr, txs)| (*addr, txs.flatten()))
            .collect()
    }
}

struct Inner {
    config: BridgeTxPoolConfig,
    signer: Signer,
    state: RwLock<PoolState>,
    journal: Mutex<Option<TxJournal>>,
    stats: BridgeTxPoolStats,
}

pub struct BridgeTxPool {
    inner: Arc<Inner>,
    exit: Option<Sender<()>>,
    rotation_thread: Option<JoinHandle<()>>,
}

impl BridgeTxPool {
    /// Create the pool, replay its journal and start the rotation thread.
    ///
    /// Journal corruption is returned to the caller; a journal that cannot
    /// be rotated afterwards is logged and left for the rotation loop.
    pub fn new(config: BridgeTxPoolConfig) -> Result<Self> {
        let config = config.sanitize();
        let inner = Arc::new(Inner {
            signer: Signer::new(config.parent_chain_id),
            journal: Mutex::new(config.journal.clone().map(TxJournal::new)),
            config,
            state: RwLock::default(),
            stats: BridgeTxPoolStats::default(),
        });

        if inner.journal.lock().is_some() {
            inner.load_journal()?;
            inner.rotate_journal();
        }

        let (exit_sender, exit_receiver) = bounded(1);
        let thread_inner = inner.clone();
        let rotation_thread = Builder::new()
            .name("rangerBridgeJournal".to_string())
            .spawn(move || thread_inner.run(exit_receiver))?;

        Ok(Self {
            inner,
            exit: Some(exit_sender),
            rotation_thread: Some(rotation_thread),
        })
    }

    pub fn config(&self) -> &BridgeTxPoolConfig {
        &self.inner.config
    }

    pub fn signer(&self) -> &Signer {
        &self.inner.signer
    }

    /// Add one locally submitted transaction.
    pub fn add_local(&self, tx: Transaction) -> Result<()> {
        self.inner.add(tx)
    }

    /// Add a batch; returns one result per transaction, in order.
    pub fn add_locals(&self, txs: Vec<Transaction>) -> Vec<Result<()>> {
        self.inner.add_all(txs)
    }

    pub fn get(&self, hash: &Hash) -> Option<Arc<Transaction>> {
        self.inner.state.read().all.get(hash).cloned()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.inner.state.read().all.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.inner.state.read().all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every pooled transaction grouped by sender, nonce ascending.
    pub fn pending(&self) -> HashMap<Address, Vec<Arc<Transaction>>> {
        self.inner.pending()
    }

    /// All pooled transactions, sender by sender.
    pub fn content(&self) -> Vec<Arc<Transaction>> {
        let state = self.inner.state.read();
        let mut senders: Vec<_> = state.queue.keys().copied().collect();
        senders.sort();
        senders
            .iter()
            .filter_map(|sender| state.queue.get(sender))
            .flat_map(TxSortedMap::flatten)
            .collect()
    }

    /// Transactions of `address`, nonce ascending, at most `limit` of them
    /// (a negative limit means all).
    pub fn pending_txs_by_address(&self, address: &Address, limit: i64) -> Vec<Arc<Transaction>> {
        let state = self.inner.state.read();
        let Some(txs) = state.queue.get(address) else {
            return Vec::new();
        };
        let flat = txs.flatten();
        match usize::try_from(limit) {
            Ok(limit) => flat.into_iter().take(limit).collect(),
            Err(_) => flat,
        }
    }

    pub fn pending_tx_hashes_by_address(&self, address: &Address, limit: i64) -> Vec<Hash> {
        self.pending_txs_by_address(address, limit)
            .iter()
            .map(|tx| tx.hash())
            .collect()
    }

    /// Highest pooled nonce of `address`.
    pub fn get_max_tx_nonce(&self, address: &Address) -> Option<u64> {
        self.inner
            .state
            .read()
            .queue
            .get(address)
            .and_then(TxSortedMap::max_nonce)
    }

    /// Remove one transaction.
    pub fn remove_tx(&self, tx: &Transaction) -> Result<()> {
        if self.inner.remove(&tx.hash()) {
            Ok(())
        } else {
            Err(TxPoolError::UnknownTx)
        }
    }

    /// Remove included transactions; returns how many were pooled.
    pub fn remove(&self, txs: &[Transaction]) -> usize {
        txs.iter()
            .filter(|tx| self.inner.remove(&tx.hash()))
            .count()
    }

    pub fn stats(&self) -> BridgeTxPoolStatsSnapshot {
        let stats = &self.inner.stats;
        BridgeTxPoolStatsSnapshot {
            queued: self.len(),
            pool_full_rejections: stats.pool_full_rejections.load(Ordering::Relaxed),
            known_tx_rejections: stats.known_tx_rejections.load(Ordering::Relaxed),
            journal_write_failures: stats.journal_write_failures.load(Ordering::Relaxed),
            journal_rotations: stats.journal_rotations.load(Ordering::Relaxed),
        }
    }

    /// Stop the rotation thread. It rotates the journal one last time and
    /// closes it before this returns.
    pub fn stop(&mut self) {
        if let Some(exit) = self.exit.take() {
            // a closed channel also wakes the loop
            let _ = exit.send(());
        }
        if let Some(handle) = self.rotation_thread.take() {
            if handle.join().is_err() {
                error!("Bridge journal rotation thread panicked");
            }
        }
        info!("Bridge transaction pool stopped");
    }
}

impl fmt::Debug for BridgeTxPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeTxPool")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Drop for BridgeTxPool {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Inner {
    fn add(&self, tx: Transaction) -> Result<()> {
        let mut state = self.state.write();
        let hash = tx.hash();
        if state.all.contains_key(&hash) {
            self.stats.known_tx_rejections.fetch_add(1, Ordering::Relaxed);
            debug!("Discarding already known transaction {hash}");
            return Err(TxPoolError::KnownTx);
        }
        let from = self.signer.sender(&tx).map_err(TxPoolError::InvalidSender)?;
        if state.all.len() >= self.config.global_queue {
            self.stats.pool_full_rejections.fetch_add(1, Ordering::Relaxed);
            return Err(TxPoolError::TxPoolFull);
        }
        if state
            .queue
            .get(&from)
            .is_some_and(|txs| txs.contains(tx.nonce()))
        {
            return Err(TxPoolError::DuplicatedNonceTx);
        }

        let tx = Arc::new(tx);
        state.queue.entry(from).or_default().put(tx.clone());
        state.all.insert(hash, tx.clone());
        self.journal_tx(&tx);
        debug!("Pooled new bridge transaction {hash} from {from} nonce {}", tx.nonce());
        Ok(())
    }

    fn add_all(&self, txs: Vec<Transaction>) -> Vec<Result<()>> {
        txs.into_iter().map(|tx| self.add(tx)).collect()
    }

    fn journal_tx(&self, tx: &Transaction) {
        let mut journal = self.journal.lock();
        let Some(journal) = journal.as_mut() else {
            return;
        };
        if let Err(err) = journal.insert(tx) {
            self.stats.journal_write_failures.fetch_add(1, Ordering::Relaxed);
            warn!("Failed to journal local transaction {}: {err}", tx.hash());
        }
    }

    fn remove(&self, hash: &Hash) -> bool {
        let mut state = self.state.write();
        let Some(tx) = state.all.remove(hash) else {
            return false;
        };
        if let Ok(from) = self.signer.sender(&tx) {
            if let Some(txs) = state.queue.get_mut(&from) {
                txs.remove(tx.nonce());
                if txs.is_empty() {
                    state.queue.remove(&from);
                }
            }
        }
        true
    }

    fn pending(&self) -> HashMap<Address, Vec<Arc<Transaction>>> {
        self.state.read().pending()
    }

    fn load_journal(&self) -> Result<()> {
        // Taken out for the replay so the re-added transactions are not
        // appended again, and so adds can take the state lock first.
        let Some(mut journal) = self.journal.lock().take() else {
            return Ok(());
        };
        let loaded = journal.load(|batch| {
            self.add_all(batch)
                .iter()
                .filter(|result| result.is_err())
                .count()
        });
        *self.journal.lock() = Some(journal);
        loaded.map(|_| ())
    }

    fn rotate_journal(&self) {
        // Held until the rename so an add cannot append to the old file
        // after the snapshot and a remove cannot outlive the rewrite.
        let state = self.state.read();
        let pending = state.pending();
        let mut journal = self.journal.lock();
        let Some(journal) = journal.as_mut() else {
            return;
        };
        match journal.rotate(&pending) {
            Ok(()) => {
                self.stats.journal_rotations.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => warn!("Failed to rotate bridge transaction journal: {err}"),
        }
    }

    fn run(&self, exit: Receiver<()>) {
        let journal = tick(self.config.journal_interval);
        loop {
            select! {
                recv(journal) -> _ => self.rotate_journal(),
                recv(exit) -> _ => break,
            }
        }
        self.rotate_journal();
        if let Some(journal) = self.journal.lock().as_mut() {
            if let Err(err) = journal.close() {
                warn!("Failed to close bridge transaction journal: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        ranger_account_key::SecretKey,
        ranger_transaction::{FeeDelegation, TxBody, TxData},
        std::{collections::HashSet, path::Path, thread, time::Duration},
    };

    const PARENT_CHAIN_ID: u64 = 8217;

    fn anchor(key: &SecretKey, nonce: u64) -> Transaction {
        let mut tx = Transaction::new(TxData {
            nonce,
            gas_price: 25_000_000_000,
            gas_limit: 100_000,
            from: Some(key.address()),
            body: TxBody::ChainDataAnchoring {
                anchored_data: nonce.to_le_bytes().to_vec(),
            },
            fee_delegation: FeeDelegation::None,
        })
        .unwrap();
        Signer::new(PARENT_CHAIN_ID).sign(&mut tx, &[key]);
        tx
    }

    fn journaled_hashes(path: &Path) -> HashSet<Hash> {
        let mut hashes = HashSet::new();
        TxJournal::new(path)
            .load(|batch| {
                hashes.extend(batch.iter().map(Transaction::hash));
                0
            })
            .unwrap();
        hashes
    }

    #[test]
    fn test_rotation_keeps_up_with_concurrent_adds_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge_transactions.rlp");
        let mut pool = BridgeTxPool::new(BridgeTxPoolConfig {
            parent_chain_id: PARENT_CHAIN_ID,
            journal: Some(path.clone()),
            journal_interval: Duration::from_secs(3600),
            global_queue: 4096,
        })
        .unwrap();
        let per_sender: Vec<Vec<Transaction>> = [b"a", b"b", b"c", b"d"]
            .iter()
            .map(|seed| {
                let key = SecretKey::from_seed(*seed);
                (0..64).map(|nonce| anchor(&key, nonce)).collect()
            })
            .collect();

        thread::scope(|scope| {
            let workers: Vec<_> = per_sender
                .iter()
                .map(|txs| {
                    let pool = &pool;
                    scope.spawn(move || {
                        for chunk in txs.chunks(3) {
                            for tx in chunk {
                                pool.add_local(tx.clone()).unwrap();
                            }
                            if let [_, middle, _] = chunk {
                                pool.remove_tx(middle).unwrap();
                            }
                        }
                    })
                })
                .collect();

            while !workers.iter().all(|worker| worker.is_finished()) {
                pool.inner.rotate_journal();
                // Removals are only compacted by the next rotation, but no
                // pooled transaction may ever be missing from the file.
                let state = pool.inner.state.write();
                let journaled = journaled_hashes(&path);
                for hash in state.all.keys() {
                    assert!(journaled.contains(hash), "{hash} missing from journal");
                }
            }
        });

        pool.inner.rotate_journal();
        let live: HashSet<Hash> = pool.content().iter().map(|tx| tx.hash()).collect();
        // 64 per sender, minus the middle of each of the 21 full chunks
        assert_eq!(live.len(), 172);
        assert_eq!(journaled_hashes(&path), live);

        pool.stop();
        drop(pool);
        let reopened = BridgeTxPool::new(BridgeTxPoolConfig {
            parent_chain_id: PARENT_CHAIN_ID,
            journal: Some(path.clone()),
            journal_interval: Duration::from_secs(3600),
            global_queue: 4096,
        })
        .unwrap();
        let replayed: HashSet<Hash> = reopened.content().iter().map(|tx| tx.hash()).collect();
        assert_eq!(replayed, live);
    }
}
