//! Main admission pool.
//!
//! Transactions pass pool-time validation against a shared account state,
//! are kept per account in nonce order, and are announced to subscribers
//! as they are admitted.

use {
    crate::{
        config::TxPoolConfig,
        error::{Result, TxPoolError},
        sorted_map::TxSortedMap,
    },
    crossbeam_channel::{unbounded, Receiver, Sender},
    log::{debug, trace},
    parking_lot::{Mutex, RwLock},
    ranger_primitives::{Address, Hash},
    ranger_transaction::{validate_for_pool, Signer, StateReader, Transaction},
    std::{
        collections::{BTreeMap, HashMap},
        sync::Arc,
    },
};

#[derive(Default)]
struct PoolState {
    accounts: HashMap<Address, TxSortedMap>,
    all: HashMap<Hash, (Address, Arc<Transaction>)>,
}

pub struct TxPool {
    config: TxPoolConfig,
    signer: Signer,
    chain_state: Arc<dyn StateReader>,
    state: RwLock<PoolState>,
    subscribers: Mutex<Vec<Sender<Vec<Arc<Transaction>>>>>,
}

impl TxPool {
    pub fn new(config: TxPoolConfig, chain_state: Arc<dyn StateReader>) -> Self {
        Self {
            signer: Signer::new(config.chain_id),
            config,
            chain_state,
            state: RwLock::default(),
            subscribers: Mutex::default(),
        }
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    /// Receive every batch of newly admitted transactions.
    pub fn subscribe_new_txs(&self) -> Receiver<Vec<Arc<Transaction>>> {
        let (sender, receiver) = unbounded();
        self.subscribers.lock().push(sender);
        receiver
    }

    pub fn add(&self, tx: Transaction) -> Result<()> {
        let result = self.add_one(tx);
        if let Ok(tx) = &result {
            self.notify(vec![tx.clone()]);
        }
        result.map(|_| ())
    }

    /// Add transactions received from peers; one result per transaction.
    pub fn add_remotes(&self, txs: Vec<Transaction>) -> Vec<Result<()>> {
        let mut admitted = Vec::new();
        let results: Vec<Result<()>> = txs
            .into_iter()
            .map(|tx| {
                self.add_one(tx).map(|tx| {
                    admitted.push(tx);
                })
            })
            .collect();
        if !admitted.is_empty() {
            self.notify(admitted);
        }
        results
    }

    fn add_one(&self, tx: Transaction) -> Result<Arc<Transaction>> {
        let hash = tx.hash();
        if self.state.read().all.contains_key(&hash) {
            trace!("Discarding already known transaction {hash}");
            return Err(TxPoolError::KnownTx);
        }
        let validated = validate_for_pool(
            &self.config.validation,
            &self.signer,
            self.chain_state.as_ref(),
            &tx,
        )?;
        let from = validated.sender;

        let mut state = self.state.write();
        if state.all.contains_key(&hash) {
            return Err(TxPoolError::KnownTx);
        }
        if state.all.len() >= self.config.global_slots {
            return Err(TxPoolError::TxPoolFull);
        }
        let pooled = state.accounts.get(&from);
        if pooled.is_some_and(|txs| txs.contains(tx.nonce())) {
            return Err(TxPoolError::DuplicatedNonceTx);
        }
        if pooled.map_or(0, TxSortedMap::len) >= self.config.account_slots {
            return Err(TxPoolError::AccountFull);
        }
        let tx = Arc::new(tx);
        state.accounts.entry(from).or_default().put(tx.clone());
        state.all.insert(hash, (from, tx.clone()));
        debug!("Pooled transaction {hash} from {from} nonce {}", tx.nonce());
        Ok(tx)
    }

    fn notify(&self, txs: Vec<Arc<Transaction>>) {
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(txs.clone()).is_ok());
    }

    pub fn get(&self, hash: &Hash) -> Option<Arc<Transaction>> {
        self.state.read().all.get(hash).map(|(_, tx)| tx.clone())
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.state.read().all.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.state.read().all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Executable transactions: per account, the run of consecutive nonces
    /// starting at the account's current nonce.
    pub fn pending(&self) -> BTreeMap<Address, Vec<Arc<Transaction>>> {
        let state = self.state.read();
        state
            .accounts
            .iter()
            .filter_map(|(addr, txs)| {
                let ready = txs.ready(self.chain_state.nonce(addr));
                (!ready.is_empty()).then_some((*addr, ready))
            })
            .collect()
    }

    /// Transactions waiting behind a nonce gap.
    pub fn queued(&self) -> BTreeMap<Address, Vec<Arc<Transaction>>> {
        let state = self.state.read();
        state
            .accounts
            .iter()
            .filter_map(|(addr, txs)| {
                let ready = txs.ready(self.chain_state.nonce(addr)).len();
                let waiting: Vec<_> = txs
                    .flatten()
                    .into_iter()
                    .filter(|tx| tx.nonce() >= self.chain_state.nonce(addr))
                    .skip(ready)
                    .collect();
                (!waiting.is_empty()).then_some((*addr, waiting))
            })
            .collect()
    }

    pub fn remove(&self, hash: &Hash) -> bool {
        let mut state = self.state.write();
        let Some((from, tx)) = state.all.remove(hash) else {
            return false;
        };
        if let Some(txs) = state.accounts.get_mut(&from) {
            txs.remove(tx.nonce());
            if txs.is_empty() {
                state.accounts.remove(&from);
            }
        }
        true
    }

    /// Drop transactions made stale by a new chain head; returns how many
    /// were dropped.
    pub fn reset(&self) -> usize {
        let mut state = self.state.write();
        let PoolState { accounts, all } = &mut *state;
        let mut dropped = 0usize;
        accounts.retain(|addr, txs| {
            for tx in txs.forward(self.chain_state.nonce(addr)) {
                all.remove(&tx.hash());
                dropped = dropped.saturating_add(1);
            }
            !txs.is_empty()
        });
        if dropped > 0 {
            debug!("Dropped {dropped} stale transactions on pool reset");
        }
        dropped
    }
}
