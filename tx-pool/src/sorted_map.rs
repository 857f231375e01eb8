//! Per-account transactions ordered by nonce.

use {
    ranger_transaction::Transaction,
    std::{collections::BTreeMap, sync::Arc},
};

/// Nonce-indexed transactions of one account.
#[derive(Debug, Default, Clone)]
pub struct TxSortedMap {
    items: BTreeMap<u64, Arc<Transaction>>,
}

impl TxSortedMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, nonce: u64) -> Option<&Arc<Transaction>> {
        self.items.get(&nonce)
    }

    pub fn contains(&self, nonce: u64) -> bool {
        self.items.contains_key(&nonce)
    }

    /// Insert `tx`, returning the transaction it replaced, if any.
    pub fn put(&mut self, tx: Arc<Transaction>) -> Option<Arc<Transaction>> {
        self.items.insert(tx.nonce(), tx)
    }

    pub fn remove(&mut self, nonce: u64) -> Option<Arc<Transaction>> {
        self.items.remove(&nonce)
    }

    /// Remove every transaction with a nonce below `threshold`.
    pub fn forward(&mut self, threshold: u64) -> Vec<Arc<Transaction>> {
        let kept = self.items.split_off(&threshold);
        std::mem::replace(&mut self.items, kept).into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_nonce(&self) -> Option<u64> {
        self.items.keys().next_back().copied()
    }

    /// All transactions in ascending nonce order.
    pub fn flatten(&self) -> Vec<Arc<Transaction>> {
        self.items.values().cloned().collect()
    }

    /// The run of consecutive nonces starting at `start`.
    pub fn ready(&self, start: u64) -> Vec<Arc<Transaction>> {
        let mut next = start;
        self.items
            .range(start..)
            .take_while(|(nonce, _)| {
                let contiguous = **nonce == next;
                next = next.saturating_add(1);
                contiguous
            })
            .map(|(_, tx)| tx.clone())
            .collect()
    }
}
