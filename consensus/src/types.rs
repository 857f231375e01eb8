//! Block and header types.

use {
    num_bigint::BigUint,
    ranger_primitives::{hash_of, Address, Hash},
    ranger_transaction::{Receipt, Transaction},
    serde::{Deserialize, Serialize},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub parent_hash: Hash,
    /// Account credited with block rewards.
    pub rewardbase: Address,
    pub root: Hash,
    pub tx_hash: Hash,
    pub receipt_hash: Hash,
    /// Score contributed by this block to the chain's total score.
    pub block_score: BigUint,
    pub number: u64,
    pub gas_used: u64,
    pub time: u64,
    /// Engine-specific data, such as the sealer's identity.
    pub extra: Vec<u8>,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            parent_hash: Hash::default(),
            rewardbase: Address::ZERO,
            root: Hash::default(),
            tx_hash: tx_root(&[]),
            receipt_hash: receipt_root(&[]),
            block_score: BigUint::from(1u8),
            number: 0,
            gas_used: 0,
            time: 0,
            extra: Vec::new(),
        }
    }
}

impl Header {
    pub fn hash(&self) -> Hash {
        hash_of(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: Header,
    pub body: Body,
}

impl Block {
    /// Assemble a block, committing `header.tx_hash` to `transactions`.
    pub fn new(mut header: Header, transactions: Vec<Transaction>) -> Self {
        header.tx_hash = tx_root(&transactions);
        Self {
            header,
            body: Body { transactions },
        }
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    pub fn parent_hash(&self) -> Hash {
        self.header.parent_hash
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.body.transactions
    }

    /// Whether the body matches the header's transaction root.
    pub fn has_valid_tx_root(&self) -> bool {
        tx_root(&self.body.transactions) == self.header.tx_hash
    }
}

/// Commitment to an ordered list of transactions.
pub fn tx_root(transactions: &[Transaction]) -> Hash {
    let hashes: Vec<Hash> = transactions.iter().map(Transaction::hash).collect();
    hash_of(&hashes)
}

pub fn receipt_root(receipts: &[Receipt]) -> Hash {
    hash_of(receipts)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        ranger_transaction::{FeeDelegation, TxBody, TxData},
    };

    fn cancel(nonce: u64) -> Transaction {
        Transaction::new(TxData {
            nonce,
            gas_price: 1,
            gas_limit: 21_000,
            from: Some(Address::new([1; 20])),
            body: TxBody::Cancel,
            fee_delegation: FeeDelegation::None,
        })
        .unwrap()
    }

    #[test]
    fn test_block_commits_to_transactions() {
        let block = Block::new(Header::default(), vec![cancel(0), cancel(1)]);
        assert!(block.has_valid_tx_root());
        let mut tampered = block.clone();
        tampered.body.transactions.pop();
        assert!(!tampered.has_valid_tx_root());
        assert_eq!(tampered.hash(), block.hash());
    }

    #[test]
    fn test_header_hash_covers_extra() {
        let header = Header::default();
        let mut sealed = header.clone();
        sealed.extra = vec![1];
        assert_ne!(header.hash(), sealed.hash());
    }
}
