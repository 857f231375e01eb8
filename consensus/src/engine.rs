//! The consensus engine interface and a stand-in implementation.
//!
//! An [`Engine`] decides who may author a block and what a valid header
//! looks like. The block producer drives it in order: `prepare` a fresh
//! header on top of the head, execute transactions, `finalize` with the
//! receipts, then `seal`. Importers call `verify_header` only.

use {
    crate::{
        chain::ChainReader,
        error::{ChainError, Result},
        types::{receipt_root, Block, Header},
    },
    log::*,
    num_bigint::BigUint,
    ranger_primitives::Address,
    ranger_transaction::{Receipt, Transaction},
};

pub trait Engine: Send + Sync {
    /// Address of the node that sealed `header`.
    fn author(&self, header: &Header) -> Result<Address>;

    fn verify_header(&self, chain: &dyn ChainReader, header: &Header) -> Result<()>;

    /// Fill in the consensus fields of a header built on `header.parent_hash`.
    fn prepare(&self, chain: &dyn ChainReader, header: &mut Header) -> Result<()>;

    /// Assemble the block once its transactions have been executed.
    fn finalize(
        &self,
        chain: &dyn ChainReader,
        header: Header,
        transactions: Vec<Transaction>,
        receipts: &[Receipt],
    ) -> Result<Block>;

    fn seal(&self, chain: &dyn ChainReader, block: Block) -> Result<Block>;

    fn calc_block_score(&self, chain: &dyn ChainReader, time: u64, parent: &Header) -> BigUint;
}

/// Engine used where no real BFT engine is wired in: every block scores
/// one, and sealing stamps the author's address at the end of `extra`.
#[derive(Debug, Clone)]
pub struct DummyEngine {
    author: Address,
}

impl DummyEngine {
    pub fn new(author: Address) -> Self {
        Self { author }
    }

    fn parent(&self, chain: &dyn ChainReader, header: &Header) -> Result<Header> {
        chain
            .header(&header.parent_hash)?
            .ok_or(ChainError::UnknownAncestor(header.parent_hash))
    }
}

impl Engine for DummyEngine {
    fn author(&self, header: &Header) -> Result<Address> {
        let start = header
            .extra
            .len()
            .checked_sub(Address::LEN)
            .ok_or(ChainError::MissingAuthor)?;
        Address::from_slice(&header.extra[start..]).map_err(|_| ChainError::MissingAuthor)
    }

    fn verify_header(&self, chain: &dyn ChainReader, header: &Header) -> Result<()> {
        let parent = self.parent(chain, header)?;
        let expected = parent.number.saturating_add(1);
        if header.number != expected {
            return Err(ChainError::InvalidNumber {
                expected,
                got: header.number,
            });
        }
        if header.time < parent.time {
            return Err(ChainError::InvalidTimestamp);
        }
        if header.block_score != self.calc_block_score(chain, header.time, &parent) {
            return Err(ChainError::InvalidBlockScore);
        }
        self.author(header)?;
        Ok(())
    }

    fn prepare(&self, chain: &dyn ChainReader, header: &mut Header) -> Result<()> {
        let parent = self.parent(chain, header)?;
        header.number = parent.number.saturating_add(1);
        header.time = header.time.max(parent.time);
        header.block_score = self.calc_block_score(chain, header.time, &parent);
        header.rewardbase = self.author;
        Ok(())
    }

    fn finalize(
        &self,
        _chain: &dyn ChainReader,
        mut header: Header,
        transactions: Vec<Transaction>,
        receipts: &[Receipt],
    ) -> Result<Block> {
        header.gas_used = receipts
            .iter()
            .fold(0u64, |used, receipt| used.saturating_add(receipt.gas_used));
        header.receipt_hash = receipt_root(receipts);
        Ok(Block::new(header, transactions))
    }

    fn seal(&self, _chain: &dyn ChainReader, mut block: Block) -> Result<Block> {
        block.header.extra.extend_from_slice(self.author.as_bytes());
        debug!(
            "sealed block {} ({}) as {}",
            block.number(),
            block.hash(),
            self.author
        );
        Ok(block)
    }

    fn calc_block_score(&self, _chain: &dyn ChainReader, _time: u64, _parent: &Header) -> BigUint {
        BigUint::from(1u8)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::chain::{tests::genesis, ChainStore},
        assert_matches::assert_matches,
        ranger_primitives::Hash,
        ranger_storage::MemoryDatabase,
        ranger_transaction::ReceiptStatus,
        std::sync::Arc,
    };

    fn chain() -> ChainStore {
        let store = ChainStore::new(Arc::new(MemoryDatabase::new())).unwrap();
        store.init_genesis(&genesis()).unwrap();
        store
    }

    fn produce(engine: &DummyEngine, chain: &ChainStore, receipts: &[Receipt]) -> Block {
        let parent = chain.current_header().unwrap();
        let mut header = Header {
            parent_hash: parent.hash(),
            time: parent.time.saturating_add(5),
            ..Header::default()
        };
        engine.prepare(chain, &mut header).unwrap();
        let block = engine.finalize(chain, header, Vec::new(), receipts).unwrap();
        engine.seal(chain, block).unwrap()
    }

    #[test]
    fn test_produced_block_verifies_and_imports() {
        let author = Address::new([7; 20]);
        let engine = DummyEngine::new(author);
        let chain = chain();
        let receipts = vec![Receipt {
            status: ReceiptStatus::Successful,
            gas_used: 21_000,
            tx_hash: Hash::new([1; 32]),
            contract_address: None,
        }];

        let block = produce(&engine, &chain, &receipts);
        assert_eq!(block.number(), 1);
        assert_eq!(block.header.gas_used, 21_000);
        assert_eq!(block.header.rewardbase, author);
        assert_eq!(engine.author(&block.header).unwrap(), author);
        engine.verify_header(&chain, &block.header).unwrap();
        chain.write_block(&block, &receipts).unwrap();
        assert_eq!(chain.receipts(&block.hash()).unwrap().unwrap(), receipts);

        let next = produce(&engine, &chain, &[]);
        assert_eq!(next.number(), 2);
        engine.verify_header(&chain, &next.header).unwrap();
    }

    #[test]
    fn test_verify_header_rejections() {
        let engine = DummyEngine::new(Address::new([7; 20]));
        let chain = chain();
        let good = produce(&engine, &chain, &[]).header;

        let mut header = good.clone();
        header.parent_hash = Hash::new([9; 32]);
        assert_matches!(
            engine.verify_header(&chain, &header),
            Err(ChainError::UnknownAncestor(_))
        );

        let mut header = good.clone();
        header.number = 5;
        assert_matches!(
            engine.verify_header(&chain, &header),
            Err(ChainError::InvalidNumber {
                expected: 1,
                got: 5
            })
        );

        let mut header = good.clone();
        header.time = 0;
        assert_matches!(
            engine.verify_header(&chain, &header),
            Err(ChainError::InvalidTimestamp)
        );

        let mut header = good.clone();
        header.block_score = BigUint::from(2u8);
        assert_matches!(
            engine.verify_header(&chain, &header),
            Err(ChainError::InvalidBlockScore)
        );

        let mut header = good;
        header.extra.clear();
        assert_matches!(
            engine.verify_header(&chain, &header),
            Err(ChainError::MissingAuthor)
        );
    }
}
