//! Block, receipt and total-score persistence over the storage contract.
//!
//! Every record lives in its own prefixed [`Table`] of one shared
//! database. A block write goes through a single batch so headers, bodies,
//! receipts and scores of one block become visible together.

use {
    crate::{
        error::{ChainError, Result},
        types::{Block, Body, Header},
    },
    log::*,
    num_bigint::BigUint,
    parking_lot::RwLock,
    ranger_primitives::{keccak256, Hash},
    ranger_storage::{Batch, Database, KeyValueReader, KeyValueWriter, StorageError, Table},
    ranger_transaction::Receipt,
    serde::de::DeserializeOwned,
    std::sync::Arc,
};

const HEADER_PREFIX: &[u8] = b"h";
const BODY_PREFIX: &[u8] = b"b";
const RECEIPTS_PREFIX: &[u8] = b"r";
const CANONICAL_PREFIX: &[u8] = b"n";
const TOTAL_SCORE_PREFIX: &[u8] = b"t";
const NODE_PREFIX: &[u8] = b"s";
const META_PREFIX: &[u8] = b"m";

const HEAD_KEY: &[u8] = b"head";
const GENESIS_KEY: &[u8] = b"genesis";

/// Read access to the canonical chain, as needed by engines and by peers
/// serving requests.
pub trait ChainReader: Send + Sync {
    fn genesis_hash(&self) -> Option<Hash>;

    fn current_header(&self) -> Option<Header>;

    fn header(&self, hash: &Hash) -> Result<Option<Header>>;

    fn header_by_number(&self, number: u64) -> Result<Option<Header>>;

    fn total_score(&self, hash: &Hash) -> Result<Option<BigUint>>;
}

#[derive(Debug, Clone)]
struct Head {
    header: Header,
    total_score: BigUint,
    genesis: Hash,
}

pub struct ChainStore {
    db: Arc<dyn Database>,
    headers: Table,
    bodies: Table,
    receipts: Table,
    canonical: Table,
    scores: Table,
    nodes: Table,
    meta: Table,
    /// Also serializes writers: a block write holds it across the batch.
    head: RwLock<Option<Head>>,
}

impl ChainStore {
    /// Open a chain store over `db`, restoring the head if one was written.
    pub fn new(db: Arc<dyn Database>) -> Result<Self> {
        let table = |prefix: &[u8]| Table::new(db.clone(), prefix);
        let store = Self {
            headers: table(HEADER_PREFIX),
            bodies: table(BODY_PREFIX),
            receipts: table(RECEIPTS_PREFIX),
            canonical: table(CANONICAL_PREFIX),
            scores: table(TOTAL_SCORE_PREFIX),
            nodes: table(NODE_PREFIX),
            meta: table(META_PREFIX),
            head: RwLock::new(None),
            db,
        };
        let head = store.load_head()?;
        if let Some(head) = &head {
            info!(
                "chain store opened at block {} ({})",
                head.header.number,
                head.header.hash()
            );
        }
        *store.head.write() = head;
        Ok(store)
    }

    fn load_head(&self) -> Result<Option<Head>> {
        let Some(genesis) = read_hash(&self.meta, GENESIS_KEY)? else {
            return Ok(None);
        };
        let hash = read_hash(&self.meta, HEAD_KEY)?.ok_or(ChainError::MissingGenesis)?;
        let header = self.header(&hash)?.ok_or(ChainError::UnknownAncestor(hash))?;
        let total_score = self
            .total_score(&hash)?
            .ok_or(ChainError::UnknownAncestor(hash))?;
        Ok(Some(Head {
            header,
            total_score,
            genesis,
        }))
    }

    /// Write `genesis` as block zero of an empty store. Re-initializing
    /// with the same genesis is a no-op; a different one is rejected.
    pub fn init_genesis(&self, genesis: &Block) -> Result<Hash> {
        let hash = genesis.hash();
        let mut head = self.head.write();
        if let Some(current) = head.as_ref() {
            if current.genesis != hash {
                return Err(ChainError::GenesisMismatch {
                    stored: current.genesis,
                    given: hash,
                });
            }
            return Ok(hash);
        }
        if genesis.number() != 0 {
            return Err(ChainError::InvalidNumber {
                expected: 0,
                got: genesis.number(),
            });
        }

        let total_score = genesis.header.block_score.clone();
        let mut batch = self.db.new_batch();
        self.stage_block(batch.as_mut(), genesis, &[], &total_score)?;
        batch.put(&self.key(&self.canonical, &0u64.to_be_bytes()), hash.as_ref())?;
        batch.put(&self.key(&self.meta, GENESIS_KEY), hash.as_ref())?;
        batch.put(&self.key(&self.meta, HEAD_KEY), hash.as_ref())?;
        batch.write()?;

        info!("initialized chain with genesis {hash}");
        *head = Some(Head {
            header: genesis.header.clone(),
            total_score,
            genesis: hash,
        });
        Ok(hash)
    }

    /// Store `block` with its receipts and return its total score. The
    /// block becomes the new head when its total score exceeds the current
    /// head's; the canonical index is rewritten back to the common ancestor.
    pub fn write_block(&self, block: &Block, receipts: &[Receipt]) -> Result<BigUint> {
        let mut head_guard = self.head.write();
        let head = head_guard.as_ref().ok_or(ChainError::MissingGenesis)?;
        let parent_hash = block.parent_hash();
        let parent_score = self
            .total_score(&parent_hash)?
            .ok_or(ChainError::UnknownAncestor(parent_hash))?;
        let total_score = parent_score + &block.header.block_score;
        let hash = block.hash();

        let mut batch = self.db.new_batch();
        self.stage_block(batch.as_mut(), block, receipts, &total_score)?;

        let becomes_head = total_score > head.total_score;
        if becomes_head {
            self.stage_canonical(batch.as_mut(), block, head.header.number)?;
            batch.put(&self.key(&self.meta, HEAD_KEY), hash.as_ref())?;
        }
        batch.write()?;

        if becomes_head {
            debug!("new chain head {} ({hash})", block.number());
            let genesis = head.genesis;
            *head_guard = Some(Head {
                header: block.header.clone(),
                total_score: total_score.clone(),
                genesis,
            });
        } else {
            debug!("stored side block {} ({hash})", block.number());
        }
        Ok(total_score)
    }

    fn stage_block(
        &self,
        batch: &mut (dyn Batch + '_),
        block: &Block,
        receipts: &[Receipt],
        total_score: &BigUint,
    ) -> Result<()> {
        let hash = block.hash();
        batch.put(
            &self.key(&self.headers, hash.as_ref()),
            &bincode::serialize(&block.header)?,
        )?;
        batch.put(
            &self.key(&self.bodies, hash.as_ref()),
            &bincode::serialize(&block.body)?,
        )?;
        batch.put(
            &self.key(&self.receipts, hash.as_ref()),
            &bincode::serialize(receipts)?,
        )?;
        batch.put(
            &self.key(&self.scores, hash.as_ref()),
            &bincode::serialize(total_score)?,
        )?;
        Ok(())
    }

    fn stage_canonical(
        &self,
        batch: &mut (dyn Batch + '_),
        block: &Block,
        old_head_number: u64,
    ) -> Result<()> {
        let number = block.number();
        batch.put(
            &self.key(&self.canonical, &number.to_be_bytes()),
            block.hash().as_ref(),
        )?;
        let mut stale = number.saturating_add(1);
        while stale <= old_head_number {
            batch.delete(&self.key(&self.canonical, &stale.to_be_bytes()))?;
            stale = stale.saturating_add(1);
        }

        let mut ancestor = block.parent_hash();
        let mut ancestor_number = number;
        while let Some(n) = ancestor_number.checked_sub(1) {
            if self.canonical_hash(n)? == Some(ancestor) {
                break;
            }
            batch.put(&self.key(&self.canonical, &n.to_be_bytes()), ancestor.as_ref())?;
            let header = self
                .header(&ancestor)?
                .ok_or(ChainError::UnknownAncestor(ancestor))?;
            ancestor = header.parent_hash;
            ancestor_number = n;
        }
        Ok(())
    }

    fn key(&self, table: &Table, key: &[u8]) -> Vec<u8> {
        [table.prefix(), key].concat()
    }

    pub fn canonical_hash(&self, number: u64) -> Result<Option<Hash>> {
        read_hash(&self.canonical, &number.to_be_bytes())
    }

    pub fn body(&self, hash: &Hash) -> Result<Option<Body>> {
        read_decoded(&self.bodies, hash.as_ref())
    }

    pub fn block(&self, hash: &Hash) -> Result<Option<Block>> {
        let Some(header) = self.header(hash)? else {
            return Ok(None);
        };
        let Some(body) = self.body(hash)? else {
            return Ok(None);
        };
        Ok(Some(Block { header, body }))
    }

    pub fn block_by_number(&self, number: u64) -> Result<Option<Block>> {
        match self.canonical_hash(number)? {
            Some(hash) => self.block(&hash),
            None => Ok(None),
        }
    }

    pub fn receipts(&self, hash: &Hash) -> Result<Option<Vec<Receipt>>> {
        read_decoded(&self.receipts, hash.as_ref())
    }

    pub fn has_block(&self, hash: &Hash) -> Result<bool> {
        Ok(self.headers.has(hash.as_ref())? && self.bodies.has(hash.as_ref())?)
    }

    pub fn current_block(&self) -> Result<Option<Block>> {
        let hash = self.head.read().as_ref().map(|head| head.header.hash());
        match hash {
            Some(hash) => self.block(&hash),
            None => Ok(None),
        }
    }

    /// Head hash and total score, as advertised in the status handshake.
    pub fn head_status(&self) -> Option<(Hash, BigUint)> {
        self.head
            .read()
            .as_ref()
            .map(|head| (head.header.hash(), head.total_score.clone()))
    }

    /// Store a state trie node under the keccak-256 of its encoding.
    pub fn put_node_data(&self, data: &[u8]) -> Result<Hash> {
        let hash = keccak256(data);
        self.nodes.put(hash.as_ref(), data)?;
        Ok(hash)
    }

    pub fn node_data(&self, hash: &Hash) -> Result<Option<Vec<u8>>> {
        not_found_as_none(self.nodes.get(hash.as_ref()))
    }
}

impl ChainReader for ChainStore {
    fn genesis_hash(&self) -> Option<Hash> {
        self.head.read().as_ref().map(|head| head.genesis)
    }

    fn current_header(&self) -> Option<Header> {
        self.head.read().as_ref().map(|head| head.header.clone())
    }

    fn header(&self, hash: &Hash) -> Result<Option<Header>> {
        read_decoded(&self.headers, hash.as_ref())
    }

    fn header_by_number(&self, number: u64) -> Result<Option<Header>> {
        match self.canonical_hash(number)? {
            Some(hash) => self.header(&hash),
            None => Ok(None),
        }
    }

    fn total_score(&self, hash: &Hash) -> Result<Option<BigUint>> {
        read_decoded(&self.scores, hash.as_ref())
    }
}

fn not_found_as_none(value: ranger_storage::Result<Vec<u8>>) -> Result<Option<Vec<u8>>> {
    match value {
        Ok(bytes) => Ok(Some(bytes)),
        Err(StorageError::NotFound) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn read_decoded<T: DeserializeOwned>(table: &Table, key: &[u8]) -> Result<Option<T>> {
    not_found_as_none(table.get(key))?
        .map(|bytes| bincode::deserialize(&bytes).map_err(ChainError::from))
        .transpose()
}

fn read_hash(table: &Table, key: &[u8]) -> Result<Option<Hash>> {
    not_found_as_none(table.get(key))?
        .map(|bytes| Hash::from_slice(&bytes).map_err(|err| ChainError::Codec(err.to_string())))
        .transpose()
}

#[cfg(test)]
pub(crate) mod tests {
    use {
        super::*,
        assert_matches::assert_matches,
        ranger_primitives::Address,
        ranger_storage::MemoryDatabase,
    };

    pub(crate) fn genesis() -> Block {
        Block::new(
            Header {
                time: 1_000,
                extra: b"ranger genesis".to_vec(),
                ..Header::default()
            },
            Vec::new(),
        )
    }

    pub(crate) fn child(parent: &Header, score: u32, salt: u8) -> Block {
        Block::new(
            Header {
                parent_hash: parent.hash(),
                number: parent.number.saturating_add(1),
                time: parent.time.saturating_add(1),
                block_score: BigUint::from(score),
                rewardbase: Address::new([salt; 20]),
                ..Header::default()
            },
            Vec::new(),
        )
    }

    fn store() -> (Arc<dyn Database>, ChainStore) {
        let db: Arc<dyn Database> = Arc::new(MemoryDatabase::new());
        let store = ChainStore::new(db.clone()).unwrap();
        (db, store)
    }

    #[test]
    fn test_genesis_init_is_idempotent() {
        let (_db, store) = store();
        assert!(store.current_header().is_none());
        let hash = store.init_genesis(&genesis()).unwrap();
        assert_eq!(store.init_genesis(&genesis()).unwrap(), hash);
        assert_eq!(store.genesis_hash(), Some(hash));
        assert_eq!(store.header_by_number(0).unwrap().unwrap().hash(), hash);

        let mut other = genesis();
        other.header.time = 7;
        assert_matches!(
            store.init_genesis(&other),
            Err(ChainError::GenesisMismatch { .. })
        );
    }

    #[test]
    fn test_write_block_requires_known_parent() {
        let (_db, store) = store();
        assert_matches!(
            store.write_block(&genesis(), &[]),
            Err(ChainError::MissingGenesis)
        );
        store.init_genesis(&genesis()).unwrap();
        let orphan = child(&child(&genesis().header, 1, 0).header, 1, 0);
        assert_matches!(
            store.write_block(&orphan, &[]),
            Err(ChainError::UnknownAncestor(_))
        );
    }

    #[test]
    fn test_heavier_fork_becomes_canonical() {
        let (_db, store) = store();
        let genesis = genesis();
        store.init_genesis(&genesis).unwrap();

        let a1 = child(&genesis.header, 1, 1);
        let a2 = child(&a1.header, 1, 1);
        assert_eq!(store.write_block(&a1, &[]).unwrap(), BigUint::from(2u8));
        assert_eq!(store.write_block(&a2, &[]).unwrap(), BigUint::from(3u8));
        assert_eq!(store.current_header().unwrap(), a2.header);

        // Lighter side block does not move the head.
        let b1 = child(&genesis.header, 1, 2);
        store.write_block(&b1, &[]).unwrap();
        assert_eq!(store.current_header().unwrap(), a2.header);
        assert!(store.has_block(&b1.hash()).unwrap());

        // A shorter but heavier fork replaces the canonical index.
        let b2 = child(&b1.header, 5, 2);
        store.write_block(&b2, &[]).unwrap();
        assert_eq!(store.current_header().unwrap(), b2.header);
        assert_eq!(store.canonical_hash(1).unwrap(), Some(b1.hash()));
        assert_eq!(store.canonical_hash(2).unwrap(), Some(b2.hash()));

        let b3 = child(&b2.header, 1, 2);
        store.write_block(&b3, &[]).unwrap();
        let a3 = child(&a2.header, 1, 1);
        store.write_block(&a3, &[]).unwrap();
        assert_eq!(store.canonical_hash(3).unwrap(), Some(b3.hash()));
    }

    #[test]
    fn test_reopen_restores_head() {
        let (db, store) = store();
        let genesis = genesis();
        store.init_genesis(&genesis).unwrap();
        let b1 = child(&genesis.header, 1, 1);
        store.write_block(&b1, &[]).unwrap();
        drop(store);

        let reopened = ChainStore::new(db).unwrap();
        assert_eq!(reopened.current_header().unwrap(), b1.header);
        assert_eq!(
            reopened.head_status(),
            Some((b1.hash(), BigUint::from(2u8)))
        );
        assert_eq!(reopened.current_block().unwrap().unwrap(), b1);
    }

    #[test]
    fn test_node_data_is_content_addressed() {
        let (_db, store) = store();
        let hash = store.put_node_data(b"trie node").unwrap();
        assert_eq!(hash, keccak256(b"trie node"));
        assert_eq!(store.node_data(&hash).unwrap().unwrap(), b"trie node");
        assert_eq!(store.node_data(&Hash::default()).unwrap(), None);
    }
}
