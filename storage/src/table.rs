//! Prefixed views over a shared database.

use {
    crate::{Batch, Database, KeyValueReader, KeyValueWriter, KvIterator, Result},
    std::sync::Arc,
};

/// A logical table: every key is transparently prefixed before it reaches
/// the underlying store. Tables compose, so a table over a table nests
/// the prefixes.
#[derive(Clone)]
pub struct Table {
    db: Arc<dyn Database>,
    prefix: Vec<u8>,
}

impl Table {
    pub fn new(db: Arc<dyn Database>, prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            db,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    fn key(&self, key: &[u8]) -> Vec<u8> {
        prefixed(&self.prefix, key)
    }
}

fn prefixed(prefix: &[u8], key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(prefix.len().saturating_add(key.len()));
    out.extend_from_slice(prefix);
    out.extend_from_slice(key);
    out
}

impl KeyValueReader for Table {
    fn has(&self, key: &[u8]) -> Result<bool> {
        self.db.has(&self.key(key))
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.db.get(&self.key(key))
    }
}

impl KeyValueWriter for Table {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.put(&self.key(key), value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.db.delete(&self.key(key))
    }
}

impl Database for Table {
    fn new_batch(&self) -> Box<dyn Batch + '_> {
        Box::new(TableBatch {
            batch: self.db.new_batch(),
            prefix: &self.prefix,
        })
    }

    fn new_iterator(&self, prefix: &[u8]) -> KvIterator<'_> {
        let strip = self.prefix.len();
        Box::new(
            self.db
                .new_iterator(&self.key(prefix))
                .map(move |(k, v)| (k[strip..].to_vec(), v)),
        )
    }

    /// Closing a table leaves the shared backend open.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A batch that prefixes every key with its table's prefix.
pub struct TableBatch<'a> {
    batch: Box<dyn Batch + 'a>,
    prefix: &'a [u8],
}

impl Batch for TableBatch<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.batch.put(&prefixed(self.prefix, key), value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.batch.delete(&prefixed(self.prefix, key))
    }

    fn value_size(&self) -> usize {
        self.batch.value_size()
    }

    fn write(&mut self) -> Result<()> {
        self.batch.write()
    }

    fn reset(&mut self) {
        self.batch.reset()
    }
}
