//! Sorted in-memory key-value store.

use {
    crate::{Batch, Database, KeyValueReader, KeyValueWriter, KvIterator, Result, StorageError},
    log::debug,
    parking_lot::RwLock,
    std::collections::BTreeMap,
};

/// An in-memory [`Database`]. `None` inside the lock marks a closed store.
#[derive(Debug)]
pub struct MemoryDatabase {
    entries: RwLock<Option<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Some(BTreeMap::new())),
        }
    }

    /// Number of stored entries (0 once closed).
    pub fn len(&self) -> usize {
        self.entries.read().as_ref().map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueReader for MemoryDatabase {
    fn has(&self, key: &[u8]) -> Result<bool> {
        let guard = self.entries.read();
        let map = guard.as_ref().ok_or(StorageError::Closed)?;
        Ok(map.contains_key(key))
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let guard = self.entries.read();
        let map = guard.as_ref().ok_or(StorageError::Closed)?;
        map.get(key).cloned().ok_or(StorageError::NotFound)
    }
}

impl KeyValueWriter for MemoryDatabase {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut guard = self.entries.write();
        let map = guard.as_mut().ok_or(StorageError::Closed)?;
        map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        let mut guard = self.entries.write();
        let map = guard.as_mut().ok_or(StorageError::Closed)?;
        map.remove(key);
        Ok(())
    }
}

impl Database for MemoryDatabase {
    fn new_batch(&self) -> Box<dyn Batch + '_> {
        Box::new(MemoryBatch {
            db: self,
            writes: Vec::new(),
            size: 0,
        })
    }

    fn new_iterator(&self, prefix: &[u8]) -> KvIterator<'_> {
        // Snapshot under the read lock so the iterator never blocks writers.
        let snapshot: Vec<(Vec<u8>, Vec<u8>)> = match self.entries.read().as_ref() {
            Some(map) => map
                .range(prefix.to_vec()..)
                .take_while(|(k, _)| k.starts_with(prefix))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            None => Vec::new(),
        };
        Box::new(snapshot.into_iter())
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.entries.write();
        if guard.take().is_some() {
            debug!("memory database closed");
        }
        Ok(())
    }
}

/// Queued write: `None` value means delete.
type QueuedWrite = (Vec<u8>, Option<Vec<u8>>);

struct MemoryBatch<'a> {
    db: &'a MemoryDatabase,
    writes: Vec<QueuedWrite>,
    size: usize,
}

impl Batch for MemoryBatch<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.writes.push((key.to_vec(), Some(value.to_vec())));
        self.size = self.size.saturating_add(value.len());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.writes.push((key.to_vec(), None));
        self.size = self.size.saturating_add(key.len());
        Ok(())
    }

    fn value_size(&self) -> usize {
        self.size
    }

    fn write(&mut self) -> Result<()> {
        let mut guard = self.db.entries.write();
        let map = guard.as_mut().ok_or(StorageError::Closed)?;
        for (key, value) in &self.writes {
            match value {
                Some(value) => {
                    map.insert(key.clone(), value.clone());
                }
                None => {
                    map.remove(key);
                }
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.writes.clear();
        self.size = 0;
    }
}
