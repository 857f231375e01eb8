//! Bounded caches of hashes a peer is known to have.
//!
//! Only used to avoid sending a peer something it already has. An evicted
//! entry costs one redundant send, never a missed message.

use {lru::LruCache, parking_lot::Mutex, ranger_primitives::Hash};

pub struct KnownCache {
    inner: Mutex<LruCache<Hash, ()>>,
}

impl KnownCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity.max(1))),
        }
    }

    pub fn insert(&self, hash: Hash) {
        self.inner.lock().put(hash, ());
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.inner.lock().contains(hash)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
