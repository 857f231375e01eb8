//! Key-value storage contract consumed by the chain store and state reader.
//!
//! The storage engine itself is an external collaborator; this crate only
//! fixes the contract every backend must satisfy and ships two
//! implementations of it:
//!
//! - [`MemoryDatabase`] - a sorted in-memory map, used by tests and by
//!   nodes that run without persistence.
//! - [`Table`] - a prefixed view over any other [`Database`], so several
//!   logical stores can share one physical backend.
//!
//! Absent keys are an error on `get` ([`StorageError::NotFound`]); use
//! `has` to probe.

pub mod error;
pub mod memory;
pub mod table;

pub use {
    error::{Result, StorageError},
    memory::MemoryDatabase,
    table::{Table, TableBatch},
};

/// Batches are flushed by callers once they reach roughly this many bytes.
pub const IDEAL_BATCH_SIZE: usize = 100 * 1024;

/// Boxed iterator over `(key, value)` pairs in ascending key order.
pub type KvIterator<'a> = Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + Send + 'a>;

/// Read access to a key-value store.
pub trait KeyValueReader {
    /// Whether `key` is present.
    fn has(&self, key: &[u8]) -> Result<bool>;

    /// The value stored under `key`, or [`StorageError::NotFound`].
    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;
}

/// Write access to a key-value store.
pub trait KeyValueWriter {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Deleting an absent key is not an error.
    fn delete(&self, key: &[u8]) -> Result<()>;
}

/// A write-only batch that is committed atomically with [`Batch::write`].
pub trait Batch: Send {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// Amount of data queued for writing, in bytes.
    fn value_size(&self) -> usize;

    /// Flush all queued writes to the backing store.
    fn write(&mut self) -> Result<()>;

    /// Drop queued writes so the batch can be reused.
    fn reset(&mut self);
}

/// A complete key-value backend.
pub trait Database: KeyValueReader + KeyValueWriter + Send + Sync {
    fn new_batch(&self) -> Box<dyn Batch + '_>;

    /// Iterate every entry whose key starts with `prefix`.
    fn new_iterator(&self, prefix: &[u8]) -> KvIterator<'_>;

    fn close(&self) -> Result<()>;
}
