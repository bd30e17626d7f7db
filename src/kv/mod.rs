//! The key-ordered local store (§4.3, §4.4).
//!
//! `KvStore` is the narrow trait the table layer is built against; the
//! production implementation is RocksDB-backed (`rocks.rs`), and an
//! in-memory `BTreeMap` fake (`memory.rs`) backs the table and server unit
//! tests without requiring a RocksDB dependency at test time.

mod memory;
mod rocks;

pub use memory::MemoryKvStore;
pub use rocks::RocksKvStore;

use crate::error::TableError;

/// A half-open byte-range over the keyspace, matching the big-endian
/// composite key layout in `talaria_wire::key`.
#[derive(Clone, Debug)]
pub struct KeyRange {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
}

pub trait KvStore: Send + Sync {
    /// Writes `key -> value`, overwriting any existing entry.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), TableError>;

    /// Writes all of `entries` atomically.
    fn put_batch(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<(), TableError>;

    /// Returns all entries in `range`, in key order, lowest first.
    fn range(&self, range: &KeyRange) -> Result<Vec<(Vec<u8>, Vec<u8>)>, TableError>;

    /// Deletes every key in `range`.
    fn delete_range(&self, range: &KeyRange) -> Result<(), TableError>;

    /// Approximate number of live bytes stored in `range`. Implementations
    /// may estimate rather than scan exactly.
    fn approximate_size(&self, range: &KeyRange) -> Result<u64, TableError>;
}
