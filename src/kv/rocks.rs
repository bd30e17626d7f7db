use std::path::Path;

use rocksdb::{IteratorMode, Options, WriteBatch, DB};

use crate::error::TableError;
use crate::kv::{KeyRange, KvStore};

/// A single column family holds every table's blocks, keyed by the
/// composite `(partition_hash, event_time, suffix)` scheme, a
/// content-addressed key that does not require a centrally minted
/// sequence number.
const BLOCKS_CF: &str = "blocks";

pub struct RocksKvStore {
    db: DB,
}

impl RocksKvStore {
    pub fn open(path: &Path) -> Result<RocksKvStore, TableError> {
        let mut options = Options::default();
        options.create_if_missing(true);
        options.create_missing_column_families(true);

        let cf_opts = Options::default();
        let db = DB::open_cf_with_opts(&options, path, vec![(BLOCKS_CF, cf_opts)])
            .map_err(|e| TableError::StoreUnavailable(e.to_string()))?;
        Ok(RocksKvStore { db })
    }

    fn cf(&self) -> &rocksdb::ColumnFamily {
        self.db
            .cf_handle(BLOCKS_CF)
            .expect("blocks column family missing, RocksKvStore::open invariant violated")
    }
}

impl KvStore for RocksKvStore {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), TableError> {
        self.db
            .put_cf(self.cf(), key, value)
            .map_err(|e| TableError::StoreUnavailable(e.to_string()))
    }

    fn put_batch(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<(), TableError> {
        let mut batch = WriteBatch::default();
        for (key, value) in entries {
            batch.put_cf(self.cf(), key, value);
        }
        self.db
            .write(batch)
            .map_err(|e| TableError::StoreUnavailable(e.to_string()))
    }

    fn range(&self, range: &KeyRange) -> Result<Vec<(Vec<u8>, Vec<u8>)>, TableError> {
        let mode = IteratorMode::From(&range.start, rocksdb::Direction::Forward);
        let mut out = Vec::new();
        for item in self.db.iterator_cf(self.cf(), mode) {
            let (key, value) = item.map_err(|e| TableError::StoreUnavailable(e.to_string()))?;
            if key.as_ref() >= range.end.as_slice() {
                break;
            }
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }

    fn delete_range(&self, range: &KeyRange) -> Result<(), TableError> {
        let mut batch = WriteBatch::default();
        batch.delete_range_cf(self.cf(), &range.start, &range.end);
        self.db
            .write(batch)
            .map_err(|e| TableError::StoreUnavailable(e.to_string()))
    }

    fn approximate_size(&self, range: &KeyRange) -> Result<u64, TableError> {
        let sizes = self
            .db
            .get_approximate_sizes_cf(self.cf(), &[rocksdb::Range {
                start: &range.start,
                end: &range.end,
            }]);
        Ok(sizes.into_iter().next().unwrap_or(0))
    }
}
