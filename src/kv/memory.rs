use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::TableError;
use crate::kv::{KeyRange, KvStore};

/// An in-memory stand-in for [`super::RocksKvStore`], used by table and
/// server unit tests so they don't need a real RocksDB directory.
#[derive(Default)]
pub struct MemoryKvStore {
    data: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        MemoryKvStore::default()
    }
}

impl KvStore for MemoryKvStore {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), TableError> {
        self.data.lock().unwrap().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn put_batch(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<(), TableError> {
        let mut data = self.data.lock().unwrap();
        for (key, value) in entries {
            data.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn range(&self, range: &KeyRange) -> Result<Vec<(Vec<u8>, Vec<u8>)>, TableError> {
        let data = self.data.lock().unwrap();
        Ok(data
            .range(range.start.clone()..range.end.clone())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn delete_range(&self, range: &KeyRange) -> Result<(), TableError> {
        let mut data = self.data.lock().unwrap();
        let keys: Vec<Vec<u8>> = data
            .range(range.start.clone()..range.end.clone())
            .map(|(k, _)| k.clone())
            .collect();
        for key in keys {
            data.remove(&key);
        }
        Ok(())
    }

    fn approximate_size(&self, range: &KeyRange) -> Result<u64, TableError> {
        let data = self.data.lock().unwrap();
        Ok(data
            .range(range.start.clone()..range.end.clone())
            .map(|(k, v)| (k.len() + v.len()) as u64)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_respects_half_open_bound() {
        let store = MemoryKvStore::new();
        store.put(b"a", b"1").unwrap();
        store.put(b"b", b"2").unwrap();
        store.put(b"c", b"3").unwrap();
        let got = store
            .range(&KeyRange {
                start: b"a".to_vec(),
                end: b"c".to_vec(),
            })
            .unwrap();
        assert_eq!(got, vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec())]);
    }

    #[test]
    fn delete_range_removes_only_matching_keys() {
        let store = MemoryKvStore::new();
        store.put(b"a", b"1").unwrap();
        store.put(b"b", b"2").unwrap();
        store
            .delete_range(&KeyRange {
                start: b"a".to_vec(),
                end: b"b".to_vec(),
            })
            .unwrap();
        let remaining = store
            .range(&KeyRange {
                start: vec![0],
                end: vec![0xff],
            })
            .unwrap();
        assert_eq!(remaining, vec![(b"b".to_vec(), b"2".to_vec())]);
    }
}
