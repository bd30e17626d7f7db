//! The time-series table (§4.6): key scheme, append path, split-producer,
//! read-split materialisation, and (in `sweep`) the TTL background task.

mod sweep;

pub use sweep::TtlSweeper;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use hashring::HashRing;
use talaria_wire::key::{hash_partition, keyspace_end, keyspace_start, PARTITION_HASH_LEN};
use talaria_wire::{Block, ColumnType, SplitToken, TableKey};

use crate::error::TableError;
use crate::kv::{KeyRange, KvStore};
use crate::metrics;

/// One split ready to be handed to the query engine: a byte-range token
/// plus the node it is provisionally assigned to (§4.6 step 4).
#[derive(Debug, Clone)]
pub struct Split {
    pub token: SplitToken,
    pub assigned_node_id: Option<String>,
    pub estimated_bytes: u64,
}

#[derive(Clone, Copy, Hash, PartialEq, Eq, Debug)]
struct RingNode(u64);

pub struct Table {
    name: String,
    partition_column: String,
    time_column: String,
    store: Arc<dyn KvStore>,
    suffix_counter: AtomicU64,
    known_partitions: Mutex<HashSet<[u8; PARTITION_HASH_LEN]>>,
    split_target_bytes: u64,
}

impl Table {
    pub fn new(
        name: String,
        partition_column: String,
        time_column: String,
        store: Arc<dyn KvStore>,
        split_target_bytes: u64,
    ) -> Self {
        Table {
            name,
            partition_column,
            time_column,
            store,
            suffix_counter: AtomicU64::new(0),
            known_partitions: Mutex::new(HashSet::new()),
            split_target_bytes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Verifies `partition_column`/`time_column` exist on `block` with the
    /// expected types, computes the composite key, serialises the block,
    /// and writes it (§4.6 Append path).
    pub fn append(&self, block: Block) -> Result<(), TableError> {
        let partition_col = block
            .column(&self.partition_column)
            .ok_or_else(|| TableError::PartitionNotFound(self.partition_column.clone()))?;
        if partition_col.data.column_type() != ColumnType::String {
            return Err(TableError::SchemaMismatch {
                column: self.partition_column.clone(),
                expected: "string",
                found: partition_col.data.column_type().name().to_string(),
            });
        }
        let time_col = block
            .column(&self.time_column)
            .ok_or_else(|| TableError::PartitionNotFound(self.time_column.clone()))?;
        if time_col.data.column_type() != ColumnType::Timestamp {
            return Err(TableError::SchemaMismatch {
                column: self.time_column.clone(),
                expected: "timestamp",
                found: time_col.data.column_type().name().to_string(),
            });
        }

        let partition_hash = hash_partition(&block.partition_key);
        let suffix = self.suffix_counter.fetch_add(1, Ordering::SeqCst);
        let key = TableKey::new(partition_hash, block.max_time_ns, suffix);
        let bytes = block.to_bytes();
        self.store.put(&key.encode(), &bytes)?;

        self.known_partitions.lock().unwrap().insert(partition_hash);
        metrics::ROWS_APPENDED.inc_by(block.row_count as f64);
        Ok(())
    }

    /// Produces the splits covering `[t0, t1)`, optionally restricted to
    /// one partition, assigning each to a node by consistent hashing over
    /// `members` (§4.6 Split-producer algorithm).
    pub fn scan_splits(
        &self,
        time_range: Option<(i64, i64)>,
        partition_filter: Option<&str>,
        members: &[String],
    ) -> Result<Vec<Split>, TableError> {
        let prefixes: Vec<[u8; PARTITION_HASH_LEN]> = match partition_filter {
            Some(p) => vec![hash_partition(p)],
            None => self.known_partitions.lock().unwrap().iter().copied().collect(),
        };

        let mut ring: HashRing<RingNode> = HashRing::new();
        for (i, _) in members.iter().enumerate() {
            ring.add(RingNode(i as u64));
        }

        let (t0, t1) = time_range.unwrap_or((i64::MIN, i64::MAX));
        let mut splits = Vec::new();
        for prefix in prefixes {
            let range = time_bounded_range(prefix, time_range);
            let entries = self.store.range(&range)?;
            splits.extend(group_into_splits(entries, self.split_target_bytes, members, &ring, t0, t1));
        }
        Ok(splits)
    }

    /// Scans `[low_key, high_key)`, deserialises every stored block in
    /// the range, and filters each block's rows down to the split's own
    /// `[time_low_ns, time_high_ns)` bound (§4.6 Read-split path, §8 row
    /// bound invariant). Column projection is applied by the caller (the
    /// server), which only needs the filtered blocks here.
    pub fn read_split(&self, token: &SplitToken) -> Result<Vec<Block>, TableError> {
        let entries = self.store.range(&KeyRange {
            start: token.low_key.clone(),
            end: token.high_key.clone(),
        })?;
        let mut blocks = Vec::with_capacity(entries.len());
        for (_, value) in entries {
            let block = Block::from_bytes(&value).map_err(|e| TableError::StoreUnavailable(e.to_string()))?;
            metrics::SPLITS_SERVED.inc();
            if let Some(block) = block.filter_time_range(&self.time_column, token.time_low_ns, token.time_high_ns) {
                blocks.push(block);
            }
        }
        Ok(blocks)
    }

    pub(crate) fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub(crate) fn known_partitions_snapshot(&self) -> Vec<[u8; PARTITION_HASH_LEN]> {
        self.known_partitions.lock().unwrap().iter().copied().collect()
    }
}

fn time_bounded_range(prefix: [u8; PARTITION_HASH_LEN], time_range: Option<(i64, i64)>) -> KeyRange {
    let (t0, t1) = time_range.unwrap_or((i64::MIN, i64::MAX));
    KeyRange {
        start: TableKey::range_start(prefix, t0).to_vec(),
        end: TableKey::range_end(prefix, t1).to_vec(),
    }
}

fn group_into_splits(
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    target_bytes: u64,
    members: &[String],
    ring: &HashRing<RingNode>,
    time_low_ns: i64,
    time_high_ns: i64,
) -> Vec<Split> {
    let mut splits = Vec::new();
    let mut group_start: Option<Vec<u8>> = None;
    let mut group_bytes: u64 = 0;
    let mut last_key: Option<Vec<u8>> = None;

    for (key, value) in &entries {
        if group_start.is_none() {
            group_start = Some(key.clone());
            group_bytes = 0;
        }
        group_bytes += value.len() as u64;
        last_key = Some(key.clone());
        if group_bytes >= target_bytes {
            splits.push(finish_split(
                group_start.take().unwrap(),
                next_key(key),
                group_bytes,
                members,
                ring,
                time_low_ns,
                time_high_ns,
            ));
            group_bytes = 0;
        }
    }
    if let (Some(start), Some(last)) = (group_start, last_key) {
        splits.push(finish_split(
            start,
            next_key(&last),
            group_bytes,
            members,
            ring,
            time_low_ns,
            time_high_ns,
        ));
    }
    splits
}

/// The smallest key strictly greater than `key`, used as a split's
/// exclusive upper bound so that key itself (the last block in the
/// group) is included.
fn next_key(key: &[u8]) -> Vec<u8> {
    let mut out = key.to_vec();
    out.push(0);
    out
}

fn finish_split(
    low: Vec<u8>,
    high: Vec<u8>,
    estimated_bytes: u64,
    members: &[String],
    ring: &HashRing<RingNode>,
    time_low_ns: i64,
    time_high_ns: i64,
) -> Split {
    let assigned_node_id = ring
        .get(&low)
        .and_then(|node| members.get(node.0 as usize).cloned());
    Split {
        token: SplitToken::new(low, high, time_low_ns, time_high_ns),
        assigned_node_id,
        estimated_bytes,
    }
}

/// The unbounded `[keyspace_start(), keyspace_end())` range, used by the
/// TTL sweeper's legacy full-scan fallback and by tests.
pub fn full_keyspace() -> KeyRange {
    KeyRange {
        start: keyspace_start().to_vec(),
        end: keyspace_end().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;
    use talaria_wire::block::schema_fingerprint;
    use talaria_wire::{ColumnArray, ColumnData};

    fn sample_block(partition: &str, max_time: i64) -> Block {
        Block::new(
            partition.to_string(),
            max_time - 10,
            max_time,
            1,
            schema_fingerprint(&[]),
            vec![
                ColumnArray {
                    name: "p".to_string(),
                    data: ColumnData::String(vec![partition.to_string()]),
                    nulls: vec![false],
                },
                ColumnArray {
                    name: "t".to_string(),
                    data: ColumnData::Timestamp(vec![max_time]),
                    nulls: vec![false],
                },
            ],
        )
        .unwrap()
    }

    fn table() -> Table {
        Table::new(
            "events".to_string(),
            "p".to_string(),
            "t".to_string(),
            Arc::new(MemoryKvStore::new()),
            16 * 1024 * 1024,
        )
    }

    #[test]
    fn append_rejects_missing_partition_column() {
        let t = table();
        let block = Block::new(
            "x".to_string(),
            0,
            1,
            1,
            schema_fingerprint(&[]),
            vec![ColumnArray {
                name: "t".to_string(),
                data: ColumnData::Timestamp(vec![1]),
                nulls: vec![false],
            }],
        )
        .unwrap();
        assert!(matches!(t.append(block), Err(TableError::PartitionNotFound(_))));
    }

    #[test]
    fn append_and_read_split_round_trips() {
        let t = table();
        t.append(sample_block("p1", 100)).unwrap();
        let splits = t.scan_splits(None, Some("p1"), &[]).unwrap();
        assert_eq!(splits.len(), 1);
        let blocks = t.read_split(&splits[0].token).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].partition_key, "p1");
    }

    #[test]
    fn scan_respects_time_range() {
        let t = table();
        t.append(sample_block("p1", 100)).unwrap();
        t.append(sample_block("p1", 5_000)).unwrap();
        let splits = t.scan_splits(Some((0, 1000)), Some("p1"), &[]).unwrap();
        let mut total_rows = 0;
        for split in &splits {
            total_rows += t.read_split(&split.token).unwrap().len();
        }
        assert_eq!(total_rows, 1);
    }

    #[test]
    fn unknown_partition_filter_yields_no_splits() {
        let t = table();
        t.append(sample_block("p1", 100)).unwrap();
        let splits = t.scan_splits(None, Some("does-not-exist"), &[]).unwrap();
        assert!(splits.is_empty());
    }

    /// A block's key is keyed on its *max* time, so a scan bounded to
    /// `[t0, t1)` can select a block whose key falls inside the bound even
    /// though some of its rows don't (§8: "never splitting a single
    /// block"). `read_split` must still filter those rows out.
    #[test]
    fn read_split_filters_rows_outside_the_queried_time_bound() {
        let t = table();
        let wide_block = Block::new(
            "p1".to_string(),
            0,
            1_000,
            2,
            schema_fingerprint(&[]),
            vec![
                ColumnArray {
                    name: "p".to_string(),
                    data: ColumnData::String(vec!["p1".to_string(), "p1".to_string()]),
                    nulls: vec![false, false],
                },
                ColumnArray {
                    name: "t".to_string(),
                    data: ColumnData::Timestamp(vec![0, 1_000]),
                    nulls: vec![false, false],
                },
            ],
        )
        .unwrap();
        t.append(wide_block).unwrap();

        let splits = t.scan_splits(Some((500, 2_000)), Some("p1"), &[]).unwrap();
        assert_eq!(splits.len(), 1);
        let blocks = t.read_split(&splits[0].token).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].row_count, 1);
        assert_eq!(
            blocks[0].column("t").unwrap().data,
            ColumnData::Timestamp(vec![1_000])
        );
    }
}
