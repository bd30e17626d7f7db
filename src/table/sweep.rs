//! The TTL sweeper (§4.6 "TTL sweep"): a single background task that
//! periodically removes blocks whose max time has aged out.

use std::sync::Arc;
use std::time::Duration;

use talaria_wire::TableKey;
use tokio_util::sync::CancellationToken;

use crate::kv::KeyRange;
use crate::metrics;
use crate::table::Table;

pub struct TtlSweeper {
    table: Arc<Table>,
    ttl: Duration,
    interval: Duration,
    cancel: CancellationToken,
}

impl TtlSweeper {
    pub fn new(table: Arc<Table>, ttl: Duration, interval: Duration, cancel: CancellationToken) -> Self {
        TtlSweeper {
            table,
            ttl,
            interval,
            cancel,
        }
    }

    /// Runs the sweep on `interval` until cancelled. Each run is
    /// idempotent and safe to re-run (§4.6): rows already deleted in a
    /// previous sweep simply don't appear in the next scan.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once(now_unix_ns()) {
                        log::warn!("ttl sweep failed: {e}");
                    }
                }
            }
        }
    }

    fn sweep_once(&self, now_ns: i64) -> Result<(), crate::error::TableError> {
        let cutoff = now_ns.saturating_sub(self.ttl.as_nanos() as i64);
        let store = self.table.store();
        for prefix in self.table.known_partitions_snapshot() {
            let range = KeyRange {
                start: TableKey::range_start(prefix, i64::MIN).to_vec(),
                end: TableKey::range_end(prefix, cutoff).to_vec(),
            };
            let expired = store.range(&range)?;
            if expired.is_empty() {
                continue;
            }
            store.delete_range(&range)?;
            metrics::ROWS_EXPIRED.inc_by(expired.len() as f64);
        }
        Ok(())
    }
}

fn now_unix_ns() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;
    use crate::table::Table;
    use std::sync::Arc;
    use talaria_wire::block::schema_fingerprint;
    use talaria_wire::{Block, ColumnArray, ColumnData};

    fn sample_block(partition: &str, max_time: i64) -> Block {
        Block::new(
            partition.to_string(),
            max_time - 1,
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

    #[test]
    fn sweep_removes_only_expired_blocks() {
        let table = Arc::new(Table::new(
            "events".to_string(),
            "p".to_string(),
            "t".to_string(),
            Arc::new(MemoryKvStore::new()),
            16 * 1024 * 1024,
        ));
        let ttl = Duration::from_secs(60);
        let now = 1_000_000_000_000i64;
        table.append(sample_block("p1", now - ttl.as_nanos() as i64 * 2)).unwrap();
        table.append(sample_block("p1", now)).unwrap();

        let sweeper = TtlSweeper::new(table.clone(), ttl, Duration::from_secs(1), CancellationToken::new());
        sweeper.sweep_once(now).unwrap();

        let remaining = table.scan_splits(None, Some("p1"), &[]).unwrap();
        let mut rows = 0;
        for split in remaining {
            rows += table.read_split(&split.token).unwrap().len();
        }
        assert_eq!(rows, 1);
    }
}
