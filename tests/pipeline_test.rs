use std::sync::Arc;

use talaria::codec::{from_columnar_by, RowSource};
use talaria::error::TableError;
use talaria::kv::MemoryKvStore;
use talaria::table::Table;
use talaria_wire::{ColumnType, Value};

struct VecRowSource {
    schema: Vec<(String, ColumnType)>,
    rows: std::vec::IntoIter<Vec<Value>>,
}

impl VecRowSource {
    fn new(schema: Vec<(String, ColumnType)>, rows: Vec<Vec<Value>>) -> Self {
        VecRowSource {
            schema,
            rows: rows.into_iter(),
        }
    }
}

impl RowSource for VecRowSource {
    fn schema(&self) -> &Vec<(String, ColumnType)> {
        &self.schema
    }
    fn next_row(&mut self) -> Result<Option<Vec<Value>>, TableError> {
        Ok(self.rows.next())
    }
}

fn schema() -> Vec<(String, ColumnType)> {
    vec![
        ("device".to_string(), ColumnType::String),
        ("ts".to_string(), ColumnType::Timestamp),
        ("reading".to_string(), ColumnType::Float64),
    ]
}

fn rows_for(device: &str, count: i64) -> Vec<Vec<Value>> {
    (0..count)
        .map(|i| {
            vec![
                Value::String(device.to_string()),
                Value::Timestamp(i * 1_000_000),
                Value::Float64(i as f64),
            ]
        })
        .collect()
}

fn fresh_table() -> Table {
    Table::new(
        "events".to_string(),
        "device".to_string(),
        "ts".to_string(),
        Arc::new(MemoryKvStore::new()),
        16 * 1024 * 1024,
    )
}

#[test]
fn decoded_blocks_survive_a_full_append_and_read_split_round_trip() {
    let mut rows = rows_for("sensor-1", 4);
    rows.extend(rows_for("sensor-2", 6));
    let source = VecRowSource::new(schema(), rows);

    let (blocks, stats) = from_columnar_by(source, "device", "ts").unwrap();
    assert_eq!(stats.rows_seen, 10);
    assert_eq!(stats.rows_dropped, 0);
    assert_eq!(blocks.len(), 2);

    let table = fresh_table();
    for block in blocks {
        table.append(block).unwrap();
    }

    let sensor1_splits = table.scan_splits(None, Some("sensor-1"), &[]).unwrap();
    assert_eq!(sensor1_splits.len(), 1);
    let sensor1_blocks = table.read_split(&sensor1_splits[0].token).unwrap();
    assert_eq!(sensor1_blocks.len(), 1);
    assert_eq!(sensor1_blocks[0].row_count, 4);

    let sensor2_splits = table.scan_splits(None, Some("sensor-2"), &[]).unwrap();
    let sensor2_blocks = table.read_split(&sensor2_splits[0].token).unwrap();
    assert_eq!(sensor2_blocks[0].row_count, 6);

    // No partition filter ranges over every partition known to the table.
    let all_splits = table.scan_splits(None, None, &[]).unwrap();
    let total_rows: usize = all_splits
        .iter()
        .map(|s| table.read_split(&s.token).unwrap().iter().map(|b| b.row_count).sum::<usize>())
        .sum();
    assert_eq!(total_rows, 10);
}

#[test]
fn time_range_filter_excludes_blocks_outside_the_window() {
    let source = VecRowSource::new(schema(), rows_for("sensor-1", 3));
    let (blocks, _stats) = from_columnar_by(source, "device", "ts").unwrap();

    let table = fresh_table();
    for block in blocks {
        table.append(block).unwrap();
    }

    // rows_for produces timestamps 0, 1_000_000, 2_000_000 (ns); a window
    // ending before the first timestamp should exclude the single sealed
    // block entirely.
    let splits = table.scan_splits(Some((-10, -5)), Some("sensor-1"), &[]).unwrap();
    assert!(splits.is_empty());
}

#[test]
fn a_block_missing_the_configured_time_column_is_rejected_on_append() {
    let schema_without_ts = vec![
        ("device".to_string(), ColumnType::String),
        ("reading".to_string(), ColumnType::Float64),
    ];
    let rows = vec![vec![Value::String("sensor-1".to_string()), Value::Float64(1.0)]];
    let source = VecRowSource::new(schema_without_ts, rows);
    let (blocks, _stats) = from_columnar_by(source, "device", "reading").unwrap();

    let table = fresh_table();
    let err = table.append(blocks.into_iter().next().unwrap());
    assert!(err.is_err());
}
