//! Per-partition column accumulation (§4.1 step 3, `FillNulls`).
//!
//! One [`PartitionBuilder`] exists per distinct partition value seen so
//! far in the current file. Rows are appended one at a time; when the
//! builder reaches `MAX_ROWS` the caller seals it into a [`Block`] and
//! starts a fresh builder for that partition.

use talaria_wire::block::MAX_ROWS;
use talaria_wire::{Block, BlockError, ColumnArray, ColumnData, ColumnType, Value};

use crate::codec::Schema;

pub struct PartitionBuilder {
    partition_key: String,
    schema: Schema,
    time_column_idx: usize,
    rows: Vec<Vec<Value>>,
    min_time_ns: i64,
    max_time_ns: i64,
}

impl PartitionBuilder {
    pub fn new(partition_key: String, schema: Schema, time_column_idx: usize) -> Self {
        PartitionBuilder {
            partition_key,
            schema,
            time_column_idx,
            rows: Vec::new(),
            min_time_ns: i64::MAX,
            max_time_ns: i64::MIN,
        }
    }

    pub fn is_full(&self) -> bool {
        self.rows.len() >= MAX_ROWS
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Appends one row's worth of values, assumed to be positioned
    /// identically to `self.schema`. Returns the row's dropped-ness is
    /// the caller's concern (partition-cell validation happens before
    /// this is called); this only tracks the time bounds.
    pub fn push_row(&mut self, values: Vec<Value>) {
        if let Some(t) = values.get(self.time_column_idx).and_then(Value::as_timestamp_ns) {
            self.min_time_ns = self.min_time_ns.min(t);
            self.max_time_ns = self.max_time_ns.max(t);
        }
        self.rows.push(values);
    }

    /// Equalises all column lengths to the current row count and
    /// produces an immutable [`Block`]. Consumes the builder.
    pub fn seal(self, schema_fingerprint: u64) -> Result<Block, BlockError> {
        let row_count = self.rows.len();
        let mut columns: Vec<ColumnArray> = self
            .schema
            .iter()
            .map(|(name, column_type)| ColumnArray {
                name: name.clone(),
                data: empty_column_data(*column_type),
                nulls: Vec::with_capacity(row_count),
            })
            .collect();

        for row in &self.rows {
            for (col_idx, value) in row.iter().enumerate() {
                push_value(&mut columns[col_idx], value);
            }
        }

        Block::new(
            self.partition_key,
            self.min_time_ns,
            self.max_time_ns,
            row_count,
            schema_fingerprint,
            columns,
        )
    }
}

fn empty_column_data(column_type: ColumnType) -> ColumnData {
    match column_type {
        ColumnType::Int64 => ColumnData::Int64(Vec::new()),
        ColumnType::Float64 => ColumnData::Float64(Vec::new()),
        ColumnType::String => ColumnData::String(Vec::new()),
        ColumnType::Bool => ColumnData::Bool(Vec::new()),
        ColumnType::Timestamp => ColumnData::Timestamp(Vec::new()),
        ColumnType::Json => ColumnData::Json(Vec::new()),
    }
}

fn push_value(column: &mut ColumnArray, value: &Value) {
    let is_null = value.is_null();
    column.nulls.push(is_null);
    match &mut column.data {
        ColumnData::Int64(v) => v.push(if let Value::Int64(x) = value { *x } else { 0 }),
        ColumnData::Float64(v) => v.push(if let Value::Float64(x) = value { *x } else { 0.0 }),
        ColumnData::String(v) => v.push(if let Value::String(x) = value { x.clone() } else { String::new() }),
        ColumnData::Bool(v) => v.push(if let Value::Bool(x) = value { *x } else { false }),
        ColumnData::Timestamp(v) => v.push(if let Value::Timestamp(x) = value { *x } else { 0 }),
        ColumnData::Json(v) => v.push(if let Value::Json(x) = value { x.clone() } else { String::new() }),
    }
}
