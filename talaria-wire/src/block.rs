use byteorder::{ByteOrder, LittleEndian};
use std::hash::{Hash, Hasher};

use crate::value::ColumnType;

/// Rows per block, per §3 Data Model. A block never grows past this.
pub const MAX_ROWS: usize = 10_000;

/// Target size, in bytes, for a single split produced by the time-series
/// table's split-producer algorithm (§4.6).
pub const SPLIT_TARGET_BYTES: u64 = 16 * 1024 * 1024;

/// One column's encoded values plus a parallel null bitmap.
///
/// `nulls[i] == true` means row `i` is null in this column; the
/// corresponding slot in `data` still holds a (ignored) placeholder so
/// every column stays the same length, per the `FillNulls` step of the
/// block codec.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnArray {
    pub name: String,
    pub data: ColumnData,
    pub nulls: Vec<bool>,
}

impl ColumnArray {
    /// Builds a copy of this column containing only the rows at `keep`,
    /// in order.
    fn select(&self, keep: &[usize]) -> ColumnArray {
        let nulls = keep.iter().map(|&i| self.nulls[i]).collect();
        let data = match &self.data {
            ColumnData::Int64(v) => ColumnData::Int64(keep.iter().map(|&i| v[i]).collect()),
            ColumnData::Float64(v) => ColumnData::Float64(keep.iter().map(|&i| v[i]).collect()),
            ColumnData::String(v) => ColumnData::String(keep.iter().map(|&i| v[i].clone()).collect()),
            ColumnData::Bool(v) => ColumnData::Bool(keep.iter().map(|&i| v[i]).collect()),
            ColumnData::Timestamp(v) => ColumnData::Timestamp(keep.iter().map(|&i| v[i]).collect()),
            ColumnData::Json(v) => ColumnData::Json(keep.iter().map(|&i| v[i].clone()).collect()),
        };
        ColumnArray {
            name: self.name.clone(),
            data,
            nulls,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ColumnData {
    Int64(Vec<i64>),
    Float64(Vec<f64>),
    String(Vec<String>),
    Bool(Vec<bool>),
    /// Unix nanoseconds.
    Timestamp(Vec<i64>),
    /// Canonical JSON text, one document per row.
    Json(Vec<String>),
}

impl ColumnData {
    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnData::Int64(_) => ColumnType::Int64,
            ColumnData::Float64(_) => ColumnType::Float64,
            ColumnData::String(_) => ColumnType::String,
            ColumnData::Bool(_) => ColumnType::Bool,
            ColumnData::Timestamp(_) => ColumnType::Timestamp,
            ColumnData::Json(_) => ColumnType::Json,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Int64(v) => v.len(),
            ColumnData::Float64(v) => v.len(),
            ColumnData::String(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::Timestamp(v) => v.len(),
            ColumnData::Json(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An immutable, sealed columnar batch for a single partition (§3).
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub partition_key: String,
    pub min_time_ns: i64,
    pub max_time_ns: i64,
    pub row_count: usize,
    pub schema_fingerprint: u64,
    pub columns: Vec<ColumnArray>,
}

#[derive(thiserror::Error, Debug)]
pub enum BlockError {
    #[error("block exceeds MAX_ROWS ({row_count} > {MAX_ROWS})")]
    TooManyRows { row_count: usize },
    #[error("block has zero rows")]
    Empty,
    #[error("column {name} has length {got}, expected {expected}")]
    ColumnLengthMismatch {
        name: String,
        got: usize,
        expected: usize,
    },
    #[error("malformed block payload: {0}")]
    Malformed(String),
}

impl Block {
    /// Validates the invariants from §3: 1 <= row_count <= MAX_ROWS, and
    /// every column (and its null bitmap) has exactly `row_count` entries.
    pub fn new(
        partition_key: String,
        min_time_ns: i64,
        max_time_ns: i64,
        row_count: usize,
        schema_fingerprint: u64,
        columns: Vec<ColumnArray>,
    ) -> Result<Block, BlockError> {
        if row_count == 0 {
            return Err(BlockError::Empty);
        }
        if row_count > MAX_ROWS {
            return Err(BlockError::TooManyRows { row_count });
        }
        for col in &columns {
            if col.data.len() != row_count {
                return Err(BlockError::ColumnLengthMismatch {
                    name: col.name.clone(),
                    got: col.data.len(),
                    expected: row_count,
                });
            }
            if col.nulls.len() != row_count {
                return Err(BlockError::ColumnLengthMismatch {
                    name: col.name.clone(),
                    got: col.nulls.len(),
                    expected: row_count,
                });
            }
        }
        Ok(Block {
            partition_key,
            min_time_ns,
            max_time_ns,
            row_count,
            schema_fingerprint,
            columns,
        })
    }

    pub fn column(&self, name: &str) -> Option<&ColumnArray> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Restricts this block to rows whose `time_column` value falls in
    /// `[lo, hi)`, so a split that groups several blocks at block
    /// granularity (never splitting one) can still honor a scan's exact
    /// `[t0, t1)` bound at the row level (§8 "For all scans over
    /// `[t0,t1)`, returned rows satisfy `t0 <= time < t1`"). Rows with a
    /// null or non-timestamp time column are dropped, since they cannot
    /// be proven to satisfy the bound. Returns `None` if no rows match.
    pub fn filter_time_range(&self, time_column: &str, lo: i64, hi: i64) -> Option<Block> {
        if lo == i64::MIN && hi == i64::MAX {
            return Some(self.clone());
        }
        let time_col = self.column(time_column)?;
        let times = match &time_col.data {
            ColumnData::Timestamp(v) => v,
            _ => return Some(self.clone()),
        };
        let keep: Vec<usize> = (0..self.row_count)
            .filter(|&i| !time_col.nulls[i] && times[i] >= lo && times[i] < hi)
            .collect();
        if keep.len() == self.row_count {
            return Some(self.clone());
        }
        if keep.is_empty() {
            return None;
        }
        let columns = self.columns.iter().map(|c| c.select(&keep)).collect();
        Block::new(
            self.partition_key.clone(),
            self.min_time_ns,
            self.max_time_ns,
            keep.len(),
            self.schema_fingerprint,
            columns,
        )
        .ok()
    }

    /// Rough, deterministic estimate of the block's serialized byte size,
    /// used by the split-producer to group keys into ~`SPLIT_TARGET_BYTES`
    /// splits without materialising the split.
    pub fn estimated_bytes(&self) -> u64 {
        let mut total = 32u64;
        for col in &self.columns {
            total += col.name.len() as u64 + 8;
            total += col.nulls.len() as u64;
            total += match &col.data {
                ColumnData::Int64(v) => (v.len() * 8) as u64,
                ColumnData::Float64(v) => (v.len() * 8) as u64,
                ColumnData::Timestamp(v) => (v.len() * 8) as u64,
                ColumnData::Bool(v) => v.len() as u64,
                ColumnData::String(v) => v.iter().map(|s| s.len() as u64 + 4).sum(),
                ColumnData::Json(v) => v.iter().map(|s| s.len() as u64 + 4).sum(),
            };
        }
        total
    }

    /// Serialises the block column-at-a-time with a length prefix on every
    /// variable-length section, per §4.6 ("Serialise the block
    /// (column-at-a-time, length-prefixed) and Put").
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.estimated_bytes() as usize);
        write_lp_str(&mut buf, &self.partition_key);
        write_i64(&mut buf, self.min_time_ns);
        write_i64(&mut buf, self.max_time_ns);
        write_u32(&mut buf, self.row_count as u32);
        write_u64(&mut buf, self.schema_fingerprint);
        write_u32(&mut buf, self.columns.len() as u32);
        for col in &self.columns {
            write_lp_str(&mut buf, &col.name);
            buf.push(type_tag(col.data.column_type()));
            write_bitmap(&mut buf, &col.nulls);
            write_column_data(&mut buf, &col.data);
        }
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Block, BlockError> {
        let mut cur = Cursor { buf: bytes, pos: 0 };
        let partition_key = cur.read_lp_str()?;
        let min_time_ns = cur.read_i64()?;
        let max_time_ns = cur.read_i64()?;
        let row_count = cur.read_u32()? as usize;
        let schema_fingerprint = cur.read_u64()?;
        let num_columns = cur.read_u32()? as usize;
        let mut columns = Vec::with_capacity(num_columns);
        for _ in 0..num_columns {
            let name = cur.read_lp_str()?;
            let tag = cur.read_u8()?;
            let nulls = cur.read_bitmap(row_count)?;
            let data = cur.read_column_data(tag, row_count)?;
            columns.push(ColumnArray { name, data, nulls });
        }
        Block::new(
            partition_key,
            min_time_ns,
            max_time_ns,
            row_count,
            schema_fingerprint,
            columns,
        )
    }
}

/// Fingerprints an ordered `(name, type)` schema so the table can reject a
/// block whose columns disagree with a previously-seen schema for the same
/// logical column without comparing full column lists every time.
pub fn schema_fingerprint(columns: &[(String, ColumnType)]) -> u64 {
    let mut hasher = seahash::SeaHasher::default();
    for (name, ty) in columns {
        name.hash(&mut hasher);
        (*ty as u8 as u64).hash(&mut hasher)
    }
    hasher.finish()
}

fn type_tag(t: ColumnType) -> u8 {
    match t {
        ColumnType::Int64 => 0,
        ColumnType::Float64 => 1,
        ColumnType::String => 2,
        ColumnType::Bool => 3,
        ColumnType::Timestamp => 4,
        ColumnType::Json => 5,
    }
}

fn write_u32(buf: &mut Vec<u8>, v: u32) {
    let mut tmp = [0u8; 4];
    LittleEndian::write_u32(&mut tmp, v);
    buf.extend_from_slice(&tmp);
}

fn write_u64(buf: &mut Vec<u8>, v: u64) {
    let mut tmp = [0u8; 8];
    LittleEndian::write_u64(&mut tmp, v);
    buf.extend_from_slice(&tmp);
}

fn write_i64(buf: &mut Vec<u8>, v: i64) {
    let mut tmp = [0u8; 8];
    LittleEndian::write_i64(&mut tmp, v);
    buf.extend_from_slice(&tmp);
}

fn write_f64(buf: &mut Vec<u8>, v: f64) {
    let mut tmp = [0u8; 8];
    LittleEndian::write_f64(&mut tmp, v);
    buf.extend_from_slice(&tmp);
}

fn write_lp_str(buf: &mut Vec<u8>, s: &str) {
    write_u32(buf, s.len() as u32);
    buf.extend_from_slice(s.as_bytes());
}

fn write_bitmap(buf: &mut Vec<u8>, nulls: &[bool]) {
    let packed_len = nulls.len().div_ceil(8);
    let mut packed = vec![0u8; packed_len];
    for (i, is_null) in nulls.iter().enumerate() {
        if *is_null {
            packed[i / 8] |= 1 << (i % 8);
        }
    }
    write_u32(buf, packed.len() as u32);
    buf.extend_from_slice(&packed);
}

fn write_column_data(buf: &mut Vec<u8>, data: &ColumnData) {
    match data {
        ColumnData::Int64(v) | ColumnData::Timestamp(v) => {
            write_u32(buf, (v.len() * 8) as u32);
            for x in v {
                write_i64(buf, *x);
            }
        }
        ColumnData::Float64(v) => {
            write_u32(buf, (v.len() * 8) as u32);
            for x in v {
                write_f64(buf, *x);
            }
        }
        ColumnData::Bool(v) => {
            write_bitmap(buf, v);
        }
        ColumnData::String(v) | ColumnData::Json(v) => {
            let mut section = Vec::new();
            for s in v {
                write_lp_str(&mut section, s);
            }
            write_u32(buf, section.len() as u32);
            buf.extend_from_slice(&section);
        }
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn need(&self, n: usize) -> Result<(), BlockError> {
        if self.pos + n > self.buf.len() {
            Err(BlockError::Malformed(format!(
                "expected {} more bytes at offset {}, have {}",
                n,
                self.pos,
                self.buf.len() - self.pos
            )))
        } else {
            Ok(())
        }
    }

    fn read_u8(&mut self) -> Result<u8, BlockError> {
        self.need(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    fn read_u32(&mut self) -> Result<u32, BlockError> {
        self.need(4)?;
        let v = LittleEndian::read_u32(&self.buf[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(v)
    }

    fn read_u64(&mut self) -> Result<u64, BlockError> {
        self.need(8)?;
        let v = LittleEndian::read_u64(&self.buf[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(v)
    }

    fn read_i64(&mut self) -> Result<i64, BlockError> {
        self.need(8)?;
        let v = LittleEndian::read_i64(&self.buf[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(v)
    }

    fn read_f64(&mut self) -> Result<f64, BlockError> {
        self.need(8)?;
        let v = LittleEndian::read_f64(&self.buf[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(v)
    }

    fn read_lp_str(&mut self) -> Result<String, BlockError> {
        let len = self.read_u32()? as usize;
        self.need(len)?;
        let s = std::str::from_utf8(&self.buf[self.pos..self.pos + len])
            .map_err(|e| BlockError::Malformed(e.to_string()))?
            .to_string();
        self.pos += len;
        Ok(s)
    }

    fn read_bitmap(&mut self, row_count: usize) -> Result<Vec<bool>, BlockError> {
        let byte_len = self.read_u32()? as usize;
        self.need(byte_len)?;
        let packed = &self.buf[self.pos..self.pos + byte_len];
        self.pos += byte_len;
        let mut out = Vec::with_capacity(row_count);
        for i in 0..row_count {
            out.push(packed[i / 8] & (1 << (i % 8)) != 0);
        }
        Ok(out)
    }

    fn read_column_data(&mut self, tag: u8, row_count: usize) -> Result<ColumnData, BlockError> {
        let section_len = self.read_u32()? as usize;
        let start = self.pos;
        let data = match tag {
            0 | 4 => {
                let mut v = Vec::with_capacity(row_count);
                for _ in 0..row_count {
                    v.push(self.read_i64()?);
                }
                if tag == 0 {
                    ColumnData::Int64(v)
                } else {
                    ColumnData::Timestamp(v)
                }
            }
            1 => {
                let mut v = Vec::with_capacity(row_count);
                for _ in 0..row_count {
                    v.push(self.read_f64()?);
                }
                ColumnData::Float64(v)
            }
            2 | 5 => {
                let mut v = Vec::with_capacity(row_count);
                for _ in 0..row_count {
                    v.push(self.read_lp_str()?);
                }
                if tag == 2 {
                    ColumnData::String(v)
                } else {
                    ColumnData::Json(v)
                }
            }
            3 => {
                self.pos = start;
                let bits = self.read_bitmap(row_count)?;
                ColumnData::Bool(bits)
            }
            other => return Err(BlockError::Malformed(format!("unknown column tag {other}"))),
        };
        if tag != 3 && self.pos != start + section_len {
            return Err(BlockError::Malformed(
                "column section length did not match consumed bytes".to_string(),
            ));
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> Block {
        Block::new(
            "device-1".to_string(),
            100,
            900,
            3,
            schema_fingerprint(&[
                ("ts".to_string(), ColumnType::Timestamp),
                ("val".to_string(), ColumnType::Float64),
                ("tag".to_string(), ColumnType::String),
            ]),
            vec![
                ColumnArray {
                    name: "ts".to_string(),
                    data: ColumnData::Timestamp(vec![100, 500, 900]),
                    nulls: vec![false, false, false],
                },
                ColumnArray {
                    name: "val".to_string(),
                    data: ColumnData::Float64(vec![1.5, 2.5, 0.0]),
                    nulls: vec![false, false, true],
                },
                ColumnArray {
                    name: "tag".to_string(),
                    data: ColumnData::String(vec![
                        "a".to_string(),
                        "b".to_string(),
                        "".to_string(),
                    ]),
                    nulls: vec![false, false, true],
                },
            ],
        )
        .unwrap()
    }

    #[test]
    fn round_trips_through_bytes() {
        let block = sample_block();
        let bytes = block.to_bytes();
        let decoded = Block::from_bytes(&bytes).unwrap();
        assert_eq!(block, decoded);
    }

    #[test]
    fn rejects_empty_block() {
        let err = Block::new("p".to_string(), 0, 0, 0, 0, vec![]);
        assert!(matches!(err, Err(BlockError::Empty)));
    }

    #[test]
    fn rejects_too_many_rows() {
        let err = Block::new("p".to_string(), 0, 0, MAX_ROWS + 1, 0, vec![]);
        assert!(matches!(err, Err(BlockError::TooManyRows { .. })));
    }

    #[test]
    fn rejects_column_length_mismatch() {
        let err = Block::new(
            "p".to_string(),
            0,
            0,
            3,
            0,
            vec![ColumnArray {
                name: "x".to_string(),
                data: ColumnData::Int64(vec![1, 2]),
                nulls: vec![false, false],
            }],
        );
        assert!(matches!(err, Err(BlockError::ColumnLengthMismatch { .. })));
    }

    #[test]
    fn filter_time_range_drops_rows_outside_bound() {
        let block = sample_block();
        let filtered = block.filter_time_range("ts", 0, 600).unwrap();
        assert_eq!(filtered.row_count, 2);
        let ts = filtered.column("ts").unwrap();
        assert_eq!(ts.data, ColumnData::Timestamp(vec![100, 500]));
    }

    #[test]
    fn filter_time_range_returns_none_when_nothing_matches() {
        let block = sample_block();
        assert!(block.filter_time_range("ts", 10_000, 20_000).is_none());
    }

    #[test]
    fn filter_time_range_unbounded_is_a_no_op() {
        let block = sample_block();
        let filtered = block.filter_time_range("ts", i64::MIN, i64::MAX).unwrap();
        assert_eq!(filtered, block);
    }

    #[test]
    fn schema_fingerprint_is_order_sensitive() {
        let a = schema_fingerprint(&[
            ("a".to_string(), ColumnType::Int64),
            ("b".to_string(), ColumnType::String),
        ]);
        let b = schema_fingerprint(&[
            ("b".to_string(), ColumnType::String),
            ("a".to_string(), ColumnType::Int64),
        ]);
        assert_ne!(a, b);
    }
}
