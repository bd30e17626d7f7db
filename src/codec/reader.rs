//! Arrow-IPC backed implementation of [`RowSource`].
//!
//! A field tagged with Arrow metadata `logical_type = "json"` is read as
//! [`Value::Json`] instead of [`Value::String`]; every other supported
//! Arrow type maps onto exactly one [`ColumnType`]. Anything else is a
//! decode error, matching "unknown types are rejected" (§3).

use std::io::{Cursor, Read, Seek};
use std::sync::Arc;

use arrow::array::Array;
use arrow::datatypes::{DataType, Schema as ArrowSchema, TimeUnit};
use arrow::ipc::reader::FileReader;
use arrow::record_batch::RecordBatch;
use talaria_wire::{ColumnType, Value};

use crate::error::TableError;

pub type Schema = Vec<(String, ColumnType)>;

const JSON_METADATA_KEY: &str = "logical_type";
const JSON_METADATA_VALUE: &str = "json";

/// A columnar decoder that exposes its schema and streams rows one at a
/// time. `FromColumnarBy` (see [`crate::codec::from_columnar_by`]) is
/// written against this trait rather than Arrow directly so it can be
/// driven by a fake in tests.
pub trait RowSource {
    fn schema(&self) -> &Schema;
    /// Returns the next row as one [`Value`] per schema column, or `None`
    /// at end of input. A malformed row is a hard decode error.
    fn next_row(&mut self) -> Result<Option<Vec<Value>>, TableError>;
}

pub struct ArrowRowSource<R> {
    reader: FileReader<R>,
    schema: Schema,
    column_types: Vec<ColumnType>,
    current_batch: Option<RecordBatch>,
    row_in_batch: usize,
}

impl<R: Read + Seek> ArrowRowSource<R> {
    pub fn new(source: R) -> Result<Self, TableError> {
        let reader = FileReader::try_new(source, None)
            .map_err(|e| TableError::StoreUnavailable(format!("failed to open columnar file: {e}")))?;
        let arrow_schema = reader.schema();
        let (schema, column_types) = translate_schema(&arrow_schema)?;
        Ok(ArrowRowSource {
            reader,
            schema,
            column_types,
            current_batch: None,
            row_in_batch: 0,
        })
    }

    fn advance_batch(&mut self) -> Result<bool, TableError> {
        match self.reader.next() {
            Some(Ok(batch)) => {
                self.current_batch = Some(batch);
                self.row_in_batch = 0;
                Ok(true)
            }
            Some(Err(e)) => Err(TableError::StoreUnavailable(format!("columnar decode error: {e}"))),
            None => {
                self.current_batch = None;
                Ok(false)
            }
        }
    }
}

impl ArrowRowSource<Cursor<Vec<u8>>> {
    pub fn from_bytes(buf: Vec<u8>) -> Result<Self, TableError> {
        ArrowRowSource::new(Cursor::new(buf))
    }
}

impl<R: Read + Seek> RowSource for ArrowRowSource<R> {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn next_row(&mut self) -> Result<Option<Vec<Value>>, TableError> {
        loop {
            if let Some(batch) = &self.current_batch {
                if self.row_in_batch < batch.num_rows() {
                    let row = row_at(batch, &self.column_types, self.row_in_batch)?;
                    self.row_in_batch += 1;
                    return Ok(Some(row));
                }
            }
            if !self.advance_batch()? {
                return Ok(None);
            }
        }
    }
}

fn translate_schema(schema: &ArrowSchema) -> Result<(Schema, Vec<ColumnType>), TableError> {
    let mut out = Vec::with_capacity(schema.fields().len());
    let mut types = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let is_json = field
            .metadata()
            .get(JSON_METADATA_KEY)
            .map(|v| v == JSON_METADATA_VALUE)
            .unwrap_or(false);
        let column_type = if is_json {
            if !matches!(field.data_type(), DataType::Utf8 | DataType::LargeUtf8) {
                return Err(TableError::SchemaMismatch {
                    column: field.name().clone(),
                    expected: "utf8",
                    found: format!("{:?} tagged logical_type=json", field.data_type()),
                });
            }
            ColumnType::Json
        } else {
            match field.data_type() {
                DataType::Int64 => ColumnType::Int64,
                DataType::Float64 => ColumnType::Float64,
                DataType::Utf8 | DataType::LargeUtf8 => ColumnType::String,
                DataType::Boolean => ColumnType::Bool,
                DataType::Timestamp(TimeUnit::Nanosecond, _) => ColumnType::Timestamp,
                other => {
                    return Err(TableError::SchemaMismatch {
                        column: field.name().clone(),
                        expected: "int64|float64|utf8|bool|timestamp(ns)",
                        found: format!("{other:?}"),
                    })
                }
            }
        };
        out.push((field.name().clone(), column_type));
        types.push(column_type);
    }
    Ok((out, types))
}

fn row_at(batch: &RecordBatch, types: &[ColumnType], row: usize) -> Result<Vec<Value>, TableError> {
    let mut values = Vec::with_capacity(types.len());
    for (i, column_type) in types.iter().enumerate() {
        let column: &Arc<dyn Array> = batch.column(i);
        if column.is_null(row) {
            values.push(Value::Null);
            continue;
        }
        let value = match column_type {
            ColumnType::Int64 => {
                let arr = column
                    .as_any()
                    .downcast_ref::<arrow::array::Int64Array>()
                    .expect("schema translation guarantees Int64Array");
                Value::Int64(arr.value(row))
            }
            ColumnType::Float64 => {
                let arr = column
                    .as_any()
                    .downcast_ref::<arrow::array::Float64Array>()
                    .expect("schema translation guarantees Float64Array");
                Value::Float64(arr.value(row))
            }
            ColumnType::Bool => {
                let arr = column
                    .as_any()
                    .downcast_ref::<arrow::array::BooleanArray>()
                    .expect("schema translation guarantees BooleanArray");
                Value::Bool(arr.value(row))
            }
            ColumnType::Timestamp => {
                let arr = column
                    .as_any()
                    .downcast_ref::<arrow::array::TimestampNanosecondArray>()
                    .expect("schema translation guarantees TimestampNanosecondArray");
                Value::Timestamp(arr.value(row))
            }
            ColumnType::String => Value::String(string_value(column, row)),
            ColumnType::Json => Value::Json(canonicalize_json(&string_value(column, row))?),
        };
        values.push(value);
    }
    Ok(values)
}

fn string_value(column: &Arc<dyn Array>, row: usize) -> String {
    if let Some(arr) = column.as_any().downcast_ref::<arrow::array::StringArray>() {
        return arr.value(row).to_string();
    }
    let arr = column
        .as_any()
        .downcast_ref::<arrow::array::LargeStringArray>()
        .expect("schema translation guarantees a Utf8-family array");
    arr.value(row).to_string()
}

/// Re-encodes a JSON cell as canonical JSON bytes (§4.1 step 4), so
/// whitespace or key-order differences in the source file don't leak
/// into stored blocks.
fn canonicalize_json(raw: &str) -> Result<String, TableError> {
    let parsed: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| TableError::SchemaMismatch {
            column: "<json>".to_string(),
            expected: "valid json",
            found: e.to_string(),
        })?;
    serde_json::to_string(&parsed).map_err(|e| TableError::SchemaMismatch {
        column: "<json>".to_string(),
        expected: "valid json",
        found: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_json_normalizes_whitespace() {
        let got = canonicalize_json("{ \"a\" :  1 }").unwrap();
        assert_eq!(got, "{\"a\":1}");
    }

    #[test]
    fn canonicalize_json_rejects_malformed_input() {
        assert!(canonicalize_json("{not json").is_err());
    }
}
