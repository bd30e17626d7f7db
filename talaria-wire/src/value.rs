use serde::{Deserialize, Serialize};

/// A single decoded cell, tagged by its source column type.
///
/// The decoder boundary exposes a closed, tagged variant rather than a
/// generic `Any`, so every downstream consumer can match exhaustively
/// instead of downcasting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int64(i64),
    Float64(f64),
    String(String),
    Bool(bool),
    /// Unix nanoseconds.
    Timestamp(i64),
    /// Canonical JSON text for a nested container cell.
    Json(String),
    Null,
}

impl Value {
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Int64(_) => Some(ColumnType::Int64),
            Value::Float64(_) => Some(ColumnType::Float64),
            Value::String(_) => Some(ColumnType::String),
            Value::Bool(_) => Some(ColumnType::Bool),
            Value::Timestamp(_) => Some(ColumnType::Timestamp),
            Value::Json(_) => Some(ColumnType::Json),
            Value::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Partition-key cells must be string or integer; anything else causes
    /// the row to be dropped (§4.1).
    pub fn as_partition_key(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Int64(i) => Some(i.to_string()),
            _ => None,
        }
    }

    pub fn as_timestamp_ns(&self) -> Option<i64> {
        match self {
            Value::Timestamp(ns) => Some(*ns),
            Value::Int64(ns) => Some(*ns),
            _ => None,
        }
    }
}

/// Column types recognised by the block codec. Unknown source types are
/// rejected rather than silently coerced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Int64,
    Float64,
    String,
    Bool,
    Timestamp,
    Json,
}

impl ColumnType {
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Int64 => "int64",
            ColumnType::Float64 => "float64",
            ColumnType::String => "string",
            ColumnType::Bool => "bool",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Json => "json",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
