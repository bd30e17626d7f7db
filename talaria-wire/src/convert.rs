//! Conversions between the in-process [`crate::block`] types and the
//! generated exchange-protocol messages: one direction walks our own
//! structs and fills in a wire message, the other walks wire structs and
//! reconstructs ours. Kept here rather than as `From`/`TryFrom` impls on
//! the generated types because those types live in a separate
//! (build-generated) module this crate does not own the definition of.

use std::collections::HashMap;

use crate::block::{Block, ColumnArray, ColumnData};
use crate::exchange::column_page::Data as WireColumnData;
use crate::exchange::{
    BoolArray, ColumnPage, ColumnSchema, ColumnType as WireColumnType, Float64Array, Int64Array,
    JsonArray, Page, StringArray, TableSchema, TimestampArray,
};
use crate::value::ColumnType;

pub fn column_type_to_wire(t: ColumnType) -> WireColumnType {
    match t {
        ColumnType::Int64 => WireColumnType::Int64,
        ColumnType::Float64 => WireColumnType::Float64,
        ColumnType::String => WireColumnType::String,
        ColumnType::Bool => WireColumnType::Bool,
        ColumnType::Timestamp => WireColumnType::Timestamp,
        ColumnType::Json => WireColumnType::Json,
    }
}

pub fn column_type_from_wire(t: WireColumnType) -> Option<ColumnType> {
    match t {
        WireColumnType::Int64 => Some(ColumnType::Int64),
        WireColumnType::Float64 => Some(ColumnType::Float64),
        WireColumnType::String => Some(ColumnType::String),
        WireColumnType::Bool => Some(ColumnType::Bool),
        WireColumnType::Timestamp => Some(ColumnType::Timestamp),
        WireColumnType::Json => Some(ColumnType::Json),
        WireColumnType::Unspecified => None,
    }
}

pub fn table_schema(name: &str, columns: &[(String, ColumnType)]) -> TableSchema {
    TableSchema {
        name: name.to_string(),
        columns: columns
            .iter()
            .map(|(name, ty)| ColumnSchema {
                name: name.clone(),
                r#type: column_type_to_wire(*ty) as i32,
            })
            .collect(),
    }
}

/// Projects a block down to the requested columns (or all columns, if
/// `columns` is empty) and packs it into one exchange-protocol [`Page`].
pub fn block_to_page(block: &Block, columns: &[String]) -> Page {
    let wanted: Option<std::collections::HashSet<&str>> = if columns.is_empty() {
        None
    } else {
        Some(columns.iter().map(|s| s.as_str()).collect())
    };
    let mut out = HashMap::with_capacity(block.columns.len());
    for col in &block.columns {
        if let Some(wanted) = &wanted {
            if !wanted.contains(col.name.as_str()) {
                continue;
            }
        }
        out.insert(col.name.clone(), column_array_to_page(col));
    }
    Page {
        row_count: block.row_count as i64,
        columns: out,
    }
}

fn column_array_to_page(col: &ColumnArray) -> ColumnPage {
    let data = match &col.data {
        ColumnData::Int64(v) => WireColumnData::Int64(Int64Array { values: v.clone() }),
        ColumnData::Timestamp(v) => WireColumnData::Timestamp(TimestampArray { values: v.clone() }),
        ColumnData::Float64(v) => WireColumnData::Float64(Float64Array { values: v.clone() }),
        ColumnData::String(v) => WireColumnData::String(StringArray { values: v.clone() }),
        ColumnData::Json(v) => WireColumnData::Json(JsonArray { values: v.clone() }),
        ColumnData::Bool(v) => WireColumnData::Bool(BoolArray { values: v.clone() }),
    };
    ColumnPage {
        data: Some(data),
        nulls: col.nulls.clone(),
    }
}
