pub mod block;
pub mod convert;
pub mod key;
pub mod split;
pub mod value;

/// Generated client/server stubs and message types for the columnar
/// exchange protocol (`proto/exchange.proto`).
pub mod exchange {
    tonic::include_proto!("talaria.exchange.v1");
}

pub use block::{Block, BlockError, ColumnArray, ColumnData};
pub use key::TableKey;
pub use split::SplitToken;
pub use value::{ColumnType, Value};
