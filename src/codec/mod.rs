//! The block codec (§4.1): decodes an input columnar file and repartitions
//! its rows into fixed-size, single-partition [`talaria_wire::Block`]s.
//!
//! The decoder itself (schema + row iteration) is bound to Arrow's IPC
//! reader, since the input file format is explicitly left unspecified and
//! Arrow IPC is the columnar file format the rest of the ecosystem already
//! reaches for.

mod builder;
mod reader;
mod repartition;

pub use builder::PartitionBuilder;
pub use reader::{ArrowRowSource, RowSource, Schema};
pub use repartition::from_columnar_by;
