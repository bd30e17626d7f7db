//! Talaria: a distributed, append-only, time-partitioned columnar event
//! store. See the module docs under each subsystem for the relevant
//! piece of the pipeline: notification queue -> object fetch -> block
//! codec -> time-series table -> columnar exchange server, with gossip
//! membership and DNS programming tying the fleet together.

pub mod cluster;
pub mod codec;
pub mod config;
pub mod dns;
pub mod error;
pub mod fetch;
pub mod ingest;
pub mod kv;
pub mod metrics;
pub mod nodes_table;
pub mod queue;
pub mod server;
pub mod shutdown;
pub mod table;
