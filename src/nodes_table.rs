//! The nodes table (§4.9): a read-only virtual table over cluster
//! membership, exposed to the query engine alongside the event-log table.

use std::sync::Arc;

use talaria_wire::block::{schema_fingerprint, ColumnArray, ColumnData};
use talaria_wire::{Block, ColumnType, Value};

use crate::cluster::GossipCluster;

pub const TABLE_NAME: &str = "nodes";

pub fn schema() -> Vec<(String, ColumnType)> {
    vec![
        ("address".to_string(), ColumnType::String),
        ("peers".to_string(), ColumnType::Int64),
        ("shard_key".to_string(), ColumnType::String),
    ]
}

/// One row per live member: its address, the size of the member set it
/// was observed within, and its gossip node id (used as the shard key
/// for split assignment elsewhere).
pub async fn rows(cluster: &Arc<GossipCluster>) -> Vec<Vec<Value>> {
    let members = cluster.members().await;
    let peer_count = members.len() as i64;
    members
        .into_iter()
        .map(|m| {
            vec![
                Value::String(m.address.to_string()),
                Value::Int64(peer_count),
                Value::String(m.node_id),
            ]
        })
        .collect()
}

/// Packs the membership snapshot into a single block so it can flow
/// through the same `block_to_page` conversion as the real event table.
/// Returns `None` for an empty cluster view rather than a zero-row block,
/// which [`talaria_wire::block::Block::new`] rejects.
pub fn to_block(rows: Vec<Vec<Value>>) -> Option<Block> {
    let row_count = rows.len();
    if row_count == 0 {
        return None;
    }

    let mut addresses = Vec::with_capacity(row_count);
    let mut peers = Vec::with_capacity(row_count);
    let mut shard_keys = Vec::with_capacity(row_count);
    for row in rows {
        match (&row[0], &row[1], &row[2]) {
            (Value::String(address), Value::Int64(peer_count), Value::String(shard_key)) => {
                addresses.push(address.clone());
                peers.push(*peer_count);
                shard_keys.push(shard_key.clone());
            }
            _ => unreachable!("rows() always produces (String, Int64, String) triples"),
        }
    }
    let nulls = vec![false; row_count];
    let columns = vec![
        ColumnArray {
            name: "address".to_string(),
            data: ColumnData::String(addresses),
            nulls: nulls.clone(),
        },
        ColumnArray {
            name: "peers".to_string(),
            data: ColumnData::Int64(peers),
            nulls: nulls.clone(),
        },
        ColumnArray {
            name: "shard_key".to_string(),
            data: ColumnData::String(shard_keys),
            nulls,
        },
    ];
    Block::new(
        TABLE_NAME.to_string(),
        0,
        0,
        row_count,
        schema_fingerprint(&schema()),
        columns,
    )
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_matches_spec_columns() {
        let cols: Vec<&str> = schema().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(cols, vec!["address", "peers", "shard_key"]);
    }

    #[test]
    fn to_block_returns_none_for_empty_rows() {
        assert!(to_block(vec![]).is_none());
    }

    #[test]
    fn to_block_packs_one_row_per_member() {
        let rows = vec![
            vec![
                Value::String("10.0.0.1:7280".to_string()),
                Value::Int64(2),
                Value::String("node-a".to_string()),
            ],
            vec![
                Value::String("10.0.0.2:7280".to_string()),
                Value::Int64(2),
                Value::String("node-b".to_string()),
            ],
        ];
        let block = to_block(rows).unwrap();
        assert_eq!(block.row_count, 2);
        assert_eq!(block.column("shard_key").unwrap().data, ColumnData::String(vec!["node-a".to_string(), "node-b".to_string()]));
    }
}
