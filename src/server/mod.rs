//! The query server (§4.10): implements the columnar exchange protocol's
//! metadata, split-listing, and split-data endpoints, plus the `Append`
//! entry point the ingestion loop is wired against.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use talaria_wire::convert::{block_to_page, table_schema};
use talaria_wire::exchange::exchange_server::Exchange;
use talaria_wire::exchange::{
    AppendRequest, AppendResponse, GetSplitDataRequest, GetSplitsRequest, GetSplitsResponse,
    ListColumnsRequest, ListColumnsResponse, ListSchemasRequest, ListSchemasResponse, ListTablesRequest,
    ListTablesResponse, Page, Split as WireSplit,
};
use talaria_wire::{Block, ColumnType, SplitToken};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

use crate::bail;
use crate::cluster::GossipCluster;
use crate::codec::{from_columnar_by, ArrowRowSource};
use crate::error::{ServerError, TableError};
use crate::ingest::Appender;
use crate::nodes_table;
use crate::table::Table;

/// The bound column schema this node serves: the configured event-log
/// table plus the built-in `nodes` virtual table (§4.9).
const SCHEMA_NAME: &str = "talaria";

pub struct QueryServer {
    table: Arc<Table>,
    table_columns: Vec<(String, ColumnType)>,
    cluster: Arc<GossipCluster>,
    partition_column: String,
    time_column: String,
}

impl QueryServer {
    pub fn new(
        table: Arc<Table>,
        table_columns: Vec<(String, ColumnType)>,
        cluster: Arc<GossipCluster>,
        partition_column: String,
        time_column: String,
    ) -> Self {
        QueryServer {
            table,
            table_columns,
            cluster,
            partition_column,
            time_column,
        }
    }

    async fn member_ids(&self) -> Vec<String> {
        self.cluster.members().await.into_iter().map(|m| m.node_id).collect()
    }
}

#[async_trait]
impl Appender for QueryServer {
    async fn append(&self, block: Block) -> Result<(), TableError> {
        self.table.append(block)
    }
}

type SplitDataStream = Pin<Box<dyn Stream<Item = Result<Page, Status>> + Send>>;

/// The sole split token ever issued for the `nodes` virtual table.
fn nodes_split_token() -> SplitToken {
    SplitToken::unbounded(nodes_table::TABLE_NAME.as_bytes().to_vec(), nodes_table::TABLE_NAME.as_bytes().to_vec())
}

// Implemented on `Arc<QueryServer>` rather than `QueryServer` directly so
// the same `Arc` handed to the ingestion loop as an `Appender` can be
// registered with tonic's generated server, which Arcs its service
// internally and expects to own the value it wraps.
#[tonic::async_trait]
impl Exchange for Arc<QueryServer> {
    async fn list_schemas(
        &self,
        _request: Request<ListSchemasRequest>,
    ) -> Result<Response<ListSchemasResponse>, Status> {
        Ok(Response::new(ListSchemasResponse {
            schemas: vec![SCHEMA_NAME.to_string()],
        }))
    }

    async fn list_tables(
        &self,
        request: Request<ListTablesRequest>,
    ) -> Result<Response<ListTablesResponse>, Status> {
        if request.into_inner().schema != SCHEMA_NAME {
            return Ok(Response::new(ListTablesResponse { tables: vec![] }));
        }
        Ok(Response::new(ListTablesResponse {
            tables: vec![self.table.name().to_string(), nodes_table::TABLE_NAME.to_string()],
        }))
    }

    async fn list_columns(
        &self,
        request: Request<ListColumnsRequest>,
    ) -> Result<Response<ListColumnsResponse>, Status> {
        let table = request.into_inner().table;
        let schema = if table == self.table.name() {
            table_schema(&table, &self.table_columns)
        } else if table == nodes_table::TABLE_NAME {
            table_schema(&table, &nodes_table::schema())
        } else {
            bail!(ServerError::Protocol, "unknown table {}", table);
        };
        Ok(Response::new(ListColumnsResponse { schema: Some(schema) }))
    }

    async fn get_splits(&self, request: Request<GetSplitsRequest>) -> Result<Response<GetSplitsResponse>, Status> {
        let req = request.into_inner();
        if req.table == nodes_table::TABLE_NAME {
            // The nodes table has no keyspace of its own: it is always
            // served as a single split over the current membership
            // snapshot, assigned to this node since it is the only one
            // that can answer for its own gossip view.
            return Ok(Response::new(GetSplitsResponse {
                splits: vec![WireSplit {
                    token: nodes_split_token().encode(),
                    assigned_node_id: self.cluster.node_id().to_string(),
                    estimated_bytes: 0,
                }],
            }));
        }
        if req.table != self.table.name() {
            bail!(ServerError::Protocol, "unknown table {}", req.table);
        }
        let time_range = req.time_range.map(|r| (r.start_unix_ns, r.end_unix_ns));
        let members = self.member_ids().await;
        let splits = self
            .table
            .scan_splits(time_range, req.partition_filter.as_deref(), &members)
            .map_err(ServerError::from)?;

        Ok(Response::new(GetSplitsResponse {
            splits: splits
                .into_iter()
                .map(|s| WireSplit {
                    token: s.token.encode(),
                    assigned_node_id: s.assigned_node_id.unwrap_or_default(),
                    estimated_bytes: s.estimated_bytes as i64,
                })
                .collect(),
        }))
    }

    type GetSplitDataStream = SplitDataStream;

    async fn get_split_data(
        &self,
        request: Request<GetSplitDataRequest>,
    ) -> Result<Response<Self::GetSplitDataStream>, Status> {
        let req = request.into_inner();
        if req.table == nodes_table::TABLE_NAME {
            let rows = nodes_table::rows(&self.cluster).await;
            let (tx, rx) = mpsc::channel(1);
            if let Some(block) = nodes_table::to_block(rows) {
                let page = block_to_page(&block, &req.columns);
                tokio::spawn(async move {
                    let _ = tx.send(Ok(page)).await;
                });
            }
            return Ok(Response::new(Box::pin(ReceiverStream::new(rx))));
        }
        if req.table != self.table.name() {
            bail!(ServerError::Protocol, "unknown table {}", req.table);
        }
        let token = SplitToken::decode(&req.split_token)
            .ok_or_else(|| Status::from(ServerError::Protocol("malformed split token".to_string())))?;
        let blocks = self.table.read_split(&token).map_err(ServerError::from)?;

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for block in blocks {
                let page = block_to_page(&block, &req.columns);
                if tx.send(Ok(page)).await.is_err() {
                    return;
                }
            }
        });
        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }

    async fn append(&self, request: Request<AppendRequest>) -> Result<Response<AppendResponse>, Status> {
        let req = request.into_inner();
        let partition_column = if req.partition_column.is_empty() {
            self.partition_column.clone()
        } else {
            req.partition_column
        };
        let source = ArrowRowSource::from_bytes(req.payload)
            .map_err(|e| Status::from(ServerError::Protocol(format!("failed to open payload: {e}"))))?;
        let (blocks, stats) = from_columnar_by(source, &partition_column, &self.time_column)
            .map_err(ServerError::from)?;
        let blocks_written = blocks.len() as u32;
        for block in blocks {
            self.table.append(block).map_err(ServerError::from)?;
        }
        Ok(Response::new(AppendResponse {
            blocks_written,
            rows_dropped: stats.rows_dropped as u32,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::GossipCluster;
    use crate::kv::MemoryKvStore;
    use std::collections::HashMap;
    use std::net::SocketAddr;

    async fn bootstrap_server() -> Arc<QueryServer> {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let cluster = Arc::new(
            GossipCluster::join("test-node".to_string(), addr, addr, vec![], HashMap::new())
                .await
                .unwrap(),
        );
        let table = Arc::new(Table::new(
            "events".to_string(),
            "p".to_string(),
            "t".to_string(),
            Arc::new(MemoryKvStore::new()),
            16 * 1024 * 1024,
        ));
        Arc::new(QueryServer::new(
            table,
            vec![
                ("p".to_string(), ColumnType::String),
                ("t".to_string(), ColumnType::Timestamp),
            ],
            cluster,
            "p".to_string(),
            "t".to_string(),
        ))
    }

    #[tokio::test]
    async fn list_tables_includes_event_and_nodes_tables() {
        let server = bootstrap_server().await;
        let resp = server
            .list_tables(Request::new(ListTablesRequest {
                schema: SCHEMA_NAME.to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(resp.tables.contains(&"events".to_string()));
        assert!(resp.tables.contains(&nodes_table::TABLE_NAME.to_string()));
    }

    #[tokio::test]
    async fn list_columns_rejects_unknown_table() {
        let server = bootstrap_server().await;
        let err = server
            .list_columns(Request::new(ListColumnsRequest {
                table: "does-not-exist".to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn get_splits_rejects_unknown_table() {
        let server = bootstrap_server().await;
        let err = server
            .get_splits(Request::new(GetSplitsRequest {
                table: "does-not-exist".to_string(),
                time_range: None,
                partition_filter: None,
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }
}

