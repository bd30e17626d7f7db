use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use talaria::cluster::GossipCluster;
use talaria::config::{Args, Config};
use talaria::dns::DnsProgrammer;
use talaria::error::AppError;
use talaria::fetch::S3Fetcher;
use talaria::ingest::IngestionLoop;
use talaria::kv::RocksKvStore;
use talaria::queue::SqsQueueReader;
use talaria::server::QueryServer;
use talaria::shutdown::{wait_for_signal, Shutdown};
use talaria::table::{Table, TtlSweeper};
use talaria_wire::exchange::exchange_server::ExchangeServer;
use talaria_wire::ColumnType;

const QUERY_GRACE_PERIOD: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), AppError> {
    let args = Args::parse();
    let config_path = args
        .config
        .ok_or(talaria::error::ConfigError::MissingEnvVar("TALARIA_CONF"))?;
    let config = Config::load(&config_path)?;

    let store = Arc::new(RocksKvStore::open(&config.store_path).map_err(|e| AppError::Store(e.to_string()))?);
    let table_columns: Vec<(String, ColumnType)> = vec![
        (config.table.partition_column.clone(), ColumnType::String),
        (config.table.time_column.clone(), ColumnType::Timestamp),
    ];
    let table = Arc::new(Table::new(
        config.table.name.clone(),
        config.table.partition_column.clone(),
        config.table.time_column.clone(),
        store,
        config.table.split_target_bytes,
    ));

    let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(config.fetch.region.clone()))
        .load()
        .await;

    let node_id = config
        .cluster
        .node_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let advertise_addr: SocketAddr = config
        .advertise_addr
        .parse()
        .map_err(|_| talaria::error::ConfigError::Invalid("advertise_addr is not a valid socket address".into()))?;
    let gossip_addr = SocketAddr::new(advertise_addr.ip(), config.cluster.gossip_port);

    let cluster = Arc::new(
        GossipCluster::join(
            node_id,
            advertise_addr,
            gossip_addr,
            config.cluster.seeds.clone(),
            std::collections::HashMap::new(),
        )
        .await?,
    );

    let mut shutdown = Shutdown::new(QUERY_GRACE_PERIOD);
    let cancel = shutdown.token();

    if let Some(dns_config) = &config.dns {
        let route53 = aws_sdk_route53::Client::new(&aws_config);
        let programmer = DnsProgrammer::new(route53, dns_config.hosted_zone_id.clone(), dns_config.record_name.clone());
        let cluster = cluster.clone();
        let debounce = dns_config.reconcile_debounce();
        let cancel = cancel.clone();
        shutdown.track(tokio::spawn(async move {
            talaria::dns::run_reconciler(cluster, programmer, debounce, cancel).await;
        }));
    }

    let sweeper = TtlSweeper::new(table.clone(), config.table.ttl(), config.table.sweep_interval(), cancel.clone());
    shutdown.track(tokio::spawn(async move {
        sweeper.run().await;
    }));

    let statsd = talaria::metrics::statsd_client(config.metrics.statsd_addr.as_deref()).map_err(AppError::Io)?;
    let statsd_cancel = cancel.clone();
    shutdown.track(tokio::spawn(async move {
        talaria::metrics::run_statsd_reporter(statsd, Duration::from_secs(10), statsd_cancel).await;
    }));

    let server = Arc::new(QueryServer::new(
        table.clone(),
        table_columns,
        cluster.clone(),
        config.table.partition_column.clone(),
        config.table.time_column.clone(),
    ));

    // The queue can live in a different region than the fetch/DNS clients,
    // so its client gets its own region override rather than reusing
    // `aws_config` verbatim.
    let sqs_config = aws_sdk_sqs::config::Builder::from(&aws_config)
        .region(aws_config::Region::new(config.queue.region.clone()))
        .build();
    let sqs = aws_sdk_sqs::Client::from_conf(sqs_config);
    let queue = Arc::new(SqsQueueReader::new(
        sqs,
        config.queue.queue_url.clone(),
        config.queue.wait_timeout_secs,
        config.queue.visibility_timeout_secs,
    ));
    let s3 = aws_sdk_s3::Client::new(&aws_config);
    let fetcher = S3Fetcher::new(s3, config.fetch.concurrency);
    let ingestion = IngestionLoop::new(
        queue,
        fetcher,
        server.clone(),
        config.table.partition_column.clone(),
        config.table.time_column.clone(),
        cancel.clone(),
    );
    shutdown.track(tokio::spawn(async move {
        ingestion.run().await;
    }));

    let query_addr: SocketAddr = format!("0.0.0.0:{}", config.query.port)
        .parse()
        .expect("constructed from a valid port number");
    let server_for_grpc = server.clone();
    let grpc_cancel = cancel.clone();
    shutdown.track(tokio::spawn(async move {
        let serving = tonic::transport::Server::builder()
            .add_service(ExchangeServer::new(server_for_grpc))
            .serve_with_shutdown(query_addr, grpc_cancel.cancelled());
        if let Err(e) = serving.await {
            log::error!("query server exited with error: {e}");
        }
    }));

    wait_for_signal().await;
    log::info!("shutdown signal received, draining");
    shutdown.trigger().await;
    cluster_leave_best_effort(cluster).await;
    Ok(())
}

async fn cluster_leave_best_effort(cluster: Arc<GossipCluster>) {
    if let Ok(cluster) = Arc::try_unwrap(cluster) {
        if let Err(e) = cluster.leave().await {
            log::warn!("failed to leave gossip cluster cleanly: {e}");
        }
    }
}

