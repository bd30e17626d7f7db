//! Process-wide metrics registry.
//!
//! Counters and gauges are registered once into a global `prometheus`
//! registry for an operator's own scrape sidecar to pull from; `cadence`
//! additionally pushes the same counters to StatsD when
//! `metrics.statsd_addr` is configured.

use std::net::UdpSocket;
use std::time::Duration;

use cadence::{Counted, Gauged, NopMetricSink, QueuingMetricSink, StatsdClient, UdpMetricSink};
use tokio_util::sync::CancellationToken;
use lazy_static::lazy_static;
use prometheus::{register_counter, register_histogram, register_int_gauge, Counter, Histogram, IntGauge};

lazy_static! {
    pub static ref MESSAGES_POLLED: Counter =
        register_counter!("talaria_messages_polled_total", "notification messages received from the queue")
            .unwrap();
    pub static ref MESSAGES_ACKED: Counter =
        register_counter!("talaria_messages_acked_total", "notification messages acknowledged").unwrap();
    pub static ref MESSAGES_DROPPED: Counter = register_counter!(
        "talaria_messages_dropped_total",
        "notification messages dropped due to a permanent decode or fetch failure"
    )
    .unwrap();
    pub static ref FETCH_ERRORS: Counter =
        register_counter!("talaria_fetch_errors_total", "object fetch attempts that failed").unwrap();
    pub static ref ROWS_APPENDED: Counter =
        register_counter!("talaria_rows_appended_total", "rows written to the local store").unwrap();
    pub static ref BLOCKS_APPENDED: Counter =
        register_counter!("talaria_blocks_appended_total", "blocks written to the local store").unwrap();
    pub static ref ROWS_EXPIRED: Counter =
        register_counter!("talaria_rows_expired_total", "rows removed by the TTL sweeper").unwrap();
    pub static ref SPLITS_SERVED: Counter =
        register_counter!("talaria_splits_served_total", "split data reads served to query clients").unwrap();
    pub static ref INGEST_LATENCY: Histogram = register_histogram!(
        "talaria_ingest_latency_seconds",
        "time from message receipt to Table.Append completion"
    )
    .unwrap();
    pub static ref CLUSTER_MEMBERS: IntGauge =
        register_int_gauge!("talaria_cluster_members", "number of live gossip members observed").unwrap();
}

/// Builds a `cadence` StatsD client, or a no-op sink if no address was
/// configured: callers never need to branch on whether metrics were
/// enabled.
pub fn statsd_client(addr: Option<&str>) -> std::io::Result<StatsdClient> {
    match addr {
        None => Ok(StatsdClient::from_sink("talaria", NopMetricSink)),
        Some(addr) => {
            let socket = UdpSocket::bind("0.0.0.0:0")?;
            socket.set_nonblocking(true)?;
            let host = resolve_addr(addr)?;
            let sink = UdpMetricSink::from(host, socket)?;
            let queuing_sink = QueuingMetricSink::from(sink);
            Ok(StatsdClient::from_sink("talaria", queuing_sink))
        }
    }
}

/// Periodically mirrors the Prometheus counters into the StatsD client
/// (a no-op if it was built with [`statsd_client`]`(None)`), since the
/// Prometheus crate itself only maintains in-process state and exposes no
/// transport of its own: scraping it is left to the operator's existing
/// monitoring sidecar.
pub async fn run_statsd_reporter(client: StatsdClient, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                let _ = client.count("messages_acked", MESSAGES_ACKED.get() as i64);
                let _ = client.count("rows_appended", ROWS_APPENDED.get() as i64);
                let _ = client.count("rows_expired", ROWS_EXPIRED.get() as i64);
                let _ = client.gauge("cluster_members", CLUSTER_MEMBERS.get() as u64);
            }
        }
    }
}

fn resolve_addr(addr: &str) -> std::io::Result<std::net::SocketAddr> {
    use std::net::ToSocketAddrs;
    addr.to_socket_addrs()?
        .next()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "could not resolve statsd address"))
}
