//! Process configuration (§6).
//!
//! Loaded from a TOML file named by the `TALARIA_CONF` environment
//! variable, with individual fields overridable by their own environment
//! variables (`clap`'s `env` feature) so the same binary works unmodified
//! under systemd, Docker, and a developer's shell.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::ensure;
use crate::error::ConfigError;

const DEFAULT_TTL_SECS: u64 = 30 * 24 * 60 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_RECONCILE_DEBOUNCE_MS: u64 = 5_000;
const DEFAULT_SPLIT_TARGET_BYTES: u64 = 16 * 1024 * 1024;
const DEFAULT_FETCH_CONCURRENCY: usize = 16;
const DEFAULT_GOSSIP_PORT: u16 = 7280;
const DEFAULT_QUERY_PORT: u16 = 7281;
const DEFAULT_QUEUE_WAIT_TIMEOUT_SECS: i32 = 20;
const DEFAULT_QUEUE_VISIBILITY_TIMEOUT_SECS: i32 = 60;

#[derive(Parser, Debug)]
#[command(name = "talaria", about = "columnar event store node")]
pub struct Args {
    /// Path to the TOML config file. Defaults to the `TALARIA_CONF` env var.
    #[arg(long, env = "TALARIA_CONF")]
    pub config: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// This node's advertised address, e.g. `10.0.1.4:7281`.
    pub advertise_addr: String,
    /// Local RocksDB directory.
    pub store_path: PathBuf,

    pub queue: QueueConfig,
    pub fetch: FetchConfig,
    pub table: TableConfig,
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub dns: Option<DnsConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct QueueConfig {
    pub queue_url: String,
    pub region: String,
    /// Long-poll `ReceiveMessage` wait time, seconds (SQS max is 20).
    #[serde(default = "default_queue_wait_timeout_secs")]
    pub wait_timeout_secs: i32,
    /// Visibility timeout applied to each received message.
    #[serde(default = "default_queue_visibility_timeout_secs")]
    pub visibility_timeout_secs: i32,
}

fn default_queue_wait_timeout_secs() -> i32 {
    DEFAULT_QUEUE_WAIT_TIMEOUT_SECS
}
fn default_queue_visibility_timeout_secs() -> i32 {
    DEFAULT_QUEUE_VISIBILITY_TIMEOUT_SECS
}

#[derive(Deserialize, Debug, Clone)]
pub struct FetchConfig {
    pub region: String,
    #[serde(default = "default_fetch_concurrency")]
    pub concurrency: usize,
}

fn default_fetch_concurrency() -> usize {
    DEFAULT_FETCH_CONCURRENCY
}

#[derive(Deserialize, Debug, Clone)]
pub struct TableConfig {
    pub name: String,
    pub partition_column: String,
    pub time_column: String,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_split_target_bytes")]
    pub split_target_bytes: u64,
}

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}
fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}
fn default_split_target_bytes() -> u64 {
    DEFAULT_SPLIT_TARGET_BYTES
}

impl TableConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ClusterConfig {
    pub node_id: Option<String>,
    #[serde(default = "default_gossip_port")]
    pub gossip_port: u16,
    #[serde(default)]
    pub seeds: Vec<String>,
}

fn default_gossip_port() -> u16 {
    DEFAULT_GOSSIP_PORT
}

#[derive(Deserialize, Debug, Clone)]
pub struct DnsConfig {
    pub hosted_zone_id: String,
    pub record_name: String,
    #[serde(default = "default_reconcile_debounce_ms")]
    pub reconcile_debounce_ms: u64,
}

fn default_reconcile_debounce_ms() -> u64 {
    DEFAULT_RECONCILE_DEBOUNCE_MS
}

impl DnsConfig {
    pub fn reconcile_debounce(&self) -> Duration {
        Duration::from_millis(self.reconcile_debounce_ms)
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct MetricsConfig {
    /// Prometheus text-exposition bind address, e.g. `0.0.0.0:9090`.
    pub prometheus_addr: Option<String>,
    /// StatsD host:port to additionally push metrics to.
    pub statsd_addr: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct QueryConfig {
    #[serde(default = "default_query_port")]
    pub port: u16,
}

fn default_query_port() -> u16 {
    DEFAULT_QUERY_PORT
}

impl Config {
    pub fn load(path: &PathBuf) -> Result<Config, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source: Box::new(source),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            self.table.partition_column != self.table.time_column,
            ConfigError::Invalid,
            "partition_column and time_column must differ"
        );
        ensure!(self.table.ttl_secs != 0, ConfigError::Invalid, "ttl_secs must be nonzero");
        ensure!(
            (1..=20).contains(&self.queue.wait_timeout_secs),
            ConfigError::Invalid,
            "queue.wait_timeout_secs must be between 1 and 20, got {}",
            self.queue.wait_timeout_secs
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_matching_partition_and_time_column() {
        let config = Config {
            advertise_addr: "127.0.0.1:7281".to_string(),
            store_path: PathBuf::from("/tmp/talaria"),
            queue: QueueConfig {
                queue_url: "https://sqs.example/q".to_string(),
                region: "us-east-1".to_string(),
                wait_timeout_secs: DEFAULT_QUEUE_WAIT_TIMEOUT_SECS,
                visibility_timeout_secs: DEFAULT_QUEUE_VISIBILITY_TIMEOUT_SECS,
            },
            fetch: FetchConfig {
                region: "us-east-1".to_string(),
                concurrency: 8,
            },
            table: TableConfig {
                name: "events".to_string(),
                partition_column: "user_id".to_string(),
                time_column: "user_id".to_string(),
                ttl_secs: DEFAULT_TTL_SECS,
                sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
                split_target_bytes: DEFAULT_SPLIT_TARGET_BYTES,
            },
            cluster: ClusterConfig {
                node_id: None,
                gossip_port: DEFAULT_GOSSIP_PORT,
                seeds: vec![],
            },
            dns: None,
            metrics: MetricsConfig::default(),
            query: QueryConfig::default(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_wait_timeout_out_of_sqs_range() {
        let mut config = Config {
            advertise_addr: "127.0.0.1:7281".to_string(),
            store_path: PathBuf::from("/tmp/talaria"),
            queue: QueueConfig {
                queue_url: "https://sqs.example/q".to_string(),
                region: "us-east-1".to_string(),
                wait_timeout_secs: DEFAULT_QUEUE_WAIT_TIMEOUT_SECS,
                visibility_timeout_secs: DEFAULT_QUEUE_VISIBILITY_TIMEOUT_SECS,
            },
            fetch: FetchConfig {
                region: "us-east-1".to_string(),
                concurrency: 8,
            },
            table: TableConfig {
                name: "events".to_string(),
                partition_column: "p".to_string(),
                time_column: "t".to_string(),
                ttl_secs: DEFAULT_TTL_SECS,
                sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
                split_target_bytes: DEFAULT_SPLIT_TARGET_BYTES,
            },
            cluster: ClusterConfig {
                node_id: None,
                gossip_port: DEFAULT_GOSSIP_PORT,
                seeds: vec![],
            },
            dns: None,
            metrics: MetricsConfig::default(),
            query: QueryConfig::default(),
        };
        assert!(config.validate().is_ok());
        config.queue.wait_timeout_secs = 21;
        assert!(config.validate().is_err());
    }
}
