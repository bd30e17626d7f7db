//! Subsystem error types and their startup/runtime disposition (§7).
//!
//! Each subsystem boundary gets its own `thiserror` enum rather than a
//! single catch-all, so a caller can match on exactly the variants that
//! boundary can produce. `AppError` only exists to let `main` propagate a
//! single `Result` up to an exit code.

use thiserror::Error;

/// Returns early with an error built from a tuple-variant constructor,
/// converting through `Into` so the same macro works against every
/// subsystem's error enum (and, via `ServerError`'s `From` impl below,
/// directly against a `tonic::Status` return type too) rather than just
/// the single enum the teacher crate's own `bail!` targets.
#[macro_export]
macro_rules! bail {
    ($kind:expr) => {
        return Err(::std::convert::From::from($kind))
    };
    ($kind:expr, $e:expr) => {
        return Err(::std::convert::From::from($kind($e.to_owned())))
    };
    ($kind:expr, $fmt:expr, $($arg:tt)+) => {
        return Err(::std::convert::From::from($kind(format!($fmt, $($arg)+))))
    };
}

#[macro_export]
macro_rules! ensure {
    ($cond:expr, $kind:expr) => {
        if !($cond) {
            $crate::bail!($kind);
        }
    };
    ($cond:expr, $kind:expr, $e:expr) => {
        if !($cond) {
            $crate::bail!($kind, $e);
        }
    };
    ($cond:expr, $kind:expr, $fmt:expr, $($arg:tt)+) => {
        if !($cond) {
            $crate::bail!($kind, $fmt, $($arg)+);
        }
    };
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} is not set")]
    MissingEnvVar(&'static str),
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: Box<toml::de::Error>,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("transient fetch failure for s3://{bucket}/{key}: {message}")]
    Transient {
        bucket: String,
        key: String,
        message: String,
    },
    #[error("permanent fetch failure for s3://{bucket}/{key}: {message}")]
    Permanent {
        bucket: String,
        key: String,
        message: String,
    },
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("transient queue failure: {0}")]
    Transient(String),
    #[error("failed to parse notification payload: {0}")]
    MalformedNotification(String),
}

#[derive(Error, Debug)]
pub enum TableError {
    #[error("partition column {0:?} not found in block schema")]
    PartitionNotFound(String),
    #[error("schema mismatch: column {column} expected {expected}, found {found}")]
    SchemaMismatch {
        column: String,
        expected: &'static str,
        found: String,
    },
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

#[derive(Error, Debug)]
pub enum GossipError {
    #[error("failed to join gossip cluster: no seed responded")]
    JoinFailed,
    #[error("gossip transport error: {0}")]
    Transport(String),
}

#[derive(Error, Debug)]
pub enum DnsError {
    #[error("DNS reconcile failed: {0}")]
    ReconcileFailed(String),
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("query protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Transport(#[from] tonic::transport::Error),
}

impl From<ServerError> for tonic::Status {
    fn from(err: ServerError) -> tonic::Status {
        match err {
            ServerError::Protocol(msg) => tonic::Status::invalid_argument(msg),
            ServerError::Table(TableError::PartitionNotFound(col)) => {
                tonic::Status::not_found(format!("unknown column {col}"))
            }
            ServerError::Table(TableError::SchemaMismatch { .. }) => {
                tonic::Status::invalid_argument(err.to_string())
            }
            ServerError::Table(TableError::StoreUnavailable(msg)) => {
                tonic::Status::unavailable(msg)
            }
            ServerError::Transport(e) => tonic::Status::internal(e.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to open local store: {0}")]
    Store(String),
    #[error(transparent)]
    Gossip(#[from] GossipError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
