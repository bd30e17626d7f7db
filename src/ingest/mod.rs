//! The ingestion loop (§4.5): poll → fetch → decode/repartition →
//! `Table.Append` → ack-or-drop.

mod notification;

pub use notification::{parse_notification, ObjectRef};

use std::sync::Arc;

use async_trait::async_trait;
use talaria_wire::Block;
use tokio_util::sync::CancellationToken;

use crate::codec::{from_columnar_by, ArrowRowSource};
use crate::error::{QueueError, TableError};
use crate::fetch::ObjectFetcher;
use crate::metrics;
use crate::queue::QueueReader;

/// The narrow capability the ingestion loop depends on, broken out so the
/// loop does not need to depend on the query server directly: the server
/// implements this trait instead (§9 Design Notes, "Cyclic references").
#[async_trait]
pub trait Appender: Send + Sync {
    async fn append(&self, block: Block) -> Result<(), TableError>;
}

#[async_trait]
impl<T: Appender + ?Sized> Appender for Arc<T> {
    async fn append(&self, block: Block) -> Result<(), TableError> {
        (**self).append(block).await
    }
}

pub struct IngestionLoop<F, A> {
    queue: Arc<dyn QueueReader>,
    fetcher: F,
    appender: A,
    partition_column: String,
    time_column: String,
    cancel: CancellationToken,
}

impl<F, A> IngestionLoop<F, A>
where
    F: ObjectFetcher,
    A: Appender,
{
    pub fn new(
        queue: Arc<dyn QueueReader>,
        fetcher: F,
        appender: A,
        partition_column: String,
        time_column: String,
        cancel: CancellationToken,
    ) -> Self {
        IngestionLoop {
            queue,
            fetcher,
            appender,
            partition_column,
            time_column,
            cancel,
        }
    }

    /// Runs until cancelled. Finishes whatever message is currently being
    /// processed before observing cancellation, per §4.5 / §5.
    pub async fn run(&self) {
        while !self.cancel.is_cancelled() {
            let messages = match self.queue.poll().await {
                Ok(messages) => messages,
                Err(QueueError::Transient(msg)) => {
                    log::warn!("transient queue error, retrying: {msg}");
                    continue;
                }
                Err(err) => {
                    log::error!("queue poll failed: {err}");
                    continue;
                }
            };

            for message in messages {
                let started = std::time::Instant::now();
                metrics::MESSAGES_POLLED.inc();
                match self.process_payload(message.payload()).await {
                    Ok(()) => {
                        if let Err(e) = message.ack().await {
                            log::warn!("failed to ack message after successful append: {e}");
                        } else {
                            metrics::MESSAGES_ACKED.inc();
                        }
                    }
                    Err(ProcessError::Poison(reason)) => {
                        log::warn!("dropping poison message: {reason}");
                        if message.ack().await.is_ok() {
                            metrics::MESSAGES_DROPPED.inc();
                        }
                    }
                    Err(ProcessError::Retryable(reason)) => {
                        log::warn!("leaving message unacked for redelivery: {reason}");
                    }
                }
                metrics::INGEST_LATENCY.observe(started.elapsed().as_secs_f64());
            }
        }
    }

    async fn process_payload(&self, payload: &[u8]) -> Result<(), ProcessError> {
        let refs = parse_notification(payload)
            .map_err(|e| ProcessError::Poison(format!("malformed notification: {e}")))?;

        let mut blocks = Vec::new();
        for object_ref in &refs {
            let bytes = self
                .fetcher
                .fetch(&object_ref.bucket, &object_ref.key)
                .await
                .map_err(|e| match e {
                    crate::error::FetchError::Permanent { .. } => ProcessError::Poison(e.to_string()),
                    crate::error::FetchError::Transient { .. } => ProcessError::Retryable(e.to_string()),
                })?;

            let source = ArrowRowSource::from_bytes(bytes)
                .map_err(|e| ProcessError::Poison(format!("failed to open columnar file: {e}")))?;
            let (mut file_blocks, stats) =
                from_columnar_by(source, &self.partition_column, &self.time_column)
                    .map_err(|e| ProcessError::Retryable(format!("decode failed: {e}")))?;
            if stats.rows_dropped > 0 {
                log::info!(
                    "dropped {} of {} rows with invalid partition cells",
                    stats.rows_dropped,
                    stats.rows_seen
                );
            }
            blocks.append(&mut file_blocks);
        }

        for block in blocks {
            self.appender
                .append(block)
                .await
                .map_err(|e| ProcessError::Retryable(e.to_string()))?;
            metrics::BLOCKS_APPENDED.inc();
        }
        Ok(())
    }
}

enum ProcessError {
    /// Permanent failure (malformed notification, decode error, auth
    /// failure): acking drops the message so it stops being redelivered.
    Poison(String),
    /// Transient failure (store unavailable, fetch backoff exhausted):
    /// leave unacked so the queue redelivers.
    Retryable(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FakeFetcher;
    use crate::queue::FakeQueueReader;
    use std::sync::Mutex;

    struct RecordingAppender {
        blocks: Mutex<Vec<Block>>,
    }

    #[async_trait]
    impl Appender for &RecordingAppender {
        async fn append(&self, block: Block) -> Result<(), TableError> {
            self.blocks.lock().unwrap().push(block);
            Ok(())
        }
    }

    fn s3_notification(bucket: &str, key: &str) -> Vec<u8> {
        serde_json::json!({
            "Records": [{ "s3": { "bucket": { "name": bucket }, "object": { "key": key } } }]
        })
        .to_string()
        .into_bytes()
    }

    #[tokio::test]
    async fn poison_notification_is_acked_and_dropped() {
        let queue = Arc::new(FakeQueueReader::new(vec![b"not json".to_vec()]));
        let fetcher = FakeFetcher::new();
        let appender = RecordingAppender {
            blocks: Mutex::new(Vec::new()),
        };
        let cancel = CancellationToken::new();
        let loop_ = IngestionLoop::new(
            queue.clone(),
            fetcher,
            &appender,
            "partition".to_string(),
            "ts".to_string(),
            cancel.clone(),
        );

        let messages = queue.poll().await.unwrap();
        assert_eq!(messages.len(), 1);
        let err = loop_.process_payload(messages[0].payload()).await;
        assert!(matches!(err, Err(ProcessError::Poison(_))));
    }

    #[tokio::test]
    async fn permanent_fetch_failure_is_poison() {
        let queue = Arc::new(FakeQueueReader::new(vec![]));
        let fetcher = FakeFetcher::new();
        let appender = RecordingAppender {
            blocks: Mutex::new(Vec::new()),
        };
        let loop_ = IngestionLoop::new(
            queue,
            fetcher,
            &appender,
            "partition".to_string(),
            "ts".to_string(),
            CancellationToken::new(),
        );
        let payload = s3_notification("bucket", "missing-key");
        let err = loop_.process_payload(&payload).await;
        assert!(matches!(err, Err(ProcessError::Poison(_))));
    }
}
