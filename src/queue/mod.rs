//! The notification queue reader (§4.3): long-polls a queue and yields an
//! infinite sequence of messages, hiding empty polls.

mod fake;
mod sqs;

pub use fake::FakeQueueReader;
pub use sqs::SqsQueueReader;

use async_trait::async_trait;

use crate::error::QueueError;

/// One notification message. `ack()` deletes it from the queue;
/// `extend_visibility()` is used by slow consumers to avoid redelivery
/// mid-processing. Neither is called automatically: the ingestion loop
/// decides when a message's work is actually durable.
#[async_trait]
pub trait Message: Send + Sync {
    fn payload(&self) -> &[u8];
    async fn ack(&self) -> Result<(), QueueError>;
    async fn extend_visibility(&self, by_secs: u32) -> Result<(), QueueError>;
}

#[async_trait]
pub trait QueueReader: Send + Sync {
    /// Blocks (up to the configured wait timeout) for the next batch of
    /// messages. Returns an empty vec on a timed-out poll: that is not
    /// an error condition.
    async fn poll(&self) -> Result<Vec<Box<dyn Message>>, QueueError>;
}
