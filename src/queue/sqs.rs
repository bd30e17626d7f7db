use async_trait::async_trait;
use aws_sdk_sqs::Client;

use crate::error::QueueError;
use crate::queue::{Message, QueueReader};

const MAX_MESSAGES_PER_POLL: i32 = 10;

pub struct SqsQueueReader {
    client: Client,
    queue_url: String,
    wait_timeout_secs: i32,
    visibility_timeout_secs: i32,
}

impl SqsQueueReader {
    pub fn new(client: Client, queue_url: String, wait_timeout_secs: i32, visibility_timeout_secs: i32) -> Self {
        SqsQueueReader {
            client,
            queue_url,
            wait_timeout_secs,
            visibility_timeout_secs,
        }
    }
}

#[async_trait]
impl QueueReader for SqsQueueReader {
    async fn poll(&self) -> Result<Vec<Box<dyn Message>>, QueueError> {
        let response = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(MAX_MESSAGES_PER_POLL)
            .wait_time_seconds(self.wait_timeout_secs)
            .visibility_timeout(self.visibility_timeout_secs)
            .send()
            .await
            .map_err(|e| QueueError::Transient(e.to_string()))?;

        let messages = response.messages.unwrap_or_default();
        Ok(messages
            .into_iter()
            .filter_map(|m| {
                let body = m.body?;
                let receipt_handle = m.receipt_handle?;
                Some(Box::new(SqsMessage {
                    client: self.client.clone(),
                    queue_url: self.queue_url.clone(),
                    receipt_handle,
                    body: body.into_bytes(),
                }) as Box<dyn Message>)
            })
            .collect())
    }
}

struct SqsMessage {
    client: Client,
    queue_url: String,
    receipt_handle: String,
    body: Vec<u8>,
}

#[async_trait]
impl Message for SqsMessage {
    fn payload(&self) -> &[u8] {
        &self.body
    }

    async fn ack(&self) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(&self.receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Transient(e.to_string()))?;
        Ok(())
    }

    async fn extend_visibility(&self, by_secs: u32) -> Result<(), QueueError> {
        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(&self.receipt_handle)
            .visibility_timeout(by_secs as i32)
            .send()
            .await
            .map_err(|e| QueueError::Transient(e.to_string()))?;
        Ok(())
    }
}
