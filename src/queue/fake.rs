use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::QueueError;
use crate::queue::{Message, QueueReader};

/// A queue reader backed by a fixed, pre-seeded list of payloads. Each
/// `poll()` returns the next unseen payload (or empty, modeling a timed
/// out long-poll) so ingestion-loop tests can drive it deterministically.
pub struct FakeQueueReader {
    payloads: Vec<Vec<u8>>,
    next: AtomicUsize,
    acked: Arc<Mutex<Vec<usize>>>,
}

impl FakeQueueReader {
    pub fn new(payloads: Vec<Vec<u8>>) -> Self {
        FakeQueueReader {
            payloads,
            next: AtomicUsize::new(0),
            acked: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn acked_indices(&self) -> Vec<usize> {
        self.acked.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueueReader for FakeQueueReader {
    async fn poll(&self) -> Result<Vec<Box<dyn Message>>, QueueError> {
        let idx = self.next.fetch_add(1, Ordering::SeqCst);
        if idx >= self.payloads.len() {
            return Ok(Vec::new());
        }
        Ok(vec![Box::new(FakeMessage {
            index: idx,
            body: self.payloads[idx].clone(),
            acked: self.acked.clone(),
        })])
    }
}

pub struct FakeMessage {
    index: usize,
    body: Vec<u8>,
    acked: Arc<Mutex<Vec<usize>>>,
}

#[async_trait]
impl Message for FakeMessage {
    fn payload(&self) -> &[u8] {
        &self.body
    }

    async fn ack(&self) -> Result<(), QueueError> {
        self.acked.lock().unwrap().push(self.index);
        Ok(())
    }

    async fn extend_visibility(&self, _by_secs: u32) -> Result<(), QueueError> {
        Ok(())
    }
}
