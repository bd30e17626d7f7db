use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::fetch::ObjectFetcher;

/// An in-memory fetcher for ingestion-loop tests: objects are seeded by
/// `(bucket, key)` up front, and missing objects surface as
/// [`FetchError::Permanent`] the way a real not-found response would.
#[derive(Default)]
pub struct FakeFetcher {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        FakeFetcher::default()
    }

    pub fn seed(&self, bucket: &str, key: &str, bytes: Vec<u8>) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), bytes);
    }
}

#[async_trait]
impl ObjectFetcher for FakeFetcher {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, FetchError> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| FetchError::Permanent {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: "object not found".to_string(),
            })
    }
}
