use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::Client;
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use tokio::sync::Semaphore;

use crate::error::FetchError;
use crate::fetch::ObjectFetcher;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_DEADLINE: Duration = Duration::from_secs(60);

pub struct S3Fetcher {
    client: Client,
    concurrency: Arc<Semaphore>,
}

impl S3Fetcher {
    pub fn new(client: Client, concurrency: usize) -> Self {
        S3Fetcher {
            client,
            concurrency: Arc::new(Semaphore::new(concurrency)),
        }
    }
}

#[async_trait]
impl ObjectFetcher for S3Fetcher {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, FetchError> {
        let _permit = self.concurrency.acquire().await.expect("semaphore never closed");

        let backoff = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(RETRY_DEADLINE))
            .build();

        retry(backoff, || async {
            match tokio::time::timeout(FETCH_TIMEOUT, self.fetch_once(bucket, key)).await {
                Ok(Ok(bytes)) => Ok(bytes),
                Ok(Err(FetchError::Permanent { bucket, key, message })) => {
                    Err(backoff::Error::permanent(FetchError::Permanent { bucket, key, message }))
                }
                Ok(Err(transient)) => Err(backoff::Error::transient(transient)),
                Err(_elapsed) => Err(backoff::Error::transient(FetchError::Transient {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    message: "fetch attempt timed out".to_string(),
                })),
            }
        })
        .await
    }
}

impl S3Fetcher {
    async fn fetch_once(&self, bucket: &str, key: &str) -> Result<Vec<u8>, FetchError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(bucket, key, &e))?;
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| FetchError::Transient {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: e.to_string(),
            })?
            .into_bytes();
        Ok(bytes.to_vec())
    }
}

fn classify<E: ProvideErrorMetadata>(bucket: &str, key: &str, err: &E) -> FetchError {
    let code = err.code().unwrap_or("");
    let message = err.message().unwrap_or("unknown error").to_string();
    if matches!(code, "NoSuchKey" | "AccessDenied" | "NoSuchBucket") {
        FetchError::Permanent {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message,
        }
    } else {
        FetchError::Transient {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message,
        }
    }
}
