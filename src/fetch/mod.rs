//! The object fetcher (§4.4): given a bucket+key, returns bytes, with
//! bounded concurrency and retry.

mod fake;
mod s3;

pub use fake::FakeFetcher;
pub use s3::S3Fetcher;

use async_trait::async_trait;

use crate::error::FetchError;

#[async_trait]
pub trait ObjectFetcher: Send + Sync {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, FetchError>;
}
