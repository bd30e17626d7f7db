//! Parses a standard object-storage event-notification payload into one
//! or more `(bucket, key)` references (§6 "Notification queue payload").

use serde::Deserialize;

use crate::error::QueueError;

#[derive(Deserialize)]
struct S3EventNotification {
    #[serde(rename = "Records")]
    records: Vec<S3EventRecord>,
}

#[derive(Deserialize)]
struct S3EventRecord {
    s3: S3Entity,
}

#[derive(Deserialize)]
struct S3Entity {
    bucket: S3Bucket,
    object: S3Object,
}

#[derive(Deserialize)]
struct S3Bucket {
    name: String,
}

#[derive(Deserialize)]
struct S3Object {
    key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

/// Parses the SQS message body. Two shapes are accepted: a raw S3 event
/// notification, or an SNS envelope wrapping one as a JSON string in
/// `Message` (the common S3 -> SNS -> SQS fan-out topology).
pub fn parse_notification(payload: &[u8]) -> Result<Vec<ObjectRef>, QueueError> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| QueueError::MalformedNotification(e.to_string()))?;

    let inner = if let Ok(envelope) = serde_json::from_str::<SnsEnvelope>(text) {
        envelope.message
    } else {
        text.to_string()
    };

    let notification: S3EventNotification =
        serde_json::from_str(&inner).map_err(|e| QueueError::MalformedNotification(e.to_string()))?;

    Ok(notification
        .records
        .into_iter()
        .map(|r| ObjectRef {
            bucket: r.s3.bucket.name,
            key: urldecode(&r.s3.object.key),
        })
        .collect())
}

#[derive(Deserialize)]
struct SnsEnvelope {
    #[serde(rename = "Message")]
    message: String,
}

fn urldecode(key: &str) -> String {
    key.replace("+", " ")
}
