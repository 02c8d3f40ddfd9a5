//! Turns an S3 notification event into the records the dispatcher works on.

use aws_lambda_events::event::s3::S3Event;
use tracing::warn;

/// One object-creation notification: where the new object lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRecord {
    pub bucket: String,
    pub key: String,
}

impl NotificationRecord {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Builds the records of an S3 event, in event order. Missing bucket or
    /// key names come through empty and are skipped by the dispatcher.
    pub fn from_s3_event(event: &S3Event) -> Vec<Self> {
        event
            .records
            .iter()
            .map(|record| {
                let bucket = record.s3.bucket.name.clone().unwrap_or_default();
                let key = record
                    .s3
                    .object
                    .key
                    .as_deref()
                    .map(decode_key)
                    .unwrap_or_default();
                Self { bucket, key }
            })
            .collect()
    }
}

/// S3 notifications carry form-encoded keys: `+` for space, `%XX` escapes.
/// An undecodable key is used verbatim.
pub fn decode_key(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(e) => {
            warn!(error = ?e, key = %raw, "unable to decode key, using it as-is");
            raw.to_string()
        }
    }
}
