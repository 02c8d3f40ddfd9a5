use async_trait::async_trait;
use aws_sdk_s3::{
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::ByteStream,
    Client,
};
use std::fmt::Debug;
use tracing::{debug, info};

use super::{ObjectStore, StorageError};

/// S3-backed [`ObjectStore`].
#[derive(Clone, Debug)]
pub struct S3Store {
    inner: Client,
}

impl S3Store {
    pub fn new(inner: Client) -> Self {
        Self { inner }
    }
}

/// Map an SDK failure onto the storage error kinds the dispatcher reports.
fn classify<E, R>(err: SdkError<E, R>, bucket: &str, key: &str) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: Debug,
{
    match err.code() {
        Some("NoSuchKey") | Some("NotFound") | Some("NoSuchBucket") => StorageError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        Some("AccessDenied") | Some("Forbidden") => StorageError::AccessDenied {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        _ => StorageError::Backend {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message: DisplayErrorContext(&err).to_string(),
        },
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let resp = self
            .inner
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(e, bucket, key))?;

        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: format!("could not collect body: {}", e),
            })?;
        let bytes = body.into_bytes().to_vec();
        debug!(size = bytes.len(), "fetched object");
        Ok(bytes)
    }

    #[tracing::instrument(skip(self, content), fields(size = content.len()))]
    async fn store(&self, bucket: &str, key: &str, content: &[u8]) -> Result<(), StorageError> {
        self.inner
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type("text/csv")
            .body(ByteStream::from(content.to_vec()))
            .send()
            .await
            .map_err(|e| classify(e, bucket, key))?;

        info!("Successfully uploaded to s3://{}/{}", bucket, key);
        Ok(())
    }
}
