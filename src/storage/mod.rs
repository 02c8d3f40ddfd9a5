use async_trait::async_trait;
use thiserror::Error;

pub mod local;
pub mod s3;

pub use local::LocalStore;
pub use s3::S3Store;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object s3://{bucket}/{key} not found")]
    NotFound { bucket: String, key: String },

    #[error("access denied to s3://{bucket}/{key}")]
    AccessDenied { bucket: String, key: String },

    #[error("storage backend failed for s3://{bucket}/{key}: {message}")]
    Backend {
        bucket: String,
        key: String,
        message: String,
    },
}

/// Whole-object reads and writes against a bucket/key addressed store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read the full content of `bucket/key` into memory.
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Write `content` to `bucket/key`, replacing whatever was there.
    async fn store(&self, bucket: &str, key: &str, content: &[u8]) -> Result<(), StorageError>;
}
