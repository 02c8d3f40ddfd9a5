use async_trait::async_trait;
use std::{
    io,
    path::{Component, Path, PathBuf},
};
use tokio::fs;
use tracing::debug;

use super::{ObjectStore, StorageError};

/// Filesystem-backed [`ObjectStore`]: bucket `b`, key `k` lives at `<root>/b/k`.
///
/// Used to replay notification events locally without touching S3.
#[derive(Clone, Debug)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `bucket/key` under the root, refusing anything that would escape it.
    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        let rel = Path::new(bucket).join(key);
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if bucket.is_empty() || key.is_empty() || escapes {
            return Err(StorageError::Backend {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: "invalid object path".to_string(),
            });
        }
        Ok(self.root.join(rel))
    }
}

fn map_io(err: io::Error, bucket: &str, key: &str) -> StorageError {
    match err.kind() {
        io::ErrorKind::NotFound => StorageError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        io::ErrorKind::PermissionDenied => StorageError::AccessDenied {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        _ => StorageError::Backend {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message: err.to_string(),
        },
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(bucket, key)?;
        let bytes = fs::read(&path).await.map_err(|e| map_io(e, bucket, key))?;
        debug!(path = %path.display(), size = bytes.len(), "read local object");
        Ok(bytes)
    }

    async fn store(&self, bucket: &str, key: &str, content: &[u8]) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| map_io(e, bucket, key))?;
        }
        fs::write(&path, content)
            .await
            .map_err(|e| map_io(e, bucket, key))?;
        debug!(path = %path.display(), size = content.len(), "wrote local object");
        Ok(())
    }
}
