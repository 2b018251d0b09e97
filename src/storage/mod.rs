//! Object storage abstraction for shipments
//! Uses Apache Arrow object_store crate

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{ObjectStore, path::Path as StoragePath};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod mock;

pub use mock::{MockStorage, RecordedPut};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Put failed: {0}")]
    PutFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Write capability for one logical destination.
///
/// Implementations must tolerate concurrent calls, although the uploader
/// only ever issues one at a time.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> Result<()>;
}

/// Storage backed by any object_store backend.
///
/// The logical bucket becomes the first path segment, so one store can
/// serve many destinations.
#[derive(Clone)]
pub struct ObjectStoreStorage {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreStorage {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// In-memory storage for testing/development
    pub fn in_memory() -> Self {
        Self::new(Arc::new(object_store::memory::InMemory::new()))
    }

    /// Local filesystem storage rooted at `root`, created if missing
    pub fn local(root: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(root.as_ref())?;
        let store = object_store::local::LocalFileSystem::new_with_prefix(root.as_ref())?;
        Ok(Self::new(Arc::new(store)))
    }

    /// Read back a shipped object
    pub async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let path = object_path(bucket, key);

        let result = match self.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound(path.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let bytes = result.bytes().await?;
        tracing::debug!(bucket, key, size = bytes.len(), "Read shipment from storage");

        Ok(bytes)
    }
}

#[async_trait]
impl Storage for ObjectStoreStorage {
    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> Result<()> {
        let path = object_path(bucket, key);
        let size = body.len();

        self.store.put(&path, body.into()).await?;

        tracing::info!(bucket, key, size, "Shipment written to storage");
        Ok(())
    }
}

fn object_path(bucket: &str, key: &str) -> StoragePath {
    StoragePath::from(format!("{}/{}", bucket, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_in_memory_put_then_get() {
        let storage = ObjectStoreStorage::in_memory();

        storage
            .put("access-logs", "web/2024-01-01-00-00-00-AAAA", Bytes::from_static(b"a\nb\n"))
            .await
            .unwrap();

        let body = storage
            .get("access-logs", "web/2024-01-01-00-00-00-AAAA")
            .await
            .unwrap();
        assert_eq!(&body[..], b"a\nb\n");
    }

    #[tokio::test]
    async fn test_buckets_are_isolated() {
        let storage = ObjectStoreStorage::in_memory();
        storage.put("one", "k", Bytes::from_static(b"x")).await.unwrap();

        let missing = storage.get("two", "k").await;
        assert!(matches!(missing, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_local_storage_writes_under_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("shipments");
        let storage = ObjectStoreStorage::local(&root).unwrap();

        storage
            .put("bucket", "logs/obj", Bytes::from_static(b"line\n"))
            .await
            .unwrap();

        let on_disk = std::fs::read(root.join("bucket").join("logs").join("obj")).unwrap();
        assert_eq!(on_disk, b"line\n");
    }
}
