use std::sync::Arc;

use bytes::Bytes;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{path::Path as ObjPath, ObjectStore};

use crate::utils::config::{AppConfig, StorageKind};

pub type DynStore = Arc<dyn ObjectStore>;

/// Object storage behind a uniform put/get interface. Backed by the local
/// filesystem in deployments and by memory in tests.
#[derive(Clone)]
pub struct StorageManager {
    store: DynStore,
    backend_kind: StorageKind,
}

impl StorageManager {
    pub async fn new(cfg: &AppConfig) -> Result<Self, crate::error::AppError> {
        let backend_kind = cfg.storage.clone();
        let store: DynStore = match backend_kind {
            StorageKind::Local => {
                tokio::fs::create_dir_all(&cfg.data_dir).await?;
                Arc::new(LocalFileSystem::new_with_prefix(&cfg.data_dir)?)
            }
            StorageKind::Memory => Arc::new(InMemory::new()),
        };

        Ok(Self {
            store,
            backend_kind,
        })
    }

    /// Create a StorageManager with a custom storage backend, for tests.
    pub fn with_backend(store: DynStore, backend_kind: StorageKind) -> Self {
        Self {
            store,
            backend_kind,
        }
    }

    pub fn backend_kind(&self) -> &StorageKind {
        &self.backend_kind
    }

    /// Store bytes at the specified location.
    pub async fn put(&self, location: &str, data: Bytes) -> object_store::Result<()> {
        let path = ObjPath::from(location);
        let payload = object_store::PutPayload::from_bytes(data);
        self.store.put(&path, payload).await.map(|_| ())
    }

    /// Retrieve bytes from the specified location, fully buffered.
    pub async fn get(&self, location: &str) -> object_store::Result<Bytes> {
        let path = ObjPath::from(location);
        let result = self.store.get(&path).await?;
        result.bytes().await
    }

    pub async fn delete(&self, location: &str) -> object_store::Result<()> {
        let path = ObjPath::from(location);
        self.store.delete(&path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_manager() -> StorageManager {
        StorageManager::with_backend(Arc::new(InMemory::new()), StorageKind::Memory)
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let storage = memory_manager();
        let contents = b"ementa do acordao".to_vec();

        storage
            .put("documents/doc-1/file.txt", Bytes::from(contents.clone()))
            .await
            .expect("put");

        let fetched = storage
            .get("documents/doc-1/file.txt")
            .await
            .expect("get");
        assert_eq!(fetched.as_ref(), contents.as_slice());
    }

    #[tokio::test]
    async fn get_missing_location_errors() {
        let storage = memory_manager();
        let result = storage.get("documents/missing").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn delete_removes_object() {
        let storage = memory_manager();
        storage
            .put("tmp/x", Bytes::from_static(b"payload"))
            .await
            .expect("put");
        storage.delete("tmp/x").await.expect("delete");
        assert!(storage.get("tmp/x").await.is_err());
    }
}
