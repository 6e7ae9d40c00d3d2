use crate::store::{validate_key, write_atomically, ObjectStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;


/// Object store kept in process memory. Objects survive as long as the last
/// clone of the handle.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    inner: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object directly, bypassing the filesystem.
    pub async fn insert(&self, key: &str, bytes: impl Into<Vec<u8>>) {
        self.inner.write().await.insert(key.to_string(), bytes.into());
    }

    pub async fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.read().await.get(key).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, local_path: &Path) -> Result<(), StoreError> {
        validate_key(key)?;
        let bytes = tokio::fs::read(local_path).await.map_err(|e| StoreError::io(key, e))?;
        self.inner.write().await.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str, dest_path: &Path) -> Result<(), StoreError> {
        validate_key(key)?;
        let bytes = {
            let map = self.inner.read().await;
            map.get(key).cloned().ok_or_else(|| StoreError::NotFound { key: key.to_string() })?
        };
        write_atomically(dest_path, &bytes).await.map_err(|e| StoreError::io(key, e))
    }
}
