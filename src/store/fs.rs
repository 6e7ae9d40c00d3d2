use crate::store::{validate_key, write_atomically, ObjectStore, StoreError};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};

/// Bucket backed by a local directory: `{root}/{bucket}/{key}`.
///
/// Objects are written through a temp file and a rename, so an object is
/// either absent or complete. That is what lets the ingest side announce a
/// key as soon as `put` returns.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    bucket_dir: PathBuf,
}

impl LocalObjectStore {
    /// Open (creating if needed) the bucket directory.
    pub async fn open(root: &Path, bucket: &str) -> Result<Self, StoreError> {
        validate_key(bucket)?;
        let bucket_dir = root.join(bucket);
        tokio::fs::create_dir_all(&bucket_dir).await.map_err(|e| StoreError::io(bucket, e))?;
        Ok(Self { bucket_dir })
    }

    pub fn bucket_dir(&self) -> &Path {
        &self.bucket_dir
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.bucket_dir.join(key))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, local_path: &Path) -> Result<(), StoreError> {
        let target = self.object_path(key)?;
        let bytes = tokio::fs::read(local_path).await.map_err(|e| StoreError::io(key, e))?;
        write_atomically(&target, &bytes).await.map_err(|e| StoreError::io(key, e))
    }

    async fn get(&self, key: &str, dest_path: &Path) -> Result<(), StoreError> {
        let source = self.object_path(key)?;
        let bytes = match tokio::fs::read(&source).await {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound { key: key.to_string() })
            }
            Err(e) => return Err(StoreError::io(key, e)),
        };
        write_atomically(dest_path, &bytes).await.map_err(|e| StoreError::io(key, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn put_and_get_through_bucket_directory() {
        let root = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let store = LocalObjectStore::open(root.path(), "bucket").await.unwrap();

        let src = work.path().join("a.txt");
        std::fs::write(&src, "4").unwrap();
        store.put("a.txt", &src).await.unwrap();
        assert_eq!(std::fs::read_to_string(root.path().join("bucket").join("a.txt")).unwrap(), "4");

        let dest = work.path().join("downloaded_files").join("a.txt");
        store.get("a.txt", &dest).await.unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "4");
    }

    #[tokio::test]
    async fn get_unknown_key_is_not_found() {
        let root = TempDir::new().unwrap();
        let store = LocalObjectStore::open(root.path(), "bucket").await.unwrap();
        let err = store.get("missing.txt", &root.path().join("x")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { key } if key == "missing.txt"));
    }

    #[tokio::test]
    async fn keys_cannot_escape_the_bucket() {
        let root = TempDir::new().unwrap();
        let store = LocalObjectStore::open(root.path(), "bucket").await.unwrap();
        let err = store.get("../secret", &root.path().join("x")).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey { .. }));
    }
}
