//! Object storage seam. Objects are opaque blobs addressed by a UTF-8 key,
//! which by convention is the source file name.

pub mod fs;
pub mod memory;

pub use fs::LocalObjectStore;
pub use memory::MemoryObjectStore;

use async_trait::async_trait;
use std::io;
use std::path::{Component, Path};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("object {key} not found")]
    NotFound { key: String },

    #[error("invalid object key {key:?}")]
    InvalidKey { key: String },

    #[error("i/o error on object {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn io(key: &str, source: io::Error) -> Self {
        StoreError::Io { key: key.to_string(), source }
    }
}

/// Durable blob store reachable by key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload the file at `local_path` under `key`, replacing any previous object.
    async fn put(&self, key: &str, local_path: &Path) -> Result<(), StoreError>;

    /// Download the object `key` into `dest_path`.
    async fn get(&self, key: &str, dest_path: &Path) -> Result<(), StoreError>;
}

/// Keys become single path components in local backends, so anything the
/// host would read as more than one plain component is refused. Any other
/// character a file name may hold is accepted.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let mut components = Path::new(key).components();
    let single = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(name)), None) if name == key
    );
    if !single || key.contains('\0') {
        return Err(StoreError::InvalidKey { key: key.to_string() });
    }
    Ok(())
}

/// Write `bytes` to `dest` through a sibling temp file and a rename, so
/// concurrent readers see either the old file or the complete new one.
pub(crate) async fn write_atomically(dest: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = temp_sibling(dest);
    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&tmp, dest).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

fn temp_sibling(dest: &Path) -> std::path::PathBuf {
    let name = dest.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    dest.with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4().simple()))
}
