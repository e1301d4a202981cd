//! Durable blob storage for document snapshots.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use crate::StoreError;

/// A durable key/blob store.
///
/// Writes replace the whole blob. The room actor keeps one key per room
/// (see [`snapshot_key`]).
pub trait BlobStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>, StoreError>> + Send;

    fn put(&self, key: &str, data: Vec<u8>) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// The key a room's document snapshot is stored under.
pub fn snapshot_key(room: &str) -> String {
    format!("{room}.ydoc")
}

/// In-process store. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.lock().await.is_empty()
    }
}

impl BlobStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.blobs.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StoreError> {
        self.blobs.lock().await.insert(key.to_string(), data);
        Ok(())
    }
}

/// One file per key under a directory.
///
/// Each write goes to a temporary sibling first and is renamed into place,
/// so a reader never sees a half-written snapshot.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens (creating if needed) a store rooted at `dir`.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::Io {
                key: dir.display().to_string(),
                source,
            })?;
        tracing::info!(dir = %dir.display(), "file store opened");
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && !key.contains(['/', '\\'])
            && key != "..";
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(key))
    }
}

impl BlobStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let tmp = self.dir.join(format!(".{key}.tmp"));
        let io_err = |source: std::io::Error| StoreError::Io {
            key: key.to_string(),
            source,
        };
        tokio::fs::write(&tmp, &data).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_err)?;
        Ok(())
    }
}
