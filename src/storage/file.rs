//! JSON-file storage backend.
//!
//! Each area is one JSON object on disk (`local.json`, `sync.json`) so that
//! counters, preferences and the auth token survive between CLI runs.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::debug;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::{StorageArea, StorageBackend};
use crate::error_handling::StorageError;

/// Storage persisted as one JSON document per area under a directory.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
    // Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileStorage {
    /// Opens (and creates if needed) the storage directory.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::Platform(format!("{}: {}", dir.display(), e)))?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    fn path(&self, area: StorageArea) -> PathBuf {
        self.dir.join(format!("{}.json", area.as_str()))
    }

    async fn load(&self, area: StorageArea) -> Result<Map<String, Value>, StorageError> {
        let path = self.path(area);
        match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Map::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(StorageError::Platform(format!("{}: {}", path.display(), e))),
        }
    }

    async fn store(&self, area: StorageArea, entries: &Map<String, Value>) -> Result<(), StorageError> {
        let path = self.path(area);
        let bytes = serde_json::to_vec_pretty(entries)?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StorageError::Platform(format!("{}: {}", path.display(), e)))?;
        debug!("Persisted {} storage ({} keys)", area, entries.len());
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FileStorage {
    async fn get(&self, area: StorageArea, keys: &[&str]) -> Result<Map<String, Value>, StorageError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load(area).await?;
        Ok(keys
            .iter()
            .filter_map(|key| entries.remove(*key).map(|v| ((*key).to_string(), v)))
            .collect())
    }

    async fn set(&self, area: StorageArea, values: Map<String, Value>) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load(area).await?;
        entries.extend(values);
        self.store(area, &entries).await
    }

    async fn remove(&self, area: StorageArea, keys: &[&str]) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load(area).await?;
        for key in keys {
            entries.remove(*key);
        }
        self.store(area, &entries).await
    }
}
