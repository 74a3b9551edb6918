//! Extension storage adapter.
//!
//! Promise-style key/value access to the two persistent storage areas shared
//! by every execution context (content script, background, UI pages):
//! - `Local`: per-device data (auth token, enabled flag, config)
//! - `Sync`: data that follows the user (counters, preferences)
//!
//! A [`Storage`] without a backend models a context where the storage API is
//! absent; every operation then fails with [`StorageError::Unavailable`].
//! There are no retries and no locking: concurrent writes to the same key are
//! last-write-wins.

mod file;
pub mod keys;
mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error_handling::StorageError;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Storage area selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageArea {
    Local,
    Sync,
}

impl StorageArea {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageArea::Local => "local",
            StorageArea::Sync => "sync",
        }
    }
}

impl fmt::Display for StorageArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A platform storage implementation.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Returns the entries present for `keys` (missing keys are omitted).
    async fn get(&self, area: StorageArea, keys: &[&str]) -> Result<Map<String, Value>, StorageError>;

    /// Stores every entry of `values`.
    async fn set(&self, area: StorageArea, values: Map<String, Value>) -> Result<(), StorageError>;

    /// Removes `keys`; missing keys are ignored.
    async fn remove(&self, area: StorageArea, keys: &[&str]) -> Result<(), StorageError>;
}

/// Typed handle over a [`StorageBackend`]. Cheap to clone.
#[derive(Clone, Default)]
pub struct Storage {
    backend: Option<Arc<dyn StorageBackend>>,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("available", &self.is_available())
            .finish()
    }
}

impl Storage {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// A handle for a context without the storage API.
    pub fn detached() -> Self {
        Self { backend: None }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    fn backend(&self) -> Result<&Arc<dyn StorageBackend>, StorageError> {
        self.backend.as_ref().ok_or(StorageError::Unavailable)
    }

    /// Reads `key` from `area`.
    ///
    /// Returns `Ok(None)` when the key is absent or holds `null`.
    ///
    /// # Errors
    ///
    /// `Unavailable` without a backend, `Platform` on backend failure and
    /// `Serialization` when the stored value does not fit `T`.
    pub async fn read<T: DeserializeOwned>(
        &self,
        key: &str,
        area: StorageArea,
    ) -> Result<Option<T>, StorageError> {
        let mut entries = self.backend()?.get(area, &[key]).await?;
        match entries.remove(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    /// Writes a single entry.
    pub async fn write<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        area: StorageArea,
    ) -> Result<(), StorageError> {
        let backend = self.backend()?;
        let mut values = Map::new();
        values.insert(key.to_string(), serde_json::to_value(value)?);
        backend.set(area, values).await
    }

    /// Writes several entries in one backend call.
    pub async fn write_many(
        &self,
        values: Map<String, Value>,
        area: StorageArea,
    ) -> Result<(), StorageError> {
        self.backend()?.set(area, values).await
    }

    pub async fn remove(&self, keys: &[&str], area: StorageArea) -> Result<(), StorageError> {
        self.backend()?.remove(area, keys).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_detached_storage_is_unavailable() {
        let storage = Storage::detached();
        assert!(!storage.is_available());
        let read = storage.read::<String>(keys::AUTH_TOKEN, StorageArea::Local).await;
        assert!(matches!(read, Err(StorageError::Unavailable)));
        let write = storage.write(keys::AUTH_TOKEN, "t", StorageArea::Local).await;
        assert!(matches!(write, Err(StorageError::Unavailable)));
        let remove = storage.remove(&[keys::AUTH_TOKEN], StorageArea::Local).await;
        assert!(matches!(remove, Err(StorageError::Unavailable)));
    }

    #[tokio::test]
    async fn test_areas_are_independent() {
        let storage = Storage::new(Arc::new(MemoryStorage::new()));
        storage
            .write(keys::TOTAL_BLOCKED, &7u64, StorageArea::Sync)
            .await
            .unwrap();
        assert_eq!(
            storage
                .read::<u64>(keys::TOTAL_BLOCKED, StorageArea::Sync)
                .await
                .unwrap(),
            Some(7)
        );
        assert_eq!(
            storage
                .read::<u64>(keys::TOTAL_BLOCKED, StorageArea::Local)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_write_many_and_remove() {
        let storage = Storage::new(Arc::new(MemoryStorage::new()));
        let mut values = Map::new();
        values.insert(keys::LANGUAGE.to_string(), json!("vi"));
        values.insert(keys::THEME.to_string(), json!("dark"));
        storage.write_many(values, StorageArea::Sync).await.unwrap();

        storage
            .remove(&[keys::THEME], StorageArea::Sync)
            .await
            .unwrap();
        assert_eq!(
            storage
                .read::<String>(keys::LANGUAGE, StorageArea::Sync)
                .await
                .unwrap()
                .as_deref(),
            Some("vi")
        );
        assert_eq!(
            storage
                .read::<String>(keys::THEME, StorageArea::Sync)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_type_mismatch_is_serialization_error() {
        let storage = Storage::new(Arc::new(MemoryStorage::new()));
        storage
            .write(keys::EXTENSION_ENABLED, "yes", StorageArea::Local)
            .await
            .unwrap();
        let read = storage
            .read::<bool>(keys::EXTENSION_ENABLED, StorageArea::Local)
            .await;
        assert!(matches!(read, Err(StorageError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_platform_error_surfaces_message() {
        let backend = Arc::new(MemoryStorage::new());
        backend.fail_with("QUOTA_BYTES quota exceeded");
        let storage = Storage::new(backend);
        let err = storage
            .write(keys::USER, &json!({"id": 1}), StorageArea::Sync)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("QUOTA_BYTES"));
    }
}
