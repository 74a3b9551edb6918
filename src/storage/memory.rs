//! In-process storage backend.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{StorageArea, StorageBackend};
use crate::error_handling::StorageError;

/// Storage held in memory and shared by every context of one runtime.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    areas: RwLock<HashMap<StorageArea, Map<String, Value>>>,
    failure: Mutex<Option<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following operation fail with a platform error.
    pub fn fail_with(&self, message: &str) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(message.to_string());
        }
    }

    fn check(&self) -> Result<(), StorageError> {
        let failure = self
            .failure
            .lock()
            .map_err(|e| StorageError::Platform(e.to_string()))?;
        match failure.as_ref() {
            Some(message) => Err(StorageError::Platform(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn get(&self, area: StorageArea, keys: &[&str]) -> Result<Map<String, Value>, StorageError> {
        self.check()?;
        let areas = self
            .areas
            .read()
            .map_err(|e| StorageError::Platform(e.to_string()))?;
        let mut found = Map::new();
        if let Some(entries) = areas.get(&area) {
            for key in keys {
                if let Some(value) = entries.get(*key) {
                    found.insert((*key).to_string(), value.clone());
                }
            }
        }
        Ok(found)
    }

    async fn set(&self, area: StorageArea, values: Map<String, Value>) -> Result<(), StorageError> {
        self.check()?;
        let mut areas = self
            .areas
            .write()
            .map_err(|e| StorageError::Platform(e.to_string()))?;
        areas.entry(area).or_default().extend(values);
        Ok(())
    }

    async fn remove(&self, area: StorageArea, keys: &[&str]) -> Result<(), StorageError> {
        self.check()?;
        let mut areas = self
            .areas
            .write()
            .map_err(|e| StorageError::Platform(e.to_string()))?;
        if let Some(entries) = areas.get_mut(&area) {
            for key in keys {
                entries.remove(*key);
            }
        }
        Ok(())
    }
}
