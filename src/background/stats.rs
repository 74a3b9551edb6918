//! Aggregate block counters.
//!
//! `totalBlocked`, `todayBlocked` and `weeklyBlocked` live in sync storage.
//! They grow by one for every blocked or warned image and are overwritten
//! from the statistics endpoint when the user is signed in.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::STATISTICS_PATH;
use crate::error_handling::StorageError;
use crate::messaging::{MessageBus, RuntimeMessage, StatsSnapshot};
use crate::storage::{keys, Storage, StorageArea};

/// Persisted counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockCounters {
    pub total: u64,
    pub today: u64,
    pub weekly: u64,
}

impl From<BlockCounters> for StatsSnapshot {
    fn from(counters: BlockCounters) -> Self {
        StatsSnapshot {
            total: counters.total,
            today: counters.today,
            weekly: counters.weekly,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatisticsBody {
    #[serde(default)]
    total_blocked: u64,
    #[serde(default)]
    today_blocked: u64,
    #[serde(default)]
    weekly_blocked: u64,
}

/// Reads the counters from either `{totalBlocked, ...}` or
/// `{success, data: {totalBlocked, ...}}`.
fn parse_statistics(body: Value) -> Result<BlockCounters> {
    let payload = match body.get("data") {
        Some(data) if data.is_object() => data.clone(),
        _ => body,
    };
    let stats: StatisticsBody =
        serde_json::from_value(payload).context("Malformed statistics payload")?;
    Ok(BlockCounters {
        total: stats.total_blocked,
        today: stats.today_blocked,
        weekly: stats.weekly_blocked,
    })
}

/// Owner of the aggregate counters in the background context.
pub struct StatsService {
    http: reqwest::Client,
    api_base: String,
    storage: Storage,
    bus: Arc<MessageBus>,
}

impl StatsService {
    pub fn new(
        http: reqwest::Client,
        api_base: impl Into<String>,
        storage: Storage,
        bus: Arc<MessageBus>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            storage,
            bus,
        }
    }

    /// Current counters; absent keys count as zero.
    pub async fn load(&self) -> Result<BlockCounters, StorageError> {
        Ok(BlockCounters {
            total: self.read_counter(keys::TOTAL_BLOCKED).await?,
            today: self.read_counter(keys::TODAY_BLOCKED).await?,
            weekly: self.read_counter(keys::WEEKLY_BLOCKED).await?,
        })
    }

    async fn read_counter(&self, key: &str) -> Result<u64, StorageError> {
        Ok(self
            .storage
            .read::<u64>(key, StorageArea::Sync)
            .await?
            .unwrap_or(0))
    }

    async fn store(&self, counters: BlockCounters) -> Result<(), StorageError> {
        let mut values = Map::new();
        values.insert(keys::TOTAL_BLOCKED.to_string(), counters.total.into());
        values.insert(keys::TODAY_BLOCKED.to_string(), counters.today.into());
        values.insert(keys::WEEKLY_BLOCKED.to_string(), counters.weekly.into());
        self.storage.write_many(values, StorageArea::Sync).await
    }

    /// Counts one blocked or warned image and broadcasts `STATS_UPDATED`.
    pub async fn record_detection(&self) -> Result<BlockCounters, StorageError> {
        let current = self.load().await?;
        let next = BlockCounters {
            total: current.total + 1,
            today: current.today + 1,
            weekly: current.weekly + 1,
        };
        self.store(next).await?;
        log::debug!(
            "Block counters: total={}, today={}, weekly={}",
            next.total,
            next.today,
            next.weekly
        );
        self.bus
            .notify(RuntimeMessage::StatsUpdated { data: next.into() });
        Ok(next)
    }

    /// Replaces the counters with the server's figures.
    ///
    /// Returns `Ok(None)` without a request when nobody is signed in.
    ///
    /// # Errors
    ///
    /// Network failures, non-2xx answers, malformed bodies and storage
    /// failures.
    pub async fn refresh(&self) -> Result<Option<BlockCounters>> {
        let token = self
            .storage
            .read::<String>(keys::AUTH_TOKEN, StorageArea::Local)
            .await
            .context("Failed to read auth token")?;
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            log::debug!("Not signed in, keeping local block counters");
            return Ok(None);
        };

        let url = format!("{}{}", self.api_base, STATISTICS_PATH);
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .context("Failed to request statistics")?
            .error_for_status()
            .context("Statistics endpoint returned an error")?;
        let body: Value = response
            .json()
            .await
            .context("Failed to decode statistics response")?;

        let counters = parse_statistics(body)?;
        self.store(counters)
            .await
            .context("Failed to store block counters")?;
        self.bus
            .notify(RuntimeMessage::StatsUpdated {
                data: counters.into(),
            });
        log::info!(
            "Statistics refreshed: total={}, today={}, weekly={}",
            counters.total,
            counters.today,
            counters.weekly
        );
        Ok(Some(counters))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    fn service(storage: Storage) -> StatsService {
        StatsService::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9/",
            storage,
            MessageBus::new("background"),
        )
    }

    #[test]
    fn test_parse_plain_and_wrapped_payloads() {
        let plain = json!({"totalBlocked": 7, "todayBlocked": 2, "weeklyBlocked": 5, "plan": "free"});
        assert_eq!(
            parse_statistics(plain).unwrap(),
            BlockCounters {
                total: 7,
                today: 2,
                weekly: 5
            }
        );

        let wrapped = json!({"success": true, "data": {"totalBlocked": 1}});
        assert_eq!(
            parse_statistics(wrapped).unwrap(),
            BlockCounters {
                total: 1,
                today: 0,
                weekly: 0
            }
        );

        assert!(parse_statistics(json!({"totalBlocked": "many"})).is_err());
    }

    #[tokio::test]
    async fn test_record_detection_increments_all_counters() {
        let storage = Storage::new(Arc::new(MemoryStorage::new()));
        storage
            .write(keys::TOTAL_BLOCKED, &10u64, StorageArea::Sync)
            .await
            .unwrap();
        let stats = service(storage.clone());

        let counters = stats.record_detection().await.unwrap();
        assert_eq!(
            counters,
            BlockCounters {
                total: 11,
                today: 1,
                weekly: 1
            }
        );
        assert_eq!(stats.load().await.unwrap(), counters);
    }

    #[tokio::test]
    async fn test_refresh_without_token_is_a_no_op() {
        let storage = Storage::new(Arc::new(MemoryStorage::new()));
        assert_eq!(service(storage).refresh().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_detached_storage_fails() {
        assert!(matches!(
            service(Storage::detached()).record_detection().await,
            Err(StorageError::Unavailable)
        ));
    }
}
