//! Background context.
//!
//! The privileged side of the extension: it answers classification requests
//! proxied by content scripts with direct API calls, keeps the aggregate
//! block counters, and acknowledges every other message type.

mod stats;

use std::sync::Arc;

use strum::IntoEnumIterator;

use crate::config::{ScanConfig, Thresholds};
use crate::detection::{Action, DetectionClient};
use crate::messaging::{MessageBus, MessageKind, RuntimeMessage, RuntimeResponse, Subscription};
use crate::storage::{keys, Storage, StorageArea};

pub use stats::{BlockCounters, StatsService};

/// Message handlers of the background context.
///
/// Handlers stay registered while the router is alive.
pub struct BackgroundRouter {
    _subscriptions: Vec<Subscription>,
}

struct RouterState {
    client: Arc<DetectionClient>,
    stats: Arc<StatsService>,
    bus: Arc<MessageBus>,
    storage: Storage,
}

impl BackgroundRouter {
    /// Registers a handler for every message kind on `bus`.
    ///
    /// `client` must call the API directly (no proxy).
    pub fn install(
        bus: &Arc<MessageBus>,
        client: Arc<DetectionClient>,
        stats: Arc<StatsService>,
        storage: Storage,
    ) -> Self {
        let state = Arc::new(RouterState {
            client,
            stats,
            bus: Arc::clone(bus),
            storage,
        });
        let subscriptions = MessageKind::iter()
            .map(|kind| {
                let state = Arc::clone(&state);
                bus.add_listener(kind, move |message| {
                    let state = Arc::clone(&state);
                    async move { Some(state.handle(message).await) }
                })
            })
            .collect();
        log::info!("Background router installed");
        Self {
            _subscriptions: subscriptions,
        }
    }
}

impl RouterState {
    /// Thresholds from the persisted scan configuration.
    async fn thresholds(&self) -> Thresholds {
        match self
            .storage
            .read::<ScanConfig>(keys::SCAN_CONFIG, StorageArea::Local)
            .await
        {
            Ok(config) => config.unwrap_or_default().thresholds(),
            Err(e) => {
                log::debug!("Using default thresholds: {}", e);
                Thresholds::default()
            }
        }
    }

    async fn handle(&self, message: RuntimeMessage) -> RuntimeResponse {
        match message {
            RuntimeMessage::AnalyzeImage { url, context } => {
                let thresholds = self.thresholds().await;
                let result = self.client.analyze_image(&url, context, thresholds).await;
                RuntimeResponse::Detection(result)
            }
            RuntimeMessage::AnalyzeImageData {
                image_data, url, ..
            } => {
                let thresholds = self.thresholds().await;
                let result = self.client.analyze_data(&image_data, &url, thresholds).await;
                RuntimeResponse::Detection(result)
            }
            RuntimeMessage::DetectionResult { data } => {
                if matches!(data.action, Action::Block | Action::Warn) {
                    if let Err(e) = self.stats.record_detection().await {
                        log::warn!("Failed to update block counters: {}", e);
                    }
                }
                RuntimeResponse::ok()
            }
            RuntimeMessage::UpdateState { payload } => {
                self.bus
                    .notify(RuntimeMessage::StateUpdated { payload });
                RuntimeResponse::ok()
            }
            other => {
                log::debug!("Background acknowledged {}", other.kind().as_ref());
                RuntimeResponse::ok()
            }
        }
    }
}
