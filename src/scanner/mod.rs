//! Page scanner.
//!
//! Discovers the images of a page (present at load and inserted later),
//! filters out ineligible ones, classifies the rest one at a time through a
//! [`Detector`], and applies the block/warn/allow treatment.
//!
//! Scanning is strictly sequential with `scan_delay` between classification
//! calls. The initial pass and the mutation observer run as separate tasks
//! that share the processed set; its check and insert are separate steps, so
//! the same image can in rare cases be classified twice when both paths
//! reach it at once.
//!
//! Every scan-triggering action first checks that the messaging context is
//! still alive. Once it is not, the scanner disconnects its observer, stops
//! scanning for good and shows a single reload banner.

mod blacklist;
mod eligibility;
mod treatment;

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

use tokio::task::JoinHandle;

use crate::config::{
    ScanConfig, ScanConfigPatch, ATTR_BLOCKED, ATTR_LOADED, ATTR_PENDING, ATTR_SAFE,
    ATTR_SCANNED, ATTR_WARNED, BLACKLIST_OVERLAY_ID, IMAGE_LOAD_TIMEOUT, RELOAD_BANNER_ID,
};
use crate::detection::{Action, DetectionContext, DetectionRequest, Detector};
use crate::dom::{
    ImageElement, ImageState, LoadState, MutationObserver, MutationRecord, Page, ReadyState,
};
use crate::early_blur::is_image_search_surface;
use crate::error_handling::{ConfigError, ScanStats};
use crate::messaging::{
    ExtensionState, MessageBus, MessageKind, RuntimeMessage, RuntimeResponse, Subscription,
};
use crate::storage::{keys, Storage, StorageArea};

pub use blacklist::{find_match, load_blacklist, matches_pattern, normalize_pattern};
pub use eligibility::{fetchable_url, has_min_size, image_identifier, SkipReason};
pub use treatment::{add_click_to_reveal, mark_allowed, mark_blocked, mark_warned};

const RELOAD_BANNER_HTML: &str = concat!(
    r#"<div style="position: fixed; top: 0; left: 0; right: 0; background: #ff6b6b; "#,
    r#"color: white; padding: 12px; text-align: center; z-index: 999999;">"#,
    r#"The extension was updated. Please <strong>refresh this page (F5)</strong> to continue."#,
    r#"<button data-action="reload">Refresh Now</button></div>"#
);

/// Outcome of classifying one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Skipped(SkipReason),
    Classified(Action),
    /// The classification failed and the image was treated as allowed.
    Failed,
}

/// Counts of one whole-page scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Classification calls made.
    pub scanned: usize,
    pub blocked: usize,
    pub warned: usize,
    pub allowed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ScanSummary {
    fn record(&mut self, outcome: ScanOutcome) {
        match outcome {
            ScanOutcome::Skipped(_) => self.skipped += 1,
            ScanOutcome::Classified(action) => {
                self.scanned += 1;
                match action {
                    Action::Block => self.blocked += 1,
                    Action::Warn => self.warned += 1,
                    Action::Allow => self.allowed += 1,
                }
            }
            ScanOutcome::Failed => {
                self.scanned += 1;
                self.failed += 1;
            }
        }
    }
}

/// An image that passed eligibility and is registered as processed.
struct Candidate {
    id: String,
    url: String,
}

/// Content-side scanner of one page.
pub struct PageScanner {
    page: Arc<Page>,
    bus: Arc<MessageBus>,
    detector: Arc<dyn Detector>,
    storage: Storage,
    config: RwLock<ScanConfig>,
    processed: Mutex<HashSet<String>>,
    stats: Arc<ScanStats>,
    image_search: bool,
    observer: Mutex<Option<MutationObserver>>,
    subscriptions: Mutex<Vec<Subscription>>,
    notifications: Mutex<Vec<JoinHandle<()>>>,
    context_lost: AtomicBool,
    page_blocked: AtomicBool,
}

impl PageScanner {
    pub fn new(
        page: Arc<Page>,
        bus: Arc<MessageBus>,
        detector: Arc<dyn Detector>,
        storage: Storage,
    ) -> Self {
        let image_search = is_image_search_surface(page.url());
        Self {
            page,
            bus,
            detector,
            storage,
            config: RwLock::new(ScanConfig::default()),
            processed: Mutex::new(HashSet::new()),
            stats: Arc::new(ScanStats::new()),
            image_search,
            observer: Mutex::new(None),
            subscriptions: Mutex::new(Vec::new()),
            notifications: Mutex::new(Vec::new()),
            context_lost: AtomicBool::new(false),
            page_blocked: AtomicBool::new(false),
        }
    }

    pub fn with_config(self, config: ScanConfig) -> Self {
        if let Ok(mut current) = self.config.write() {
            *current = config;
        }
        self
    }

    pub fn with_stats(mut self, stats: Arc<ScanStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn page(&self) -> &Arc<Page> {
        &self.page
    }

    pub fn stats(&self) -> &Arc<ScanStats> {
        &self.stats
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> ScanConfig {
        self.config
            .read()
            .map(|config| config.clone())
            .unwrap_or_default()
    }

    pub fn is_processed(&self, id: &str) -> bool {
        self.processed().contains(id)
    }

    pub fn processed_count(&self) -> usize {
        self.processed().len()
    }

    pub fn is_observing(&self) -> bool {
        self.observer
            .lock()
            .map(|observer| observer.as_ref().is_some_and(MutationObserver::is_connected))
            .unwrap_or(false)
    }

    pub fn is_page_blocked(&self) -> bool {
        self.page_blocked.load(Ordering::SeqCst)
    }

    fn processed(&self) -> MutexGuard<'_, HashSet<String>> {
        self.processed.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Marks the document and registers the inbound message handlers.
    pub fn install(self: &Arc<Self>) {
        self.page.set_document_attribute(ATTR_LOADED, "true");

        let mut subscriptions = Vec::new();
        for kind in [
            MessageKind::ScanPage,
            MessageKind::ToggleExtension,
            MessageKind::UpdateConfig,
        ] {
            let scanner = Arc::downgrade(self);
            subscriptions.push(self.bus.add_listener(kind, move |message| {
                let scanner = Weak::clone(&scanner);
                async move {
                    let scanner = scanner.upgrade()?;
                    scanner.handle_message(message).await
                }
            }));
        }
        if let Ok(mut slot) = self.subscriptions.lock() {
            slot.extend(subscriptions);
        }
        log::info!("Content script initialized on {}", self.page.url());
    }

    /// Waits for `DOMContentLoaded`, starts observing, scans the page, and
    /// schedules a rescan for when the page finishes loading.
    pub async fn start(self: &Arc<Self>) -> ScanSummary {
        self.page.wait_for_dom_content_loaded().await;
        self.observe_mutations();
        let summary = self.scan_page().await;

        if self.page.ready_state() < ReadyState::Complete {
            let scanner = Arc::downgrade(self);
            let page = Arc::clone(&self.page);
            tokio::spawn(async move {
                page.wait_for_load().await;
                if let Some(scanner) = scanner.upgrade() {
                    log::info!("Window loaded: re-scanning page...");
                    scanner.scan_page().await;
                }
            });
        }
        summary
    }

    fn observe_mutations(self: &Arc<Self>) {
        if !self.page.has_body() || self.context_lost.load(Ordering::SeqCst) {
            return;
        }
        let scanner = Arc::downgrade(self);
        let observer = MutationObserver::observe(&self.page, move |records| {
            let scanner = Weak::clone(&scanner);
            async move {
                match scanner.upgrade() {
                    Some(scanner) => scanner.handle_mutations(records).await,
                    None => ControlFlow::Break(()),
                }
            }
        });
        if let Ok(mut slot) = self.observer.lock() {
            *slot = Some(observer);
        }
        log::info!("DOM observer initialized");
    }

    /// Checks that the messaging context is alive.
    ///
    /// On the first failure the observer is disconnected and the reload
    /// banner is shown; later calls only report `false`.
    pub fn ensure_valid_context(&self) -> bool {
        if !self.context_lost.load(Ordering::SeqCst) && self.bus.is_context_valid() {
            return true;
        }
        if !self.context_lost.swap(true, Ordering::SeqCst) {
            log::warn!(
                "Extension was reloaded. Please refresh this page (F5) for content script to work."
            );
            if let Ok(observer) = self.observer.lock() {
                if let Some(observer) = observer.as_ref() {
                    observer.disconnect();
                }
            }
        }
        if !self.page.has_element(RELOAD_BANNER_ID) {
            self.page.append_overlay(RELOAD_BANNER_ID, RELOAD_BANNER_HTML);
        }
        false
    }

    /// Enabled in config and storage, and signed in. Absence of either is a
    /// silent no-op for the caller.
    async fn is_active(&self) -> bool {
        if !self.config().enabled {
            log::debug!("Scanning disabled by configuration");
            return false;
        }
        match self
            .storage
            .read::<bool>(keys::EXTENSION_ENABLED, StorageArea::Local)
            .await
        {
            Ok(Some(false)) => {
                log::debug!("Extension is disabled");
                return false;
            }
            Ok(_) => {}
            Err(e) => {
                log::debug!("Could not read enabled flag: {}", e);
                return false;
            }
        }
        match self
            .storage
            .read::<String>(keys::AUTH_TOKEN, StorageArea::Local)
            .await
        {
            Ok(Some(token)) if !token.is_empty() => true,
            Ok(_) => {
                log::debug!("User not authenticated - skipping scan");
                false
            }
            Err(e) => {
                log::debug!("Could not read auth token: {}", e);
                false
            }
        }
    }

    /// Shows the blacklist overlay when the page host is blacklisted.
    async fn check_blacklist(&self) -> bool {
        if self.is_page_blocked() {
            return true;
        }
        if self.page.url().scheme() == "chrome-extension" {
            return false;
        }
        let blacklist = load_blacklist(&self.storage).await;
        let Some(pattern) = find_match(self.page.hostname(), &blacklist) else {
            return false;
        };
        self.page_blocked.store(true, Ordering::SeqCst);
        self.page
            .append_overlay(BLACKLIST_OVERLAY_ID, &blacklist::overlay_html(pattern));
        self.page.set_document_style("overflow", "hidden");
        log::warn!(
            "Page blocked by blacklist: {} matches {}",
            self.page.hostname(),
            pattern
        );
        true
    }

    fn mark_pending(&self, images: &[Arc<ImageElement>]) {
        if !self.image_search {
            return;
        }
        for image in images {
            let untouched = [ATTR_BLOCKED, ATTR_WARNED, ATTR_SCANNED, ATTR_SAFE]
                .iter()
                .all(|name| !image.has_attribute(name));
            if untouched {
                image.set_attribute(ATTR_PENDING, "true");
            }
        }
    }

    /// Scans every image of the page in document order.
    pub async fn scan_page(self: &Arc<Self>) -> ScanSummary {
        let mut summary = ScanSummary::default();
        if !self.ensure_valid_context() {
            return summary;
        }
        if self.check_blacklist().await {
            return summary;
        }
        if !self.is_active().await {
            return summary;
        }

        log::info!("Starting page scan...");
        let images = self.page.images();
        self.mark_pending(&images);

        for image in &images {
            if !self.ensure_valid_context() {
                break;
            }
            let config = self.config();
            if config
                .max_images_per_scan
                .is_some_and(|max| summary.scanned >= max)
            {
                log::info!(
                    "Reached max images per scan ({})",
                    config.max_images_per_scan.unwrap_or_default()
                );
                break;
            }

            let candidate = match self.prepare(image).await {
                Ok(candidate) => candidate,
                Err(reason) => {
                    summary.record(ScanOutcome::Skipped(reason));
                    continue;
                }
            };
            if summary.scanned > 0 {
                tokio::time::sleep(config.scan_delay).await;
            }
            let outcome = self.classify(image, candidate).await;
            summary.record(outcome);
        }

        log::info!(
            "Page scan completed. Classified {} images ({} blocked, {} warned, {} failed).",
            summary.scanned,
            summary.blocked,
            summary.warned,
            summary.failed
        );
        summary
    }

    /// Scans a single image through the eligibility filter.
    pub async fn scan_image(self: &Arc<Self>, image: &Arc<ImageElement>) -> ScanOutcome {
        match self.prepare(image).await {
            Ok(candidate) => self.classify(image, candidate).await,
            Err(reason) => ScanOutcome::Skipped(reason),
        }
    }

    async fn prepare(&self, image: &ImageElement) -> Result<Candidate, SkipReason> {
        if image.has_attribute(ATTR_BLOCKED) || image.has_attribute(ATTR_WARNED) {
            return Err(SkipReason::AlreadyTreated);
        }
        let page_url = self.page.url();
        let id = image_identifier(image, page_url).ok_or(SkipReason::NoIdentity)?;
        if self.is_processed(&id) {
            return Err(SkipReason::Duplicate);
        }
        let url = fetchable_url(image, page_url, self.image_search)
            .ok_or(SkipReason::NotFetchable)?;

        if image.load_state() == LoadState::Loading {
            image.wait_loaded(IMAGE_LOAD_TIMEOUT).await;
        }
        if image.load_state() != LoadState::Loaded {
            log::warn!("Image not ready for scanning: {}", id);
            return Err(SkipReason::NotLoaded);
        }
        if !has_min_size(image, eligibility::min_dimension(self.image_search)) {
            return Err(SkipReason::TooSmall);
        }

        self.processed().insert(id.clone());
        image.set_attribute(ATTR_SCANNED, "pending");
        image.set_state(ImageState::Scanning);
        Ok(Candidate { id, url })
    }

    async fn classify(self: &Arc<Self>, image: &ImageElement, candidate: Candidate) -> ScanOutcome {
        let thresholds = self.config().thresholds();
        let context = DetectionContext {
            page_url: self.page.url().to_string(),
            domain: self.page.hostname().to_string(),
        };
        log::info!("Scanning image: {}", candidate.url);
        let request = DetectionRequest::image(candidate.url.clone(), Some(context));
        let result = self.detector.analyze(&request, thresholds).await;

        if !result.is_completed() {
            log::warn!(
                "Failed to scan image {}: {}",
                candidate.id,
                result.error.as_deref().unwrap_or("unknown error")
            );
            self.processed().remove(&candidate.id);
            if self.image_search {
                add_click_to_reveal(image);
                image.set_attribute(ATTR_SCANNED, "failed");
                image.set_state(ImageState::Allowed);
            } else {
                mark_allowed(image);
                image.remove_attribute(ATTR_SCANNED);
            }
            return ScanOutcome::Failed;
        }

        match result.action {
            Action::Block => {
                mark_blocked(image, &result);
                log::warn!("Blocked image: {}", candidate.url);
            }
            Action::Warn => {
                mark_warned(image, &result);
                log::warn!("Warned about image: {}", candidate.url);
            }
            Action::Allow => {
                mark_allowed(image);
                log::info!("Allowed image: {}", candidate.url);
            }
        }
        image.set_attribute(ATTR_SCANNED, "complete");
        self.stats.increment_verdict(result.action);

        let action = result.action;
        if action != Action::Allow && self.bus.is_context_valid() {
            self.notify(RuntimeMessage::DetectionResult { data: result });
        }
        ScanOutcome::Classified(action)
    }

    fn notify(&self, message: RuntimeMessage) {
        let handle = self.bus.notify(message);
        let mut pending = self
            .notifications
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        pending.retain(|task| !task.is_finished());
        pending.push(handle);
    }

    /// Stops observing and waits for outstanding notifications.
    pub async fn shutdown(&self) {
        if let Ok(observer) = self.observer.lock() {
            if let Some(observer) = observer.as_ref() {
                observer.disconnect();
            }
        }
        let pending: Vec<JoinHandle<()>> = self
            .notifications
            .lock()
            .map(|mut pending| pending.drain(..).collect())
            .unwrap_or_default();
        for task in pending {
            if let Err(e) = task.await {
                log::warn!("Notification task failed: {}", e);
            }
        }
    }

    /// Scans the images of one mutation batch.
    async fn handle_mutations(self: &Arc<Self>, records: Vec<MutationRecord>) -> ControlFlow<()> {
        if !self.ensure_valid_context() {
            return ControlFlow::Break(());
        }
        if self.is_page_blocked() || !self.is_active().await {
            return ControlFlow::Continue(());
        }

        let mut seen = HashSet::new();
        let mut images = Vec::new();
        for record in records {
            match record {
                MutationRecord::ImagesAdded(added) => images.extend(added),
                MutationRecord::SourceChanged(image) => {
                    let unseen = image_identifier(&image, self.page.url())
                        .is_some_and(|id| !self.is_processed(&id));
                    if unseen {
                        images.push(image);
                    }
                }
                MutationRecord::HeadAttached | MutationRecord::BodyAttached => {}
            }
        }
        images.retain(|image| seen.insert(image.node_id()));
        self.mark_pending(&images);

        for image in &images {
            if !self.ensure_valid_context() {
                return ControlFlow::Break(());
            }
            self.scan_image(image).await;
        }
        ControlFlow::Continue(())
    }

    /// Handles `SCAN_PAGE`, `TOGGLE_EXTENSION` and `UPDATE_CONFIG`.
    pub async fn handle_message(self: &Arc<Self>, message: RuntimeMessage) -> Option<RuntimeResponse> {
        if !self.ensure_valid_context() {
            return Some(RuntimeResponse::error("Extension context invalidated"));
        }
        let patch = match message {
            RuntimeMessage::ScanPage => {
                self.scan_page().await;
                return Some(RuntimeResponse::ok());
            }
            RuntimeMessage::ToggleExtension { enabled } => ScanConfigPatch {
                enabled: Some(enabled),
                ..Default::default()
            },
            RuntimeMessage::UpdateConfig { config } => config,
            _ => return None,
        };
        match self.update_config(&patch).await {
            Ok(_) => Some(RuntimeResponse::ok()),
            Err(e) => Some(RuntimeResponse::error(e.to_string())),
        }
    }

    /// The single way to change the scan configuration.
    ///
    /// Applies `patch` and announces the new state with `STATE_UPDATED`.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] of an invalid patch; the configuration is
    /// then unchanged and nothing is announced.
    pub async fn update_config(&self, patch: &ScanConfigPatch) -> Result<ScanConfig, ConfigError> {
        let updated = {
            let mut config = self.config.write().unwrap_or_else(|e| e.into_inner());
            config.apply(patch)?;
            config.clone()
        };
        log::info!(
            "Scan configuration updated: enabled={}, block={}, warn={}",
            updated.enabled,
            updated.block_threshold,
            updated.warn_threshold
        );

        let mut state = match self
            .storage
            .read::<ExtensionState>(keys::EXTENSION_STATE, StorageArea::Local)
            .await
        {
            Ok(state) => state.unwrap_or_default(),
            Err(e) => {
                log::debug!("Using default extension state: {}", e);
                ExtensionState::default()
            }
        };
        state.is_enabled = updated.enabled;
        self.notify(RuntimeMessage::StateUpdated { payload: state });
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut summary = ScanSummary::default();
        summary.record(ScanOutcome::Classified(Action::Block));
        summary.record(ScanOutcome::Classified(Action::Allow));
        summary.record(ScanOutcome::Failed);
        summary.record(ScanOutcome::Skipped(SkipReason::TooSmall));
        assert_eq!(
            summary,
            ScanSummary {
                scanned: 3,
                blocked: 1,
                warned: 0,
                allowed: 1,
                failed: 1,
                skipped: 1,
            }
        );
    }
}
