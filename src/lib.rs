//! media_guard library: image moderation pipeline of a browser extension
//!
//! This library scans the images of a web page, classifies them with a remote
//! moderation API and blurs, flags or releases each one. The browser surfaces
//! are modelled in-process: a headless page ([`dom::Page`]), extension
//! storage ([`storage::Storage`]) and the runtime connecting the content
//! script to the background context ([`messaging::ExtensionRuntime`]).
//!
//! # Example
//!
//! ```no_run
//! use media_guard::{Config, run_scan};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config {
//!     page: "gallery.html".to_string(),
//!     page_url: Some("https://example.com/gallery".to_string()),
//!     token: Some("secret".to_string()),
//!     ..Default::default()
//! };
//!
//! let report = run_scan(config).await?;
//! println!("Scanned {} images: {} blocked, {} warned",
//!          report.summary.scanned, report.summary.blocked, report.summary.warned);
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime. Use `#[tokio::main]` in your application
//! or ensure you're calling library functions within an async context.

mod app;
pub mod background;
pub mod config;
pub mod detection;
pub mod dom;
pub mod early_blur;
mod error_handling;
pub mod initialization;
pub mod messaging;
pub mod scanner;
pub mod storage;
mod utils;

// Re-export public API
pub use app::{load_page, print_scan_statistics, validate_page_url};
pub use background::{BackgroundRouter, BlockCounters, StatsService};
pub use config::{Config, LogFormat, LogLevel, ScanConfig, ScanConfigPatch, Thresholds};
pub use detection::{DetectionClient, Detector};
pub use early_blur::EarlyBlurGuard;
pub use error_handling::{
    ConfigError, DetectionError, FailureType, InitializationError, MessagingError, ScanStats,
    StorageError,
};
pub use run::{run_scan, ImageReport, ScanReport};
pub use scanner::{PageScanner, ScanOutcome, ScanSummary};

// Internal run module (wires the contexts together for a headless scan)
mod run {
    use std::sync::Arc;

    use anyhow::{Context, Result};
    use log::{info, warn};

    use crate::app::{load_page, print_scan_statistics};
    use crate::background::{BackgroundRouter, BlockCounters, StatsService};
    use crate::config::Config;
    use crate::detection::DetectionClient;
    use crate::dom::ImageState;
    use crate::early_blur::EarlyBlurGuard;
    use crate::error_handling::ScanStats;
    use crate::initialization::init_client;
    use crate::messaging::{ExtensionRuntime, MessageBus};
    use crate::scanner::{PageScanner, ScanSummary};
    use crate::storage::{keys, FileStorage, MemoryStorage, Storage, StorageArea};

    /// Final state of one image of the scanned page.
    #[derive(Debug, Clone)]
    pub struct ImageReport {
        /// The `src` attribute as written in the page
        pub source: Option<String>,
        pub state: ImageState,
    }

    /// Results of a headless page scan.
    #[derive(Debug, Clone)]
    pub struct ScanReport {
        /// Address the page was scanned as
        pub page_url: String,
        pub summary: ScanSummary,
        /// Every image of the page in document order
        pub images: Vec<ImageReport>,
        /// Classification failures by any cause
        pub failures: usize,
        /// Aggregate counters after the scan, when storage was readable
        pub counters: Option<BlockCounters>,
        /// Whether the page matched the site blacklist
        pub page_blocked: bool,
        pub elapsed_seconds: f64,
    }

    async fn open_storage(config: &Config) -> Result<Storage> {
        let storage = match &config.storage_dir {
            Some(dir) => {
                let backend = FileStorage::open(dir)
                    .await
                    .with_context(|| format!("Failed to open storage in {}", dir.display()))?;
                info!("Using storage directory {}", dir.display());
                Storage::new(Arc::new(backend))
            }
            None => Storage::new(Arc::new(MemoryStorage::new())),
        };
        if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
            storage
                .write(keys::AUTH_TOKEN, token, StorageArea::Local)
                .await
                .context("Failed to store auth token")?;
        }
        Ok(storage)
    }

    /// Scans one page with the full extension pipeline.
    ///
    /// Loads the page, connects a background context (router, direct
    /// detection client, block counters) and a content context (early-blur
    /// guard, page scanner, proxying detection client) through an in-process
    /// runtime, and runs the initial page scan.
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - The scan configuration is invalid
    /// - The HTTP client cannot be built
    /// - Storage cannot be opened
    /// - The page cannot be loaded
    pub async fn run_scan(config: Config) -> Result<ScanReport> {
        let start_time = std::time::Instant::now();
        let scan_config = config.scan_config().context("Invalid scan configuration")?;
        let http = init_client(config.timeout_seconds).context("Failed to initialize HTTP client")?;
        let storage = open_storage(&config).await?;
        storage
            .write(keys::SCAN_CONFIG, &scan_config, StorageArea::Local)
            .await
            .context("Failed to store scan configuration")?;

        let page = load_page(&http, &config.page, config.page_url.as_deref()).await?;
        info!("Scanning {}", page.url());

        let runtime = ExtensionRuntime::new();
        let stats = Arc::new(ScanStats::new());

        // Background context
        let background_bus = MessageBus::new("background");
        runtime.connect(&background_bus);
        let background_client = Arc::new(
            DetectionClient::new(http.clone(), config.api_base.as_str(), storage.clone())
                .with_stats(Arc::clone(&stats)),
        );
        let counters = Arc::new(StatsService::new(
            http.clone(),
            config.api_base.as_str(),
            storage.clone(),
            Arc::clone(&background_bus),
        ));
        let _router = BackgroundRouter::install(
            &background_bus,
            background_client,
            Arc::clone(&counters),
            storage.clone(),
        );
        if let Err(e) = counters.refresh().await {
            warn!("Failed to refresh statistics: {:#}", e);
        }

        // Content context
        let content_bus = MessageBus::new("content");
        runtime.connect(&content_bus);
        let content_client = DetectionClient::new(http, config.api_base.as_str(), storage.clone())
            .with_proxy(Arc::clone(&content_bus))
            .with_stats(Arc::clone(&stats));
        let guard = EarlyBlurGuard::install(&page);
        let scanner = Arc::new(
            PageScanner::new(
                Arc::clone(&page),
                content_bus,
                Arc::new(content_client),
                storage,
            )
            .with_config(scan_config)
            .with_stats(Arc::clone(&stats)),
        );
        scanner.install();
        let summary = scanner.start().await;
        scanner.shutdown().await;
        if let Some(guard) = guard {
            guard.stop();
        }

        let counters = match counters.load().await {
            Ok(counters) => Some(counters),
            Err(e) => {
                warn!("Failed to read block counters: {}", e);
                None
            }
        };
        let images = page
            .images()
            .iter()
            .map(|image| ImageReport {
                source: image.src(),
                state: image.state(),
            })
            .collect();

        print_scan_statistics(&stats);

        Ok(ScanReport {
            page_url: page.url().to_string(),
            summary,
            images,
            failures: stats.total_failures(),
            counters,
            page_blocked: scanner.is_page_blocked(),
            elapsed_seconds: start_time.elapsed().as_secs_f64(),
        })
    }
}
