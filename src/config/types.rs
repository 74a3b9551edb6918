//! Configuration types and CLI options.
//!
//! This module defines the page-lifetime [`ScanConfig`], its partial update
//! form carried by `UPDATE_CONFIG` messages, and the CLI/library [`Config`].

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::config::constants::{
    DEFAULT_API_BASE_URL, DEFAULT_BLOCK_THRESHOLD, DEFAULT_SCAN_DELAY, DEFAULT_TIMEOUT_SECS,
    DEFAULT_WARN_THRESHOLD,
};
use crate::error_handling::ConfigError;

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
///
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: Structured JSON format for machine parsing
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Verdict thresholds applied to the maximum prediction score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Scores at or above this value block the image.
    pub block: f64,
    /// Scores at or above this value (and below `block`) warn.
    pub warn: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            block: DEFAULT_BLOCK_THRESHOLD,
            warn: DEFAULT_WARN_THRESHOLD,
        }
    }
}

/// Scan configuration for one page lifetime.
///
/// Created with defaults when the content script loads and mutated only
/// through [`ScanConfig::apply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanConfig {
    pub enabled: bool,
    pub block_threshold: f64,
    pub warn_threshold: f64,
    /// `None` means no limit.
    pub max_images_per_scan: Option<usize>,
    #[serde(with = "duration_millis", rename = "scanDelay")]
    pub scan_delay: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            block_threshold: DEFAULT_BLOCK_THRESHOLD,
            warn_threshold: DEFAULT_WARN_THRESHOLD,
            max_images_per_scan: None,
            scan_delay: DEFAULT_SCAN_DELAY,
        }
    }
}

impl ScanConfig {
    /// The thresholds the detection client should apply.
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            block: self.block_threshold,
            warn: self.warn_threshold,
        }
    }

    /// Applies a partial update.
    ///
    /// The patch is validated against the merged result, so a patch that would
    /// leave `block_threshold < warn_threshold` is rejected and the
    /// configuration is left untouched.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a threshold lies outside `[0, 1]` or the
    /// thresholds would be inverted.
    pub fn apply(&mut self, patch: &ScanConfigPatch) -> Result<(), ConfigError> {
        let mut next = self.clone();
        if let Some(enabled) = patch.enabled {
            next.enabled = enabled;
        }
        if let Some(block) = patch.block_threshold {
            next.block_threshold = block;
        }
        if let Some(warn) = patch.warn_threshold {
            next.warn_threshold = warn;
        }
        if let Some(max) = patch.max_images_per_scan {
            next.max_images_per_scan = max;
        }
        if let Some(delay_ms) = patch.scan_delay {
            next.scan_delay = Duration::from_millis(delay_ms);
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    /// Checks the threshold invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("blockThreshold", self.block_threshold),
            ("warnThreshold", self.warn_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { name, value });
            }
        }
        if self.block_threshold < self.warn_threshold {
            return Err(ConfigError::InvertedThresholds {
                block: self.block_threshold,
                warn: self.warn_threshold,
            });
        }
        Ok(())
    }
}

/// Partial [`ScanConfig`] carried by `UPDATE_CONFIG`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warn_threshold: Option<f64>,
    /// `Some(None)` lifts the limit.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "double_option"
    )]
    pub max_images_per_scan: Option<Option<usize>>,
    /// Milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_delay: Option<u64>,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Option<usize>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Option<usize>>, D::Error> {
        Option::<usize>::deserialize(deserializer).map(Some)
    }
}

/// Library configuration, also parsed from the command line.
///
/// # Examples
///
/// ```no_run
/// use media_guard::Config;
/// use std::path::PathBuf;
///
/// let config = Config {
///     page: "page.html".to_string(),
///     token: Some("secret".to_string()),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Parser)]
#[command(
    name = "media_guard",
    about = "Scans the images of a web page and blurs or flags sensitive media."
)]
pub struct Config {
    /// HTML file to scan, or an http(s) URL to download it from
    #[arg(value_parser)]
    pub page: String,

    /// Address the page is served from (defaults to the page argument when it is a URL)
    #[arg(long)]
    pub page_url: Option<String>,

    /// Base URL of the moderation API
    #[arg(long, env = "MEDIA_GUARD_API_BASE", default_value = DEFAULT_API_BASE_URL)]
    pub api_base: String,

    /// API bearer token (stored as the signed-in user's token)
    #[arg(long, env = "MEDIA_GUARD_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Score at or above which an image is blocked
    #[arg(long, default_value_t = DEFAULT_BLOCK_THRESHOLD)]
    pub block_threshold: f64,

    /// Score at or above which an image is flagged
    #[arg(long, default_value_t = DEFAULT_WARN_THRESHOLD)]
    pub warn_threshold: f64,

    /// Maximum number of images classified per page scan
    #[arg(long)]
    pub max_images: Option<usize>,

    /// Pause between classification calls in milliseconds
    #[arg(long, default_value_t = 100)]
    pub scan_delay_ms: u64,

    /// HTTP timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_seconds: u64,

    /// Directory for persisted extension storage (in-memory when omitted)
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Log format
    #[arg(long, value_enum, default_value = "plain")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page: "page.html".to_string(),
            page_url: None,
            api_base: DEFAULT_API_BASE_URL.to_string(),
            token: None,
            block_threshold: DEFAULT_BLOCK_THRESHOLD,
            warn_threshold: DEFAULT_WARN_THRESHOLD,
            max_images: None,
            scan_delay_ms: 100,
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            storage_dir: None,
            log_level: LogLevel::Info,
            log_format: LogFormat::Plain,
        }
    }
}

impl Config {
    /// Builds the initial scan configuration from the CLI values.
    pub fn scan_config(&self) -> Result<ScanConfig, ConfigError> {
        let config = ScanConfig {
            enabled: true,
            block_threshold: self.block_threshold,
            warn_threshold: self.warn_threshold,
            max_images_per_scan: self.max_images,
            scan_delay: Duration::from_millis(self.scan_delay_ms),
        };
        config.validate()?;
        Ok(config)
    }
}
