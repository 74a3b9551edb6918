//! Error type definitions.
//!
//! This module defines the error enums of each concern plus the failure
//! categories tracked by [`super::ScanStats`].

use log::SetLoggerError;
use reqwest::Error as ReqwestError;
use strum_macros::{AsRefStr, EnumIter as EnumIterMacro};
use thiserror::Error;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error initializing the HTTP client.
    #[error("HTTP client initialization error: {0}")]
    HttpClientError(#[from] ReqwestError),
}

/// Rejected configuration values (user-entered settings or `UPDATE_CONFIG`).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A threshold outside `[0, 1]`.
    #[error("{name} must be between 0 and 1, got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f64 },

    /// `blockThreshold` below `warnThreshold`.
    #[error("blockThreshold ({block}) must not be lower than warnThreshold ({warn})")]
    InvertedThresholds { block: f64, warn: f64 },
}

/// Error types for the storage adapter.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The storage API is not present in this execution context.
    #[error("Extension storage API is not available")]
    Unavailable,

    /// The backend reported a failure.
    #[error("Storage error: {0}")]
    Platform(String),

    /// A stored value could not be converted to or from JSON.
    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error types for the runtime messaging bus.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessagingError {
    /// The extension runtime went away under a live page.
    #[error("Extension context invalidated")]
    ContextInvalidated,

    /// The transport failed for another reason.
    #[error("Messaging error: {0}")]
    Transport(String),
}

/// Errors raised while classifying one piece of media.
///
/// None of these escape [`crate::DetectionClient::analyze`]: they are folded
/// into a failed, fail-open result.
#[derive(Error, Debug)]
pub enum DetectionError {
    /// No auth token in storage.
    #[error("User not authenticated. Please login first.")]
    AuthenticationRequired,

    /// The API answered 403.
    #[error("Quota exceeded. Please upgrade your plan.")]
    QuotaExceeded,

    /// The API answered another non-2xx status.
    #[error("{message}")]
    Server { status: u16, message: String },

    /// The media itself could not be retrieved.
    #[error("Failed to fetch image: {0}")]
    MediaFetch(String),

    /// Inline image data could not be decoded.
    #[error("Failed to convert image data")]
    InvalidImageData,

    /// Transport-level HTTP failure.
    #[error("Network error: {0}")]
    Network(#[from] ReqwestError),

    /// The auth token could not be read.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The media kind has no classifier.
    #[error("Video analysis not implemented yet")]
    Unsupported,
}

impl DetectionError {
    /// Maps the error to the category tracked in scan statistics.
    pub fn failure_type(&self) -> FailureType {
        match self {
            DetectionError::AuthenticationRequired => FailureType::AuthenticationRequired,
            DetectionError::QuotaExceeded => FailureType::QuotaExceeded,
            DetectionError::Server { status, .. } if *status >= 500 => FailureType::ServerError,
            DetectionError::Server { .. } => FailureType::ClientError,
            DetectionError::MediaFetch(_) => FailureType::MediaFetch,
            DetectionError::InvalidImageData => FailureType::InvalidImageData,
            DetectionError::Network(e) => super::categorize_reqwest_error(e),
            DetectionError::Storage(_) => FailureType::StorageUnavailable,
            DetectionError::Unsupported => FailureType::Unsupported,
        }
    }
}

/// Categories of per-image failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum FailureType {
    AuthenticationRequired,
    QuotaExceeded,
    ServerError,
    ClientError,
    MediaFetch,
    InvalidImageData,
    NetworkTimeout,
    NetworkConnect,
    ResponseDecode,
    NetworkOther,
    StorageUnavailable,
    Unsupported,
}
