//! Error handling and scan statistics.
//!
//! This module provides:
//! - Error type definitions per concern (storage, messaging, detection, config)
//! - Failure categorization for transport errors
//! - Scan statistics tracking (verdicts and failure categories)
//!
//! Per-image failures never abort a scan: they are folded into fail-open
//! results and counted here. Only [`MessagingError::ContextInvalidated`] is
//! escalated to the user.

mod categorization;
mod stats;
mod types;

// Re-export public API
pub use categorization::categorize_reqwest_error;
pub use stats::ScanStats;
pub use types::{
    ConfigError, DetectionError, FailureType, InitializationError, MessagingError, StorageError,
};
