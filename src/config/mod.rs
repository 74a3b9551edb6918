//! Application configuration and constants.
//!
//! This module provides:
//! - Configuration constants (thresholds, timeouts, DOM annotation names, etc.)
//! - The page-lifetime scan configuration and its partial update form
//! - CLI option types and parsing

mod constants;
mod types;

// Re-export all constants
pub use constants::*;
pub use types::{Config, LogFormat, LogLevel, ScanConfig, ScanConfigPatch, Thresholds};
