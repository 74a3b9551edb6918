//! Application helpers for headless scans.
//!
//! Page loading and statistics printing used by [`crate::run_scan`].

pub mod source;
pub mod statistics;

pub use source::{load_page, validate_page_url};
pub use statistics::print_scan_statistics;
