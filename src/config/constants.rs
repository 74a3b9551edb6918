//! Configuration constants.
//!
//! This module defines the constants used throughout the pipeline: verdict
//! thresholds, scan pacing, image eligibility limits, API paths and the names
//! of the DOM annotations the scanner and the early-blur guard agree on.

use std::time::Duration;

// Verdict thresholds (client side)
/// Maximum prediction score at or above which an image is blocked.
pub const DEFAULT_BLOCK_THRESHOLD: f64 = 0.8;
/// Maximum prediction score at or above which an image is flagged with a warning.
pub const DEFAULT_WARN_THRESHOLD: f64 = 0.5;

/// Gating threshold submitted with every classification request.
///
/// This is the server's own threshold for its `active` set and is independent
/// of the client-side block/warn thresholds above.
pub const SERVER_SUBMISSION_THRESHOLD: &str = "0.5";

// Scan pacing
/// Pause between two sequential classification calls in a page scan.
pub const DEFAULT_SCAN_DELAY: Duration = Duration::from_millis(100);
/// Longest time the scanner waits for an image that has not finished loading.
pub const IMAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(5);

// Image eligibility
/// Minimum width and height (px) of an image worth classifying.
pub const MIN_IMAGE_DIMENSION: u32 = 50;
/// Minimum size on the image search surface, where thumbnails are small.
pub const MIN_IMAGE_DIMENSION_IMAGE_SEARCH: u32 = 30;
/// Decoded inline payloads smaller than this are not real images.
pub const MIN_INLINE_IMAGE_BYTES: usize = 100;

// HTTP
/// Default base URL of the moderation API.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
/// Classification endpoint.
pub const PREDICT_PATH: &str = "/api/v1/predict";
/// Per-user statistics endpoint.
pub const STATISTICS_PATH: &str = "/api/v1/users/statistics";
/// Default HTTP timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// HTTP status the API answers with once the plan quota is exhausted.
pub const HTTP_STATUS_QUOTA_EXCEEDED: u16 = 403;
/// User-Agent sent with API and media requests.
pub const DEFAULT_USER_AGENT: &str = concat!("media_guard/", env!("CARGO_PKG_VERSION"));

// Error message limits
/// Maximum error message length in characters stored on a detection result.
pub const MAX_ERROR_MESSAGE_LENGTH: usize = 500;

// DOM annotations
pub const ATTR_PROCESSED: &str = "data-mg-processed";
pub const ATTR_BLOCKED: &str = "data-mg-blocked";
pub const ATTR_WARNED: &str = "data-mg-warned";
pub const ATTR_SAFE: &str = "data-mg-safe";
pub const ATTR_REASON: &str = "data-mg-reason";
pub const ATTR_SCANNED: &str = "data-mg-scanned";
pub const ATTR_PENDING: &str = "data-mg-pending";
pub const ATTR_CLICKABLE: &str = "data-mg-clickable";
/// Set on the document element once the content script is running.
pub const ATTR_LOADED: &str = "data-mg-loaded";

/// Element id of the early-blur stylesheet.
pub const EARLY_BLUR_STYLE_ID: &str = "mg-early-blur";
/// Element id of the "please reload" banner.
pub const RELOAD_BANNER_ID: &str = "mg-reload-banner";
/// Element id of the blacklist overlay.
pub const BLACKLIST_OVERLAY_ID: &str = "mg-blacklist-overlay";

// User-facing strings
pub const BLOCKED_TITLE: &str = "Click to reveal (Sensitive content detected)";
pub const REVEALED_TITLE: &str = "Sensitive content revealed";
pub const WARNED_TITLE: &str = "Potentially sensitive content";
pub const REVEAL_PROMPT: &str = "This image may contain sensitive content. Do you want to view it?";
pub const UNSCANNED_TITLE: &str = "Could not scan this image. Click to reveal.";
pub const UNSCANNED_REVEALED_TITLE: &str = "Image revealed (not scanned)";
