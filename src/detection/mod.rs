//! Media classification.
//!
//! This module provides:
//! - Detection request/result types and the API wire shapes
//! - Verdict derivation from prediction scores (block/warn/allow)
//! - The [`DetectionClient`] that calls the remote classifier, directly or
//!   through the background context

mod client;
mod types;
mod verdict;

pub use client::{is_inline_media_url, DetectionClient, Detector};
pub use types::{
    Action, DetectionContext, DetectionRequest, DetectionResult, DetectionStatus, MediaKind,
    PredictResponse, PredictionDetail,
};
pub use verdict::{
    category_for_label, derive_action, derive_filtered_action, Category, FilterPreferences,
};
