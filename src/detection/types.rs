//! Detection data types.
//!
//! Wire shapes exchanged with the classification API and between execution
//! contexts. Everything here serializes camelCase to match the message
//! schema the UI surfaces expect.

use chrono::Utc;
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumIter};

/// The scanner's decision for one image.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Action {
    Block,
    Warn,
    Allow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Where the media was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionContext {
    pub page_url: String,
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRequest {
    pub url: String,
    #[serde(rename = "type")]
    pub media_kind: MediaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<DetectionContext>,
}

impl DetectionRequest {
    pub fn image(url: impl Into<String>, context: Option<DetectionContext>) -> Self {
        Self {
            url: url.into(),
            media_kind: MediaKind::Image,
            context,
        }
    }
}

/// One class score from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionDetail {
    pub label: String,
    pub score: f64,
    /// Whether the label is in the model's triggered set, independent of `score`.
    pub active: bool,
}

/// Outcome of one classification attempt.
///
/// Built only through [`DetectionResult::completed`] and
/// [`DetectionResult::failed`], which keep the status invariants: a completed
/// result carries predictions, a failed one carries an error and allows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub id: String,
    pub url: String,
    #[serde(rename = "type")]
    pub media_kind: MediaKind,
    pub status: DetectionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predictions: Option<Vec<PredictionDetail>>,
    pub action: Action,
    /// RFC 3339.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota_remaining: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DetectionResult {
    pub fn completed(
        url: impl Into<String>,
        media_kind: MediaKind,
        predictions: Vec<PredictionDetail>,
        action: Action,
        quota_remaining: Option<u64>,
    ) -> Self {
        Self {
            id: new_detection_id("detection"),
            url: url.into(),
            media_kind,
            status: DetectionStatus::Completed,
            predictions: Some(predictions),
            action,
            timestamp: Utc::now().to_rfc3339(),
            quota_remaining,
            error: None,
        }
    }

    /// A fail-open result.
    pub fn failed(url: impl Into<String>, media_kind: MediaKind, error: impl Into<String>) -> Self {
        Self {
            id: new_detection_id("detection_error"),
            url: url.into(),
            media_kind,
            status: DetectionStatus::Failed,
            predictions: None,
            action: Action::Allow,
            timestamp: Utc::now().to_rfc3339(),
            quota_remaining: None,
            error: Some(error.into()),
        }
    }

    /// Result for media that is not worth classifying (inline or blob URLs).
    pub fn skipped(url: impl Into<String>) -> Self {
        Self::completed(url, MediaKind::Image, Vec::new(), Action::Allow, None)
    }

    /// The same result with its action recomputed by `derive`.
    ///
    /// Only completed results change; the id and timestamp are kept.
    pub fn with_action_from(&self, derive: impl FnOnce(&[PredictionDetail]) -> Action) -> Self {
        let mut next = self.clone();
        if let (DetectionStatus::Completed, Some(predictions)) = (self.status, &self.predictions) {
            next.action = derive(predictions);
        }
        next
    }

    pub fn is_completed(&self) -> bool {
        self.status == DetectionStatus::Completed
    }

    /// Highest score among the predictions (0 when there are none).
    pub fn max_score(&self) -> f64 {
        self.predictions
            .iter()
            .flatten()
            .map(|p| p.score)
            .fold(0.0, f64::max)
    }
}

/// `<prefix>_<unix millis>_<9 random chars>`.
fn new_detection_id(prefix: &str) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("{}_{}_{}", prefix, Utc::now().timestamp_millis(), suffix)
}

/// Successful body of `POST /api/v1/predict`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictResponse {
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub probabilities: Vec<f64>,
    #[serde(default)]
    pub active: Vec<String>,
    #[serde(default)]
    pub quota_remaining: Option<u64>,
}

impl PredictResponse {
    /// Zips `classes` with `probabilities` (a missing score counts as 0) and
    /// marks labels found in `active`.
    pub fn predictions(&self) -> Vec<PredictionDetail> {
        self.classes
            .iter()
            .enumerate()
            .map(|(index, label)| PredictionDetail {
                label: label.clone(),
                score: self.probabilities.get(index).copied().unwrap_or(0.0),
                active: self.active.iter().any(|a| a == label),
            })
            .collect()
    }
}

/// Error body of the API (FastAPI style).
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ApiErrorBody {
    pub(crate) fn message(&self) -> Option<String> {
        match self.detail.as_ref()? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}
