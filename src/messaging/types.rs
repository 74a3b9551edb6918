//! Runtime message schema.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumIter, EnumString};

use crate::config::ScanConfigPatch;
use crate::detection::{DetectionContext, DetectionResult};

/// User-facing extension state, shared between UI surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtensionState {
    pub is_enabled: bool,
    pub filter_level: String,
    pub theme: String,
    pub language: String,
    pub notifications: bool,
    pub auto_block: bool,
}

impl Default for ExtensionState {
    fn default() -> Self {
        Self {
            is_enabled: true,
            filter_level: "moderate".to_string(),
            theme: "system".to_string(),
            language: "en".to_string(),
            notifications: true,
            auto_block: false,
        }
    }
}

/// Payload of `STATS_UPDATED`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total: u64,
    pub today: u64,
    pub weekly: u64,
}

/// Messages exchanged between execution contexts.
///
/// Serialized as `{"type": "SCAN_PAGE", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuntimeMessage {
    UpdateState {
        payload: ExtensionState,
    },
    DetectionResult {
        data: DetectionResult,
    },
    ScanPage,
    ToggleExtension {
        enabled: bool,
    },
    UpdateConfig {
        config: ScanConfigPatch,
    },
    StateUpdated {
        payload: ExtensionState,
    },
    StatsUpdated {
        data: StatsSnapshot,
    },
    AnalyzeImage {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<DetectionContext>,
    },
    AnalyzeImageData {
        #[serde(rename = "imageData")]
        image_data: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<DetectionContext>,
    },
}

/// The `type` tag of a [`RuntimeMessage`], used to route to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    UpdateState,
    DetectionResult,
    ScanPage,
    ToggleExtension,
    UpdateConfig,
    StateUpdated,
    StatsUpdated,
    AnalyzeImage,
    AnalyzeImageData,
}

impl RuntimeMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            RuntimeMessage::UpdateState { .. } => MessageKind::UpdateState,
            RuntimeMessage::DetectionResult { .. } => MessageKind::DetectionResult,
            RuntimeMessage::ScanPage => MessageKind::ScanPage,
            RuntimeMessage::ToggleExtension { .. } => MessageKind::ToggleExtension,
            RuntimeMessage::UpdateConfig { .. } => MessageKind::UpdateConfig,
            RuntimeMessage::StateUpdated { .. } => MessageKind::StateUpdated,
            RuntimeMessage::StatsUpdated { .. } => MessageKind::StatsUpdated,
            RuntimeMessage::AnalyzeImage { .. } => MessageKind::AnalyzeImage,
            RuntimeMessage::AnalyzeImageData { .. } => MessageKind::AnalyzeImageData,
        }
    }
}

/// Reply to a message.
///
/// `ANALYZE_IMAGE*` answer with a detection result; everything else with an
/// acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuntimeResponse {
    Detection(DetectionResult),
    Ack {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl RuntimeResponse {
    pub fn ok() -> Self {
        RuntimeResponse::Ack {
            success: true,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        RuntimeResponse::Ack {
            success: false,
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        match self {
            RuntimeResponse::Detection(_) => true,
            RuntimeResponse::Ack { success, .. } => *success,
        }
    }
}
