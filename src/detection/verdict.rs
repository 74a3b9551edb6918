//! Verdict derivation.
//!
//! The action is decided by the maximum score across the considered
//! predictions, with inclusive lower bounds:
//! `score >= block` → block, else `score >= warn` → warn, else allow.

use serde::{Deserialize, Serialize};

use super::types::{Action, PredictionDetail};
use crate::config::Thresholds;

/// Derives the action from the maximum score of `predictions`.
///
/// An empty prediction list allows.
pub fn derive_action(predictions: &[PredictionDetail], thresholds: Thresholds) -> Action {
    if predictions.is_empty() {
        return Action::Allow;
    }
    let max_score = predictions.iter().map(|p| p.score).fold(0.0, f64::max);
    if max_score >= thresholds.block {
        Action::Block
    } else if max_score >= thresholds.warn {
        Action::Warn
    } else {
        Action::Allow
    }
}

/// Content categories the user can switch on and off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Sensitive,
    Violence,
    Toxicity,
    Vice,
}

/// Maps a model label (class index or display name) to its category.
pub fn category_for_label(label: &str) -> Option<Category> {
    match label {
        "0" | "Máu me" => Some(Category::Violence),
        "1" | "Vũ khí" => Some(Category::Toxicity),
        "2" | "Chiến tranh" => Some(Category::Vice),
        "3" | "Nhạy cảm" => Some(Category::Sensitive),
        _ => None,
    }
}

/// Per-category filter switches, stored in sync storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterPreferences {
    pub sensitive: bool,
    pub violence: bool,
    pub toxicity: bool,
    pub vice: bool,
}

impl Default for FilterPreferences {
    fn default() -> Self {
        Self {
            sensitive: true,
            violence: true,
            toxicity: true,
            vice: true,
        }
    }
}

impl FilterPreferences {
    pub fn is_enabled(&self, category: Category) -> bool {
        match category {
            Category::Sensitive => self.sensitive,
            Category::Violence => self.violence,
            Category::Toxicity => self.toxicity,
            Category::Vice => self.vice,
        }
    }

    /// Whether a prediction with `label` takes part in the verdict.
    ///
    /// Unknown labels always do.
    pub fn considers(&self, label: &str) -> bool {
        category_for_label(label).is_none_or(|category| self.is_enabled(category))
    }
}

/// [`derive_action`] over the predictions whose category is enabled.
pub fn derive_filtered_action(
    predictions: &[PredictionDetail],
    thresholds: Thresholds,
    filters: &FilterPreferences,
) -> Action {
    let considered: Vec<PredictionDetail> = predictions
        .iter()
        .filter(|p| filters.considers(&p.label))
        .cloned()
        .collect();
    derive_action(&considered, thresholds)
}
