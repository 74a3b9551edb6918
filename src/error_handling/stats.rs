//! Scan statistics tracking.
//!
//! Thread-safe counters for verdicts and per-image failures, shared between
//! the page scanner, the mutation observer task and the detection client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use strum::IntoEnumIterator;

use super::types::FailureType;
use crate::detection::Action;

/// Thread-safe scan statistics tracker.
///
/// Tracks verdicts and failure categories using atomic counters. All keys are
/// initialized to zero on creation, so lookups never miss.
pub struct ScanStats {
    verdicts: HashMap<Action, AtomicUsize>,
    failures: HashMap<FailureType, AtomicUsize>,
}

impl ScanStats {
    pub fn new() -> Self {
        let mut verdicts = HashMap::new();
        for action in Action::iter() {
            verdicts.insert(action, AtomicUsize::new(0));
        }

        let mut failures = HashMap::new();
        for failure in FailureType::iter() {
            failures.insert(failure, AtomicUsize::new(0));
        }

        ScanStats { verdicts, failures }
    }

    /// Increment a verdict counter.
    pub fn increment_verdict(&self, action: Action) {
        if let Some(counter) = self.verdicts.get(&action) {
            counter.fetch_add(1, Ordering::Relaxed);
        } else {
            log::error!(
                "Attempted to increment verdict counter for {:?} which is not in the map. \
                 This indicates a bug in ScanStats initialization.",
                action
            );
        }
    }

    /// Increment a failure counter.
    pub fn increment_failure(&self, failure: FailureType) {
        if let Some(counter) = self.failures.get(&failure) {
            counter.fetch_add(1, Ordering::Relaxed);
        } else {
            log::error!(
                "Attempted to increment failure counter for {:?} which is not in the map. \
                 This indicates a bug in ScanStats initialization.",
                failure
            );
        }
    }

    pub fn get_verdict_count(&self, action: Action) -> usize {
        self.verdicts
            .get(&action)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn get_failure_count(&self, failure: FailureType) -> usize {
        self.failures
            .get(&failure)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Get total failure count across all categories.
    pub fn total_failures(&self) -> usize {
        FailureType::iter().map(|f| self.get_failure_count(f)).sum()
    }

    /// Get total verdict count across all actions.
    pub fn total_verdicts(&self) -> usize {
        Action::iter().map(|a| self.get_verdict_count(a)).sum()
    }
}

impl Default for ScanStats {
    fn default() -> Self {
        Self::new()
    }
}
