//! Statistics printing.

use log::info;
use strum::IntoEnumIterator;

use crate::detection::Action;
use crate::error_handling::{FailureType, ScanStats};

/// Logs verdict and failure counts.
pub fn print_scan_statistics(stats: &ScanStats) {
    let total_verdicts = stats.total_verdicts();
    if total_verdicts > 0 {
        info!("Verdict Counts ({} total):", total_verdicts);
        for action in Action::iter() {
            let count = stats.get_verdict_count(action);
            if count > 0 {
                info!("   {}: {}", action.as_ref(), count);
            }
        }
    }

    let total_failures = stats.total_failures();
    if total_failures > 0 {
        info!("Failure Counts ({} total):", total_failures);
        for failure in FailureType::iter() {
            let count = stats.get_failure_count(failure);
            if count > 0 {
                info!("   {}: {}", failure.as_ref(), count);
            }
        }
    }
}
