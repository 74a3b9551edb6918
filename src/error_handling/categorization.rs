//! Error categorization.
//!
//! Maps transport-level `reqwest` failures to the failure categories tracked
//! in [`super::ScanStats`].

use super::types::FailureType;

/// Categorizes a `reqwest::Error` into a [`FailureType`].
///
/// Status errors are split into client and server errors (403 is quota
/// exhaustion for this API); transport errors by their kind.
///
/// # Arguments
///
/// * `error` - The `reqwest::Error` to categorize
pub fn categorize_reqwest_error(error: &reqwest::Error) -> FailureType {
    if let Some(status) = error.status() {
        if status.as_u16() == crate::config::HTTP_STATUS_QUOTA_EXCEEDED {
            return FailureType::QuotaExceeded;
        }
        if status.is_server_error() {
            return FailureType::ServerError;
        }
        if status.is_client_error() {
            return FailureType::ClientError;
        }
    }

    if error.is_timeout() {
        FailureType::NetworkTimeout
    } else if error.is_connect() {
        FailureType::NetworkConnect
    } else if error.is_decode() || error.is_body() {
        FailureType::ResponseDecode
    } else {
        FailureType::NetworkOther
    }
}
