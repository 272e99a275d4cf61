//! Error categorization.
//!
//! This module maps transport errors and HTTP status codes onto `ErrorType`
//! categories and records them in the fetch statistics.

use super::stats::FetchStats;
use super::types::{ErrorType, FetchError};

/// Categorizes a `reqwest::Error` into an `ErrorType`.
///
/// Status codes carried by the error take precedence over the transport
/// classification.
pub fn categorize_reqwest_error(error: &reqwest::Error) -> ErrorType {
    if let Some(status) = error.status() {
        return categorize_status(status.as_u16());
    }

    if error.is_builder() {
        ErrorType::HttpRequestBuilderError
    } else if error.is_redirect() {
        ErrorType::HttpRequestRedirectError
    } else if error.is_timeout() {
        ErrorType::HttpRequestTimeoutError
    } else if error.is_connect() {
        ErrorType::HttpRequestConnectError
    } else if error.is_body() {
        ErrorType::HttpRequestBodyError
    } else if error.is_decode() {
        ErrorType::HttpRequestDecodeError
    } else {
        ErrorType::HttpRequestOtherError
    }
}

/// Categorizes a non-2xx HTTP status code.
pub fn categorize_status(status: u16) -> ErrorType {
    match status {
        404 => ErrorType::HttpRequestNotFound,
        429 => ErrorType::HttpRequestTooManyRequests,
        500 => ErrorType::HttpRequestInternalServerError,
        503 => ErrorType::HttpRequestServiceUnavailable,
        400..=499 => ErrorType::HttpRequestClientError,
        500..=599 => ErrorType::HttpRequestServerError,
        _ => ErrorType::HttpRequestUnexpectedStatus,
    }
}

/// Records a fetch failure in the statistics.
pub fn update_error_stats(stats: &FetchStats, error: &FetchError) {
    stats.increment_error(error.error_type());
}
