//! Error type definitions.
//!
//! This module defines the failure taxonomy of a texture fetch, the category
//! enum used for statistics, and initialization errors.

use std::path::PathBuf;

use log::SetLoggerError;
use reqwest::Error as ReqwestError;
use strum_macros::EnumIter as EnumIterMacro;
use thiserror::Error;

use crate::pinning::PinningRejection;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error initializing the HTTP client.
    #[error("HTTP client initialization error: {0}")]
    HttpClientError(#[from] ReqwestError),

    /// Error building the TLS configuration.
    #[error("TLS configuration error: {0}")]
    TlsError(#[from] rustls::Error),

    /// Error building the certificate verifier.
    #[error("Certificate verifier initialization error: {0}")]
    VerifierError(String),

    /// A configured pin could not be parsed.
    #[error("Invalid certificate pin '{0}': expected DOMAIN=sha256//<64 hex chars>")]
    InvalidPinError(String),

    /// Error preparing a directory or file.
    #[error("Filesystem initialization error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Why a single fetch attempt failed.
///
/// Every variant except `InvalidDescriptor` and `Cancelled` is retried
/// according to the retry policy. None of them is ever surfaced to the
/// caller of `fetch`; they are logged and counted.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The descriptor has no usable URL or file name.
    #[error("Invalid texture descriptor: {0}")]
    InvalidDescriptor(String),

    /// Connection, TLS or timeout failure.
    #[error("Network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: ReqwestError,
    },

    /// Non-2xx response.
    #[error("HTTP status {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// Body larger than the configured ceiling.
    #[error("Download too large: {size} bytes (max: {limit} bytes)")]
    SizeExceeded { size: u64, limit: u64 },

    /// The server's public key is not pinned for this domain.
    #[error("Certificate pinning rejected {domain}: {reason}")]
    PinningRejected {
        domain: String,
        reason: PinningRejection,
    },

    /// Body does not match the descriptor's expected checksum.
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Body is not a JPEG, PNG or GIF.
    #[error("Response body is not a supported image")]
    InvalidImage,

    /// Writing the validated texture to disk failed.
    #[error("Failed to persist texture to {path:?}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The caller cancelled the fetch.
    #[error("Fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Returns the statistics category for this error.
    pub fn error_type(&self) -> ErrorType {
        match self {
            FetchError::InvalidDescriptor(_) => ErrorType::InvalidDescriptor,
            FetchError::Network { source, .. } => {
                super::categorization::categorize_reqwest_error(source)
            }
            FetchError::HttpStatus { status, .. } => {
                super::categorization::categorize_status(*status)
            }
            FetchError::SizeExceeded { .. } => ErrorType::SizeExceeded,
            FetchError::PinningRejected { .. } => ErrorType::PinningRejected,
            FetchError::ChecksumMismatch { .. } => ErrorType::ChecksumMismatch,
            FetchError::InvalidImage => ErrorType::InvalidImage,
            FetchError::Persistence { .. } => ErrorType::PersistenceError,
            FetchError::Cancelled => ErrorType::Cancelled,
        }
    }

    /// Whether the retry policy should be consulted after this error.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            FetchError::InvalidDescriptor(_) | FetchError::Cancelled
        )
    }
}

/// Categories of fetch failures, used for statistics and log context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum ErrorType {
    // Descriptor errors
    InvalidDescriptor,
    // HTTP/Network errors
    HttpRequestBuilderError,
    HttpRequestRedirectError,
    HttpRequestTimeoutError,
    HttpRequestConnectError,
    HttpRequestBodyError,
    HttpRequestDecodeError,
    HttpRequestOtherError,
    // HTTP status errors
    HttpRequestNotFound,            // 404 Not Found
    HttpRequestTooManyRequests,     // 429 Too Many Requests
    HttpRequestClientError,         // other 4xx
    HttpRequestInternalServerError, // 500 Internal Server Error
    HttpRequestServiceUnavailable,  // 503 Service Unavailable
    HttpRequestServerError,         // other 5xx
    HttpRequestUnexpectedStatus,    // 1xx/3xx reaching the caller
    // Content errors
    SizeExceeded,
    ChecksumMismatch,
    InvalidImage,
    // TLS errors
    PinningRejected,
    // Local errors
    PersistenceError,
    Cancelled,
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::InvalidDescriptor => "Invalid texture descriptor",
            ErrorType::HttpRequestBuilderError => "HTTP request builder error",
            ErrorType::HttpRequestRedirectError => "HTTP request redirect error",
            ErrorType::HttpRequestTimeoutError => "HTTP request timeout error",
            ErrorType::HttpRequestConnectError => "HTTP request connect error",
            ErrorType::HttpRequestBodyError => "HTTP request body error",
            ErrorType::HttpRequestDecodeError => "HTTP request decode error",
            ErrorType::HttpRequestOtherError => "HTTP request other error",
            ErrorType::HttpRequestNotFound => "Not Found (404)",
            ErrorType::HttpRequestTooManyRequests => "Too many requests (429)",
            ErrorType::HttpRequestClientError => "HTTP client error (4xx)",
            ErrorType::HttpRequestInternalServerError => "Internal Server Error (500)",
            ErrorType::HttpRequestServiceUnavailable => "Service Unavailable (503)",
            ErrorType::HttpRequestServerError => "HTTP server error (5xx)",
            ErrorType::HttpRequestUnexpectedStatus => "Unexpected HTTP status",
            ErrorType::SizeExceeded => "Download size exceeded",
            ErrorType::ChecksumMismatch => "Checksum mismatch",
            ErrorType::InvalidImage => "Invalid image data",
            ErrorType::PinningRejected => "Certificate pinning rejected",
            ErrorType::PersistenceError => "Texture persistence error",
            ErrorType::Cancelled => "Fetch cancelled",
        }
    }
}

/// How a fetch resolved, from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum OutcomeType {
    /// Fresh imagery downloaded and persisted
    Downloaded,
    /// Last persisted copy served after the live fetch failed
    Cached,
    /// Bundled base layer read from disk
    Bundled,
    /// Neither a live nor a local copy was available
    Unavailable,
}

impl OutcomeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeType::Downloaded => "downloaded",
            OutcomeType::Cached => "cached fallback",
            OutcomeType::Bundled => "bundled",
            OutcomeType::Unavailable => "unavailable",
        }
    }
}
