//! Configuration constants.
//!
//! This module defines all configuration constants used throughout the crate,
//! including timeouts, size limits, retry bounds and log rotation parameters.

use std::time::Duration;

// Download limits
/// Maximum accepted texture size in bytes (50 MiB).
/// Larger bodies are discarded before they are decoded or persisted.
pub const MAX_TEXTURE_SIZE: u64 = 50 * 1024 * 1024;

// Network operation timeouts
/// Per-request timeout in seconds, covering connect, TLS handshake and body transfer.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
/// TCP connection timeout in seconds
pub const CONNECT_TIMEOUT_SECS: u64 = 10;
/// Redirect hops followed before a request fails.
pub const MAX_REDIRECTS: usize = 10;

/// User-Agent sent with every texture request.
pub const USER_AGENT: &str = "Earth-Viewer/1.0";

// Retry strategy
/// Number of retries granted before a policy refuses further attempts.
pub const RETRY_MAX_ATTEMPTS: u32 = 5;
/// Unit of the exponential backoff: the n-th retry waits `2^n * RETRY_BASE_DELAY`.
pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

// Audit log
/// Active audit log file name.
pub const AUDIT_LOG_FILE_NAME: &str = "earth-viewer.log";
/// Size above which the active audit log is rotated (10 MiB).
pub const LOG_ROTATION_BYTES: u64 = 10 * 1024 * 1024;
/// Number of rotated audit log generations kept next to the active file.
pub const LOG_RETAINED_GENERATIONS: usize = 5;

// Refresh cadence
/// Interval between overlay refreshes in seconds.
/// Owned by the caller; the core is simply re-invoked at this cadence.
pub const REFRESH_INTERVAL_SECS: u64 = 600;

/// Directory name used under the platform data directory.
pub const APP_DIR_NAME: &str = "EarthViewer";
