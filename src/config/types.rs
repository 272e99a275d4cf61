//! Configuration types and CLI options.
//!
//! This module defines enums and structs used for command-line argument parsing
//! and configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::config::constants::{APP_DIR_NAME, REFRESH_INTERVAL_SECS, REQUEST_TIMEOUT_SECS};
use crate::texture::TextureKind;

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
///
/// Controls how log messages are formatted:
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: Structured JSON format for machine parsing
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// How retry budgets are shared between textures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RetryScope {
    /// One process-wide budget: a failing feed consumes retries for every feed.
    Shared,
    /// Each texture kind gets its own budget.
    PerTexture,
}

/// Library configuration (no CLI dependencies).
///
/// This is the core configuration struct used by the library. It can be
/// constructed programmatically without any CLI dependencies.
///
/// # Examples
///
/// ```no_run
/// use earth_viewer::Config;
/// use std::path::PathBuf;
///
/// let config = Config {
///     resource_dir: PathBuf::from("./resources"),
///     watch: true,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Textures to refresh (empty means every texture)
    pub textures: Vec<TextureKind>,

    /// Directory holding the bundled base layer and persisted overlays
    pub resource_dir: PathBuf,

    /// Directory holding the audit log and its rotated generations
    pub log_dir: PathBuf,

    /// Log level
    pub log_level: LogLevel,

    /// Log format
    pub log_format: LogFormat,

    /// Per-request timeout in seconds
    pub timeout_seconds: u64,

    /// Retry budget scoping
    pub retry_scope: RetryScope,

    /// Refuse plain-HTTP texture URLs (pinning only applies to HTTPS)
    pub https_only: bool,

    /// Pins in `domain=sha256//<hex>` form, added to the built-in set
    pub extra_pins: Vec<String>,

    /// Keep refreshing until interrupted
    pub watch: bool,

    /// Seconds between refreshes in watch mode
    pub refresh_interval_secs: u64,
}

impl Config {
    /// Per-request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Refresh interval as a `Duration`.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// The textures this run should refresh.
    pub fn selected_textures(&self) -> Vec<TextureKind> {
        if self.textures.is_empty() {
            TextureKind::ALL.to_vec()
        } else {
            self.textures.clone()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            textures: Vec::new(),
            resource_dir: default_app_dir("Resources", "./resources"),
            log_dir: default_app_dir("Logs", "./logs"),
            log_level: LogLevel::Info,
            log_format: LogFormat::Plain,
            timeout_seconds: REQUEST_TIMEOUT_SECS,
            retry_scope: RetryScope::Shared,
            https_only: true,
            extra_pins: Vec::new(),
            watch: false,
            refresh_interval_secs: REFRESH_INTERVAL_SECS,
        }
    }
}

fn default_app_dir(leaf: &str, fallback: &str) -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME).join(leaf))
        .unwrap_or_else(|| PathBuf::from(fallback))
}

/// Command-line options and configuration.
///
/// This struct is automatically generated by `clap` from the field attributes.
/// Every option can also be set through its `EARTH_VIEWER_*` environment variable.
///
/// # Examples
///
/// ```bash
/// # Refresh every overlay once
/// earth_viewer
///
/// # Keep GOES-East fresh, logging as JSON
/// earth_viewer goes-east --watch --log-format json
///
/// # Pin the imagery CDN's current leaf key
/// earth_viewer --pin cdn.star.nesdis.noaa.gov=sha256//0123...
/// ```
#[derive(Debug, Parser)]
#[command(
    name = "earth_viewer",
    about = "Fetches satellite textures for the Earth Viewer globe over pinned HTTPS."
)]
pub struct Opt {
    /// Textures to refresh (default: all)
    #[arg(value_enum)]
    pub textures: Vec<TextureKind>,

    /// Directory holding bundled and persisted textures
    #[arg(long, env = "EARTH_VIEWER_RESOURCE_DIR")]
    pub resource_dir: Option<PathBuf>,

    /// Directory holding the audit log
    #[arg(long, env = "EARTH_VIEWER_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Log level: error|warn|info|debug|trace
    #[arg(long, value_enum, default_value_t = LogLevel::Info, env = "EARTH_VIEWER_LOG_LEVEL")]
    pub log_level: LogLevel,

    /// Log format: plain|json
    #[arg(long, value_enum, default_value_t = LogFormat::Plain, env = "EARTH_VIEWER_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = REQUEST_TIMEOUT_SECS, env = "EARTH_VIEWER_TIMEOUT_SECONDS")]
    pub timeout_seconds: u64,

    /// Retry budget scoping: shared|per-texture
    #[arg(long, value_enum, default_value_t = RetryScope::Shared, env = "EARTH_VIEWER_RETRY_SCOPE")]
    pub retry_scope: RetryScope,

    /// Public-key pin, `domain=sha256//<hex>` (repeatable, comma-separated in the env var)
    #[arg(
        long = "pin",
        value_name = "DOMAIN=PIN",
        env = "EARTH_VIEWER_PINS",
        value_delimiter = ','
    )]
    pub pins: Vec<String>,

    /// Accept plain-HTTP texture URLs (disables pinning for those URLs)
    #[arg(long)]
    pub allow_insecure_http: bool,

    /// Keep refreshing at the refresh interval until interrupted
    #[arg(long)]
    pub watch: bool,

    /// Seconds between refreshes in watch mode
    #[arg(long, default_value_t = REFRESH_INTERVAL_SECS, env = "EARTH_VIEWER_REFRESH_INTERVAL_SECS")]
    pub refresh_interval_secs: u64,
}

impl From<Opt> for Config {
    fn from(opt: Opt) -> Self {
        let defaults = Config::default();
        Self {
            textures: opt.textures,
            resource_dir: opt.resource_dir.unwrap_or(defaults.resource_dir),
            log_dir: opt.log_dir.unwrap_or(defaults.log_dir),
            log_level: opt.log_level,
            log_format: opt.log_format,
            timeout_seconds: opt.timeout_seconds,
            retry_scope: opt.retry_scope,
            https_only: !opt.allow_insecure_http,
            extra_pins: opt.pins,
            watch: opt.watch,
            refresh_interval_secs: opt.refresh_interval_secs,
        }
    }
}
