//! earth_viewer library: secure texture fetching for the Earth Viewer globe
//!
//! This library downloads the satellite overlays drawn on the globe and keeps
//! the last good copy of each on disk. Every download goes over HTTPS with
//! public-key pinning, is size-capped and validated before it is written
//! atomically, and is retried with exponential backoff. Each step is recorded
//! in a rotating audit log.
//!
//! # Example
//!
//! ```no_run
//! use earth_viewer::{run_refresh, Config, TextureKind};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! earth_viewer::initialization::init_crypto_provider();
//! let config = Config {
//!     textures: vec![TextureKind::GoesEast],
//!     extra_pins: vec!["cdn.star.nesdis.noaa.gov=sha256//<hex>".to_string()],
//!     ..Default::default()
//! };
//!
//! let report = run_refresh(config).await?;
//! println!("{} downloaded, {} served from cache", report.downloaded, report.cached);
//! # Ok(())
//! # }
//! ```
//!
//! Callers that drive their own refresh timer use `TextureFetcher` directly.
//!
//! # Requirements
//!
//! This library requires a Tokio runtime. Use `#[tokio::main]` in your application
//! or ensure you're calling library functions within an async context.

pub mod audit_log;
pub mod config;
pub mod error_handling;
pub mod fetch;
pub mod initialization;
pub mod pinning;
pub mod retry;
pub mod texture;
pub mod validate;

// Re-export public API
pub use audit_log::{AuditLevel, LogEntry, RotationPolicy, SecureLogger};
pub use config::{Config, LogFormat, LogLevel, Opt, RetryScope};
pub use error_handling::{ErrorType, FetchError, FetchStats, InitializationError, OutcomeType};
pub use fetch::{FetchOutcome, TextureFetcher, TextureImage};
pub use pinning::{CertificatePinner, PinnedCertificateSet, PinningRejection};
pub use retry::{RetryPolicy, RetryRegistry, RetryState};
pub use run::{run_refresh, run_refresh_until, RefreshReport, TextureResult};
pub use texture::{TextureDescriptor, TextureKind, TextureSource};

// Refresh driver used by the binary
mod run {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Instant;

    use anyhow::{Context, Result};
    use futures::stream::FuturesUnordered;
    use futures::StreamExt;
    use log::{info, warn};
    use tokio_util::sync::CancellationToken;

    use crate::config::Config;
    use crate::error_handling::{FetchStats, OutcomeType};
    use crate::fetch::{FetchOutcome, TextureFetcher};
    use crate::initialization::init_fetcher;
    use crate::texture::TextureKind;

    /// How one texture resolved in the latest refresh.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct TextureResult {
        pub kind: TextureKind,
        pub outcome: OutcomeType,
        /// File backing the image, if any.
        pub path: Option<PathBuf>,
        /// SHA-256 of the image, if any.
        pub checksum: Option<String>,
    }

    /// Results of a refresh run.
    ///
    /// `textures` describes the last cycle; the counters cover every cycle.
    #[derive(Debug, Clone)]
    pub struct RefreshReport {
        pub textures: Vec<TextureResult>,
        /// Refresh cycles completed
        pub cycles: usize,
        pub downloaded: usize,
        pub cached: usize,
        pub bundled: usize,
        pub unavailable: usize,
        /// Failed attempts across all cycles, retries included
        pub failed_attempts: usize,
        pub elapsed_seconds: f64,
    }

    impl RefreshReport {
        /// Process exit code for this report: 2 when no texture could be
        /// shown at all, 0 otherwise.
        pub fn exit_code(&self) -> i32 {
            let nothing_to_show = !self.textures.is_empty()
                && self
                    .textures
                    .iter()
                    .all(|texture| texture.outcome == OutcomeType::Unavailable);
            if nothing_to_show {
                2
            } else {
                0
            }
        }
    }

    /// Refreshes the configured textures.
    ///
    /// With `config.watch`, keeps refreshing every `config.refresh_interval()`
    /// until Ctrl-C is pressed; an in-flight fetch is then cut short and
    /// resolves from the stored copy.
    ///
    /// # Errors
    ///
    /// Only initialization failures (unwritable directories, malformed pins,
    /// TLS setup) are errors. Failed downloads are reported in the
    /// `RefreshReport` and the audit log.
    pub async fn run_refresh(config: Config) -> Result<RefreshReport> {
        let cancel = CancellationToken::new();
        if config.watch {
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupt received, finishing current refresh");
                    on_signal.cancel();
                }
            });
        }
        run_refresh_until(config, cancel).await
    }

    /// Like `run_refresh`, stopping when `cancel` fires instead of on Ctrl-C.
    pub async fn run_refresh_until(
        config: Config,
        cancel: CancellationToken,
    ) -> Result<RefreshReport> {
        let start_time = Instant::now();
        let stats = Arc::new(FetchStats::new());
        let fetcher = Arc::new(
            init_fetcher(&config, Arc::clone(&stats))
                .context("Failed to initialize texture fetcher")?,
        );
        let kinds = config.selected_textures();

        let mut cycles = 0;
        let textures = loop {
            cycles += 1;
            info!("Refresh {} of {} texture(s)", cycles, kinds.len());
            let textures = refresh_once(&fetcher, &kinds, &cancel).await;

            if !config.watch || cancel.is_cancelled() {
                break textures;
            }
            info!(
                "Next refresh in {}s",
                config.refresh_interval().as_secs()
            );
            tokio::select! {
                _ = cancel.cancelled() => break textures,
                _ = tokio::time::sleep(config.refresh_interval()) => {}
            }
        };

        log_fetch_statistics(&stats);

        Ok(RefreshReport {
            textures,
            cycles,
            downloaded: stats.get_outcome_count(OutcomeType::Downloaded),
            cached: stats.get_outcome_count(OutcomeType::Cached),
            bundled: stats.get_outcome_count(OutcomeType::Bundled),
            unavailable: stats.get_outcome_count(OutcomeType::Unavailable),
            failed_attempts: stats.total_errors(),
            elapsed_seconds: start_time.elapsed().as_secs_f64(),
        })
    }

    async fn refresh_once(
        fetcher: &Arc<TextureFetcher>,
        kinds: &[TextureKind],
        cancel: &CancellationToken,
    ) -> Vec<TextureResult> {
        let mut tasks: FuturesUnordered<_> = kinds
            .iter()
            .map(|&kind| {
                let fetcher = Arc::clone(fetcher);
                let cancel = cancel.clone();
                async move {
                    let outcome = fetcher.fetch_cancellable(&kind.descriptor(), &cancel).await;
                    summarize(kind, outcome)
                }
            })
            .collect();

        let mut results = Vec::with_capacity(kinds.len());
        while let Some(result) = tasks.next().await {
            if result.outcome == OutcomeType::Unavailable {
                warn!("{} is unavailable", result.kind);
            }
            results.push(result);
        }
        results.sort_by_key(|result| result.kind);
        results
    }

    fn summarize(kind: TextureKind, outcome: FetchOutcome) -> TextureResult {
        let outcome_type = outcome.outcome_type();
        let image = outcome.into_image();
        TextureResult {
            kind,
            outcome: outcome_type,
            path: image.as_ref().map(|image| image.path.clone()),
            checksum: image.map(|image| image.checksum),
        }
    }

    fn log_fetch_statistics(stats: &FetchStats) {
        let failures = stats.nonzero_errors();
        if failures.is_empty() {
            return;
        }
        info!("Failed attempts: {}", stats.total_errors());
        for (error_type, count) in failures {
            info!("   {}: {}", error_type, count);
        }
    }
}
