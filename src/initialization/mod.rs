//! Application initialization and resource setup.
//!
//! Builds the shared services a refresh needs, in dependency order:
//! - the audit log (needed by the pinner and the fetcher)
//! - the pin set and certificate pinner
//! - the pinned HTTP client
//! - the retry registry and the texture fetcher itself
//!
//! All initialization functions return `InitializationError` on failure.

mod client;
mod logger;

use std::sync::Arc;

use rustls::crypto::{ring::default_provider, CryptoProvider};

use crate::audit_log::SecureLogger;
use crate::config::Config;
use crate::error_handling::{FetchStats, InitializationError};
use crate::fetch::TextureFetcher;
use crate::pinning::{CertificatePinner, PinnedCertificateSet};
use crate::retry::RetryRegistry;

// Re-export public API
pub use client::{init_client, pinned_tls_config, redirect_policy};
pub use logger::init_logger_with;

/// Installs `ring` as the process-wide rustls crypto provider.
///
/// Must run before any TLS connection is made.
pub fn init_crypto_provider() {
    // Reinstalling is harmless; the error only reports an existing provider.
    let _ = CryptoProvider::install_default(default_provider());
}

/// Opens the audit log under `config.log_dir`, creating the directory.
pub fn init_audit_log(config: &Config) -> Result<Arc<SecureLogger>, InitializationError> {
    std::fs::create_dir_all(&config.log_dir)?;
    Ok(Arc::new(SecureLogger::in_dir(&config.log_dir)))
}

/// The built-in pins plus `config.extra_pins`.
pub fn init_pins(config: &Config) -> Result<PinnedCertificateSet, InitializationError> {
    let mut pins = PinnedCertificateSet::builtin();
    pins.extend_from_entries(&config.extra_pins)
        .map_err(|e| InitializationError::InvalidPinError(e.to_string()))?;

    for kind in config.selected_textures() {
        let host = kind
            .descriptor()
            .source_url()
            .and_then(|url| reqwest::Url::parse(url).ok())
            .and_then(|url| url.host_str().map(str::to_string));
        if let Some(host) = host {
            if !pins.contains_domain(&host) {
                log::warn!(
                    "No certificate pins configured for {host}; {kind} downloads will be refused \
                     (add --pin {host}=sha256//<hex>)"
                );
            }
        }
    }
    Ok(pins)
}

/// Builds a fetcher wired to the pinned client, audit log and retry registry
/// described by `config`.
pub fn init_fetcher(
    config: &Config,
    stats: Arc<FetchStats>,
) -> Result<TextureFetcher, InitializationError> {
    let audit = init_audit_log(config)?;
    let pinner = Arc::new(CertificatePinner::new(init_pins(config)?, Arc::clone(&audit))?);
    let client = init_client(config, Arc::clone(&pinner))?;
    std::fs::create_dir_all(&config.resource_dir)?;

    Ok(TextureFetcher::new(
        client,
        config.resource_dir.clone(),
        Arc::new(RetryRegistry::new(config.retry_scope)),
        audit,
    )
    .with_pinner(pinner)
    .with_stats(stats))
}
