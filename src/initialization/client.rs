//! HTTP client initialization.
//!
//! The client's TLS stack is a rustls configuration whose only certificate
//! verifier is the pinning verifier, so every HTTPS connection the fetcher
//! makes is pinned. There is no fallback to the default verifier.

use std::sync::Arc;
use std::time::Duration;

use reqwest::redirect::{Attempt, Policy};
use reqwest::{ClientBuilder, Url};

use crate::config::{Config, CONNECT_TIMEOUT_SECS, MAX_REDIRECTS, USER_AGENT};
use crate::error_handling::InitializationError;
use crate::pinning::{CertificatePinner, PinningVerifier};

/// Builds the texture download client.
///
/// Sends `User-Agent: Earth-Viewer/1.0`, bounds each request by the configured
/// timeout, and refuses plain-HTTP URLs unless `config.https_only` is off.
/// Redirects go through `redirect_policy`.
pub fn init_client(
    config: &Config,
    pinner: Arc<CertificatePinner>,
) -> Result<reqwest::Client, InitializationError> {
    let client = ClientBuilder::new()
        .use_preconfigured_tls(pinned_tls_config(pinner)?)
        .user_agent(USER_AGENT)
        .timeout(config.request_timeout())
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .https_only(config.https_only)
        .redirect(redirect_policy())
        .build()?;
    Ok(client)
}

/// Follows up to `MAX_REDIRECTS` hops and never from HTTPS down to HTTP.
///
/// The downgrade check holds even when `https_only` is off: a texture that
/// was requested over TLS is never fetched in the clear.
pub fn redirect_policy() -> Policy {
    Policy::custom(|attempt: Attempt<'_>| {
        if attempt.previous().len() > MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        let downgrade = attempt
            .previous()
            .last()
            .is_some_and(|from| is_scheme_downgrade(from, attempt.url()));
        if downgrade {
            let message = format!("refusing redirect from HTTPS to {}", attempt.url());
            log::warn!("{message}");
            return attempt.error(message);
        }
        attempt.follow()
    })
}

fn is_scheme_downgrade(from: &Url, to: &Url) -> bool {
    from.scheme() == "https" && to.scheme() != "https"
}

/// rustls client configuration that verifies servers through `pinner`.
pub fn pinned_tls_config(
    pinner: Arc<CertificatePinner>,
) -> Result<rustls::ClientConfig, InitializationError> {
    let mut tls = rustls::ClientConfig::builder_with_provider(pinner.provider())
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(PinningVerifier::new(pinner)))
        .with_no_client_auth();
    tls.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(tls)
}
