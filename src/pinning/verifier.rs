//! Certificate pinning on top of standard WebPKI validation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, OtherError, RootCertStore, SignatureScheme};
use thiserror::Error;

use super::extract::{spki_pin, subject};
use super::pins::PinnedCertificateSet;
use crate::audit_log::SecureLogger;
use crate::error_handling::InitializationError;

/// Why the pinner refused a server.
///
/// Messages name the domain and the failed check only; key material and
/// observed hashes are never included.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PinningRejection {
    #[error("standard certificate validation failed: {0}")]
    ChainInvalid(String),

    #[error("server presented no certificates")]
    NoCertificates,

    #[error("could not extract the leaf public key")]
    KeyExtraction,

    #[error("no pins configured for {0}")]
    UnpinnedDomain(String),

    #[error("leaf public key does not match any pin for {0}")]
    PinMismatch(String),
}

/// Decides whether a presented chain is both trusted and pinned.
///
/// Standard validation (chain, expiry, hostname) runs first through rustls'
/// WebPKI verifier; only then is the leaf's SubjectPublicKeyInfo hash looked
/// up in the pin set. Every rejection is written to the audit log and kept as
/// the latest rejection for the host, stamped with a sequence number so a
/// caller can tell whether it happened after a given `mark`.
#[derive(Debug)]
pub struct CertificatePinner {
    pins: PinnedCertificateSet,
    webpki: Arc<WebPkiServerVerifier>,
    provider: Arc<CryptoProvider>,
    audit: Arc<SecureLogger>,
    sequence: AtomicU64,
    rejections: Mutex<HashMap<String, (u64, PinningRejection)>>,
}

impl CertificatePinner {
    /// Pinner trusting the Mozilla root program (`webpki-roots`).
    pub fn new(
        pins: PinnedCertificateSet,
        audit: Arc<SecureLogger>,
    ) -> Result<Self, InitializationError> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Self::with_roots(pins, roots, audit)
    }

    /// Pinner trusting only `roots`.
    pub fn with_roots(
        pins: PinnedCertificateSet,
        roots: RootCertStore,
        audit: Arc<SecureLogger>,
    ) -> Result<Self, InitializationError> {
        let provider = Arc::new(ring::default_provider());
        let webpki =
            WebPkiServerVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider))
                .build()
                .map_err(|e| InitializationError::VerifierError(e.to_string()))?;

        Ok(Self {
            pins,
            webpki,
            provider,
            audit,
            sequence: AtomicU64::new(0),
            rejections: Mutex::new(HashMap::new()),
        })
    }

    pub fn pins(&self) -> &PinnedCertificateSet {
        &self.pins
    }

    pub(crate) fn provider(&self) -> Arc<CryptoProvider> {
        Arc::clone(&self.provider)
    }

    /// `true` only if `chain` passes standard validation for `domain` and its
    /// leaf key is pinned for `domain`.
    pub fn verify(&self, chain: &[CertificateDer<'_>], domain: &str, now: UnixTime) -> bool {
        self.check(chain, domain, now).is_ok()
    }

    /// Like `verify`, reporting the reason on rejection.
    pub fn check(
        &self,
        chain: &[CertificateDer<'_>],
        domain: &str,
        now: UnixTime,
    ) -> Result<(), PinningRejection> {
        let domain = domain.trim_end_matches('.').to_ascii_lowercase();
        match self.evaluate(chain, &domain, now) {
            Ok(()) => {
                log::debug!("Certificate pin accepted for {domain}");
                Ok(())
            }
            Err(rejection) => {
                self.audit
                    .error(&format!("Certificate pinning rejected {domain}: {rejection}"));
                let stamp = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
                self.lock_rejections()
                    .insert(domain, (stamp, rejection.clone()));
                Err(rejection)
            }
        }
    }

    /// Current position in the rejection sequence. Take it before a request
    /// and pass it to `rejection_since` afterwards.
    pub fn mark(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// The latest rejection for `domain`, if it was recorded after `mark`.
    ///
    /// Lookups do not consume the record, so concurrent requests to the same
    /// host each see a rejection that happened during their own request.
    pub fn rejection_since(&self, domain: &str, mark: u64) -> Option<PinningRejection> {
        self.lock_rejections()
            .get(&domain.trim_end_matches('.').to_ascii_lowercase())
            .filter(|(stamp, _)| *stamp > mark)
            .map(|(_, rejection)| rejection.clone())
    }

    fn evaluate(
        &self,
        chain: &[CertificateDer<'_>],
        domain: &str,
        now: UnixTime,
    ) -> Result<(), PinningRejection> {
        let (leaf, intermediates) = chain.split_first().ok_or(PinningRejection::NoCertificates)?;

        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|e| PinningRejection::ChainInvalid(e.to_string()))?;
        self.webpki
            .verify_server_cert(leaf, intermediates, &server_name, &[], now)
            .map_err(|e| PinningRejection::ChainInvalid(e.to_string()))?;

        // Unknown domains are refused outright, whatever the key.
        if !self.pins.contains_domain(domain) {
            return Err(PinningRejection::UnpinnedDomain(domain.to_string()));
        }

        let pin = spki_pin(leaf.as_ref()).ok_or(PinningRejection::KeyExtraction)?;
        if !self.pins.is_pinned(domain, &pin) {
            log::debug!(
                "Unpinned leaf for {domain}: {}",
                subject(leaf.as_ref()).unwrap_or_default()
            );
            return Err(PinningRejection::PinMismatch(domain.to_string()));
        }
        Ok(())
    }

    fn lock_rejections(&self) -> MutexGuard<'_, HashMap<String, (u64, PinningRejection)>> {
        self.rejections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// rustls hook that routes every server certificate through a
/// `CertificatePinner`. Handshake signatures are checked by the inner WebPKI
/// verifier as usual.
#[derive(Debug)]
pub struct PinningVerifier {
    pinner: Arc<CertificatePinner>,
}

impl PinningVerifier {
    pub fn new(pinner: Arc<CertificatePinner>) -> Self {
        Self { pinner }
    }
}

impl ServerCertVerifier for PinningVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let chain: Vec<CertificateDer<'_>> = std::iter::once(end_entity.clone())
            .chain(intermediates.iter().cloned())
            .collect();

        self.pinner
            .check(&chain, &server_name.to_str(), now)
            .map(|()| ServerCertVerified::assertion())
            .map_err(|rejection| {
                rustls::Error::InvalidCertificate(CertificateError::Other(OtherError(Arc::new(
                    rejection,
                ))))
            })
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.pinner.webpki.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.pinner.webpki.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.pinner.webpki.supported_verify_schemes()
    }
}
