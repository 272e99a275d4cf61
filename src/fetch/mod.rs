//! Texture fetching.
//!
//! `TextureFetcher::fetch` refreshes one texture:
//!
//! 1. Bundled textures are read from the resource directory and returned.
//! 2. Remote textures are downloaded over the pinned client, with the body
//!    capped at the descriptor's size ceiling.
//! 3. A body is accepted only if it matches the expected checksum (when one
//!    is configured) and carries an image signature. It is then written
//!    atomically over the previous copy and the retry policy is reset.
//! 4. Any failure is audited and the retry policy decides whether to wait and
//!    try again. Once it refuses, or the fetch is cancelled, the last
//!    persisted copy is served instead, if there is a valid one.
//!
//! Failures never reach the caller as errors: `fetch` always resolves to a
//! `FetchOutcome`, and the audit log holds the details.

mod persist;
mod record;
mod request;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::audit_log::SecureLogger;
use crate::error_handling::{update_error_stats, FetchError, FetchStats, OutcomeType};
use crate::pinning::CertificatePinner;
use crate::retry::RetryRegistry;
use crate::texture::{TextureDescriptor, TextureKind, TextureSource};
use crate::validate::{checksum, detect_image_format, ImageFormat};

use persist::{load_stored, persist_atomically, StoredTexture, StoredTextureError};
use record::validate_local_filename;

pub use record::{DownloadRecord, DownloadStatus, FetchState};

/// Validated image data handed to the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureImage {
    pub bytes: Vec<u8>,
    /// Where the bytes live on disk.
    pub path: PathBuf,
    pub format: ImageFormat,
    /// Lowercase hex SHA-256 of `bytes`.
    pub checksum: String,
}

impl From<StoredTexture> for TextureImage {
    fn from(stored: StoredTexture) -> Self {
        let checksum = checksum(&stored.bytes);
        Self {
            bytes: stored.bytes,
            path: stored.path,
            format: stored.format,
            checksum,
        }
    }
}

/// How a fetch resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Fresh imagery, now persisted.
    Downloaded(TextureImage),
    /// The live fetch failed; this is the last persisted copy.
    Cached(TextureImage),
    /// The texture ships with the application.
    Bundled(TextureImage),
    /// Neither a fresh nor a stored copy is available.
    Unavailable,
}

impl FetchOutcome {
    pub fn image(&self) -> Option<&TextureImage> {
        match self {
            FetchOutcome::Downloaded(image)
            | FetchOutcome::Cached(image)
            | FetchOutcome::Bundled(image) => Some(image),
            FetchOutcome::Unavailable => None,
        }
    }

    pub fn into_image(self) -> Option<TextureImage> {
        match self {
            FetchOutcome::Downloaded(image)
            | FetchOutcome::Cached(image)
            | FetchOutcome::Bundled(image) => Some(image),
            FetchOutcome::Unavailable => None,
        }
    }

    pub fn outcome_type(&self) -> OutcomeType {
        match self {
            FetchOutcome::Downloaded(_) => OutcomeType::Downloaded,
            FetchOutcome::Cached(_) => OutcomeType::Cached,
            FetchOutcome::Bundled(_) => OutcomeType::Bundled,
            FetchOutcome::Unavailable => OutcomeType::Unavailable,
        }
    }
}

/// Downloads, validates and persists textures.
///
/// Cheap to share behind an `Arc`; concurrent fetches of different textures
/// are fine. The retry registry, audit log and statistics are injected so
/// several fetchers (or tests) can share or isolate them.
#[derive(Debug)]
pub struct TextureFetcher {
    client: reqwest::Client,
    resource_dir: PathBuf,
    retries: Arc<RetryRegistry>,
    audit: Arc<SecureLogger>,
    pinner: Option<Arc<CertificatePinner>>,
    stats: Arc<FetchStats>,
}

impl TextureFetcher {
    pub fn new(
        client: reqwest::Client,
        resource_dir: impl Into<PathBuf>,
        retries: Arc<RetryRegistry>,
        audit: Arc<SecureLogger>,
    ) -> Self {
        Self {
            client,
            resource_dir: resource_dir.into(),
            retries,
            audit,
            pinner: None,
            stats: Arc::new(FetchStats::new()),
        }
    }

    /// Attributes connection failures to pin rejections recorded by `pinner`.
    pub fn with_pinner(mut self, pinner: Arc<CertificatePinner>) -> Self {
        self.pinner = Some(pinner);
        self
    }

    pub fn with_stats(mut self, stats: Arc<FetchStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn resource_dir(&self) -> &Path {
        &self.resource_dir
    }

    pub fn retries(&self) -> &RetryRegistry {
        &self.retries
    }

    pub fn stats(&self) -> &FetchStats {
        &self.stats
    }

    /// Refreshes the catalogue entry for `kind`.
    pub async fn fetch_kind(&self, kind: TextureKind) -> FetchOutcome {
        self.fetch(&kind.descriptor()).await
    }

    pub async fn fetch(&self, descriptor: &TextureDescriptor) -> FetchOutcome {
        self.fetch_cancellable(descriptor, &CancellationToken::new())
            .await
    }

    /// Like `fetch`, but gives up on the live download as soon as `cancel`
    /// fires and goes straight to the stored copy.
    pub async fn fetch_cancellable(
        &self,
        descriptor: &TextureDescriptor,
        cancel: &CancellationToken,
    ) -> FetchOutcome {
        if descriptor.source == TextureSource::Bundled {
            return self.load_bundled(descriptor).await;
        }

        let mut record = match DownloadRecord::from_descriptor(descriptor) {
            Ok(record) => record,
            Err(error) => {
                self.report_failure(descriptor.kind, &error);
                return self.fallback(descriptor).await;
            }
        };

        let outcome = self.download_with_retries(&mut record, cancel).await;
        let outcome = match outcome {
            Some(image) => FetchOutcome::Downloaded(image),
            None => {
                record.transition(FetchState::FallbackLookup);
                self.fallback(descriptor).await
            }
        };

        record.status = match outcome {
            FetchOutcome::Downloaded(_) => DownloadStatus::Success,
            FetchOutcome::Cached(_) => DownloadStatus::FallbackUsed,
            _ => DownloadStatus::Failure,
        };
        log::debug!(
            "{}: resolved as {:?} after {} request(s)",
            record.kind,
            record.status,
            record.requests()
        );
        outcome
    }

    async fn download_with_retries(
        &self,
        record: &mut DownloadRecord,
        cancel: &CancellationToken,
    ) -> Option<TextureImage> {
        let policy = self.retries.policy_for(record.kind);

        loop {
            record.transition(FetchState::Requesting);
            self.audit
                .info(&format!("Requesting {} from {}", record.kind, record.source_url));

            let attempt = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(FetchError::Cancelled),
                result = self.attempt(record) => result,
            };

            let error = match attempt {
                Ok(image) => {
                    record.transition(FetchState::Persisted);
                    policy.reset();
                    self.stats.increment_outcome(OutcomeType::Downloaded);
                    self.audit.info(&format!(
                        "Persisted {} to {:?} ({} bytes)",
                        record.kind,
                        image.path,
                        image.bytes.len()
                    ));
                    return Some(image);
                }
                Err(error) => error,
            };

            record.transition(FetchState::Failed);
            self.report_failure(record.kind, &error);
            if !error.is_retryable() {
                return None;
            }

            let Some(delay) = policy.should_retry() else {
                record.transition(FetchState::Exhausted);
                self.audit.error(&format!(
                    "Retries exhausted for {} after {} request(s)",
                    record.kind,
                    record.requests()
                ));
                return None;
            };

            record.transition(FetchState::Retrying);
            let granted = policy.state().attempt_count;
            self.audit.info(&format!(
                "Retrying {} in {:?} (retry {}/{})",
                record.kind,
                delay,
                granted,
                policy.max_attempts()
            ));

            let cancelled = tokio::select! {
                biased;
                _ = cancel.cancelled() => true,
                _ = tokio::time::sleep(delay) => false,
            };
            if cancelled {
                self.report_failure(record.kind, &FetchError::Cancelled);
                return None;
            }
        }
    }

    /// One request: download, validate, persist.
    async fn attempt(&self, record: &mut DownloadRecord) -> Result<TextureImage, FetchError> {
        let bytes = self.download(record).await?;
        record.transition(FetchState::Validating);

        let digest = checksum(&bytes);
        self.audit.info(&format!(
            "Downloaded {}: {} bytes, sha256 {}",
            record.kind,
            bytes.len(),
            digest
        ));

        if let Some(expected) = &record.expected_checksum {
            if *expected != digest {
                return Err(FetchError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual: digest,
                });
            }
        }
        let format = detect_image_format(&bytes).ok_or(FetchError::InvalidImage)?;

        let (path, bytes) =
            persist_atomically(&self.resource_dir, &record.local_filename, bytes).await?;
        Ok(TextureImage {
            bytes,
            path,
            format,
            checksum: digest,
        })
    }

    async fn download(&self, record: &DownloadRecord) -> Result<Vec<u8>, FetchError> {
        let host = reqwest::Url::parse(&record.source_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string));

        // Only rejections recorded during this request are attributed to it.
        let mark = self.pinner.as_ref().map(|pinner| pinner.mark()).unwrap_or(0);

        match request::download_with_limit(&self.client, &record.source_url, record.max_bytes)
            .await
        {
            Err(FetchError::Network { url, source }) => {
                let rejection = self
                    .pinner
                    .as_ref()
                    .zip(host.as_ref())
                    .and_then(|(pinner, host)| pinner.rejection_since(host, mark));
                match (rejection, host) {
                    (Some(reason), Some(domain)) => {
                        Err(FetchError::PinningRejected { domain, reason })
                    }
                    _ => Err(FetchError::Network { url, source }),
                }
            }
            other => other,
        }
    }

    async fn load_bundled(&self, descriptor: &TextureDescriptor) -> FetchOutcome {
        if let Err(error) = validate_local_filename(descriptor) {
            self.report_failure(descriptor.kind, &error);
            return self.unavailable();
        }

        match load_stored(
            &self.resource_dir,
            &descriptor.local_filename,
            descriptor.max_bytes,
        )
        .await
        {
            Ok(stored) => {
                let image = TextureImage::from(stored);
                self.audit.info(&format!(
                    "Loaded bundled {} from {:?}",
                    descriptor.kind, image.path
                ));
                self.stats.increment_outcome(OutcomeType::Bundled);
                FetchOutcome::Bundled(image)
            }
            Err(StoredTextureError::Missing) => {
                self.audit.fault(&format!(
                    "Bundled texture {} is missing from {:?}",
                    descriptor.kind, self.resource_dir
                ));
                self.unavailable()
            }
            Err(StoredTextureError::Rejected(reason)) => {
                self.audit.fault(&format!(
                    "Bundled texture {} rejected: {}",
                    descriptor.kind, reason
                ));
                self.unavailable()
            }
        }
    }

    async fn fallback(&self, descriptor: &TextureDescriptor) -> FetchOutcome {
        if validate_local_filename(descriptor).is_err() {
            return self.unavailable();
        }

        match load_stored(
            &self.resource_dir,
            &descriptor.local_filename,
            descriptor.max_bytes,
        )
        .await
        {
            Ok(stored) => {
                let image = TextureImage::from(stored);
                self.audit.info(&format!(
                    "Serving last persisted {} from {:?} (sha256 {})",
                    descriptor.kind, image.path, image.checksum
                ));
                self.stats.increment_outcome(OutcomeType::Cached);
                FetchOutcome::Cached(image)
            }
            Err(StoredTextureError::Missing) => {
                self.audit.error(&format!(
                    "No persisted copy of {}; texture unavailable",
                    descriptor.kind
                ));
                self.unavailable()
            }
            Err(StoredTextureError::Rejected(reason)) => {
                self.audit.error(&format!(
                    "Persisted copy of {} rejected: {}",
                    descriptor.kind, reason
                ));
                self.unavailable()
            }
        }
    }

    fn unavailable(&self) -> FetchOutcome {
        self.stats.increment_outcome(OutcomeType::Unavailable);
        FetchOutcome::Unavailable
    }

    fn report_failure(&self, kind: TextureKind, error: &FetchError) {
        update_error_stats(&self.stats, error);
        let message = format!("{kind}: {error}");
        match error {
            FetchError::Persistence { .. } => self.audit.fault(&message),
            _ => self.audit.error(&message),
        }
    }
}
