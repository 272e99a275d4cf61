//! Per-fetch bookkeeping.

use std::fmt;
use std::path::Path;

use crate::error_handling::FetchError;
use crate::texture::{TextureDescriptor, TextureKind, TextureSource};

/// Where a fetch is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    Requesting,
    Validating,
    Persisted,
    Failed,
    Retrying,
    Exhausted,
    FallbackLookup,
}

impl FetchState {
    /// Whether the fetcher may move from `self` to `next`.
    pub fn can_transition_to(self, next: FetchState) -> bool {
        use FetchState::*;
        matches!(
            (self, next),
            (Idle, Requesting)
                | (Requesting, Validating)
                | (Requesting, Failed)
                | (Validating, Persisted)
                | (Validating, Failed)
                | (Failed, Retrying)
                | (Failed, Exhausted)
                | (Failed, FallbackLookup)
                | (Retrying, Requesting)
                | (Retrying, FallbackLookup)
                | (Exhausted, FallbackLookup)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FetchState::Idle => "idle",
            FetchState::Requesting => "requesting",
            FetchState::Validating => "validating",
            FetchState::Persisted => "persisted",
            FetchState::Failed => "failed",
            FetchState::Retrying => "retrying",
            FetchState::Exhausted => "exhausted",
            FetchState::FallbackLookup => "fallback-lookup",
        }
    }
}

impl fmt::Display for FetchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a fetch resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Pending,
    Success,
    Failure,
    FallbackUsed,
}

/// One remote fetch of one texture, from first request to resolution.
#[derive(Debug, Clone)]
pub struct DownloadRecord {
    pub kind: TextureKind,
    pub source_url: String,
    pub local_filename: String,
    pub max_bytes: u64,
    pub expected_checksum: Option<String>,
    pub status: DownloadStatus,
    state: FetchState,
    requests: u32,
}

impl DownloadRecord {
    /// Starts a record for a remote descriptor.
    ///
    /// Fails with `InvalidDescriptor` if the URL is blank, or if the file name
    /// is blank or is not a bare file name.
    pub fn from_descriptor(descriptor: &TextureDescriptor) -> Result<Self, FetchError> {
        let url = match &descriptor.source {
            TextureSource::Remote(url) if !url.trim().is_empty() => url.trim().to_string(),
            TextureSource::Remote(_) => {
                return Err(FetchError::InvalidDescriptor(format!(
                    "{}: empty source URL",
                    descriptor.kind
                )))
            }
            TextureSource::Bundled => {
                return Err(FetchError::InvalidDescriptor(format!(
                    "{}: bundled textures are not downloaded",
                    descriptor.kind
                )))
            }
        };
        validate_local_filename(descriptor)?;

        Ok(Self {
            kind: descriptor.kind,
            source_url: url,
            local_filename: descriptor.local_filename.clone(),
            max_bytes: descriptor.max_bytes,
            expected_checksum: descriptor
                .expected_checksum
                .as_ref()
                .map(|c| c.to_ascii_lowercase()),
            status: DownloadStatus::Pending,
            state: FetchState::Idle,
            requests: 0,
        })
    }

    pub fn state(&self) -> FetchState {
        self.state
    }

    /// HTTP requests issued so far.
    pub fn requests(&self) -> u32 {
        self.requests
    }

    pub(crate) fn transition(&mut self, next: FetchState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal fetch transition {} -> {}",
            self.state,
            next
        );
        log::debug!("{}: {} -> {}", self.kind, self.state, next);
        if next == FetchState::Requesting {
            self.requests += 1;
        }
        self.state = next;
    }
}

/// The file name must name a file directly inside the resource directory.
pub(crate) fn validate_local_filename(descriptor: &TextureDescriptor) -> Result<(), FetchError> {
    let name = descriptor.local_filename.as_str();
    let is_bare = !name.trim().is_empty()
        && Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name);
    if is_bare {
        Ok(())
    } else {
        Err(FetchError::InvalidDescriptor(format!(
            "{}: invalid local file name '{}'",
            descriptor.kind, name
        )))
    }
}
