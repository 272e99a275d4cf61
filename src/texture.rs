//! Texture catalogue.
//!
//! The globe knows exactly three textures. Each kind maps to where its imagery
//! comes from, the file it is persisted to under the resource directory, and a
//! human-readable update cadence. The mapping is an exhaustive `match`, so
//! adding a kind without describing it fails to compile.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;

use crate::config::MAX_TEXTURE_SIZE;

/// Host serving the GOES GeoColor imagery.
pub const GOES_IMAGERY_HOST: &str = "cdn.star.nesdis.noaa.gov";

/// The textures the globe can display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum)]
pub enum TextureKind {
    /// Base layer shipped with the application. Never fetched remotely.
    BlueMarble,
    /// GOES-East full-disk GeoColor overlay.
    GoesEast,
    /// GOES-West full-disk GeoColor overlay.
    GoesWest,
}

impl TextureKind {
    /// Every texture kind, base layer first.
    pub const ALL: [TextureKind; 3] = [
        TextureKind::BlueMarble,
        TextureKind::GoesEast,
        TextureKind::GoesWest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TextureKind::BlueMarble => "blue-marble",
            TextureKind::GoesEast => "goes-east",
            TextureKind::GoesWest => "goes-west",
        }
    }

    /// Returns the catalogue entry for this texture.
    pub fn descriptor(&self) -> TextureDescriptor {
        let (source, local_filename, update_frequency) = match self {
            TextureKind::BlueMarble => (TextureSource::Bundled, "earth_base.jpg", "Static"),
            TextureKind::GoesEast => (
                TextureSource::Remote(format!(
                    "https://{GOES_IMAGERY_HOST}/GOES19/ABI/FD/GEOCOLOR/1808x1808.jpg"
                )),
                "goes_east.jpg",
                "Every 10 minutes",
            ),
            TextureKind::GoesWest => (
                TextureSource::Remote(format!(
                    "https://{GOES_IMAGERY_HOST}/GOES18/ABI/FD/GEOCOLOR/1808x1808.jpg"
                )),
                "goes_west.jpg",
                "Every 10 minutes",
            ),
        };

        TextureDescriptor {
            kind: *self,
            source,
            local_filename: local_filename.to_string(),
            update_frequency: update_frequency.to_string(),
            max_bytes: MAX_TEXTURE_SIZE,
            expected_checksum: None,
        }
    }
}

impl fmt::Display for TextureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TextureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TextureKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown texture: {s}"))
    }
}

/// Where a texture's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureSource {
    /// Read from the resource directory; no network access.
    Bundled,
    /// Downloaded from this URL over pinned HTTPS.
    Remote(String),
}

/// Everything the fetcher needs to refresh one texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub kind: TextureKind,
    pub source: TextureSource,
    /// File name under the resource directory.
    pub local_filename: String,
    pub update_frequency: String,
    /// Size ceiling for downloaded bodies.
    pub max_bytes: u64,
    /// Lowercase hex SHA-256 the body must match. `None` for live imagery.
    pub expected_checksum: Option<String>,
}

impl TextureDescriptor {
    /// Builds a remote descriptor with default limits.
    pub fn remote(kind: TextureKind, url: impl Into<String>, local_filename: impl Into<String>) -> Self {
        Self {
            kind,
            source: TextureSource::Remote(url.into()),
            local_filename: local_filename.into(),
            update_frequency: kind.descriptor().update_frequency,
            max_bytes: MAX_TEXTURE_SIZE,
            expected_checksum: None,
        }
    }

    /// The source URL, if this texture is fetched remotely.
    pub fn source_url(&self) -> Option<&str> {
        match &self.source {
            TextureSource::Remote(url) => Some(url.as_str()),
            TextureSource::Bundled => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_layer_is_bundled() {
        let descriptor = TextureKind::BlueMarble.descriptor();
        assert_eq!(descriptor.source, TextureSource::Bundled);
        assert_eq!(descriptor.source_url(), None);
        assert_eq!(descriptor.local_filename, "earth_base.jpg");
    }

    #[test]
    fn test_overlays_are_remote_https() {
        for kind in [TextureKind::GoesEast, TextureKind::GoesWest] {
            let descriptor = kind.descriptor();
            let url = descriptor.source_url().expect("overlay should be remote");
            assert!(url.starts_with("https://cdn.star.nesdis.noaa.gov/"), "{url}");
            assert_eq!(descriptor.max_bytes, MAX_TEXTURE_SIZE);
            assert!(descriptor.expected_checksum.is_none());
        }
    }

    #[test]
    fn test_local_filenames_are_distinct() {
        let mut names: Vec<String> = TextureKind::ALL
            .iter()
            .map(|kind| kind.descriptor().local_filename)
            .collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), TextureKind::ALL.len());
    }

    #[test]
    fn test_texture_kind_round_trips_through_str() {
        for kind in TextureKind::ALL {
            assert_eq!(kind.to_string().parse::<TextureKind>(), Ok(kind));
        }
        assert_eq!("GOES-EAST".parse::<TextureKind>(), Ok(TextureKind::GoesEast));
        assert!("moon".parse::<TextureKind>().is_err());
    }
}
