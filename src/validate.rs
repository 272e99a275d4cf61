//! Size, checksum and image-signature validation.
//!
//! Downloaded and cached texture data passes through here before it is
//! trusted: files above the size ceiling are refused, every accepted body gets
//! a SHA-256 checksum for the audit trail, and the leading bytes must carry a
//! known image signature.

use std::fmt;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::MAX_TEXTURE_SIZE;

/// Validation failures for texture files.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// The file is larger than the allowed ceiling.
    #[error("File too large: {size} bytes (max: {limit} bytes)")]
    SizeExceeded { size: u64, limit: u64 },

    /// The file's size could not be read.
    #[error("Cannot read size of {path:?}: {source}")]
    InvalidFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fails if the file at `path` is larger than 50 MiB or cannot be inspected.
pub fn validate_size(path: &Path) -> Result<u64, ValidationError> {
    validate_size_with_limit(path, MAX_TEXTURE_SIZE)
}

/// Fails if the file at `path` is larger than `limit` bytes or cannot be inspected.
///
/// Returns the file size on success.
pub fn validate_size_with_limit(path: &Path, limit: u64) -> Result<u64, ValidationError> {
    let size = std::fs::metadata(path)
        .map_err(|source| ValidationError::InvalidFile {
            path: path.to_path_buf(),
            source,
        })?
        .len();

    if size > limit {
        return Err(ValidationError::SizeExceeded { size, limit });
    }
    Ok(size)
}

/// Lowercase hex SHA-256 digest of `bytes`.
pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Image encodings accepted as textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const GIF87_MAGIC: &[u8] = b"GIF87a";
const GIF89_MAGIC: &[u8] = b"GIF89a";

/// Detects the image encoding from its leading bytes.
pub fn detect_image_format(bytes: &[u8]) -> Option<ImageFormat> {
    if bytes.starts_with(JPEG_MAGIC) {
        Some(ImageFormat::Jpeg)
    } else if bytes.starts_with(PNG_MAGIC) {
        Some(ImageFormat::Png)
    } else if bytes.starts_with(GIF87_MAGIC) || bytes.starts_with(GIF89_MAGIC) {
        Some(ImageFormat::Gif)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_checksum_known_vectors() {
        assert_eq!(
            checksum(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            checksum(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_checksum_is_lowercase_hex() {
        let digest = checksum(b"earth");
        assert_eq!(digest.len(), 64);
        assert!(digest
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_validate_size_accepts_small_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("small.jpg");
        std::fs::write(&path, vec![0u8; 1024]).expect("Failed to write test file");

        assert_eq!(validate_size(&path).expect("small file should pass"), 1024);
    }

    #[test]
    fn test_validate_size_limit_is_inclusive() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("edge.jpg");
        std::fs::write(&path, vec![0u8; 100]).expect("Failed to write test file");

        assert!(validate_size_with_limit(&path, 100).is_ok());
        match validate_size_with_limit(&path, 99) {
            Err(ValidationError::SizeExceeded { size, limit }) => {
                assert_eq!(size, 100);
                assert_eq!(limit, 99);
            }
            other => panic!("Expected SizeExceeded, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_size_rejects_file_over_50_mib() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("huge.jpg");
        let file = std::fs::File::create(&path).expect("Failed to create test file");
        // Sparse file: no need to write 50 MiB of data
        file.set_len(MAX_TEXTURE_SIZE + 1)
            .expect("Failed to extend test file");
        drop(file);

        assert!(matches!(
            validate_size(&path),
            Err(ValidationError::SizeExceeded { .. })
        ));
    }

    #[test]
    fn test_validate_size_missing_file_is_invalid() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("missing.jpg");

        let error = validate_size(&path).expect_err("missing file should fail");
        assert!(matches!(error, ValidationError::InvalidFile { .. }));
        assert!(error.to_string().contains("missing.jpg"));
    }

    #[test]
    fn test_detect_image_format() {
        assert_eq!(
            detect_image_format(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]),
            Some(ImageFormat::Jpeg)
        );
        let mut png = PNG_MAGIC.to_vec();
        png.extend_from_slice(b"IHDR");
        assert_eq!(detect_image_format(&png), Some(ImageFormat::Png));
        assert_eq!(detect_image_format(b"GIF89a...."), Some(ImageFormat::Gif));
        assert_eq!(detect_image_format(b"GIF87a"), Some(ImageFormat::Gif));
    }

    #[test]
    fn test_detect_image_format_rejects_non_images() {
        assert_eq!(detect_image_format(b""), None);
        assert_eq!(detect_image_format(b"<html>Service Unavailable</html>"), None);
        assert_eq!(detect_image_format(&[0xFF, 0xD8]), None);
        let mut gzip = Vec::new();
        gzip.write_all(&[0x1f, 0x8b, 0x08]).expect("write to vec");
        assert_eq!(detect_image_format(&gzip), None);
    }
}
