//! On-disk texture storage: atomic replace and last-known-good lookup.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error_handling::FetchError;
use crate::validate::{detect_image_format, validate_size_with_limit, ImageFormat};

/// Atomically replaces `dir/file_name` with `bytes`.
///
/// The bytes go to a temporary file in the same directory, are synced, and
/// the temporary file is then renamed over the target. Readers see either the
/// old file or the new one, never a partial write. The bytes are handed back
/// together with the final path.
pub(crate) async fn persist_atomically(
    dir: &Path,
    file_name: &str,
    bytes: Vec<u8>,
) -> Result<(PathBuf, Vec<u8>), FetchError> {
    let dir = dir.to_path_buf();
    let target = dir.join(file_name);
    let task_target = target.clone();

    let bytes = tokio::task::spawn_blocking(move || {
        write_replace(&dir, &task_target, &bytes).map(|()| bytes)
    })
    .await
    .map_err(|join_error| FetchError::Persistence {
        path: target.clone(),
        source: std::io::Error::other(join_error),
    })?
    .map_err(|source| FetchError::Persistence {
        path: target.clone(),
        source,
    })?;

    Ok((target, bytes))
}

fn write_replace(dir: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// A texture file that passed validation.
#[derive(Debug)]
pub(crate) struct StoredTexture {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

/// Why a stored texture could not be served.
#[derive(Debug)]
pub(crate) enum StoredTextureError {
    Missing,
    Rejected(String),
}

/// Loads `dir/file_name` if it exists, is within `max_bytes` and carries an
/// image signature.
pub(crate) async fn load_stored(
    dir: &Path,
    file_name: &str,
    max_bytes: u64,
) -> Result<StoredTexture, StoredTextureError> {
    let path = dir.join(file_name);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(StoredTextureError::Missing);
    }

    validate_size_with_limit(&path, max_bytes)
        .map_err(|e| StoredTextureError::Rejected(e.to_string()))?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| StoredTextureError::Rejected(format!("Cannot read {path:?}: {e}")))?;
    let format = detect_image_format(&bytes).ok_or_else(|| {
        StoredTextureError::Rejected(format!("{path:?} is not a supported image"))
    })?;

    Ok(StoredTexture {
        path,
        bytes,
        format,
    })
}
