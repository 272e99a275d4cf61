//! Size-based rotation of the audit log.
//!
//! Rotated generations sit next to the active file with a numeric suffix:
//! `earth-viewer.log.1` is the most recent, `earth-viewer.log.<N>` the oldest.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::{LOG_RETAINED_GENERATIONS, LOG_ROTATION_BYTES};

/// When to rotate and how many generations to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Rotate before a write once the active file is larger than this.
    pub max_bytes: u64,
    /// Rotated files kept in addition to the active one.
    pub generations: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: LOG_ROTATION_BYTES,
            generations: LOG_RETAINED_GENERATIONS,
        }
    }
}

impl RotationPolicy {
    pub fn should_rotate(&self, current_size: u64) -> bool {
        current_size > self.max_bytes
    }
}

/// Path of rotated generation `n` (1-based) for `active`.
pub fn generation_path(active: &Path, n: usize) -> PathBuf {
    let mut name = OsString::from(active.as_os_str());
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

/// Shifts every generation up by one and moves the active file to `.1`.
///
/// The oldest generation is deleted first, so at most `generations` rotated
/// files exist afterwards. A missing active file is not an error.
pub fn rotate(active: &Path, generations: usize) -> io::Result<()> {
    if generations == 0 {
        return remove_if_exists(active);
    }

    remove_if_exists(&generation_path(active, generations))?;
    for n in (1..generations).rev() {
        let from = generation_path(active, n);
        if from.exists() {
            std::fs::rename(&from, generation_path(active, n + 1))?;
        }
    }

    match std::fs::rename(active, generation_path(active, 1)) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Rotated generations currently on disk, newest first.
pub fn existing_generations(active: &Path) -> Vec<PathBuf> {
    // Scan a little past the retention limit so leftovers from a larger
    // previous limit are still reported.
    (1..=LOG_RETAINED_GENERATIONS * 2)
        .map(|n| generation_path(active, n))
        .filter(|path| path.exists())
        .collect()
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generation_path_appends_suffix() {
        let active = Path::new("/var/log/earth-viewer.log");
        assert_eq!(
            generation_path(active, 3),
            PathBuf::from("/var/log/earth-viewer.log.3")
        );
    }

    #[test]
    fn test_should_rotate_is_strictly_greater() {
        let policy = RotationPolicy {
            max_bytes: 100,
            generations: 5,
        };
        assert!(!policy.should_rotate(100));
        assert!(policy.should_rotate(101));
    }

    #[test]
    fn test_rotate_shifts_generations() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let active = temp_dir.path().join("audit.log");
        std::fs::write(&active, "current").expect("write active");
        std::fs::write(generation_path(&active, 1), "one").expect("write gen 1");
        std::fs::write(generation_path(&active, 2), "two").expect("write gen 2");

        rotate(&active, 5).expect("rotation should succeed");

        assert!(!active.exists());
        assert_eq!(
            std::fs::read_to_string(generation_path(&active, 1)).expect("read gen 1"),
            "current"
        );
        assert_eq!(
            std::fs::read_to_string(generation_path(&active, 2)).expect("read gen 2"),
            "one"
        );
        assert_eq!(
            std::fs::read_to_string(generation_path(&active, 3)).expect("read gen 3"),
            "two"
        );
    }

    #[test]
    fn test_rotate_discards_oldest_generation() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let active = temp_dir.path().join("audit.log");
        std::fs::write(&active, "current").expect("write active");
        for n in 1..=5 {
            std::fs::write(generation_path(&active, n), format!("gen{n}")).expect("write gen");
        }

        rotate(&active, 5).expect("rotation should succeed");

        assert_eq!(existing_generations(&active).len(), 5);
        assert!(!generation_path(&active, 6).exists());
        assert_eq!(
            std::fs::read_to_string(generation_path(&active, 5)).expect("read gen 5"),
            "gen4"
        );
    }

    #[test]
    fn test_rotate_without_active_file_is_ok() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let active = temp_dir.path().join("audit.log");
        assert!(rotate(&active, 5).is_ok());
        assert!(existing_generations(&active).is_empty());
    }

    #[test]
    fn test_rotate_with_zero_generations_truncates() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let active = temp_dir.path().join("audit.log");
        std::fs::write(&active, "current").expect("write active");

        rotate(&active, 0).expect("rotation should succeed");
        assert!(!active.exists());
        assert!(existing_generations(&active).is_empty());
    }
}
