//! Append-only audit log with size-based rotation.
//!
//! Every security-relevant event of a fetch (requests, rejections, checksums,
//! fallbacks) is appended to a file as
//! `[<timestamp>] [<LEVEL>] <message>`. The logger owns the file handle and
//! serializes append + rotation behind a mutex, so concurrent fetches never
//! interleave partial lines.
//!
//! Logging never fails from the caller's point of view: filesystem errors are
//! reported through the `log` facade and then dropped.
//!
//! Writes are synchronous because the logger is also called from inside the
//! rustls certificate verifier, which cannot await. On a multi-threaded Tokio
//! runtime each write runs under `block_in_place`, so the worker's other
//! tasks move to another thread while the file is appended or rotated.

mod rotation;

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::runtime::{Handle, RuntimeFlavor};

pub use rotation::{existing_generations, generation_path, RotationPolicy};

use crate::config::AUDIT_LOG_FILE_NAME;

/// `log` target used when mirroring audit entries to the diagnostic logger.
pub const AUDIT_TARGET: &str = "earth_viewer::audit";

/// Severity of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AuditLevel {
    Info,
    Error,
    Fault,
}

impl AuditLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditLevel::Info => "INFO",
            AuditLevel::Error => "ERROR",
            AuditLevel::Fault => "FAULT",
        }
    }
}

impl fmt::Display for AuditLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: AuditLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: AuditLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }

    /// The entry as written to disk, newline included.
    pub fn format_line(&self) -> String {
        // Embedded newlines would let one entry masquerade as several.
        let message = self.message.replace(['\r', '\n'], " ");
        format!(
            "[{}] [{}] {}\n",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.level,
            message
        )
    }
}

/// Thread-safe audit log sink.
#[derive(Debug)]
pub struct SecureLogger {
    path: PathBuf,
    policy: RotationPolicy,
    file: Mutex<Option<File>>,
}

impl SecureLogger {
    /// Audit log named `earth-viewer.log` inside `dir`, default rotation policy.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(AUDIT_LOG_FILE_NAME))
    }

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_policy(path, RotationPolicy::default())
    }

    pub fn with_policy(path: impl Into<PathBuf>, policy: RotationPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
            file: Mutex::new(None),
        }
    }

    /// Path of the active log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> RotationPolicy {
        self.policy
    }

    /// Appends `message` at `level`, rotating first if the file is too large.
    pub fn log(&self, message: &str, level: AuditLevel) {
        let entry = LogEntry::new(level, message);
        mirror(&entry);

        blocking_io(|| {
            let mut handle = self.lock();
            if let Err(e) = self.append(&mut handle, &entry) {
                // Drop the handle so the next write reopens the file from scratch.
                *handle = None;
                log::warn!(
                    target: AUDIT_TARGET,
                    "Audit log write to {:?} failed: {}",
                    self.path,
                    e
                );
            }
        });
    }

    pub fn info(&self, message: &str) {
        self.log(message, AuditLevel::Info);
    }

    pub fn error(&self, message: &str) {
        self.log(message, AuditLevel::Error);
    }

    pub fn fault(&self, message: &str) {
        self.log(message, AuditLevel::Fault);
    }

    fn append(&self, handle: &mut Option<File>, entry: &LogEntry) -> io::Result<()> {
        let current_size = match std::fs::metadata(&self.path) {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // Removed underneath us: the cached handle points at an unlinked file.
                *handle = None;
                0
            }
            Err(e) => return Err(e),
        };

        if self.policy.should_rotate(current_size) {
            *handle = None;
            rotation::rotate(&self.path, self.policy.generations)?;
        }

        let file = match handle.take() {
            Some(file) => file,
            None => self.open()?,
        };
        let file = handle.insert(file);
        file.write_all(entry.format_line().as_bytes())?;
        file.flush()
    }

    fn open(&self) -> io::Result<File> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        OpenOptions::new().create(true).append(true).open(&self.path)
    }

    fn lock(&self) -> MutexGuard<'_, Option<File>> {
        self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Runs `f` with `block_in_place` on multi-threaded runtimes and inline
/// everywhere else, where `block_in_place` would panic.
fn blocking_io<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

fn mirror(entry: &LogEntry) {
    match entry.level {
        AuditLevel::Info => log::info!(target: AUDIT_TARGET, "{}", entry.message),
        AuditLevel::Error => log::error!(target: AUDIT_TARGET, "{}", entry.message),
        AuditLevel::Fault => log::error!(target: AUDIT_TARGET, "[FAULT] {}", entry.message),
    }
}
