/*============================================================
  Synavera Project: Syn-Patch
  Module: synpatch_core::logger
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1
  ------------------------------------------------------------
  Purpose:
    Provide structured, append-only logging utilities for
    Syn-Patch-Core and the `PatchLog` seam through which the
    patch core reports diagnostics.

  Security / Safety Notes:
    Field values are written as supplied; callers pass package
    names and image references only.

  Dependencies:
    std::fs::File, std::sync::Mutex, sha2 for integrity hashing.

  Operational Scope:
    The CLI builds a `Logger`; library callers may inject any
    `PatchLog`, including `NullLog` and the capturing
    `MemoryLog` used by tests.

  Revision History:
    2025-11-12 COD  Added structured fields and PatchLog seam.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Append-only logging with UTC timestamps
    - Deterministic formatting for auditability
    - Graceful error propagation on I/O failures
============================================================*/

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use crate::error::{PatchError, Result};

/// Ordered `key=value` pairs attached to a log entry.
pub type Fields<'a> = &'a [(&'a str, String)];

/// Structured log level for Syn-Patch-Core events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Debug => "DEBUG",
        }
    }
}

/// Diagnostics sink injected into the patch core.
pub trait PatchLog: Send + Sync {
    fn debug(&self, code: &str, message: &str, fields: Fields<'_>);
    fn warn(&self, code: &str, message: &str, fields: Fields<'_>);
}

/// Discards every entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLog;

impl PatchLog for NullLog {
    fn debug(&self, _code: &str, _message: &str, _fields: Fields<'_>) {}
    fn warn(&self, _code: &str, _message: &str, _fields: Fields<'_>) {}
}

/// A captured log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedEntry {
    pub level: LogLevel,
    pub code: String,
    pub line: String,
}

/// Keeps entries in memory so callers can inspect what the core reported.
#[derive(Debug, Default)]
pub struct MemoryLog {
    entries: Mutex<Vec<CapturedEntry>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<CapturedEntry> {
        self.entries
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Entries recorded at the given level.
    pub fn at(&self, level: LogLevel) -> Vec<CapturedEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.level == level)
            .collect()
    }

    fn push(&self, level: LogLevel, code: &str, message: &str, fields: Fields<'_>) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.push(CapturedEntry {
                level,
                code: code.to_string(),
                line: render_message(message, fields),
            });
        }
    }
}

impl PatchLog for MemoryLog {
    fn debug(&self, code: &str, message: &str, fields: Fields<'_>) {
        self.push(LogLevel::Debug, code, message, fields);
    }

    fn warn(&self, code: &str, message: &str, fields: Fields<'_>) {
        self.push(LogLevel::Warn, code, message, fields);
    }
}

/// Shared logger that emits append-only entries in Synavera format.
pub struct Logger {
    file: Option<Mutex<BufWriter<File>>>,
    path: Option<PathBuf>,
    verbose: bool,
}

impl Logger {
    /// Build a logger that writes to stderr and optionally to a file.
    pub fn new(path: Option<PathBuf>, verbose: bool) -> Result<Self> {
        let file = if let Some(ref file_path) = path {
            if let Some(parent) = file_path.parent() {
                std::fs::create_dir_all(parent).map_err(|err| {
                    PatchError::Filesystem(format!(
                        "Failed to create log directory {}: {err}",
                        parent.display()
                    ))
                })?;
            }

            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(file_path)
                .map_err(|err| {
                    PatchError::Filesystem(format!(
                        "Failed to open log file {}: {err}",
                        file_path.display()
                    ))
                })?;
            Some(Mutex::new(BufWriter::new(file)))
        } else {
            None
        };

        Ok(Self {
            file,
            path,
            verbose,
        })
    }

    /// Emit a log entry with the given level, code, message, and fields.
    pub fn log_fields(&self, level: LogLevel, code: &str, message: &str, fields: Fields<'_>) {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let payload = format!(
            "{timestamp} [{}] [{}] {}",
            level.as_str(),
            code,
            render_message(message, fields)
        );

        if self.verbose || level == LogLevel::Error || level == LogLevel::Warn {
            eprintln!("{payload}");
        }

        if let Some(file) = &self.file {
            if let Ok(mut guard) = file.lock() {
                if writeln!(guard, "{payload}").is_err() {
                    eprintln!(
                        "{} [{}] [{}] {}",
                        timestamp,
                        LogLevel::Error.as_str(),
                        "LOGGER",
                        "Failed to write to log file"
                    );
                }
                if guard.flush().is_err() {
                    eprintln!(
                        "{} [{}] [{}] {}",
                        timestamp,
                        LogLevel::Warn.as_str(),
                        "LOGGER",
                        "Failed to flush log writer"
                    );
                }
            }
        }
    }

    /// Emit a log entry without fields.
    pub fn log<S: AsRef<str>>(&self, level: LogLevel, code: &str, message: S) {
        self.log_fields(level, code, message.as_ref(), &[]);
    }

    /// Convenience wrapper for `INFO` level events.
    pub fn info<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Info, code, message);
    }

    /// Convenience wrapper for `ERROR` level events.
    pub fn error<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Error, code, message);
    }

    /// Return the path backing this logger, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Compute and persist SHA-256 digest of the log file.
    pub fn finalize(&self) -> Result<()> {
        if let Some(path) = self.path() {
            let data = std::fs::read(path).map_err(|err| {
                PatchError::Filesystem(format!(
                    "Failed to read log for hashing {}: {err}",
                    path.display()
                ))
            })?;
            let mut hasher = Sha256::new();
            hasher.update(&data);
            let digest = hasher.finalize();
            let hash_path = hash_path_for(path);
            let mut file = File::create(&hash_path).map_err(|err| {
                PatchError::Filesystem(format!(
                    "Failed to create hash file {}: {err}",
                    hash_path.display()
                ))
            })?;
            writeln!(
                file,
                "{:x}  {}",
                digest,
                path.file_name().unwrap_or_default().to_string_lossy()
            )
            .map_err(|err| {
                PatchError::Filesystem(format!(
                    "Failed to write hash file {}: {err}",
                    hash_path.display()
                ))
            })?;
        }
        Ok(())
    }
}

impl PatchLog for Logger {
    fn debug(&self, code: &str, message: &str, fields: Fields<'_>) {
        self.log_fields(LogLevel::Debug, code, message, fields);
    }

    fn warn(&self, code: &str, message: &str, fields: Fields<'_>) {
        self.log_fields(LogLevel::Warn, code, message, fields);
    }
}

fn hash_path_for(path: &Path) -> PathBuf {
    let mut hash_os = path.as_os_str().to_os_string();
    hash_os.push(".hash");
    PathBuf::from(hash_os)
}

fn render_message(message: &str, fields: Fields<'_>) -> String {
    let mut rendered = message.to_string();
    for (key, value) in fields {
        rendered.push(' ');
        rendered.push_str(key);
        rendered.push('=');
        rendered.push_str(value);
    }
    rendered
}
