/*============================================================
  Synavera Project: Syn-Patch
  Module: synpatch_core::error
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Centralise Syn-Patch-Core error types so every stage of a
    patch run (reduce, plan, execute, compose, validate) reports
    failures with package-identifying context.

  Security / Safety Notes:
    Captured executor diagnostics are surfaced verbatim; they
    originate from the tooling container, never from secrets.

  Dependencies:
    thiserror for ergonomic error definitions.

  Operational Scope:
    Used across modules to propagate failures and consolidate
    exit codes for the binary entry point.

  Revision History:
    2025-11-12 COD  Established patch error taxonomy.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Explicit error taxonomy with actionable context
    - No silent failure paths
    - Stable exit codes for operational tooling
============================================================*/

use std::io;
use std::process::ExitCode;

use thiserror::Error;

/// Result alias for Syn-Patch-Core operations.
pub type Result<T> = std::result::Result<T, PatchError>;

/// Enumerates high-level error domains surfaced by Syn-Patch-Core.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("Image manifest is nil")]
    NilManifest,
    #[error("Package `{package}` carries malformed version `{version}`")]
    MalformedVersion { package: String, version: String },
    #[error("Package name `{package}` contains characters outside the allowed set")]
    InvalidPackageName { package: String },
    #[error("RPM database not found at {path}")]
    NoDatabaseFound { path: String },
    #[error("Command `{command}` failed with status {status}: {diagnostics}")]
    ExecutionFailure {
        command: String,
        status: i32,
        diagnostics: String,
    },
    #[error("Failed to extract {path} from executed state: {reason}")]
    ExtractionFailure { path: String, reason: String },
    #[error("Packages below requested version: {}", packages.join(", "))]
    VersionShortfall { packages: Vec<String> },
    #[error("Installed manifest line {line}: {reason}")]
    ManifestRecord { line: usize, reason: String },
    #[error("Failed to resolve image `{image}`: {reason}")]
    Resolution { image: String, reason: String },
    #[error("Patch run cancelled")]
    Cancelled,
    #[error("Configuration: {0}")]
    Config(String),
    #[error("Serialization: {0}")]
    Serialization(String),
    #[error("Filesystem: {0}")]
    Filesystem(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl PatchError {
    /// Map error category to a deterministic exit code.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            PatchError::NilManifest => ExitCode::from(10),
            PatchError::MalformedVersion { .. } => ExitCode::from(11),
            PatchError::InvalidPackageName { .. } => ExitCode::from(12),
            PatchError::ManifestRecord { .. } => ExitCode::from(13),
            PatchError::NoDatabaseFound { .. } => ExitCode::from(20),
            PatchError::ExecutionFailure { .. } => ExitCode::from(21),
            PatchError::ExtractionFailure { .. } => ExitCode::from(22),
            PatchError::Resolution { .. } => ExitCode::from(23),
            PatchError::VersionShortfall { .. } => ExitCode::from(30),
            PatchError::Cancelled => ExitCode::from(31),
            PatchError::Config(_) => ExitCode::from(40),
            PatchError::Serialization(_) => ExitCode::from(41),
            PatchError::Filesystem(_) => ExitCode::from(42),
            PatchError::Io(_) => ExitCode::from(43),
        }
    }
}
