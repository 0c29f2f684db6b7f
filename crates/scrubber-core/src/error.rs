//! Error types for the Scrubber pipeline.
//!
//! Errors are split by concern. `PipelineError` is always scoped to a single
//! submitted item: the batch never fails because one file did, so every
//! pipeline error ends up as a failed slot in the batch report.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for Scrubber operations.
#[derive(Error, Debug)]
pub enum ScrubError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline processing errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Per-item pipeline failures.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// No transform is registered for the file extension
    #[error("Unsupported file type for {path}: {extension}")]
    UnsupportedType { path: PathBuf, extension: String },

    /// The source could not be decoded or re-encoded
    #[error("Decode error for {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// The external transcoder failed or produced no usable output
    #[error("Transcode failed for {path}: {message}")]
    Transcode { path: PathBuf, message: String },

    /// Filesystem read, write or mkdir failure
    #[error("IO error for {path}: {message}")]
    Io { path: PathBuf, message: String },

    /// Two transforms raced for the same content hash
    #[error("Dedup cache race for content {hash}")]
    CacheRace { hash: String },

    /// Operation timed out
    #[error("Timeout in {stage} stage for {path} after {timeout_ms}ms")]
    Timeout {
        path: PathBuf,
        stage: String,
        timeout_ms: u64,
    },

    /// File exceeds size limit
    #[error("File too large: {path} ({size_mb}MB > {max_mb}MB)")]
    FileTooLarge {
        path: PathBuf,
        size_mb: u64,
        max_mb: u64,
    },

    /// The batch was cancelled before this item finished
    #[error("Cancelled before {path} was processed")]
    Cancelled { path: PathBuf },

    /// The worker running this item terminated abnormally
    #[error("Worker for {path} terminated abnormally: {message}")]
    WorkerPanic { path: PathBuf, message: String },
}

impl PipelineError {
    /// Wrap an `std::io::Error` with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Classify this error for the batch report.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::UnsupportedType { .. } => FailureKind::UnsupportedType,
            Self::Decode { .. } => FailureKind::DecodeFailure,
            Self::Transcode { .. } => FailureKind::TranscodeFailure,
            Self::Io { .. } => FailureKind::IoFailure,
            Self::CacheRace { .. } => FailureKind::CacheRace,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::FileTooLarge { .. } => FailureKind::TooLarge,
            Self::Cancelled { .. } => FailureKind::Cancelled,
            Self::WorkerPanic { .. } => FailureKind::Internal,
        }
    }
}

/// Serializable failure classification carried by failed report items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnsupportedType,
    DecodeFailure,
    TranscodeFailure,
    IoFailure,
    CacheRace,
    Timeout,
    TooLarge,
    Cancelled,
    Internal,
}

/// Convenience type alias for Scrubber results.
pub type Result<T> = std::result::Result<T, ScrubError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
