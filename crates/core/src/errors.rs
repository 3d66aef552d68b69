//! Error types for the working-copy merge engine.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them for callers that want a single
//! error type. Structural merge outcomes (obstructed, missing, conflicted)
//! are *not* errors; they travel as [`crate::callback::StatusType`] values.

use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    WorkingCopy(#[from] WcError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CoreError {
    /// `true` when the operation stopped because cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Merge(MergeError::Cancelled))
    }

    /// `true` for checksum mismatches on incoming content.
    pub fn is_checksum_mismatch(&self) -> bool {
        matches!(self, Self::Merge(MergeError::ChecksumMismatch { .. }))
    }
}

// ---------------------------------------------------------------------------
// Merge errors
// ---------------------------------------------------------------------------

/// Errors from the line sequencer, the three-way merger and text merges.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Reading or writing line data failed.
    #[error("merge I/O error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// Incoming content does not match its advertised checksum.
    #[error("checksum mismatch for '{}': expected {expected}, actual {actual}", path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// A conflict marker is unusable (e.g. contains a line break).
    #[error("invalid conflict marker: {0}")]
    InvalidMarker(String),
}

impl MergeError {
    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Working-copy errors
// ---------------------------------------------------------------------------

/// Errors from working-copy collaborators (admin state, log replay, files).
#[derive(Debug, Error)]
pub enum WcError {
    /// File system failure on a working-copy path.
    #[error("working copy I/O error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The path has no versioned entry.
    #[error("'{0}' is not under version control")]
    NotVersioned(String),

    /// The path was expected to be a versioned directory.
    #[error("'{0}' is not a working copy directory")]
    NotADirectory(String),

    /// An unexpected node occupies the path.
    #[error("'{0}' is obstructed")]
    Obstructed(String),

    /// A work log item could not be replayed.
    #[error("failed to run work log item '{item}': {detail}")]
    LogReplay { item: String, detail: String },

    /// The work log could not be (de)serialized.
    #[error("work log serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WcError {
    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors related to loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// The configuration file could not be read.
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// TOML parse error.
    #[error("failed to parse config: {0}")]
    ParseError(String),

    /// A configuration value is invalid.
    #[error("invalid config value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },
}
