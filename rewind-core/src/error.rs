/*!
Error types for the rewind core engine.
*/

use std::path::PathBuf;
use thiserror::Error;

/// Result type used throughout the rewind core.
pub type Result<T> = std::result::Result<T, RewindError>;

/// Errors that can occur while recording mutations or rolling them back.
#[derive(Error, Debug)]
pub enum RewindError {
    /// I/O errors during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backup store read/write failure
    #[error("Backup error: {0}")]
    Backup(String),

    /// Journal open/append failure
    #[error("Journal error: {0}")]
    Journal(String),

    /// Interior journal corruption or an incompatible header.
    ///
    /// A truncated final record is not corruption; the reader discards it
    /// with a warning instead of returning this variant.
    #[error("Corrupt journal: {0}")]
    CorruptJournal(String),

    /// `record_modify` was called for a path that does not exist
    #[error("Cannot record modification of missing file: {0}")]
    TargetMissing(PathBuf),

    /// Backup bytes do not match the pre-image hash recorded in the journal
    #[error("Integrity check failed: expected hash {expected}, got {actual}")]
    IntegrityCheckFailed { expected: String, actual: String },

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

impl RewindError {
    /// Create a new backup store error
    pub fn backup<S: Into<String>>(msg: S) -> Self {
        Self::Backup(msg.into())
    }

    /// Create a new journal error
    pub fn journal<S: Into<String>>(msg: S) -> Self {
        Self::Journal(msg.into())
    }

    /// Create a new corrupt-journal error
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        Self::CorruptJournal(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }
}
