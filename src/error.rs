//! Error Handling Module
//!
//! Defines custom error types for the steelseg library.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for steelseg operations
#[derive(Error, Debug)]
pub enum SteelSegError {
    /// Configuration error (invalid hyperparameter, unknown selector, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error loading or processing an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error saving or restoring a checkpoint record
    #[error("Checkpoint error at '{path}': {reason}")]
    Checkpoint { path: PathBuf, reason: String },

    /// Error with training
    #[error("Training error: {0}")]
    Training(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience Result type for steelseg operations
pub type Result<T> = std::result::Result<T, SteelSegError>;

impl SteelSegError {
    /// Build a checkpoint error from any displayable failure
    pub fn checkpoint(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Checkpoint {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
