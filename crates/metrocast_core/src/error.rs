//! Error types for metrocast_core.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A configuration value is out of its allowed range or inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The requested learning-rate schedule does not exist.
    #[error("Unknown scheduler type: '{0}' (expected one of: cosine, step, plateau)")]
    UnknownScheduler(String),

    /// The target column is not part of the configured or persisted columns.
    #[error("Target column '{target}' not found in columns: {available:?}")]
    TargetNotFound {
        /// Requested target column.
        target: String,
        /// Columns that were searched.
        available: Vec<String>,
    },

    /// A required file does not exist.
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The YAML document could not be parsed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
