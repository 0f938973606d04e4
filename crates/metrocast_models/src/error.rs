//! Error types for metrocast_models.

use thiserror::Error;

use crate::checkpoint::CheckpointError;

/// Result type alias using [`ModelError`].
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised while building or restoring a model.
#[derive(Error, Debug)]
pub enum ModelError {
    /// Hyperparameters are inconsistent.
    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),

    /// Checkpoint I/O failed.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}
