//! Error types for training.

use metrocast_core::Split;
use thiserror::Error;

/// Result type alias for training operations.
pub type Result<T> = std::result::Result<T, TrainError>;

/// Errors that can occur during training or evaluation.
#[derive(Error, Debug)]
pub enum TrainError {
    /// Trainer settings are inconsistent.
    #[error("Invalid training configuration: {0}")]
    InvalidConfig(String),

    /// The data holds weather codes the embedding cannot index.
    #[error(
        "{split} split contains weather code {max_code}, but the embedding only has {num_codes} entries"
    )]
    CategoryOutOfRange {
        /// Offending split.
        split: Split,
        /// Largest code found.
        max_code: usize,
        /// Embedding vocabulary size.
        num_codes: usize,
    },

    /// Every batch of an epoch produced a non-finite loss.
    #[error("Epoch {epoch}: all {batches} training batches produced a non-finite loss")]
    NonFiniteLoss {
        /// 1-based epoch.
        epoch: usize,
        /// Batches seen.
        batches: usize,
    },

    /// Data error.
    #[error("Data error: {0}")]
    Data(#[from] metrocast_data::DataError),

    /// Model construction or restore error.
    #[error("Model error: {0}")]
    Model(#[from] metrocast_models::ModelError),

    /// Checkpoint error.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] metrocast_models::CheckpointError),

    /// Core error.
    #[error("Core error: {0}")]
    Core(#[from] metrocast_core::CoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
