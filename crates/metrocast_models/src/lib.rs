//! # metrocast_models
//!
//! The ExcelFormer forecaster and its checkpoint I/O.
//!
//! - [`ExcelFormer`] maps a `(batch, seq_len, F)` history window (continuous
//!   columns followed by a weather-code column) to a `(batch, pred_len, 1)`
//!   forecast
//! - [`checkpoint`] saves and restores tagged (`best`/`final`) checkpoints

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod error;
pub mod excelformer;

pub use checkpoint::{
    load_excelformer, load_record, load_saved_record, save_excelformer, save_model, save_record,
    CheckpointError, CheckpointMetadata, CheckpointPaths, CheckpointTag,
};
pub use error::{ModelError, Result};
pub use excelformer::{
    AttentionOutput, EncoderBlock, ExcelFormer, ExcelFormerConfig, ExcelFormerOutput,
    MultiHeadSelfAttention,
};
