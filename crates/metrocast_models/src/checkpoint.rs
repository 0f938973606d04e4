//! Model checkpointing and serialization utilities.
//!
//! A checkpoint is a set of files in one directory sharing a tag prefix:
//!
//! - `<tag>_model.mpk`: named MessagePack model record
//! - `<tag>_optim.mpk`: optimizer record
//! - `<tag>_model.json`: [`CheckpointMetadata`] (epoch, validation loss, configs)
//!
//! # Example
//!
//! ```rust,ignore
//! use metrocast_models::checkpoint::{load_excelformer, CheckpointTag};
//!
//! let (model, meta) = load_excelformer::<NdArray>("models", CheckpointTag::Best, &device)?;
//! println!("best epoch {} (val loss {:?})", meta.epoch, meta.val_loss);
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Record, Recorder};
use metrocast_core::Config as RunConfig;
use serde::{Deserialize, Serialize};

use crate::excelformer::{ExcelFormer, ExcelFormerConfig};

/// Which checkpoint of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointTag {
    /// Lowest validation loss seen so far.
    Best,
    /// State at the end of training.
    Final,
}

impl CheckpointTag {
    /// File-name prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Best => "best",
            Self::Final => "final",
        }
    }
}

impl fmt::Display for CheckpointTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointTag {
    type Err = CheckpointError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "best" => Ok(Self::Best),
            "final" => Ok(Self::Final),
            other => Err(CheckpointError::InvalidFormat(format!(
                "unknown checkpoint tag '{other}' (expected 'best' or 'final')"
            ))),
        }
    }
}

/// File locations of one tagged checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointPaths {
    dir: PathBuf,
    tag: CheckpointTag,
}

impl CheckpointPaths {
    /// Paths for `tag` inside `dir`.
    pub fn new(dir: impl Into<PathBuf>, tag: CheckpointTag) -> Self {
        Self {
            dir: dir.into(),
            tag,
        }
    }

    /// Checkpoint directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Checkpoint tag.
    pub fn tag(&self) -> CheckpointTag {
        self.tag
    }

    /// `<tag>_model.mpk`.
    pub fn model(&self) -> PathBuf {
        self.dir.join(format!("{}_model.mpk", self.tag))
    }

    /// `<tag>_optim.mpk`.
    pub fn optimizer(&self) -> PathBuf {
        self.dir.join(format!("{}_optim.mpk", self.tag))
    }

    /// `<tag>_model.json`.
    pub fn metadata(&self) -> PathBuf {
        self.dir.join(format!("{}_model.json", self.tag))
    }

    /// Whether the model record and metadata are both present.
    pub fn exists(&self) -> bool {
        self.model().is_file() && self.metadata().is_file()
    }
}

/// Save any record to a named MessagePack file.
pub fn save_record<B, R>(record: R, path: impl AsRef<Path>) -> Result<()>
where
    B: Backend,
    R: Record<B>,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CheckpointError::Save(e.to_string()))?;
    }
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
        .record(record, path.to_path_buf())
        .map_err(|e| CheckpointError::Save(e.to_string()))
}

/// Load a record saved with [`save_record`].
pub fn load_saved_record<B, R>(path: impl AsRef<Path>, device: &B::Device) -> Result<R>
where
    B: Backend,
    R: Record<B>,
{
    let path = path.as_ref();
    if !path.is_file() {
        return Err(CheckpointError::NotFound(path.to_path_buf()));
    }
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
        .load(path.to_path_buf(), device)
        .map_err(|e| CheckpointError::Load(e.to_string()))
}

/// Save a model's parameters.
pub fn save_model<B, M>(model: &M, path: impl AsRef<Path>) -> Result<()>
where
    B: Backend,
    M: Module<B>,
{
    save_record::<B, _>(model.clone().into_record(), path)
}

/// Load a model record for a module of type `M`.
pub fn load_record<B, M>(path: impl AsRef<Path>, device: &B::Device) -> Result<M::Record>
where
    B: Backend,
    M: Module<B>,
{
    load_saved_record::<B, M::Record>(path, device)
}

/// Model checkpoint metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Checkpoint tag.
    pub tag: CheckpointTag,
    /// 1-based epoch the parameters come from.
    pub epoch: usize,
    /// Validation loss at that epoch (normalized MSE); `None` when the
    /// loss was not finite.
    pub val_loss: Option<f64>,
    /// Architecture needed to rebuild the model.
    pub model_config: ExcelFormerConfig,
    /// Full run configuration, if known.
    #[serde(default)]
    pub run_config: Option<RunConfig>,
}

impl CheckpointMetadata {
    /// Create metadata for a model state.
    ///
    /// A NaN or infinite `val_loss` is stored as `None`.
    pub fn new(tag: CheckpointTag, epoch: usize, val_loss: f64, model_config: ExcelFormerConfig) -> Self {
        Self {
            tag,
            epoch,
            val_loss: val_loss.is_finite().then_some(val_loss),
            model_config,
            run_config: None,
        }
    }

    /// Attach the run configuration.
    #[must_use]
    pub fn with_run_config(mut self, config: RunConfig) -> Self {
        self.run_config = Some(config);
        self
    }

    /// Save metadata to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CheckpointError::Save(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| CheckpointError::Save(e.to_string()))?;
        Ok(())
    }

    /// Load metadata from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(CheckpointError::NotFound(path.to_path_buf()));
        }
        let json =
            std::fs::read_to_string(path).map_err(|e| CheckpointError::Load(e.to_string()))?;
        serde_json::from_str(&json).map_err(|e| CheckpointError::InvalidFormat(e.to_string()))
    }
}

/// Write the model record and metadata of a tagged checkpoint.
///
/// The optimizer record is written separately by the caller, which owns the
/// optimizer type.
pub fn save_excelformer<B: Backend>(
    model: &ExcelFormer<B>,
    metadata: &CheckpointMetadata,
    dir: impl AsRef<Path>,
) -> Result<CheckpointPaths> {
    let paths = CheckpointPaths::new(dir.as_ref(), metadata.tag);
    save_model::<B, _>(model, paths.model())?;
    metadata.save(paths.metadata())?;
    tracing::debug!(
        tag = %metadata.tag,
        epoch = metadata.epoch,
        path = %paths.model().display(),
        "Checkpoint written"
    );
    Ok(paths)
}

/// Rebuild an [`ExcelFormer`] from a tagged checkpoint in `dir`.
pub fn load_excelformer<B: Backend>(
    dir: impl AsRef<Path>,
    tag: CheckpointTag,
    device: &B::Device,
) -> crate::error::Result<(ExcelFormer<B>, CheckpointMetadata)> {
    let paths = CheckpointPaths::new(dir.as_ref(), tag);
    let metadata = CheckpointMetadata::load(paths.metadata())?;
    let record = load_record::<B, ExcelFormer<B>>(paths.model(), device)?;
    let model = metadata.model_config.init::<B>(device)?.load_record(record);
    tracing::info!(
        tag = %tag,
        epoch = metadata.epoch,
        val_loss = ?metadata.val_loss,
        "Loaded checkpoint"
    );
    Ok((model, metadata))
}

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Checkpoint-related errors.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Error saving checkpoint.
    #[error("Failed to save checkpoint: {0}")]
    Save(String),

    /// Error loading checkpoint.
    #[error("Failed to load checkpoint: {0}")]
    Load(String),

    /// A checkpoint file is missing.
    #[error("Checkpoint file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid format.
    #[error("Invalid checkpoint format: {0}")]
    InvalidFormat(String),
}
