//! # metrocast_train
//!
//! Training orchestration for the MetroCast forecaster.
//!
//! This crate provides:
//! - [`Trainer`] running the epoch loop with AdamW, global gradient-norm clipping and
//!   per-epoch learning rate schedules
//! - [`EarlyStopping`] and [`CheckpointPolicy`] for epoch-boundary decisions
//! - [`RegressionMetrics`] in normalized and physical units
//! - [`evaluate`] and [`predict`] for gradient-free passes
//! - [`ExecutionContext`] for explicit device selection
//!
//! ## Example
//!
//! ```rust,ignore
//! use metrocast_train::{train_from_config, DefaultAutodiffBackend, ExecutionContext};
//!
//! let ctx = ExecutionContext::<DefaultAutodiffBackend>::detect();
//! let output = train_from_config(&config, ctx)?;
//! println!("best epoch: {:?}", output.report.best_epoch);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod callback;
pub mod clip;
pub mod device;
pub mod error;
pub mod evaluation;
pub mod metrics;
pub mod scheduler;
pub mod trainer;

pub use callback::{CheckpointPolicy, EarlyStopping};
pub use clip::{clip_grad_norm, grad_norm};
pub use device::{DefaultAutodiffBackend, DefaultBackend, DeviceKind, ExecutionContext};
pub use error::{Result, TrainError};
pub use evaluation::{evaluate, predict, predict_window, Evaluation, Predictions};
pub use metrics::{MetricAccumulator, RegressionMetrics};
pub use scheduler::{build_scheduler, CosineAnnealingLR, ReduceLROnPlateau, Scheduler, StepLR};
pub use trainer::{
    evaluate_split, train_from_config, EpochRecord, Trainer, TrainerConfig, TrainingOutput,
    TrainingReport, HISTORY_FILE,
};
