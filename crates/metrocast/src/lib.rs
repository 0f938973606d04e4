//! # metrocast
//!
//! Hourly 2 m temperature forecasting in Rust.
//!
//! MetroCast reads an hourly weather table, normalizes it with statistics fit
//! on the training prefix only, and trains an ExcelFormer (a post-norm
//! self-attention encoder with a learned weather-code embedding) to forecast
//! the next `pred_len` hours from the previous `seq_len` hours.
//!
//! - **Core**: run configuration, seeds, and split names
//! - **Data**: CSV ingestion, time features, statistics, windows, and batching
//! - **Models**: ExcelFormer and checkpoint persistence
//! - **Training**: the epoch loop, schedulers, early stopping, and metrics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use metrocast::prelude::*;
//!
//! let config = Config::from_file("config/config.yaml")?;
//! let ctx = ExecutionContext::<DefaultAutodiffBackend>::detect();
//! let output = train_from_config(&config, ctx)?;
//! println!("test MAE: {:.3} °C", output.report.test.mae_celsius);
//! ```
//!
//! ## Feature Flags
//!
//! - `backend-wgpu`: train and evaluate on the GPU through WGPU instead of
//!   the default ndarray CPU backend

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub use metrocast_core as core;
pub use metrocast_data as data;
pub use metrocast_models as models;
pub use metrocast_train as train;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use metrocast::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use metrocast_core::{Config, SchedulerKind, Seed, Split, SplitRatio};

    // Data
    pub use metrocast_data::{
        DatasetOptions, SplitDatasets, Statistics, TargetScaler, WeatherTable, WindowLoader,
        WindowedDataset,
    };

    // Models
    pub use metrocast_models::{
        load_excelformer, save_excelformer, CheckpointMetadata, CheckpointTag, ExcelFormer,
        ExcelFormerConfig,
    };

    // Training
    pub use metrocast_train::{
        evaluate, evaluate_split, predict, predict_window, train_from_config,
        DefaultAutodiffBackend, DefaultBackend, EarlyStopping, ExecutionContext,
        RegressionMetrics, Trainer, TrainerConfig, TrainingReport,
    };
}
