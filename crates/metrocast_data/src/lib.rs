//! # metrocast_data
//!
//! Data pipeline for MetroCast weather forecasting.
//!
//! This crate provides:
//! - [`WeatherTable`] for reading the raw hourly CSV table
//! - [`TimeFeatures`] cyclical calendar encodings
//! - [`Statistics`] fit on the training prefix and persisted as JSON
//! - [`SplitBoundaries`] for leakage-free chronological splits
//! - [`WindowedDataset`] for random access to (history, target) windows
//! - [`WindowLoader`] for batched, optionally shuffled iteration
//! - [`TargetScaler`] for mapping predictions back to °C
//!
//! ## Example
//!
//! ```rust,ignore
//! use metrocast_data::{DatasetOptions, SplitDatasets, Statistics, WindowLoader};
//!
//! let stats = Statistics::load(&config.data.stats_path)?;
//! let options = DatasetOptions::from_config(&config);
//! let splits = SplitDatasets::from_csv(&config.data.raw_file_path, &stats, &options)?;
//!
//! let train = WindowLoader::builder(splits.train)
//!     .batch_size(32)
//!     .seed(Seed::new(42))
//!     .build()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dataset;
pub mod error;
pub mod features;
pub mod loader;
pub mod scaler;
pub mod split;
pub mod stats;
pub mod table;

pub use dataset::{DatasetOptions, SplitDatasets, Window, WindowedDataset};
pub use error::{DataError, Result};
pub use features::{time_feature_matrix, TimeFeatures, TIME_FEATURE_NAMES};
pub use loader::{WindowBatch, WindowLoader, WindowLoaderBuilder};
pub use scaler::TargetScaler;
pub use split::{window_count, SplitBoundaries};
pub use stats::{Statistics, STATS_SCHEMA_VERSION};
pub use table::{parse_timestamp, WeatherTable, DEFAULT_TIME_COLUMN};
