//! # metrocast_core
//!
//! Core types shared by every MetroCast crate.
//!
//! This crate provides:
//! - [`Config`] typed, validated run configuration loaded from YAML
//! - [`Seed`] for deterministic random number generation
//! - [`Split`] naming the chronological train/val/test partitions
//! - [`SchedulerKind`] for the supported learning-rate schedules
//! - Error types shared by the higher layers
//!
//! ## Example
//!
//! ```rust,ignore
//! use metrocast_core::{Config, Seed};
//!
//! let config = Config::from_file("config.yaml")?;
//! let seed = Seed::new(config.training.seed);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
mod error;
mod seed;
mod split;

pub use config::{
    Config, DataConfig, EarlyStoppingConfig, FeaturesConfig, LocationConfig, ModelSection,
    SchedulerConfig, SchedulerKind, SplitRatio, TrackingConfig, TrainingConfig,
};
pub use error::{CoreError, Result};
pub use seed::Seed;
pub use split::Split;

/// Number of cyclical calendar features derived from each timestamp.
pub const NUM_TIME_FEATURES: usize = 6;
