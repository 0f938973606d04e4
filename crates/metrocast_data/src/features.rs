//! Cyclical calendar features derived from timestamps.
//!
//! Each timestamp yields six values in `[-1, 1]`, in this order:
//!
//! | name        | value                         |
//! |-------------|-------------------------------|
//! | `hour_sin`  | `sin(2π · hour / 24)`         |
//! | `hour_cos`  | `cos(2π · hour / 24)`         |
//! | `day_sin`   | `sin(2π · day_of_month / 365)`|
//! | `day_cos`   | `cos(2π · day_of_month / 365)`|
//! | `month_sin` | `sin(2π · (month − 1) / 12)`  |
//! | `month_cos` | `cos(2π · (month − 1) / 12)`  |
//!
//! The features are bounded by construction and are never normalized.

use std::f64::consts::PI;

use chrono::{Datelike, NaiveDateTime, Timelike};
use ndarray::Array2;

use metrocast_core::NUM_TIME_FEATURES;

/// Column names of the derived features, in matrix order.
pub const TIME_FEATURE_NAMES: [&str; NUM_TIME_FEATURES] = [
    "hour_sin",
    "hour_cos",
    "day_sin",
    "day_cos",
    "month_sin",
    "month_cos",
];

/// Calendar encoding of a single timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeFeatures {
    /// Sine of the hour of day.
    pub hour_sin: f32,
    /// Cosine of the hour of day.
    pub hour_cos: f32,
    /// Sine of the day of month.
    pub day_sin: f32,
    /// Cosine of the day of month.
    pub day_cos: f32,
    /// Sine of the month of year.
    pub month_sin: f32,
    /// Cosine of the month of year.
    pub month_cos: f32,
}

impl TimeFeatures {
    /// Encode a timestamp.
    #[must_use]
    pub fn from_datetime(ts: &NaiveDateTime) -> Self {
        let hour = 2.0 * PI * f64::from(ts.hour()) / 24.0;
        let day = 2.0 * PI * f64::from(ts.day()) / 365.0;
        let month = 2.0 * PI * f64::from(ts.month0()) / 12.0;

        Self {
            hour_sin: hour.sin() as f32,
            hour_cos: hour.cos() as f32,
            day_sin: day.sin() as f32,
            day_cos: day.cos() as f32,
            month_sin: month.sin() as f32,
            month_cos: month.cos() as f32,
        }
    }

    /// Values in [`TIME_FEATURE_NAMES`] order.
    #[must_use]
    pub fn to_array(&self) -> [f32; NUM_TIME_FEATURES] {
        [
            self.hour_sin,
            self.hour_cos,
            self.day_sin,
            self.day_cos,
            self.month_sin,
            self.month_cos,
        ]
    }
}

/// Encode a sequence of timestamps into a `(len, 6)` matrix.
#[must_use]
pub fn time_feature_matrix(timestamps: &[NaiveDateTime]) -> Array2<f32> {
    let mut out = Array2::<f32>::zeros((timestamps.len(), NUM_TIME_FEATURES));
    for (mut row, ts) in out.rows_mut().into_iter().zip(timestamps) {
        for (cell, value) in row.iter_mut().zip(TimeFeatures::from_datetime(ts).to_array()) {
            *cell = value;
        }
    }
    out
}
