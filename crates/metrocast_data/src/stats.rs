//! Normalization statistics fit on the training prefix.
//!
//! [`Statistics`] holds the per-column mean and standard deviation of the
//! continuous weather columns, computed from the rows before the training
//! boundary only. The categorical weather-code column is never normalized;
//! it is listed in `exclude_from_norm` and appended after the continuous
//! block in `all_cols`.
//!
//! On disk the artifact is a JSON document:
//!
//! ```json
//! {
//!   "schema_version": 1,
//!   "mean": [14.2, 71.9],
//!   "std": [6.8, 15.1],
//!   "input_cols": ["temperature_2m", "relative_humidity_2m"],
//!   "all_cols": ["temperature_2m", "relative_humidity_2m", "weather_code"],
//!   "exclude_from_norm": ["weather_code"]
//! }
//! ```
//!
//! `mean[i]` and `std[i]` belong to `input_cols[i]`. Consumers look columns
//! up by name and check the list against their own before indexing.

use std::path::Path;

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use metrocast_core::SplitRatio;

use crate::error::{DataError, Result};
use crate::scaler::TargetScaler;
use crate::split::SplitBoundaries;
use crate::table::WeatherTable;

/// Current on-disk schema version.
pub const STATS_SCHEMA_VERSION: u32 = 1;

/// Per-column normalization statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Layout version of the artifact.
    pub schema_version: u32,
    /// Column means, parallel to `input_cols`.
    pub mean: Vec<f64>,
    /// Column standard deviations, parallel to `input_cols`; never zero.
    pub std: Vec<f64>,
    /// Normalized columns in order.
    pub input_cols: Vec<String>,
    /// Every model input column: `input_cols` then the excluded columns.
    #[serde(default)]
    pub all_cols: Vec<String>,
    /// Columns carried through without normalization.
    #[serde(default)]
    pub exclude_from_norm: Vec<String>,
}

impl Statistics {
    /// Fit statistics on the training prefix of `table`.
    ///
    /// * `columns` - continuous columns to normalize, in order
    /// * `categorical` - column recorded as excluded from normalization
    /// * `ratio` - split ratios; only rows before the training boundary are used
    /// * `target` - forecast column, which must be among `columns`
    ///
    /// Standard deviations use the sample estimator (n - 1). A column with
    /// zero or undefined spread gets `std = 1.0`.
    ///
    /// # Errors
    ///
    /// Fails with [`DataError::InvalidConfig`] if `target` is not among
    /// `columns`, and with [`DataError::EmptyDataset`] if the training prefix
    /// has no rows.
    pub fn fit(
        table: &WeatherTable,
        columns: &[String],
        categorical: &str,
        ratio: &SplitRatio,
        target: &str,
    ) -> Result<Self> {
        if !columns.iter().any(|c| c == target) {
            return Err(DataError::InvalidConfig(format!(
                "target column '{target}' is not among the normalized columns {columns:?}"
            )));
        }

        let bounds = SplitBoundaries::new(table.len(), ratio)?;
        let train = 0..bounds.train_end();
        if train.is_empty() {
            return Err(DataError::EmptyDataset(format!(
                "training prefix of a {}-row table is empty",
                table.len()
            )));
        }

        let mut mean = Vec::with_capacity(columns.len());
        let mut std = Vec::with_capacity(columns.len());
        for name in columns {
            let values = table.column_rows(name, train.clone())?;
            let (m, s) = mean_and_sample_std(values);
            mean.push(m);
            std.push(s);
        }

        let mut all_cols = columns.to_vec();
        all_cols.push(categorical.to_string());

        tracing::info!(
            train_rows = train.len(),
            columns = columns.len(),
            "fitted normalization statistics on training prefix"
        );

        Ok(Self {
            schema_version: STATS_SCHEMA_VERSION,
            mean,
            std,
            input_cols: columns.to_vec(),
            all_cols,
            exclude_from_norm: vec![categorical.to_string()],
        })
    }

    /// Load a persisted artifact.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::NotFound`] if the file is missing,
    /// [`DataError::SchemaVersion`] for an incompatible layout, or an error if
    /// the arrays are not parallel.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DataError::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let stats: Statistics = serde_json::from_str(&text)?;
        if stats.schema_version != STATS_SCHEMA_VERSION {
            return Err(DataError::SchemaVersion {
                expected: STATS_SCHEMA_VERSION,
                found: stats.schema_version,
            });
        }
        stats.check_parallel()?;
        Ok(stats)
    }

    /// Persist as pretty-printed JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        tracing::info!(path = %path.display(), "saved normalization statistics");
        Ok(())
    }

    /// Number of normalized columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.input_cols.len()
    }

    /// Whether no column is normalized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.input_cols.is_empty()
    }

    /// Position of a normalized column.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.input_cols
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| DataError::TargetNotFound {
                target: name.to_string(),
                available: self.input_cols.clone(),
            })
    }

    /// Assert that `expected` names exactly the normalized columns, in order.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::ColumnMismatch`] when the lists differ.
    pub fn ensure_columns(&self, expected: &[String]) -> Result<()> {
        if self.input_cols.as_slice() != expected {
            return Err(DataError::ColumnMismatch {
                expected: expected.to_vec(),
                found: self.input_cols.clone(),
            });
        }
        Ok(())
    }

    /// Normalize one value of a column.
    pub fn normalize(&self, column: &str, value: f64) -> Result<f64> {
        let idx = self.column_index(column)?;
        Ok((value - self.mean[idx]) / self.std[idx])
    }

    /// Undo [`Statistics::normalize`].
    pub fn denormalize(&self, column: &str, value: f64) -> Result<f64> {
        let idx = self.column_index(column)?;
        Ok(value * self.std[idx] + self.mean[idx])
    }

    /// Scaling parameters of the forecast target.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::TargetNotFound`] if `target` is not normalized.
    pub fn target_scaler(&self, target: &str) -> Result<TargetScaler> {
        let idx = self.column_index(target)?;
        Ok(TargetScaler::new(self.mean[idx], self.std[idx]))
    }

    /// Normalize rows of `table` over the statistics columns.
    ///
    /// Returns a `(rows, input_cols)` matrix in `input_cols` order.
    pub fn normalize_rows(
        &self,
        table: &WeatherTable,
        rows: std::ops::Range<usize>,
    ) -> Result<Array2<f32>> {
        let mut out = Array2::<f32>::zeros((rows.len(), self.len()));
        for (j, name) in self.input_cols.iter().enumerate() {
            let values = table.column_rows(name, rows.clone())?;
            let (m, s) = (self.mean[j], self.std[j]);
            for (cell, &v) in out.column_mut(j).iter_mut().zip(values.iter()) {
                *cell = ((v - m) / s) as f32;
            }
        }
        Ok(out)
    }

    fn check_parallel(&self) -> Result<()> {
        if self.mean.len() != self.input_cols.len() || self.std.len() != self.input_cols.len() {
            return Err(DataError::InvalidConfig(format!(
                "statistics arrays are not parallel: {} columns, {} means, {} stds",
                self.input_cols.len(),
                self.mean.len(),
                self.std.len()
            )));
        }
        if let Some(i) = self.std.iter().position(|s| *s == 0.0 || !s.is_finite()) {
            return Err(DataError::InvalidConfig(format!(
                "std of column '{}' must be non-zero and finite",
                self.input_cols[i]
            )));
        }
        Ok(())
    }
}

/// Mean and sample standard deviation; spread floored to 1.0 when degenerate.
fn mean_and_sample_std(values: ArrayView1<'_, f64>) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.sum() / n;
    let std = if values.len() > 1 {
        let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (n - 1.0)).sqrt()
    } else {
        f64::NAN
    };
    let std = if std == 0.0 || !std.is_finite() { 1.0 } else { std };
    (mean, std)
}
