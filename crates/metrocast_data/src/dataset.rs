//! Windowed sequence dataset over one chronological split.
//!
//! At construction the split's rows are normalized with the persisted
//! statistics, the six calendar features are appended, and the raw
//! weather code is appended last. The resulting feature matrix is
//!
//! ```text
//! [ normalized continuous (input_cols order) | hour/day/month sin,cos | weather_code ]
//! ```
//!
//! Window `i` is history rows `[i, i + seq_len)` over every column and the
//! target column over rows `[i + seq_len, i + seq_len + pred_len)`.

use std::ops::Range;
use std::path::Path;

use ndarray::{concatenate, s, Array1, Array2, Axis};

use metrocast_core::{Config, Split, SplitRatio};

use crate::error::{DataError, Result};
use crate::features::{time_feature_matrix, TIME_FEATURE_NAMES};
use crate::scaler::TargetScaler;
use crate::split::{window_count, SplitBoundaries};
use crate::stats::Statistics;
use crate::table::WeatherTable;

/// One supervised sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    /// `(seq_len, n_features)` history.
    pub history: Array2<f32>,
    /// `(pred_len,)` normalized target values.
    pub target: Array1<f32>,
}

/// Options shared by the three split datasets.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetOptions {
    /// History window length.
    pub seq_len: usize,
    /// Forecast window length.
    pub pred_len: usize,
    /// Forecast column; must be one of `continuous`.
    pub target_col: String,
    /// Continuous columns; must equal the statistics' `input_cols`.
    pub continuous: Vec<String>,
    /// Categorical weather-code column.
    pub categorical: String,
    /// Chronological split fractions.
    pub split_ratio: SplitRatio,
}

impl DatasetOptions {
    /// Options derived from a validated run configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            seq_len: config.training.seq_len,
            pred_len: config.training.pred_len,
            target_col: config.features.target.clone(),
            continuous: config.continuous_columns(),
            categorical: config.features.categorical.clone(),
            split_ratio: config.training.split_ratio,
        }
    }

    /// Columns to read from the raw table.
    #[must_use]
    pub fn table_columns(&self) -> Vec<String> {
        let mut cols = self.continuous.clone();
        cols.push(self.categorical.clone());
        cols
    }

    fn validate(&self) -> Result<()> {
        if self.seq_len == 0 || self.pred_len == 0 {
            return Err(DataError::InvalidConfig(format!(
                "seq_len and pred_len must be >= 1 (got {} and {})",
                self.seq_len, self.pred_len
            )));
        }
        self.split_ratio.validate()?;
        Ok(())
    }
}

/// Random-access dataset of windows over one split.
#[derive(Debug, Clone)]
pub struct WindowedDataset {
    split: Split,
    rows: Range<usize>,
    seq_len: usize,
    pred_len: usize,
    columns: Vec<String>,
    data: Array2<f32>,
    target_idx: usize,
    scaler: TargetScaler,
}

impl WindowedDataset {
    /// Read the raw CSV table and build the dataset for `split`.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::NotFound`] if the table is missing, plus every
    /// error of [`WindowedDataset::from_table`].
    pub fn from_csv(
        path: impl AsRef<Path>,
        stats: &Statistics,
        options: &DatasetOptions,
        split: Split,
    ) -> Result<Self> {
        let table = WeatherTable::from_csv(path, &options.table_columns())?;
        Self::from_table(&table, stats, options, split)
    }

    /// Build the dataset for `split` from an in-memory table.
    ///
    /// # Errors
    ///
    /// * [`DataError::InvalidConfig`] for zero lengths or bad ratios
    /// * [`DataError::ColumnMismatch`] if the statistics were fit on other columns
    /// * [`DataError::TargetNotFound`] if the target is not a statistics column
    /// * [`DataError::MissingColumn`] if the table lacks a column
    /// * [`DataError::InvalidCategory`] if a weather code in the split is
    ///   negative, fractional, or not finite
    pub fn from_table(
        table: &WeatherTable,
        stats: &Statistics,
        options: &DatasetOptions,
        split: Split,
    ) -> Result<Self> {
        options.validate()?;
        stats.ensure_columns(&options.continuous)?;
        let target_idx = stats.column_index(&options.target_col)?;
        let scaler = stats.target_scaler(&options.target_col)?;

        let bounds = SplitBoundaries::new(table.len(), &options.split_ratio)?;
        let rows = bounds.range(split);

        let continuous = stats.normalize_rows(table, rows.clone())?;
        let time = time_feature_matrix(&table.timestamps()[rows.clone()]);
        let raw_codes = table.column_rows(&options.categorical, rows.clone())?;
        if let Some((offset, &value)) = raw_codes
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || **v < 0.0 || v.fract() != 0.0)
        {
            return Err(DataError::InvalidCategory {
                row: rows.start + offset,
                column: options.categorical.clone(),
                value,
            });
        }
        let codes = raw_codes.mapv(|v| v as f32).insert_axis(Axis(1));
        let data = concatenate(Axis(1), &[continuous.view(), time.view(), codes.view()])
            .map_err(|e| DataError::InvalidConfig(e.to_string()))?;

        let mut columns = stats.input_cols.clone();
        columns.extend(TIME_FEATURE_NAMES.iter().map(|s| (*s).to_string()));
        columns.push(options.categorical.clone());

        let dataset = Self {
            split,
            rows,
            seq_len: options.seq_len,
            pred_len: options.pred_len,
            columns,
            data,
            target_idx,
            scaler,
        };
        tracing::info!(
            split = %split,
            start = dataset.rows.start,
            end = dataset.rows.end,
            windows = dataset.len(),
            "built windowed dataset"
        );
        Ok(dataset)
    }

    /// Number of windows.
    #[must_use]
    pub fn len(&self) -> usize {
        window_count(self.data.nrows(), self.seq_len, self.pred_len)
    }

    /// Whether the split is too short for a single window.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Window at position `index`.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::IndexOutOfBounds`] if `index >= len()`.
    pub fn get(&self, index: usize) -> Result<Window> {
        let length = self.len();
        if index >= length {
            return Err(DataError::IndexOutOfBounds { index, length });
        }
        let split_at = index + self.seq_len;
        let history = self.data.slice(s![index..split_at, ..]).to_owned();
        let target = self
            .data
            .slice(s![split_at..split_at + self.pred_len, self.target_idx])
            .to_owned();
        Ok(Window { history, target })
    }

    /// Split this dataset covers.
    #[must_use]
    pub fn split(&self) -> Split {
        self.split
    }

    /// Absolute table rows of the split.
    #[must_use]
    pub fn split_range(&self) -> Range<usize> {
        self.rows.clone()
    }

    /// History window length.
    #[must_use]
    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    /// Forecast window length.
    #[must_use]
    pub fn pred_len(&self) -> usize {
        self.pred_len
    }

    /// Feature column names, in matrix order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Width of a history row.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    /// Continuous width: every column but the trailing categorical code.
    #[must_use]
    pub fn n_continuous(&self) -> usize {
        self.columns.len() - 1
    }

    /// Position of the target inside a history row.
    #[must_use]
    pub fn target_index(&self) -> usize {
        self.target_idx
    }

    /// Target scaling parameters.
    #[must_use]
    pub fn scaler(&self) -> TargetScaler {
        self.scaler
    }

    /// `value * target_std + target_mean`.
    #[must_use]
    pub fn inverse_transform_target(&self, value: f64) -> f64 {
        self.scaler.inverse(value)
    }

    /// Largest weather code in the split, if any rows exist.
    ///
    /// Codes are checked to be non-negative integers at construction.
    /// Callers compare this against the embedding size before training.
    #[must_use]
    pub fn max_category(&self) -> Option<usize> {
        let code_col = self.data.ncols() - 1;
        self.data.column(code_col).iter().map(|&v| v as usize).max()
    }
}

/// Train, validation, and test datasets cut from a single table read.
#[derive(Debug, Clone)]
pub struct SplitDatasets {
    /// Training windows.
    pub train: WindowedDataset,
    /// Validation windows.
    pub val: WindowedDataset,
    /// Test windows.
    pub test: WindowedDataset,
}

impl SplitDatasets {
    /// Build all three splits from one table.
    pub fn from_table(
        table: &WeatherTable,
        stats: &Statistics,
        options: &DatasetOptions,
    ) -> Result<Self> {
        Ok(Self {
            train: WindowedDataset::from_table(table, stats, options, Split::Train)?,
            val: WindowedDataset::from_table(table, stats, options, Split::Val)?,
            test: WindowedDataset::from_table(table, stats, options, Split::Test)?,
        })
    }

    /// Read the raw table once and build all three splits.
    pub fn from_csv(
        path: impl AsRef<Path>,
        stats: &Statistics,
        options: &DatasetOptions,
    ) -> Result<Self> {
        let table = WeatherTable::from_csv(path, &options.table_columns())?;
        Self::from_table(&table, stats, options)
    }

    /// Dataset of a split.
    #[must_use]
    pub fn get(&self, split: Split) -> &WindowedDataset {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
            Split::Test => &self.test,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::{Duration, NaiveDate};
    use metrocast_core::NUM_TIME_FEATURES;

    fn names(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|s| (*s).to_string()).collect()
    }

    /// `len` hourly rows with `temp = row`, `hum = 2 * row`, `code = row % 7`.
    fn table(len: usize) -> WeatherTable {
        let start = NaiveDate::from_ymd_opt(2023, 12, 31)
            .unwrap()
            .and_hms_opt(20, 0, 0)
            .unwrap();
        let ts = (0..len as i64).map(|h| start + Duration::hours(h)).collect();
        let values = Array2::from_shape_fn((len, 3), |(r, c)| match c {
            0 => r as f64,
            1 => 2.0 * r as f64,
            _ => (r % 7) as f64,
        });
        WeatherTable::new(ts, names(&["temp", "hum", "code"]), values).unwrap()
    }

    fn options(seq_len: usize, pred_len: usize) -> DatasetOptions {
        DatasetOptions {
            seq_len,
            pred_len,
            target_col: "temp".to_string(),
            continuous: names(&["temp", "hum"]),
            categorical: "code".to_string(),
            split_ratio: SplitRatio::new(0.8, 0.1, 0.1),
        }
    }

    fn stats_for(t: &WeatherTable, o: &DatasetOptions) -> Statistics {
        Statistics::fit(t, &o.continuous, &o.categorical, &o.split_ratio, &o.target_col).unwrap()
    }

    #[test]
    fn test_thousand_row_window_counts() {
        let t = table(1000);
        let o = options(24, 24);
        let splits = SplitDatasets::from_table(&t, &stats_for(&t, &o), &o).unwrap();

        assert_eq!(splits.train.split_range(), 0..800);
        assert_eq!(splits.val.split_range(), 800..900);
        assert_eq!(splits.test.split_range(), 900..1000);
        assert_eq!(splits.train.len(), 753);
        assert_eq!(splits.val.len(), 53);
        assert_eq!(splits.test.len(), 53);
    }

    #[test]
    fn test_feature_layout() {
        let t = table(200);
        let o = options(6, 3);
        let ds = WindowedDataset::from_table(&t, &stats_for(&t, &o), &o, Split::Train).unwrap();

        assert_eq!(ds.n_features(), 2 + NUM_TIME_FEATURES + 1);
        assert_eq!(ds.n_continuous(), 2 + NUM_TIME_FEATURES);
        assert_eq!(ds.columns()[0], "temp");
        assert_eq!(ds.columns()[2], "hour_sin");
        assert_eq!(ds.columns().last().map(String::as_str), Some("code"));
        assert_eq!(ds.target_index(), 0);

        let w = ds.get(10).unwrap();
        assert_eq!(w.history.dim(), (6, ds.n_features()));
        assert_eq!(w.target.len(), 3);
        // raw categorical code, not normalized
        assert_eq!(w.history[[0, ds.n_features() - 1]], (10 % 7) as f32);
    }

    #[test]
    fn test_window_contents_and_overlap() {
        let t = table(120);
        let o = options(5, 4);
        let stats = stats_for(&t, &o);
        let ds = WindowedDataset::from_table(&t, &stats, &o, Split::Train).unwrap();

        let w0 = ds.get(0).unwrap();
        let w1 = ds.get(1).unwrap();

        // target = temp rows 5..9, normalized
        for (k, &v) in w0.target.iter().enumerate() {
            let raw = ds.inverse_transform_target(f64::from(v));
            assert_abs_diff_eq!(raw, (5 + k) as f64, epsilon = 1e-4);
        }
        // consecutive windows share seq_len + pred_len - 1 rows
        assert_eq!(w0.history.slice(s![1.., ..]), w1.history.slice(s![..4, ..]));
        assert_eq!(w0.target.slice(s![1..]), w1.target.slice(s![..3]));
        assert_eq!(w0.target[0], w1.history[[4, 0]]);
    }

    #[test]
    fn test_val_split_uses_train_statistics() {
        let t = table(100);
        let o = options(4, 2);
        let stats = stats_for(&t, &o);
        let val = WindowedDataset::from_table(&t, &stats, &o, Split::Val).unwrap();

        // first val row is table row 80
        let first = val.get(0).unwrap().history[[0, 0]];
        assert_abs_diff_eq!(
            f64::from(first),
            stats.normalize("temp", 80.0).unwrap(),
            epsilon = 1e-4
        );
    }

    #[test]
    fn test_index_out_of_bounds() {
        let t = table(100);
        let o = options(4, 2);
        let ds = WindowedDataset::from_table(&t, &stats_for(&t, &o), &o, Split::Test).unwrap();
        assert_eq!(ds.len(), 10 - 5);
        assert!(matches!(
            ds.get(ds.len()),
            Err(DataError::IndexOutOfBounds { index: 5, length: 5 })
        ));
    }

    #[test]
    fn test_short_split_is_empty() {
        let t = table(100);
        let o = options(24, 24);
        let ds = WindowedDataset::from_table(&t, &stats_for(&t, &o), &o, Split::Val).unwrap();
        assert!(ds.is_empty());
    }

    #[test]
    fn test_target_must_be_in_statistics() {
        let t = table(100);
        let o = options(4, 2);
        let stats = stats_for(&t, &o);
        let mut bad = o.clone();
        bad.target_col = "code".to_string();
        let err = WindowedDataset::from_table(&t, &stats, &bad, Split::Train).unwrap_err();
        assert!(matches!(err, DataError::TargetNotFound { .. }));
    }

    #[test]
    fn test_column_mismatch_detected() {
        let t = table(100);
        let o = options(4, 2);
        let stats = stats_for(&t, &o);
        let mut reordered = o.clone();
        reordered.continuous = names(&["hum", "temp"]);
        let err = WindowedDataset::from_table(&t, &stats, &reordered, Split::Train).unwrap_err();
        assert!(matches!(err, DataError::ColumnMismatch { .. }));
    }

    #[test]
    fn test_zero_lengths_rejected() {
        let t = table(100);
        let o = options(4, 2);
        let stats = stats_for(&t, &o);
        let bad = options(0, 2);
        assert!(matches!(
            WindowedDataset::from_table(&t, &stats, &bad, Split::Train),
            Err(DataError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_max_category() {
        let t = table(100);
        let o = options(4, 2);
        let ds = WindowedDataset::from_table(&t, &stats_for(&t, &o), &o, Split::Train).unwrap();
        assert_eq!(ds.max_category(), Some(6));
    }

    #[test]
    fn test_negative_or_fractional_code_rejected() {
        let clean = table(100);
        let o = options(4, 2);
        let stats = stats_for(&clean, &o);

        for (row, bad) in [(12, -1.0), (30, 2.5), (45, f64::NAN)] {
            let mut values = clean.values().to_owned();
            values[[row, 2]] = bad;
            let t = WeatherTable::new(
                clean.timestamps().to_vec(),
                names(&["temp", "hum", "code"]),
                values,
            )
            .unwrap();
            match WindowedDataset::from_table(&t, &stats, &o, Split::Train) {
                Err(DataError::InvalidCategory { row: r, column, .. }) => {
                    assert_eq!(r, row);
                    assert_eq!(column, "code");
                }
                other => panic!("expected InvalidCategory, got {other:?}"),
            }
            // rows outside the split are not inspected
            assert!(WindowedDataset::from_table(&t, &stats, &o, Split::Test).is_ok());
        }
    }
}
