//! Raw chronological weather table.
//!
//! The table is read from a CSV file with a header row, one row per hour.
//! A timestamp column (default `time`) is parsed with `chrono`; every other
//! requested column is parsed as a number. Columns that are not requested
//! are ignored.

use std::ops::Range;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime};
use ndarray::{s, Array2, ArrayView1, ArrayView2};

use crate::error::{DataError, Result};

/// Default name of the timestamp column.
pub const DEFAULT_TIME_COLUMN: &str = "time";

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Chronological table of numeric weather observations.
///
/// Invariant: timestamps are strictly increasing and `values` has one row
/// per timestamp and one column per entry of `columns`.
#[derive(Debug, Clone)]
pub struct WeatherTable {
    timestamps: Vec<NaiveDateTime>,
    columns: Vec<String>,
    values: Array2<f64>,
}

impl WeatherTable {
    /// Build a table from parts, validating shape and ordering.
    ///
    /// # Errors
    ///
    /// Returns an error if the value matrix does not match the timestamps and
    /// columns, or if the timestamps are not strictly increasing.
    pub fn new(
        timestamps: Vec<NaiveDateTime>,
        columns: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self> {
        if values.nrows() != timestamps.len() || values.ncols() != columns.len() {
            return Err(DataError::InvalidConfig(format!(
                "value matrix is {:?} but table has {} timestamps and {} columns",
                values.dim(),
                timestamps.len(),
                columns.len()
            )));
        }
        check_monotonic(&timestamps)?;
        Ok(Self {
            timestamps,
            columns,
            values,
        })
    }

    /// Read the requested columns from a CSV file.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::NotFound`] if the file does not exist,
    /// [`DataError::MissingColumn`] if a requested column is absent, and
    /// [`DataError::Parse`] for unreadable cells.
    pub fn from_csv(path: impl AsRef<Path>, columns: &[String]) -> Result<Self> {
        Self::from_csv_with_time_column(path, columns, DEFAULT_TIME_COLUMN)
    }

    /// Read the requested columns, naming the timestamp column explicitly.
    pub fn from_csv_with_time_column(
        path: impl AsRef<Path>,
        columns: &[String],
        time_column: &str,
    ) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DataError::NotFound(path.to_path_buf()));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)?;
        let headers = reader.headers()?.clone();

        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| DataError::MissingColumn(name.to_string()))
        };
        let time_idx = find(time_column)?;
        let col_idx = columns
            .iter()
            .map(|c| find(c))
            .collect::<Result<Vec<_>>>()?;

        let mut timestamps = Vec::new();
        let mut flat = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let raw_ts = record.get(time_idx).unwrap_or_default();
            timestamps.push(parse_timestamp(raw_ts).map_err(|message| DataError::Parse {
                row,
                column: time_column.to_string(),
                message,
            })?);

            for (&idx, name) in col_idx.iter().zip(columns) {
                let cell = record.get(idx).unwrap_or_default();
                let value = cell.parse::<f64>().map_err(|e| DataError::Parse {
                    row,
                    column: name.clone(),
                    message: format!("'{cell}': {e}"),
                })?;
                flat.push(value);
            }
        }

        let values = Array2::from_shape_vec((timestamps.len(), columns.len()), flat)
            .map_err(|e| DataError::InvalidConfig(e.to_string()))?;

        tracing::debug!(
            path = %path.display(),
            rows = timestamps.len(),
            columns = columns.len(),
            "read weather table"
        );
        Self::new(timestamps, columns.to_vec(), values)
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Column names, in matrix order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Timestamps, one per row.
    #[must_use]
    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    /// Full value matrix.
    #[must_use]
    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    /// Position of a column.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| DataError::MissingColumn(name.to_string()))
    }

    /// Values of a single column.
    pub fn column(&self, name: &str) -> Result<ArrayView1<'_, f64>> {
        let idx = self.column_index(name)?;
        Ok(self.values.column(idx))
    }

    /// Values of a column restricted to a row range.
    pub fn column_rows(&self, name: &str, rows: Range<usize>) -> Result<ArrayView1<'_, f64>> {
        let idx = self.column_index(name)?;
        if rows.end > self.len() || rows.start > rows.end {
            return Err(DataError::IndexOutOfBounds {
                index: rows.end,
                length: self.len(),
            });
        }
        Ok(self.values.slice(s![rows, idx]))
    }
}

/// Parse an ISO-8601 style timestamp.
///
/// Accepts naive forms such as `2024-01-01T13:00` as well as RFC 3339 with
/// an offset, in which case the local wall-clock time is kept.
pub fn parse_timestamp(raw: &str) -> std::result::Result<NaiveDateTime, String> {
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(ts);
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.naive_local())
        .map_err(|e| format!("'{raw}' is not a recognized timestamp: {e}"))
}

fn check_monotonic(timestamps: &[NaiveDateTime]) -> Result<()> {
    for (row, pair) in timestamps.windows(2).enumerate() {
        if pair[1] <= pair[0] {
            return Err(DataError::NonMonotonicTimestamps {
                row: row + 1,
                timestamp: pair[1].to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_reads_requested_columns_only() {
        let file = write_csv(
            "time,temperature_2m,rain,weather_code\n\
             2024-01-01T00:00,5.5,0.0,3\n\
             2024-01-01T01:00,5.1,0.2,61\n",
        );
        let table = WeatherTable::from_csv(file.path(), &cols(&["weather_code", "temperature_2m"])).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.columns(), &cols(&["weather_code", "temperature_2m"])[..]);
        assert_eq!(table.column("temperature_2m").unwrap().to_vec(), vec![5.5, 5.1]);
        assert_eq!(table.column("weather_code").unwrap().to_vec(), vec![3.0, 61.0]);
        assert!(table.column("rain").is_err());
    }

    #[test]
    fn test_missing_file_and_column() {
        let err = WeatherTable::from_csv("/no/such/table.csv", &cols(&["a"])).unwrap_err();
        assert!(matches!(err, DataError::NotFound(_)));

        let file = write_csv("time,a\n2024-01-01T00:00,1\n");
        let err = WeatherTable::from_csv(file.path(), &cols(&["b"])).unwrap_err();
        assert!(matches!(err, DataError::MissingColumn(ref c) if c == "b"));
    }

    #[test]
    fn test_rejects_unsorted_timestamps() {
        let file = write_csv("time,a\n2024-01-01T01:00,1\n2024-01-01T00:00,2\n");
        let err = WeatherTable::from_csv(file.path(), &cols(&["a"])).unwrap_err();
        assert!(matches!(err, DataError::NonMonotonicTimestamps { row: 1, .. }));
    }

    #[test]
    fn test_bad_cell_reports_location() {
        let file = write_csv("time,a\n2024-01-01T00:00,1\n2024-01-01T01:00,n/a\n");
        let err = WeatherTable::from_csv(file.path(), &cols(&["a"])).unwrap_err();
        assert!(matches!(err, DataError::Parse { row: 1, ref column, .. } if column == "a"));
    }

    #[test]
    fn test_timestamp_formats() {
        assert!(parse_timestamp("2024-05-01T13:00").is_ok());
        assert!(parse_timestamp("2024-05-01T13:00:00").is_ok());
        assert!(parse_timestamp("2024-05-01 13:00:00").is_ok());
        let with_offset = parse_timestamp("2024-05-01T13:00:00+03:00").unwrap();
        assert_eq!(with_offset.to_string(), "2024-05-01 13:00:00");
        assert!(parse_timestamp("yesterday").is_err());
    }
}
