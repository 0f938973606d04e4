//! Error types for metrocast_data.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`DataError`].
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur while loading, normalizing, or windowing data.
#[derive(Error, Debug)]
pub enum DataError {
    /// A required file (raw table or statistics artifact) does not exist.
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    /// A configured column is absent from the table.
    #[error("Column '{0}' not found in table")]
    MissingColumn(String),

    /// The target column does not resolve inside the statistics columns.
    #[error("Target column '{target}' not found in columns: {available:?}")]
    TargetNotFound {
        /// Requested target column.
        target: String,
        /// Columns that were searched.
        available: Vec<String>,
    },

    /// Two column lists that must be identical differ.
    #[error("Column mismatch: expected {expected:?}, found {found:?}")]
    ColumnMismatch {
        /// Columns the consumer expects.
        expected: Vec<String>,
        /// Columns actually present.
        found: Vec<String>,
    },

    /// Timestamps are not strictly increasing.
    #[error("Timestamps must be strictly increasing: row {row} ({timestamp}) does not follow its predecessor")]
    NonMonotonicTimestamps {
        /// Zero-based data row.
        row: usize,
        /// Offending timestamp as written in the table.
        timestamp: String,
    },

    /// Invalid dataset or loader configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Statistics artifact written by an incompatible version.
    #[error("Unsupported statistics schema version {found} (expected {expected})")]
    SchemaVersion {
        /// Version this build understands.
        expected: u32,
        /// Version found on disk.
        found: u32,
    },

    /// A categorical cell is not a non-negative whole number.
    #[error("Invalid category {value} in column '{column}' at row {row}: codes must be non-negative integers")]
    InvalidCategory {
        /// Zero-based table row.
        row: usize,
        /// Categorical column name.
        column: String,
        /// Offending value.
        value: f64,
    },

    /// Dataset has no rows or windows.
    #[error("Dataset is empty: {0}")]
    EmptyDataset(String),

    /// Index out of bounds.
    #[error("Index {index} out of bounds for length {length}")]
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// The length of the collection.
        length: usize,
    },

    /// A cell could not be parsed.
    #[error("Parse error at row {row}, column '{column}': {message}")]
    Parse {
        /// Zero-based data row.
        row: usize,
        /// Column name.
        column: String,
        /// Parser message.
        message: String,
    },

    /// CSV reader error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Core error.
    #[error("Core error: {0}")]
    Core(#[from] metrocast_core::CoreError),
}
