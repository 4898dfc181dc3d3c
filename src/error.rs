//! Error taxonomy for the transform and sampling jobs.
//!
//! Every variant is fatal: the jobs abort on the first error and surface
//! its message.

use std::path::PathBuf;

use datafusion::arrow::error::ArrowError;
use datafusion::error::DataFusionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    /// The remote CSV could not be fetched.
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// A local file could not be read or written.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed CSV, type mismatch inside a kernel, etc.
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("DataFusion error: {0}")]
    DataFusion(#[from] DataFusionError),

    /// An expected column is absent from the dataset.
    #[error("missing expected column '{0}'")]
    MissingColumn(String),

    #[error("column '{column}' has type {actual}, expected {expected}")]
    ColumnType {
        column: String,
        expected: String,
        actual: String,
    },

    #[error("unparsable timestamp in column '{column}': {reason}")]
    Timestamp { column: String, reason: String },

    #[error("{dimension}: code(s) without a label: {codes:?}")]
    UnmappedCode { dimension: String, codes: Vec<String> },

    #[error("{dimension}: no dimension row matches fact row {row}")]
    UnmatchedRow { dimension: String, row: usize },

    #[error("requested a sample of {requested} rows but only {available} rows remain after filtering")]
    InsufficientRows { requested: usize, available: usize },

    #[error("round-trip check failed for {dimension} at row {row}")]
    RoundTrip { dimension: String, row: usize },

    /// A dimension was asked for something its shape cannot provide.
    #[error("invalid dimension {dimension}: {reason}")]
    InvalidDimension { dimension: String, reason: String },
}

pub type Result<T, E = EtlError> = std::result::Result<T, E>;

impl EtlError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EtlError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn column_type(
        column: &str,
        expected: impl Into<String>,
        actual: &datafusion::arrow::datatypes::DataType,
    ) -> Self {
        EtlError::ColumnType {
            column: column.to_string(),
            expected: expected.into(),
            actual: actual.to_string(),
        }
    }
}
