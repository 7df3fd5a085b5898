//! Error types for the waste model pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, WasteModelError>;

/// Everything that can stop `train_waste_model` from producing a run.
#[derive(Error, Debug)]
pub enum WasteModelError {
    /// The file is missing, unreadable or not valid CSV.
    #[error("Data source error: {0}")]
    DataSource(String),

    /// A required column is absent, null, or holds values of the wrong kind.
    #[error("Schema error: {0}")]
    Schema(String),

    /// The data cannot support a fit (too few rows).
    #[error("Degenerate data: {0}")]
    DegenerateData(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<polars::error::PolarsError> for WasteModelError {
    fn from(err: polars::error::PolarsError) -> Self {
        WasteModelError::DataSource(err.to_string())
    }
}
