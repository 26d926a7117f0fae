use polars::prelude::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from loading, filtering, or aggregating grid tables.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Variable '{0}' is not in the registry; no aggregation class is known for it")]
    UnclassifiedVariable(String),

    #[error("Grid file {path} uses an unsupported format '{extension}'")]
    UnsupportedGridFormat { path: PathBuf, extension: String },

    #[error("Grid file {path} is missing required column '{column}'")]
    MissingColumn { path: PathBuf, column: String },

    #[error("Grid files disagree on their coordinate grid: {detail}")]
    MergeKeyMismatch { detail: String },

    #[error("No grid rows remain after merging downloaded files")]
    EmptyGrid,

    #[error("Polars operation failed: {0}")]
    Polars(#[from] PolarsError),
}
