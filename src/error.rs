use crate::download::error::RetrievalError;
use crate::geometry::error::RegionError;
use crate::processing::error::ProcessingError;
use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClimatabError {
    #[error(transparent)]
    Region(#[from] RegionError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),

    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("No variables requested")]
    EmptyVariableList,

    #[error("Pressure levels must be provided for the pressure-level dataset")]
    MissingPressureLevels,

    #[error(
        "Retrieval for chunk {chunk_index} ({start} to {end}) failed after {attempts} attempts"
    )]
    RetrievalExhausted {
        chunk_index: usize,
        start: NaiveDate,
        end: NaiveDate,
        attempts: u32,
        #[source]
        source: RetrievalError,
    },

    #[error("Retrieval for chunk {chunk_index} failed with a non-retryable error")]
    RetrievalFailed {
        chunk_index: usize,
        #[source]
        source: RetrievalError,
    },

    #[error("Retrieval client configuration failed")]
    Config(#[source] RetrievalError),

    #[error("Failed to create output directory '{0}'")]
    OutputDirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to write output file '{0}'")]
    OutputWrite(PathBuf, #[source] std::io::Error),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}
