//! Writes a run's tables to the conventional output layout: a
//! `{id}_output/` directory holding the aggregated data, the contributing
//! coordinates, and optionally the raw merged rows.

use crate::error::ClimatabError;
use crate::pipeline::PipelineOutcome;
use crate::processing::ProcessingError;
use crate::types::frequency::Frequency;
use log::info;
use polars::prelude::*;
use std::path::{Path, PathBuf};

/// Where each file of one run landed.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub directory: PathBuf,
    pub data: PathBuf,
    pub unique_coords: PathBuf,
    pub raw: Option<PathBuf>,
}

/// Writes the outcome's tables as CSV under `base_dir`. Blocking file work
/// runs off the async runtime.
pub async fn write_outputs(
    base_dir: &Path,
    request_id: &str,
    frequency: Frequency,
    outcome: &PipelineOutcome,
) -> Result<OutputPaths, ClimatabError> {
    let directory = base_dir.join(format!("{request_id}_output"));
    let data = directory.join(format!("{request_id}_{}_data.csv", frequency.path_segment()));
    let unique_coords = directory.join(format!("{request_id}_unique_latlongs.csv"));
    let raw = outcome
        .raw
        .is_some()
        .then(|| directory.join(format!("{request_id}_raw_data.csv")));

    let mut aggregated = outcome.aggregated.clone();
    let mut coords = outcome.unique_coords.clone();
    let mut raw_frame = outcome.raw.clone();
    let paths = OutputPaths {
        directory,
        data,
        unique_coords,
        raw,
    };
    let written = paths.clone();
    tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&written.directory)
            .map_err(|e| ClimatabError::OutputDirCreation(written.directory.clone(), e))?;
        write_csv(&written.data, &mut aggregated)?;
        write_csv(&written.unique_coords, &mut coords)?;
        if let (Some(path), Some(frame)) = (&written.raw, raw_frame.as_mut()) {
            write_csv(path, frame)?;
        }
        Ok::<(), ClimatabError>(())
    })
    .await??;

    info!(
        "Wrote {} output file(s) to {}",
        if paths.raw.is_some() { 3 } else { 2 },
        paths.directory.display()
    );
    Ok(paths)
}

fn write_csv(path: &Path, frame: &mut DataFrame) -> Result<(), ClimatabError> {
    let file = std::fs::File::create(path)
        .map_err(|e| ClimatabError::OutputWrite(path.to_path_buf(), e))?;
    CsvWriter::new(file)
        .include_header(true)
        .finish(frame)
        .map_err(ProcessingError::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RunSummary;
    use tempfile::TempDir;

    fn outcome(save_raw: bool) -> PipelineOutcome {
        let aggregated = df!(
            "year" => [2023i32, 2023],
            "t2m" => [280.0, 281.0],
        )
        .unwrap();
        let unique_coords = df!(
            "latitude" => [1.0],
            "longitude" => [1.0],
        )
        .unwrap();
        PipelineOutcome {
            aggregated: aggregated.clone(),
            unique_coords,
            raw: save_raw.then(|| aggregated),
            empty_region: false,
            summary: RunSummary {
                chunks: 1,
                raw_rows: 2,
                aggregated_rows: 2,
                elapsed: std::time::Duration::ZERO,
            },
        }
    }

    #[tokio::test]
    async fn writes_the_conventional_layout() {
        let dir = TempDir::new().unwrap();
        let paths = write_outputs(dir.path(), "berlin", Frequency::Daily, &outcome(true))
            .await
            .unwrap();
        assert!(paths.directory.ends_with("berlin_output"));
        assert!(paths.data.exists());
        assert!(paths.unique_coords.exists());
        assert!(paths.raw.as_ref().unwrap().exists());
        let text = std::fs::read_to_string(&paths.data).unwrap();
        assert!(text.starts_with("year,t2m"));
    }

    #[tokio::test]
    async fn raw_file_is_optional() {
        let dir = TempDir::new().unwrap();
        let paths = write_outputs(dir.path(), "berlin", Frequency::Monthly, &outcome(false))
            .await
            .unwrap();
        assert!(paths.raw.is_none());
        assert!(paths
            .data
            .file_name()
            .unwrap()
            .to_string_lossy()
            .contains("monthly"));
    }
}
