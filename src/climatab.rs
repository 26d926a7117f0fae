//! The high-level client: one call turns a region, a variable list, and a
//! date range into aggregated CSV files on disk.

use crate::download::cds_client::{CdsClient, CdsConfig, Retrieval};
use crate::error::ClimatabError;
use crate::output::{self, OutputPaths};
use crate::pipeline::{Pipeline, PipelineOutcome, ProgressSink, RetryPolicy, RunSummary};
use crate::region::RegionSpec;
use crate::types::frequency::{DatasetKind, Frequency};
use crate::types::request::RequestSpec;
use bon::bon;
use chrono::NaiveDate;
use polars::prelude::DataFrame;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Default grid resolution in degrees, the archive's native spacing.
pub const DEFAULT_RESOLUTION: f64 = 0.25;
/// Default resolution for single-point requests.
pub const DEFAULT_POINT_RESOLUTION: f64 = 0.1;

/// A completed run: the tables in memory plus where they were written.
#[derive(Debug)]
pub struct RunResult {
    pub aggregated: DataFrame,
    pub unique_coords: DataFrame,
    /// True when the region contained no grid cell; the files exist but
    /// hold only headers.
    pub empty_region: bool,
    pub summary: RunSummary,
    pub paths: OutputPaths,
}

/// Client for downloading and aggregating reanalysis data.
///
/// ```rust,no_run
/// # use climatab::{Climatab, ClimatabError, Frequency};
/// # use chrono::NaiveDate;
/// # async fn run() -> Result<(), ClimatabError> {
/// let client = Climatab::new().await?;
/// let result = client
///     .era5ify_bbox()
///     .request_id("berlin")
///     .variables(vec!["2m_temperature".to_string()])
///     .start_date(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap())
///     .end_date(NaiveDate::from_ymd_opt(2023, 1, 31).unwrap())
///     .north(52.7)
///     .south(52.3)
///     .east(13.8)
///     .west(13.1)
///     .frequency(Frequency::Daily)
///     .call()
///     .await?;
/// println!("{}", result.aggregated);
/// # Ok(())
/// # }
/// ```
pub struct Climatab {
    pipeline: Pipeline,
    output_dir: PathBuf,
    // Downloaded grid files live here until the client is dropped.
    _scratch: Option<TempDir>,
}

#[bon]
impl Climatab {
    /// Creates a client from the `CDSAPI_URL` / `CDSAPI_KEY` environment
    /// variables, writing outputs to the current directory.
    ///
    /// # Errors
    ///
    /// Returns [`ClimatabError::Config`] when no key is configured, and an
    /// I/O error when the scratch directory cannot be created.
    pub async fn new() -> Result<Self, ClimatabError> {
        let config = CdsConfig::from_env().map_err(ClimatabError::Config)?;
        Self::with_config(config, PathBuf::from("."))
    }

    /// Creates a client with explicit credentials and output directory.
    pub fn with_config(config: CdsConfig, output_dir: PathBuf) -> Result<Self, ClimatabError> {
        let scratch = TempDir::new()
            .map_err(|e| ClimatabError::OutputDirCreation(std::env::temp_dir(), e))?;
        let retrieval: Arc<dyn Retrieval> = Arc::new(CdsClient::new(config, scratch.path()));
        Ok(Self {
            pipeline: Pipeline::new(retrieval),
            output_dir,
            _scratch: Some(scratch),
        })
    }

    /// Creates a client around any [`Retrieval`] implementation. Intended
    /// for tests and alternative archive backends.
    pub fn with_retrieval(retrieval: Arc<dyn Retrieval>, output_dir: PathBuf) -> Self {
        Self {
            pipeline: Pipeline::new(retrieval),
            output_dir,
            _scratch: None,
        }
    }

    /// Replaces the default retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.pipeline = self.pipeline.with_retry(retry);
        self
    }

    /// Attaches a progress sink; events mirror the log output.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.pipeline = self.pipeline.with_progress(progress);
        self
    }

    /// Downloads and aggregates data for a bounding box.
    ///
    /// This method uses a builder pattern.
    ///
    /// # Arguments
    ///
    /// * `.request_id(&str)`: **Required.** Names the output directory and files.
    /// * `.variables(Vec<String>)`: **Required.** Long archive variable names.
    /// * `.start_date(NaiveDate)` / `.end_date(NaiveDate)`: **Required.**
    /// * `.north(f64)` / `.south(f64)` / `.east(f64)` / `.west(f64)`: **Required.**
    /// * `.frequency(Frequency)`: Output frequency, hourly by default.
    /// * `.resolution(f64)`: Grid spacing in degrees, 0.25 by default.
    /// * `.pressure_levels(Vec<String>)`: Switches to the pressure-level dataset.
    /// * `.save_raw(bool)`: Also write the merged raw rows, on by default.
    #[builder]
    pub async fn era5ify_bbox(
        &self,
        #[builder(into)] request_id: String,
        variables: Vec<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        north: f64,
        south: f64,
        east: f64,
        west: f64,
        frequency: Option<Frequency>,
        resolution: Option<f64>,
        pressure_levels: Option<Vec<String>>,
        save_raw: Option<bool>,
    ) -> Result<RunResult, ClimatabError> {
        let bbox = crate::geometry::BoundingBox::new(north, south, east, west)?;
        self.run(RequestSpec {
            request_id,
            variables,
            start_date,
            end_date,
            frequency: frequency.unwrap_or(Frequency::Hourly),
            resolution: resolution.unwrap_or(DEFAULT_RESOLUTION),
            dataset: dataset_for(&pressure_levels),
            pressure_levels: pressure_levels.unwrap_or_default(),
            region: RegionSpec::BoundingBox(bbox),
            dist_features: vec![],
            save_raw: save_raw.unwrap_or(true),
        })
        .await
    }

    /// Downloads and aggregates data for the polygons of a GeoJSON value.
    ///
    /// Accepts a FeatureCollection, a single Feature, or a bare (Multi)Polygon.
    /// Grid cells outside the polygons are dropped; when `dist_features`
    /// names feature properties, rows are additionally grouped by them.
    #[builder]
    pub async fn era5ify_geojson(
        &self,
        #[builder(into)] request_id: String,
        variables: Vec<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        geojson: Value,
        frequency: Option<Frequency>,
        resolution: Option<f64>,
        pressure_levels: Option<Vec<String>>,
        dist_features: Option<Vec<String>>,
        save_raw: Option<bool>,
    ) -> Result<RunResult, ClimatabError> {
        self.run(RequestSpec {
            request_id,
            variables,
            start_date,
            end_date,
            frequency: frequency.unwrap_or(Frequency::Hourly),
            resolution: resolution.unwrap_or(DEFAULT_RESOLUTION),
            dataset: dataset_for(&pressure_levels),
            pressure_levels: pressure_levels.unwrap_or_default(),
            region: RegionSpec::GeoJson(geojson),
            dist_features: dist_features.unwrap_or_default(),
            save_raw: save_raw.unwrap_or(true),
        })
        .await
    }

    /// Downloads and aggregates data for a single coordinate, widened to a
    /// minimal box around the nearest grid cells.
    #[builder]
    pub async fn era5ify_point(
        &self,
        #[builder(into)] request_id: String,
        variables: Vec<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        lat: f64,
        lon: f64,
        frequency: Option<Frequency>,
        resolution: Option<f64>,
        pressure_levels: Option<Vec<String>>,
        save_raw: Option<bool>,
    ) -> Result<RunResult, ClimatabError> {
        self.run(RequestSpec {
            request_id,
            variables,
            start_date,
            end_date,
            frequency: frequency.unwrap_or(Frequency::Hourly),
            resolution: resolution.unwrap_or(DEFAULT_POINT_RESOLUTION),
            dataset: dataset_for(&pressure_levels),
            pressure_levels: pressure_levels.unwrap_or_default(),
            region: RegionSpec::Point { lat, lon },
            dist_features: vec![],
            save_raw: save_raw.unwrap_or(true),
        })
        .await
    }

    async fn run(&self, spec: RequestSpec) -> Result<RunResult, ClimatabError> {
        let outcome = self.pipeline.run(&spec).await?;
        let paths = output::write_outputs(
            &self.output_dir,
            &spec.request_id,
            spec.frequency,
            &outcome,
        )
        .await?;
        let PipelineOutcome {
            aggregated,
            unique_coords,
            empty_region,
            summary,
            ..
        } = outcome;
        Ok(RunResult {
            aggregated,
            unique_coords,
            empty_region,
            summary,
            paths,
        })
    }
}

fn dataset_for(pressure_levels: &Option<Vec<String>>) -> DatasetKind {
    match pressure_levels {
        Some(levels) if !levels.is_empty() => DatasetKind::PressureLevel,
        _ => DatasetKind::SingleLevel,
    }
}
