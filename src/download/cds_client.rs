//! Retrieval client for the Climate Data Store (CDS) archive.
//!
//! The pipeline only depends on the [`Retrieval`] trait: hand one chunk
//! request in, get local grid files back, or a failure the orchestrator can
//! classify as retryable or fatal. [`CdsClient`] is the production
//! implementation speaking the CDS job protocol: submit, poll until the
//! archive's queue finishes the job, then stream every result asset to a
//! scratch directory.

use crate::chunking::ChunkDescriptor;
use crate::download::error::RetrievalError;
use crate::geometry::BoundingBox;
use crate::types::frequency::{DatasetKind, Frequency};
use async_trait::async_trait;
use chrono::{Datelike, Duration as ChronoDuration};
use futures_util::TryStreamExt;
use log::{debug, info, warn};
use reqwest::Client;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

/// One chunk's retrieval parameters, fully resolved.
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    pub chunk: ChunkDescriptor,
    /// Long archive variable names.
    pub variables: Vec<String>,
    pub bbox: BoundingBox,
    pub resolution: f64,
    pub dataset: DatasetKind,
    pub frequency: Frequency,
    pub pressure_levels: Vec<String>,
    /// Names the downloaded files; request id plus a chunk suffix.
    pub tag: String,
}

impl ChunkRequest {
    pub fn dataset_id(&self) -> &'static str {
        self.dataset.dataset_id(self.frequency)
    }

    /// The archive's request body: exploded year/month/day lists covering
    /// the chunk's date range, the area clip, and the grid resolution.
    pub fn request_body(&self) -> Value {
        let mut years: Vec<String> = Vec::new();
        let mut months: Vec<String> = Vec::new();
        let mut days: Vec<String> = Vec::new();
        let mut current = self.chunk.start;
        while current <= self.chunk.end {
            let year = current.year().to_string();
            let month = format!("{:02}", current.month());
            let day = format!("{:02}", current.day());
            if !years.contains(&year) {
                years.push(year);
            }
            if !months.contains(&month) {
                months.push(month);
            }
            if !days.contains(&day) {
                days.push(day);
            }
            current += ChronoDuration::days(1);
        }

        let area = json!([self.bbox.north, self.bbox.west, self.bbox.south, self.bbox.east]);
        let grid = json!([self.resolution, self.resolution]);

        let mut body = if self.chunk.monthly_product {
            json!({
                "product_type": ["monthly_averaged_reanalysis"],
                "variable": self.variables,
                "year": years,
                "month": months,
                "time": ["00:00"],
                "area": area,
                "grid": grid,
                "data_format": "csv",
                "download_format": "unarchived",
            })
        } else {
            let hours: Vec<String> = (0..24).map(|h| format!("{h:02}:00")).collect();
            json!({
                "product_type": ["reanalysis"],
                "variable": self.variables,
                "year": years,
                "month": months,
                "day": days,
                "time": hours,
                "area": area,
                "grid": grid,
                "data_format": "csv",
                "download_format": "unarchived",
            })
        };
        if self.dataset == DatasetKind::PressureLevel {
            body["pressure_level"] = json!(self.pressure_levels);
        }
        body
    }
}

/// The retrieval collaborator boundary.
///
/// Implementations fetch the grid files for one chunk. Each call is one
/// attempt; retry policy lives in the orchestrator, never here.
#[async_trait]
pub trait Retrieval: Send + Sync {
    async fn fetch(&self, request: &ChunkRequest) -> Result<Vec<PathBuf>, RetrievalError>;
}

/// CDS endpoint and credentials, in the shape of a `.cdsapirc` entry.
#[derive(Debug, Clone)]
pub struct CdsConfig {
    pub url: String,
    pub key: String,
}

impl CdsConfig {
    pub const DEFAULT_URL: &'static str = "https://cds.climate.copernicus.eu/api";

    /// Reads `CDSAPI_URL` / `CDSAPI_KEY` from the environment.
    pub fn from_env() -> Result<Self, RetrievalError> {
        let url = std::env::var("CDSAPI_URL").unwrap_or_else(|_| Self::DEFAULT_URL.to_string());
        let key = std::env::var("CDSAPI_KEY").map_err(|_| {
            RetrievalError::Credentials(
                "CDSAPI_KEY is not set; create an account at the CDS and export your key"
                    .to_string(),
            )
        })?;
        Ok(Self { url, key })
    }
}

/// Production retrieval client for the CDS archive.
pub struct CdsClient {
    config: CdsConfig,
    http: Client,
    scratch_dir: PathBuf,
    poll_interval: Duration,
    attempt_timeout: Duration,
}

impl CdsClient {
    /// `scratch_dir` receives the downloaded grid files; the caller owns its
    /// lifetime (the pipeline uses a [`tempfile::TempDir`]).
    pub fn new(config: CdsConfig, scratch_dir: &Path) -> Self {
        Self {
            config,
            http: Client::new(),
            scratch_dir: scratch_dir.to_path_buf(),
            poll_interval: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(60 * 60),
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    async fn submit(&self, request: &ChunkRequest) -> Result<String, RetrievalError> {
        let url = format!(
            "{}/retrieve/v1/processes/{}/execution",
            self.config.url,
            request.dataset_id()
        );
        info!(
            "Submitting chunk {} ({} to {}) to {}",
            request.chunk.index, request.chunk.start, request.chunk.end, url
        );
        let response = self
            .http
            .post(&url)
            .header("PRIVATE-TOKEN", &self.config.key)
            .json(&json!({ "inputs": request.request_body() }))
            .send()
            .await
            .map_err(|e| RetrievalError::NetworkRequest(url.clone(), e))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(RetrievalError::Credentials(format!(
                "archive returned {status} for {url}"
            )));
        }
        if status == reqwest::StatusCode::BAD_REQUEST {
            let detail = response.text().await.unwrap_or_default();
            return Err(RetrievalError::BadRequest(detail));
        }
        let response = response.error_for_status().map_err(|e| {
            warn!("HTTP error for {url}: {e:?}");
            RetrievalError::HttpStatus {
                url: url.clone(),
                status,
                source: e,
            }
        })?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| RetrievalError::NetworkRequest(url.clone(), e))?;
        body.get("jobID")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RetrievalError::Protocol("submission response without jobID".into()))
    }

    async fn wait_for_job(&self, job_id: &str) -> Result<Value, RetrievalError> {
        let status_url = format!("{}/retrieve/v1/jobs/{}", self.config.url, job_id);
        loop {
            let body: Value = self
                .get_json(&status_url)
                .await?;
            match body.get("status").and_then(Value::as_str) {
                Some("successful") => break,
                Some("failed") | Some("dismissed") => {
                    let message = body
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("no detail")
                        .to_string();
                    return Err(RetrievalError::JobFailed {
                        job_id: job_id.to_string(),
                        message,
                    });
                }
                Some(other) => {
                    debug!("Job {job_id} status: {other}");
                    tokio::time::sleep(self.poll_interval).await;
                }
                None => {
                    return Err(RetrievalError::Protocol(
                        "job status response without status field".into(),
                    ))
                }
            }
        }
        let results_url = format!("{}/retrieve/v1/jobs/{}/results", self.config.url, job_id);
        self.get_json(&results_url).await
    }

    async fn get_json(&self, url: &str) -> Result<Value, RetrievalError> {
        let response = self
            .http
            .get(url)
            .header("PRIVATE-TOKEN", &self.config.key)
            .send()
            .await
            .map_err(|e| RetrievalError::NetworkRequest(url.to_string(), e))?;
        let status = response.status();
        let response = response
            .error_for_status()
            .map_err(|e| RetrievalError::HttpStatus {
                url: url.to_string(),
                status,
                source: e,
            })?;
        response
            .json()
            .await
            .map_err(|e| RetrievalError::NetworkRequest(url.to_string(), e))
    }

    async fn download_asset(
        &self,
        href: &str,
        destination: &Path,
    ) -> Result<(), RetrievalError> {
        let response = self
            .http
            .get(href)
            .header("PRIVATE-TOKEN", &self.config.key)
            .send()
            .await
            .map_err(|e| RetrievalError::NetworkRequest(href.to_string(), e))?;
        let status = response.status();
        let response = response
            .error_for_status()
            .map_err(|e| RetrievalError::HttpStatus {
                url: href.to_string(),
                status,
                source: e,
            })?;

        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        let mut reader = StreamReader::new(stream);
        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(|e| RetrievalError::DownloadIo(destination.to_path_buf(), e))?;
        tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        info!("Downloaded {} to {}", href, destination.display());
        Ok(())
    }
}

/// File extension for a downloaded asset, from the link when it carries
/// one. Assets without an extension are the requested tabular delivery.
pub(crate) fn asset_extension(href: &str) -> &str {
    Path::new(href)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("csv")
}

/// Pulls result-asset download links out of a CDS results document. The
/// archive answers with either a single `asset` object or an `assets` list.
pub(crate) fn extract_asset_hrefs(results: &Value) -> Vec<String> {
    let mut hrefs = Vec::new();
    if let Some(href) = results
        .pointer("/asset/value/href")
        .and_then(Value::as_str)
    {
        hrefs.push(href.to_string());
    }
    if let Some(assets) = results.get("assets").and_then(Value::as_array) {
        for asset in assets {
            if let Some(href) = asset
                .pointer("/value/href")
                .or_else(|| asset.get("href"))
                .and_then(Value::as_str)
            {
                hrefs.push(href.to_string());
            }
        }
    }
    hrefs
}

#[async_trait]
impl Retrieval for CdsClient {
    async fn fetch(&self, request: &ChunkRequest) -> Result<Vec<PathBuf>, RetrievalError> {
        let attempt = async {
            let job_id = self.submit(request).await?;
            let results = self.wait_for_job(&job_id).await?;
            let hrefs = extract_asset_hrefs(&results);
            if hrefs.is_empty() {
                return Err(RetrievalError::NoResults);
            }
            let mut paths = Vec::with_capacity(hrefs.len());
            for (i, href) in hrefs.iter().enumerate() {
                let destination = self
                    .scratch_dir
                    .join(format!("{}_{}.{}", request.tag, i, asset_extension(href)));
                self.download_asset(href, &destination).await?;
                paths.push(destination);
            }
            Ok(paths)
        };
        tokio::time::timeout(self.attempt_timeout, attempt)
            .await
            .map_err(|_| RetrievalError::AttemptTimeout(self.attempt_timeout.as_secs()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn request(start: (i32, u32, u32), end: (i32, u32, u32), monthly: bool) -> ChunkRequest {
        ChunkRequest {
            chunk: ChunkDescriptor {
                index: 0,
                start: NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
                end: NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
                monthly_product: monthly,
            },
            variables: vec!["2m_temperature".to_string()],
            bbox: BoundingBox::new(50.0, 40.0, 10.0, 0.0).unwrap(),
            resolution: 0.25,
            dataset: DatasetKind::SingleLevel,
            frequency: if monthly {
                Frequency::Monthly
            } else {
                Frequency::Daily
            },
            pressure_levels: vec![],
            tag: "t1_chunk0".to_string(),
        }
    }

    #[test]
    fn hourly_body_lists_every_day_and_hour() {
        let body = request((2023, 1, 30), (2023, 2, 2), false).request_body();
        assert_eq!(body["year"], json!(["2023"]));
        assert_eq!(body["month"], json!(["01", "02"]));
        assert_eq!(body["day"], json!(["30", "31", "01", "02"]));
        assert_eq!(body["time"].as_array().unwrap().len(), 24);
        assert_eq!(body["area"], json!([50.0, 0.0, 40.0, 10.0]));
        assert_eq!(body["product_type"], json!(["reanalysis"]));
        assert_eq!(body["data_format"], json!("csv"));
        assert_eq!(body["download_format"], json!("unarchived"));
    }

    #[test]
    fn monthly_body_has_no_day_list() {
        let body = request((2022, 11, 1), (2023, 2, 28), true).request_body();
        assert_eq!(body["year"], json!(["2022", "2023"]));
        assert_eq!(body["month"], json!(["11", "12", "01", "02"]));
        assert!(body.get("day").is_none());
        assert_eq!(body["time"], json!(["00:00"]));
        assert_eq!(body["product_type"], json!(["monthly_averaged_reanalysis"]));
    }

    #[test]
    fn pressure_levels_are_included_when_present() {
        let mut req = request((2023, 1, 1), (2023, 1, 2), false);
        req.dataset = DatasetKind::PressureLevel;
        req.pressure_levels = vec!["500".to_string(), "850".to_string()];
        let body = req.request_body();
        assert_eq!(body["pressure_level"], json!(["500", "850"]));
        assert_eq!(req.dataset_id(), "reanalysis-era5-pressure-levels");
    }

    #[test]
    fn downloaded_assets_keep_a_loadable_extension() {
        assert_eq!(asset_extension("https://x/results/a.csv"), "csv");
        assert_eq!(asset_extension("https://x/results/a.parquet"), "parquet");
        // Bare download links get the extension of the requested delivery.
        assert_eq!(asset_extension("https://x/results/0191-abcd"), "csv");
    }

    #[test]
    fn asset_hrefs_from_single_and_list_shapes() {
        let single = json!({ "asset": { "value": { "href": "https://x/y.nc" } } });
        assert_eq!(extract_asset_hrefs(&single), vec!["https://x/y.nc"]);

        let list = json!({ "assets": [
            { "value": { "href": "https://x/a.nc" } },
            { "href": "https://x/b.nc" }
        ]});
        assert_eq!(
            extract_asset_hrefs(&list),
            vec!["https://x/a.nc", "https://x/b.nc"]
        );

        assert!(extract_asset_hrefs(&json!({})).is_empty());
    }
}
