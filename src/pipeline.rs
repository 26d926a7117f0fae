//! The end-to-end run: plan chunks, fetch each one with bounded retries,
//! merge and filter, then aggregate the whole range in one pass.

use crate::chunking::{self, ChunkDescriptor};
use crate::download::cds_client::{ChunkRequest, Retrieval};
use crate::error::ClimatabError;
use crate::processing::aggregate::{self, AggregationPlan};
use crate::processing::loader;
use crate::processing::spatial::{self, FEATURE_COLUMN};
use crate::region::{self, ResolvedRegion};
use crate::types::request::RequestSpec;
use log::{info, warn};
use polars::prelude::*;
use std::sync::Arc;
use std::time::Duration;

/// Bounded exponential backoff for chunk retrieval. One chunk gets at most
/// `max_attempts` tries; the delay doubles per failed attempt and is capped
/// at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Progress notifications for long runs.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Planned { chunks: usize },
    ChunkStarted { index: usize, total: usize },
    ChunkRetried { index: usize, attempt: u32, delay: Duration },
    ChunkCompleted { index: usize, rows: usize },
    Aggregating,
    Completed { rows: usize },
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

/// Default sink; progress still reaches the log.
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_event(&self, _event: &ProgressEvent) {}
}

/// The result of one run.
#[derive(Debug)]
pub struct PipelineOutcome {
    /// Aggregated table at the requested frequency.
    pub aggregated: DataFrame,
    /// The coordinate pairs that contributed, one row each.
    pub unique_coords: DataFrame,
    /// Merged filtered rows before temporal aggregation, when requested.
    pub raw: Option<DataFrame>,
    /// True when no grid cell fell inside the region; the tables carry the
    /// right schema but no rows.
    pub empty_region: bool,
    pub summary: RunSummary,
}

#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub chunks: usize,
    pub raw_rows: usize,
    pub aggregated_rows: usize,
    pub elapsed: Duration,
}

/// Drives retrieval, filtering, and aggregation for one request.
pub struct Pipeline {
    retrieval: Arc<dyn Retrieval>,
    retry: RetryPolicy,
    progress: Arc<dyn ProgressSink>,
}

impl Pipeline {
    pub fn new(retrieval: Arc<dyn Retrieval>) -> Self {
        Self {
            retrieval,
            retry: RetryPolicy::default(),
            progress: Arc::new(NoopProgress),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub async fn run(&self, spec: &RequestSpec) -> Result<PipelineOutcome, ClimatabError> {
        let started = std::time::Instant::now();
        spec.validate()?;
        let region = region::resolve(&spec.region, spec.resolution, &spec.dist_features)?;
        let chunks = chunking::plan(
            spec.start_date,
            spec.end_date,
            spec.frequency.uses_monthly_product(),
        )?;
        info!(
            "Request '{}': {} variable(s), {} to {}, {} chunk(s)",
            spec.request_id,
            spec.variables.len(),
            spec.start_date,
            spec.end_date,
            chunks.len()
        );
        self.progress.on_event(&ProgressEvent::Planned {
            chunks: chunks.len(),
        });

        let has_levels = !spec.pressure_levels.is_empty();
        let mut filtered_frames: Vec<DataFrame> = Vec::with_capacity(chunks.len());
        let mut coord_frames: Vec<DataFrame> = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            self.progress.on_event(&ProgressEvent::ChunkStarted {
                index: chunk.index,
                total: chunks.len(),
            });
            let request = self.chunk_request(spec, &region, chunk);
            let paths = self.fetch_with_retry(&request, chunk).await?;

            let region_for_task = region.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                let merged = loader::load_and_merge(&paths, has_levels)?;
                spatial::filter_region(merged, &region_for_task)
            })
            .await??;
            self.progress.on_event(&ProgressEvent::ChunkCompleted {
                index: chunk.index,
                rows: outcome.filtered.height(),
            });
            filtered_frames.push(outcome.filtered);
            coord_frames.push(outcome.unique_coords);
        }

        self.progress.on_event(&ProgressEvent::Aggregating);
        let combined = stack_frames(filtered_frames)?;
        let unique_coords = stack_unique(coord_frames)?;
        let raw_rows = combined.height();
        let empty_region = raw_rows == 0;
        if empty_region {
            warn!(
                "No grid cell of request '{}' falls inside the region; output will be empty",
                spec.request_id
            );
        }

        let group_columns = group_columns(&combined, &region, &spec.dist_features);
        let variables = spec.variables.clone();
        let frequency = spec.frequency;
        let raw = spec.save_raw.then(|| combined.clone());
        let aggregated = tokio::task::spawn_blocking(move || {
            aggregate::aggregate_by_frequency(
                combined,
                &AggregationPlan {
                    variables: &variables,
                    frequency,
                    has_pressure_levels: has_levels,
                    group_columns,
                },
            )
        })
        .await??;

        self.progress.on_event(&ProgressEvent::Completed {
            rows: aggregated.height(),
        });
        let summary = RunSummary {
            chunks: chunks.len(),
            raw_rows,
            aggregated_rows: aggregated.height(),
            elapsed: started.elapsed(),
        };
        Ok(PipelineOutcome {
            aggregated,
            unique_coords,
            raw,
            empty_region,
            summary,
        })
    }

    fn chunk_request(
        &self,
        spec: &RequestSpec,
        region: &ResolvedRegion,
        chunk: &ChunkDescriptor,
    ) -> ChunkRequest {
        ChunkRequest {
            chunk: chunk.clone(),
            variables: spec.variables.clone(),
            bbox: region.bbox,
            resolution: spec.resolution,
            dataset: spec.dataset,
            frequency: spec.frequency,
            pressure_levels: spec.pressure_levels.clone(),
            tag: format!("{}_chunk{}", spec.request_id, chunk.index),
        }
    }

    async fn fetch_with_retry(
        &self,
        request: &ChunkRequest,
        chunk: &ChunkDescriptor,
    ) -> Result<Vec<std::path::PathBuf>, ClimatabError> {
        let mut attempt = 1u32;
        loop {
            match self.retrieval.fetch(request).await {
                Ok(paths) => return Ok(paths),
                Err(error) if !error.is_retryable() => {
                    return Err(ClimatabError::RetrievalFailed {
                        chunk_index: chunk.index,
                        source: error,
                    });
                }
                Err(error) if attempt >= self.retry.max_attempts => {
                    return Err(ClimatabError::RetrievalExhausted {
                        chunk_index: chunk.index,
                        start: chunk.start,
                        end: chunk.end,
                        attempts: attempt,
                        source: error,
                    });
                }
                Err(error) => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "Chunk {} attempt {} failed ({error}); retrying in {delay:?}",
                        chunk.index, attempt
                    );
                    self.progress.on_event(&ProgressEvent::ChunkRetried {
                        index: chunk.index,
                        attempt,
                        delay,
                    });
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Stacks per-chunk tables into one. Chunks can disagree on column order or
/// carry columns another chunk lacks, so the concat is diagonal.
fn stack_frames(frames: Vec<DataFrame>) -> Result<DataFrame, ClimatabError> {
    let lazies: Vec<LazyFrame> = frames.into_iter().map(DataFrame::lazy).collect();
    let stacked = concat_lf_diagonal(lazies, UnionArgs::default())
        .map_err(crate::processing::ProcessingError::from)?
    .collect()
    .map_err(crate::processing::ProcessingError::from)?;
    Ok(stacked)
}

fn stack_unique(frames: Vec<DataFrame>) -> Result<DataFrame, ClimatabError> {
    let stacked = stack_frames(frames)?;
    let unique = stacked
        .lazy()
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()
        .map_err(crate::processing::ProcessingError::from)?;
    Ok(unique)
}

/// Group columns for aggregation: the feature label plus any requested
/// distinguishing attributes, when the polygon filter ran.
fn group_columns(
    combined: &DataFrame,
    region: &ResolvedRegion,
    dist_features: &[String],
) -> Vec<String> {
    if region.skip_filter {
        return vec![];
    }
    let mut columns = vec![FEATURE_COLUMN.to_string()];
    for name in dist_features {
        let present = combined
            .get_column_names()
            .iter()
            .any(|c| c.as_str() == name);
        if present {
            columns.push(name.clone());
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::error::RetrievalError;
    use crate::geometry::BoundingBox;
    use crate::processing::loader::{LAT_COLUMN, LON_COLUMN, TIME_COLUMN};
    use crate::region::RegionSpec;
    use crate::types::frequency::{DatasetKind, Frequency};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serves one pre-built parquet grid file per fetch, after a configured
    /// number of retryable failures.
    struct MockRetrieval {
        dir: TempDir,
        failures_before_success: u32,
        calls: AtomicU32,
        fatal: bool,
    }

    impl MockRetrieval {
        fn new(failures_before_success: u32, fatal: bool) -> Self {
            Self {
                dir: TempDir::new().unwrap(),
                failures_before_success,
                calls: AtomicU32::new(0),
                fatal,
            }
        }
    }

    #[async_trait]
    impl Retrieval for MockRetrieval {
        async fn fetch(&self, request: &ChunkRequest) -> Result<Vec<PathBuf>, RetrievalError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fatal {
                return Err(RetrievalError::BadRequest("rejected".into()));
            }
            if call < self.failures_before_success {
                return Err(RetrievalError::JobFailed {
                    job_id: "mock".to_string(),
                    message: "queue hiccup".to_string(),
                });
            }
            let hours = 24 * (request.chunk.end - request.chunk.start).num_days() + 24;
            let base = request
                .chunk
                .start
                .and_hms_opt(0, 0, 0)
                .unwrap()
                .and_utc()
                .timestamp_millis();
            let times: Vec<i64> = (0..hours).map(|h| base + h * 3_600_000).collect();
            let n = times.len();
            let mut frame = polars::df!(
                TIME_COLUMN => times,
                LAT_COLUMN => vec![1.0; n],
                LON_COLUMN => vec![1.0; n],
                "t2m" => vec![280.0; n],
            )
            .unwrap()
            .lazy()
            .with_column(
                col(TIME_COLUMN).cast(DataType::Datetime(TimeUnit::Milliseconds, None)),
            )
            .collect()
            .unwrap();
            let path = self.dir.path().join(format!("{}.parquet", request.tag));
            let file = std::fs::File::create(&path).unwrap();
            ParquetWriter::new(file).finish(&mut frame).unwrap();
            Ok(vec![path])
        }
    }

    fn spec(days: u32) -> RequestSpec {
        RequestSpec {
            request_id: "test".to_string(),
            variables: vec!["2m_temperature".to_string()],
            start_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2023, 1, days).unwrap(),
            frequency: Frequency::Daily,
            resolution: 0.25,
            dataset: DatasetKind::SingleLevel,
            pressure_levels: vec![],
            region: RegionSpec::BoundingBox(BoundingBox::new(2.0, 0.0, 2.0, 0.0).unwrap()),
            dist_features: vec![],
            save_raw: true,
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn runs_end_to_end_over_multiple_chunks() {
        let pipeline = Pipeline::new(Arc::new(MockRetrieval::new(0, false)));
        let outcome = pipeline.run(&spec(28)).await.unwrap();
        assert_eq!(outcome.summary.chunks, 2);
        assert_eq!(outcome.aggregated.height(), 28);
        assert!(!outcome.empty_region);
        assert_eq!(outcome.unique_coords.height(), 1);
        assert_eq!(outcome.raw.unwrap().height(), 28 * 24);
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let retrieval = Arc::new(MockRetrieval::new(2, false));
        let pipeline =
            Pipeline::new(retrieval.clone()).with_retry(fast_retry());
        let outcome = pipeline.run(&spec(10)).await.unwrap();
        assert_eq!(outcome.aggregated.height(), 10);
        assert_eq!(retrieval.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_the_attempt_budget() {
        let pipeline =
            Pipeline::new(Arc::new(MockRetrieval::new(99, false))).with_retry(fast_retry());
        let err = pipeline.run(&spec(10)).await.unwrap_err();
        assert!(matches!(
            err,
            ClimatabError::RetrievalExhausted { attempts: 3, .. }
        ));
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let retrieval = Arc::new(MockRetrieval::new(0, true));
        let pipeline = Pipeline::new(retrieval.clone()).with_retry(fast_retry());
        let err = pipeline.run(&spec(10)).await.unwrap_err();
        assert!(matches!(err, ClimatabError::RetrievalFailed { .. }));
        assert_eq!(retrieval.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_spec_fails_before_any_fetch() {
        let retrieval = Arc::new(MockRetrieval::new(0, false));
        let pipeline = Pipeline::new(retrieval.clone());
        let mut bad = spec(10);
        bad.variables.clear();
        assert!(matches!(
            pipeline.run(&bad).await.unwrap_err(),
            ClimatabError::EmptyVariableList
        ));
        assert_eq!(retrieval.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn progress_events_arrive_in_order() {
        struct Recorder(Mutex<Vec<String>>);
        impl ProgressSink for Recorder {
            fn on_event(&self, event: &ProgressEvent) {
                let name = match event {
                    ProgressEvent::Planned { .. } => "planned",
                    ProgressEvent::ChunkStarted { .. } => "started",
                    ProgressEvent::ChunkRetried { .. } => "retried",
                    ProgressEvent::ChunkCompleted { .. } => "completed",
                    ProgressEvent::Aggregating => "aggregating",
                    ProgressEvent::Completed { .. } => "done",
                };
                self.0.lock().unwrap().push(name.to_string());
            }
        }
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let pipeline = Pipeline::new(Arc::new(MockRetrieval::new(0, false)))
            .with_progress(recorder.clone());
        pipeline.run(&spec(10)).await.unwrap();
        let events = recorder.0.lock().unwrap().clone();
        assert_eq!(
            events,
            vec!["planned", "started", "completed", "aggregating", "done"]
        );
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let retry = RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
        };
        assert_eq!(retry.delay_for(1), Duration::from_secs(2));
        assert_eq!(retry.delay_for(2), Duration::from_secs(4));
        assert_eq!(retry.delay_for(3), Duration::from_secs(8));
        assert_eq!(retry.delay_for(4), Duration::from_secs(10));
        assert_eq!(retry.delay_for(5), Duration::from_secs(10));
    }
}
