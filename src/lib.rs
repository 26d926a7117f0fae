mod chunking;
mod climatab;
mod download;
mod error;
mod geometry;
mod output;
mod pipeline;
mod processing;
mod region;
mod types;
mod variables;

pub use climatab::*;
pub use error::ClimatabError;

pub use download::cds_client::{CdsClient, CdsConfig, ChunkRequest, Retrieval};
pub use download::error::RetrievalError;
pub use geometry::error::RegionError;
pub use geometry::{BoundingBox, Polygon, PolygonFeature, Ring};
pub use output::OutputPaths;
pub use pipeline::{
    NoopProgress, Pipeline, PipelineOutcome, ProgressEvent, ProgressSink, RetryPolicy, RunSummary,
};
pub use processing::ProcessingError;
pub use region::{FeaturePredicate, RegionSpec, ResolvedRegion};
pub use types::frequency::{DatasetKind, Frequency};
pub use types::request::RequestSpec;
pub use variables::{
    classify, describe_variable, search_variables, VariableClass, VariableInfo,
};

pub use chunking::{plan as plan_chunks, ChunkDescriptor};
