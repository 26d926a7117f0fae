//! Turning downloaded grid files into the final aggregated table: merge,
//! spatial filter, then class-aware temporal aggregation.

pub mod aggregate;
pub mod error;
pub mod loader;
pub mod spatial;

pub use error::ProcessingError;
