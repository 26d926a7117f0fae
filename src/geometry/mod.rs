pub mod error;
pub mod geojson;
pub mod polygon;

pub use polygon::{BoundingBox, Polygon, PolygonFeature, Ring};
