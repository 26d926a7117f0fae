use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegionError {
    #[error("Invalid bounding box: south ({south}) must be below north ({north}) and west ({west}) below east ({east})")]
    InvalidBoundingBox {
        north: f64,
        south: f64,
        east: f64,
        west: f64,
    },

    #[error("Invalid coordinates: latitude {lat} must be in [-90, 90], longitude {lon} in [-180, 180]")]
    InvalidCoordinates { lat: f64, lon: f64 },

    #[error("Degenerate polygon ring in feature '{feature}': {reason}")]
    DegenerateRing { feature: String, reason: String },

    #[error("Invalid GeoJSON: {0}")]
    InvalidGeoJson(String),

    #[error("GeoJSON contains no polygon features")]
    NoPolygonFeatures,

    #[error("Failed to parse GeoJSON")]
    GeoJsonParse(#[from] serde_json::Error),
}
