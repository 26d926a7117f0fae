//! Resolves any supported region input into the canonical form the pipeline
//! works with: one bounding box for the retrieval request, plus one
//! membership predicate per named feature for the spatial filter.

use crate::geometry::error::RegionError;
use crate::geometry::geojson;
use crate::geometry::polygon::{BoundingBox, PolygonFeature};
use log::debug;
use serde_json::Value;

/// Point mode widens the coordinate into a box of at least this half-width
/// in degrees, so at least one grid cell of the archive's native grid falls
/// inside regardless of the requested resolution.
pub const MIN_POINT_HALF_WIDTH: f64 = 0.06;

/// Region input, one of the three supported shapes.
#[derive(Debug, Clone)]
pub enum RegionSpec {
    /// Explicit bounding box; the archive clips to it, so no spatial
    /// filtering is needed afterwards.
    BoundingBox(BoundingBox),
    /// Single coordinate, widened to a minimal box around the nearest grid
    /// cell.
    Point { lat: f64, lon: f64 },
    /// GeoJSON polygon feature(s); rows outside the polygons are filtered
    /// out after retrieval.
    GeoJson(Value),
}

/// Membership test for one region feature, tagged with the feature's
/// distinguishing attribute values.
#[derive(Debug, Clone)]
pub enum FeaturePredicate {
    /// Every grid cell of the retrieved box belongs to the region.
    AcceptAll,
    /// Boundary-inclusive polygon containment.
    Feature(PolygonFeature),
}

impl FeaturePredicate {
    pub fn covers(&self, lat: f64, lon: f64) -> bool {
        match self {
            FeaturePredicate::AcceptAll => true,
            FeaturePredicate::Feature(feature) => feature.covers(lon, lat),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            FeaturePredicate::AcceptAll => "region",
            FeaturePredicate::Feature(feature) => &feature.label,
        }
    }

    pub fn attrs(&self) -> &[(String, String)] {
        match self {
            FeaturePredicate::AcceptAll => &[],
            FeaturePredicate::Feature(feature) => &feature.attrs,
        }
    }
}

/// Canonical resolved region: retrieval box plus per-feature predicates.
#[derive(Debug, Clone)]
pub struct ResolvedRegion {
    pub bbox: BoundingBox,
    pub features: Vec<FeaturePredicate>,
    /// Set in bounding-box and point mode: the retrieved grid already
    /// matches the region, so the spatial-filter stage is a pass-through.
    pub skip_filter: bool,
}

/// Resolves a region spec against the requested grid resolution.
///
/// `dist_features` names the GeoJSON properties whose values are carried
/// through as extra aggregation-group keys; it is ignored for bounding-box
/// and point input.
pub fn resolve(
    spec: &RegionSpec,
    resolution: f64,
    dist_features: &[String],
) -> Result<ResolvedRegion, RegionError> {
    match spec {
        RegionSpec::BoundingBox(bbox) => {
            // Re-validate: the struct can be built with raw literals.
            let bbox = BoundingBox::new(bbox.north, bbox.south, bbox.east, bbox.west)?;
            Ok(ResolvedRegion {
                bbox,
                features: vec![FeaturePredicate::AcceptAll],
                skip_filter: true,
            })
        }
        RegionSpec::Point { lat, lon } => {
            if !(-90.0..=90.0).contains(lat) || !(-180.0..=180.0).contains(lon) {
                return Err(RegionError::InvalidCoordinates {
                    lat: *lat,
                    lon: *lon,
                });
            }
            let half = (resolution / 2.0).max(MIN_POINT_HALF_WIDTH);
            // Longitudes right on the antimeridian are nudged inside so the
            // box does not wrap.
            let lon = lon.clamp(-179.9, 179.9);
            let bbox = BoundingBox::new(
                (lat + half).min(90.0),
                (lat - half).max(-90.0),
                lon + half,
                lon - half,
            )?;
            debug!(
                "Point ({lat:.4}, {lon:.4}) widened to box {:.4}/{:.4}/{:.4}/{:.4}",
                bbox.north, bbox.south, bbox.east, bbox.west
            );
            Ok(ResolvedRegion {
                bbox,
                features: vec![FeaturePredicate::AcceptAll],
                skip_filter: true,
            })
        }
        RegionSpec::GeoJson(value) => {
            let features = geojson::parse_features(value, dist_features)?;
            let mut boxes = features.iter().map(PolygonFeature::bounding_box);
            let first = boxes.next().ok_or(RegionError::NoPolygonFeatures)?;
            let bbox = boxes
                .fold(first, |acc, b| acc.union(&b))
                .snap_outward(resolution);
            debug!(
                "Resolved {} polygon feature(s) to box {:.4}/{:.4}/{:.4}/{:.4}",
                features.len(),
                bbox.north,
                bbox.south,
                bbox.east,
                bbox.west
            );
            Ok(ResolvedRegion {
                bbox,
                features: features.into_iter().map(FeaturePredicate::Feature).collect(),
                skip_filter: false,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bbox_mode_skips_filtering() {
        let bbox = BoundingBox::new(10.0, 5.0, 20.0, 15.0).unwrap();
        let region = resolve(&RegionSpec::BoundingBox(bbox), 0.25, &[]).unwrap();
        assert!(region.skip_filter);
        assert_eq!(region.features.len(), 1);
        assert!(region.features[0].covers(7.0, 17.0));
    }

    #[test]
    fn inverted_bbox_is_rejected() {
        let bbox = BoundingBox {
            north: 5.0,
            south: 10.0,
            east: 20.0,
            west: 15.0,
        };
        assert!(matches!(
            resolve(&RegionSpec::BoundingBox(bbox), 0.25, &[]),
            Err(RegionError::InvalidBoundingBox { .. })
        ));
    }

    #[test]
    fn point_mode_widens_to_minimum_box() {
        let region = resolve(
            &RegionSpec::Point {
                lat: 52.52,
                lon: 13.40,
            },
            0.1,
            &[],
        )
        .unwrap();
        assert!(region.skip_filter);
        // half-width floor of 0.06 wins over resolution/2 = 0.05
        assert!((region.bbox.north - 52.58).abs() < 1e-9);
        assert!((region.bbox.west - 13.34).abs() < 1e-9);
    }

    #[test]
    fn point_near_antimeridian_is_nudged() {
        let region = resolve(
            &RegionSpec::Point {
                lat: 0.0,
                lon: 180.0,
            },
            0.25,
            &[],
        )
        .unwrap();
        assert!(region.bbox.east <= 180.0 + 0.125);
        assert!(region.bbox.west < region.bbox.east);
    }

    #[test]
    fn out_of_range_point_is_rejected() {
        assert!(resolve(
            &RegionSpec::Point {
                lat: 95.0,
                lon: 0.0
            },
            0.25,
            &[]
        )
        .is_err());
    }

    #[test]
    fn geojson_mode_unions_feature_boxes() {
        let geojson = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": { "name": "west" },
                    "geometry": { "type": "Polygon", "coordinates": [[
                        [0.1, 0.1], [1.1, 0.1], [1.1, 1.1], [0.1, 1.1], [0.1, 0.1]
                    ]]}
                },
                {
                    "type": "Feature",
                    "properties": { "name": "east" },
                    "geometry": { "type": "Polygon", "coordinates": [[
                        [3.1, 0.1], [4.1, 0.1], [4.1, 1.1], [3.1, 1.1], [3.1, 0.1]
                    ]]}
                }
            ]
        });
        let region = resolve(&RegionSpec::GeoJson(geojson), 0.25, &[]).unwrap();
        assert!(!region.skip_filter);
        assert_eq!(region.features.len(), 2);
        // snapped outward to the 0.25 grid
        assert_eq!(region.bbox.west, 0.0);
        assert_eq!(region.bbox.east, 4.25);
        assert!(region.features[0].covers(0.5, 0.5));
        assert!(!region.features[0].covers(0.5, 3.5));
    }
}
