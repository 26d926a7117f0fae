//! GeoJSON parsing for region input.
//!
//! Accepts a `FeatureCollection`, a single `Feature`, or a bare
//! `Polygon`/`MultiPolygon` geometry. Only polygonal geometries are kept;
//! other geometry types are rejected so a request cannot silently resolve to
//! an empty region.

use crate::geometry::error::RegionError;
use crate::geometry::polygon::{Polygon, PolygonFeature, Ring};
use serde_json::Value;

/// Parses GeoJSON into polygon features, pulling out the values of the
/// caller-named distinguishing properties for each feature.
pub fn parse_features(
    geojson: &Value,
    dist_features: &[String],
) -> Result<Vec<PolygonFeature>, RegionError> {
    let features = collect_raw_features(geojson)?;
    if features.is_empty() {
        return Err(RegionError::NoPolygonFeatures);
    }

    let mut out = Vec::with_capacity(features.len());
    for (index, (geometry, properties)) in features.iter().enumerate() {
        let label = feature_label(properties, index);
        let polygons = parse_geometry(geometry, &label)?;
        if polygons.is_empty() {
            continue;
        }
        let attrs = dist_features
            .iter()
            .map(|key| (key.clone(), property_string(properties, key)))
            .collect();
        out.push(PolygonFeature {
            label,
            polygons,
            attrs,
        });
    }

    if out.is_empty() {
        return Err(RegionError::NoPolygonFeatures);
    }
    Ok(out)
}

/// Flattens the accepted GeoJSON shapes into (geometry, properties) pairs.
fn collect_raw_features(geojson: &Value) -> Result<Vec<(Value, Value)>, RegionError> {
    match geojson.get("type").and_then(Value::as_str) {
        Some("FeatureCollection") => {
            let features = geojson
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    RegionError::InvalidGeoJson("FeatureCollection without features array".into())
                })?;
            features.iter().map(split_feature).collect()
        }
        Some("Feature") => Ok(vec![split_feature(geojson)?]),
        Some("Polygon") | Some("MultiPolygon") => {
            Ok(vec![(geojson.clone(), Value::Null)])
        }
        Some(other) => Err(RegionError::InvalidGeoJson(format!(
            "unsupported GeoJSON type '{other}'"
        ))),
        None => Err(RegionError::InvalidGeoJson("missing 'type' field".into())),
    }
}

fn split_feature(feature: &Value) -> Result<(Value, Value), RegionError> {
    let geometry = feature
        .get("geometry")
        .cloned()
        .ok_or_else(|| RegionError::InvalidGeoJson("feature without geometry".into()))?;
    let properties = feature.get("properties").cloned().unwrap_or(Value::Null);
    Ok((geometry, properties))
}

fn feature_label(properties: &Value, index: usize) -> String {
    for key in ["name", "NAME", "id", "ID"] {
        if let Some(v) = properties.get(key) {
            match v {
                Value::String(s) if !s.is_empty() => return s.clone(),
                Value::Number(n) => return n.to_string(),
                _ => {}
            }
        }
    }
    format!("feature_{index}")
}

fn property_string(properties: &Value, key: &str) -> String {
    match properties.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn parse_geometry(geometry: &Value, label: &str) -> Result<Vec<Polygon>, RegionError> {
    match geometry.get("type").and_then(Value::as_str) {
        Some("Polygon") => {
            let rings = geometry
                .get("coordinates")
                .ok_or_else(|| RegionError::InvalidGeoJson("polygon without coordinates".into()))?;
            Ok(vec![parse_polygon(rings, label)?])
        }
        Some("MultiPolygon") => {
            let polys = geometry
                .get("coordinates")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    RegionError::InvalidGeoJson("multipolygon without coordinates".into())
                })?;
            polys.iter().map(|p| parse_polygon(p, label)).collect()
        }
        Some(other) => Err(RegionError::InvalidGeoJson(format!(
            "feature '{label}' has non-polygonal geometry '{other}'"
        ))),
        None => Err(RegionError::InvalidGeoJson(format!(
            "feature '{label}' geometry is missing its type"
        ))),
    }
}

fn parse_polygon(rings: &Value, label: &str) -> Result<Polygon, RegionError> {
    let rings = rings
        .as_array()
        .ok_or_else(|| RegionError::InvalidGeoJson("polygon coordinates must be arrays".into()))?;
    if rings.is_empty() {
        return Err(RegionError::InvalidGeoJson(format!(
            "feature '{label}' polygon has no rings"
        )));
    }
    let mut parsed = rings
        .iter()
        .map(|ring| Ring::new(parse_ring_vertices(ring)?, label))
        .collect::<Result<Vec<_>, _>>()?;
    let exterior = parsed.remove(0);
    Ok(Polygon::new(exterior, parsed))
}

fn parse_ring_vertices(ring: &Value) -> Result<Vec<(f64, f64)>, RegionError> {
    let positions = ring
        .as_array()
        .ok_or_else(|| RegionError::InvalidGeoJson("ring must be an array of positions".into()))?;
    positions
        .iter()
        .map(|pos| {
            let coords = pos.as_array().ok_or_else(|| {
                RegionError::InvalidGeoJson("position must be a [lon, lat] array".into())
            })?;
            let lon = coords.first().and_then(Value::as_f64);
            let lat = coords.get(1).and_then(Value::as_f64);
            match (lon, lat) {
                (Some(lon), Some(lat)) => Ok((lon, lat)),
                _ => Err(RegionError::InvalidGeoJson(
                    "position must contain numeric lon and lat".into(),
                )),
            }
        })
        .collect()
}
