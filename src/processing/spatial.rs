//! Spatial filtering of merged grid tables against the resolved region.
//!
//! The archive only clips to a bounding box, so polygon regions keep grid
//! points outside the actual shape. Filtering tests each unique coordinate
//! pair once against the region's polygon features and joins the verdicts
//! back onto the full table, tagging every row with the feature it fell in.

use crate::processing::error::ProcessingError;
use crate::processing::loader::{LAT_COLUMN, LON_COLUMN};
use crate::region::{FeaturePredicate, ResolvedRegion};
use log::{debug, info};
use polars::prelude::*;

/// Column naming the polygon feature a row belongs to.
pub const FEATURE_COLUMN: &str = "feature";

/// A filtered chunk table plus the coordinate pairs that survived.
pub struct SpatialOutcome {
    pub filtered: DataFrame,
    pub unique_coords: DataFrame,
}

/// Applies the region's polygon filter to a merged grid table. Bounding-box
/// and point regions skip the polygon test entirely. An empty result is not
/// an error here; the orchestrator decides what an empty run means.
pub fn filter_region(
    frame: DataFrame,
    region: &ResolvedRegion,
) -> Result<SpatialOutcome, ProcessingError> {
    if region.skip_filter {
        let unique_coords = unique_coordinates(&frame)?;
        return Ok(SpatialOutcome {
            filtered: frame,
            unique_coords,
        });
    }

    let coords = unique_coordinates(&frame)?;
    let membership = feature_membership(&coords, &region.features)?;
    debug!(
        "{} of {} unique coordinate pairs fall inside the region",
        membership.height(),
        coords.height()
    );

    let on: Vec<Expr> = vec![col(LAT_COLUMN), col(LON_COLUMN)];
    let filtered = frame
        .lazy()
        .join(
            membership.lazy(),
            on.clone(),
            on,
            JoinArgs::new(JoinType::Inner),
        )
        .collect()?;
    info!("{} rows remain after spatial filtering", filtered.height());

    let unique_coords = unique_coordinates(&filtered)?;
    Ok(SpatialOutcome {
        filtered,
        unique_coords,
    })
}

/// Unique latitude/longitude pairs of a table, in first-seen order.
pub fn unique_coordinates(frame: &DataFrame) -> Result<DataFrame, ProcessingError> {
    let unique = frame
        .clone()
        .lazy()
        .select([col(LAT_COLUMN), col(LON_COLUMN)])
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()?;
    Ok(unique)
}

/// Tests every coordinate pair against every feature and returns one row per
/// covered (pair, feature) combination, carrying the feature label and its
/// distinguishing attributes. The schema is stable even with zero matches.
fn feature_membership(
    coords: &DataFrame,
    features: &[FeaturePredicate],
) -> Result<DataFrame, ProcessingError> {
    let lats = coords.column(LAT_COLUMN)?.f64()?;
    let lons = coords.column(LON_COLUMN)?.f64()?;

    // Attribute keys in first-appearance order across all features.
    let mut attr_keys: Vec<String> = Vec::new();
    for feature in features {
        for (key, _) in feature.attrs() {
            if !attr_keys.contains(key) {
                attr_keys.push(key.clone());
            }
        }
    }

    let mut out_lats: Vec<f64> = Vec::new();
    let mut out_lons: Vec<f64> = Vec::new();
    let mut out_labels: Vec<String> = Vec::new();
    let mut out_attrs: Vec<Vec<String>> = vec![Vec::new(); attr_keys.len()];

    for (lat, lon) in lats.into_iter().zip(lons) {
        let (Some(lat), Some(lon)) = (lat, lon) else {
            continue;
        };
        for feature in features {
            if !feature.covers(lat, lon) {
                continue;
            }
            out_lats.push(lat);
            out_lons.push(lon);
            out_labels.push(feature.label().to_string());
            for (slot, key) in out_attrs.iter_mut().zip(&attr_keys) {
                let value = feature
                    .attrs()
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default();
                slot.push(value);
            }
        }
    }

    let mut columns: Vec<Column> = vec![
        Column::new(LAT_COLUMN.into(), out_lats),
        Column::new(LON_COLUMN.into(), out_lons),
        Column::new(FEATURE_COLUMN.into(), out_labels),
    ];
    for (key, values) in attr_keys.iter().zip(out_attrs) {
        columns.push(Column::new(key.as_str().into(), values));
    }
    Ok(DataFrame::new(columns)?)
}
