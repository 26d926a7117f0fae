//! Merges the grid files of one chunk into a single long-form table.
//!
//! The archive splits a request over several files when variables come from
//! different streams, so a chunk arrives as one or more tables sharing the
//! coordinate columns. Merging joins them on those coordinates, drops the
//! archive's bookkeeping columns, and deduplicates rows that appear in more
//! than one file.

use crate::processing::error::ProcessingError;
use log::{debug, warn};
use polars::prelude::*;
use std::path::{Path, PathBuf};

pub const TIME_COLUMN: &str = "valid_time";
pub const LAT_COLUMN: &str = "latitude";
pub const LON_COLUMN: &str = "longitude";
pub const LEVEL_COLUMN: &str = "pressure_level";

/// Columns the archive attaches that carry no data.
const BOOKKEEPING_COLUMNS: [&str; 2] = ["number", "expver"];

/// Coordinate columns every grid table must carry.
pub fn key_columns(has_pressure_levels: bool) -> Vec<&'static str> {
    let mut keys = vec![TIME_COLUMN, LAT_COLUMN, LON_COLUMN];
    if has_pressure_levels {
        keys.push(LEVEL_COLUMN);
    }
    keys
}

/// Loads every grid file of a chunk and merges them into one table keyed by
/// the coordinate columns. Returns [`ProcessingError::EmptyGrid`] when the
/// merged table has no rows.
pub fn load_and_merge(
    paths: &[PathBuf],
    has_pressure_levels: bool,
) -> Result<DataFrame, ProcessingError> {
    let keys = key_columns(has_pressure_levels);

    let mut merged: Option<DataFrame> = None;
    for path in paths {
        let frame = load_grid_file(path, &keys)?;
        debug!(
            "Loaded {} rows x {} columns from {}",
            frame.height(),
            frame.width(),
            path.display()
        );
        merged = Some(match merged {
            None => frame,
            Some(acc) => merge_pair(acc, frame, &keys)?,
        });
    }

    let merged = merged.ok_or(ProcessingError::EmptyGrid)?;
    let key_names: Vec<PlSmallStr> = keys.iter().map(|k| PlSmallStr::from_str(k)).collect();
    let sort_names: Vec<PlSmallStr> = key_names.clone();
    let result = merged
        .lazy()
        .unique_stable(Some(key_names), UniqueKeepStrategy::First)
        .sort(sort_names, SortMultipleOptions::default())
        .collect()?;
    if result.height() == 0 {
        return Err(ProcessingError::EmptyGrid);
    }
    Ok(result)
}

fn load_grid_file(path: &Path, keys: &[&str]) -> Result<DataFrame, ProcessingError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let lazy = match extension.as_str() {
        "parquet" => LazyFrame::scan_parquet(path, ScanArgsParquet::default())?,
        "csv" => LazyCsvReader::new(path)
            .with_has_header(true)
            .with_try_parse_dates(true)
            .finish()?,
        other => {
            return Err(ProcessingError::UnsupportedGridFormat {
                path: path.to_path_buf(),
                extension: other.to_string(),
            })
        }
    };
    let mut frame = lazy.collect()?;

    // Monthly products label the time coordinate differently.
    let time_source = ["time", "date"]
        .into_iter()
        .find(|alias| !has_column(&frame, TIME_COLUMN) && has_column(&frame, alias));

    for key in keys {
        if *key == TIME_COLUMN && time_source.is_some() {
            continue;
        }
        if !has_column(&frame, key) {
            return Err(ProcessingError::MissingColumn {
                path: path.to_path_buf(),
                column: key.to_string(),
            });
        }
    }

    let mut drop_columns: Vec<PlSmallStr> = Vec::new();
    for column in BOOKKEEPING_COLUMNS {
        if has_column(&frame, column) {
            drop_columns.push(column.into());
        }
    }
    if !drop_columns.is_empty() {
        warn!("Dropping bookkeeping columns: {drop_columns:?}");
        frame = frame.drop_many(drop_columns);
    }

    // Per-file dedup keeps rows duplicated across experiment versions from
    // inflating the merge join. Renaming the time alias must happen inside
    // the lazy plan; a DataFrame::rename beforehand leaves the plan's
    // cached schema pointing at the old name.
    let key_names: Vec<PlSmallStr> = keys.iter().map(|k| PlSmallStr::from_str(k)).collect();
    let mut lazy = frame.lazy();
    if let Some(alias) = time_source {
        lazy = lazy.rename([alias], [TIME_COLUMN], true);
    }
    let frame = lazy
        .with_column(col(TIME_COLUMN).cast(DataType::Datetime(TimeUnit::Milliseconds, None)))
        .unique_stable(Some(key_names), UniqueKeepStrategy::First)
        .collect()?;
    Ok(frame)
}

/// Joins two grid tables on the coordinate columns. Data columns already in
/// the left table are dropped from the right before joining, so the first
/// file to carry a variable wins.
fn merge_pair(
    left: DataFrame,
    right: DataFrame,
    keys: &[&str],
) -> Result<DataFrame, ProcessingError> {
    let fresh: Vec<Expr> = right
        .get_column_names()
        .iter()
        .filter(|name| keys.contains(&name.as_str()) || !has_column(&left, name.as_str()))
        .map(|name| col(name.as_str()))
        .collect();
    if fresh.len() == keys.len() {
        // Nothing new in the right table; keep rows it may add.
        let key_exprs: Vec<Expr> = keys.iter().map(|k| col(*k)).collect();
        let stacked = concat_lf_diagonal(
            [left.lazy(), right.lazy().select(key_exprs)],
            UnionArgs::default(),
        )?;
        return Ok(stacked.collect()?);
    }

    let left_rows = left.height();
    let right_rows = right.height();
    let key_exprs: Vec<Expr> = keys.iter().map(|k| col(*k)).collect();
    let joined = left
        .lazy()
        .join(
            right.lazy().select(fresh),
            key_exprs.clone(),
            key_exprs,
            JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns),
        )
        .collect()?;
    // A full join only grows past both inputs when their coordinate sets
    // disagree.
    if joined.height() > left_rows.max(right_rows) {
        return Err(ProcessingError::MergeKeyMismatch {
            detail: format!(
                "{left_rows} and {right_rows} coordinate rows merged into {}",
                joined.height()
            ),
        });
    }
    Ok(joined)
}

fn has_column(frame: &DataFrame, name: &str) -> bool {
    frame.get_column_names().iter().any(|c| c.as_str() == name)
}
