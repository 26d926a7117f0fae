//! Class-aware two-stage aggregation.
//!
//! Stage one collapses the spatial dimension: every timestamp's grid cells
//! are reduced to one row per group, using the statistic each variable's
//! class prescribes for space (mean for most, max/min for extremes). Stage
//! two resamples that series to the requested frequency, again per class
//! (sum for accumulations, mean for intensive and rate variables, max/min
//! for extremes). Hourly output stops after stage one.
//!
//! Monthly-product runs need a correction afterwards: the archive stores
//! accumulations as mean daily totals, so monthly values are scaled by the
//! days in each month and yearly sums by the mean month length.

use crate::chunking::last_day_of_month;
use crate::processing::error::ProcessingError;
use crate::processing::loader::{LEVEL_COLUMN, TIME_COLUMN};
use crate::types::frequency::Frequency;
use crate::variables::{self, VariableClass};
use chrono::{Datelike, NaiveDate};
use log::{info, warn};
use polars::prelude::*;

/// Mean month length in days, for scaling yearly sums of monthly means.
const MEAN_DAYS_PER_MONTH: f64 = 30.4375;

/// What to aggregate and how to group it.
pub struct AggregationPlan<'a> {
    /// Long archive variable names, as requested.
    pub variables: &'a [String],
    pub frequency: Frequency,
    pub has_pressure_levels: bool,
    /// Feature label and distinguishing-attribute columns, when the run
    /// went through the polygon filter.
    pub group_columns: Vec<String>,
}

/// Reduces a spatially filtered grid table to one row per time bucket and
/// group, applying each variable's class statistic in both stages.
pub fn aggregate_by_frequency(
    frame: DataFrame,
    plan: &AggregationPlan<'_>,
) -> Result<DataFrame, ProcessingError> {
    let columns = resolve_columns(&frame, plan)?;
    if columns.is_empty() {
        return Err(ProcessingError::EmptyGrid);
    }

    let mut keys: Vec<Expr> = vec![col(TIME_COLUMN)];
    if plan.has_pressure_levels {
        keys.push(col(LEVEL_COLUMN));
    }
    for group in &plan.group_columns {
        keys.push(col(group.as_str()));
    }

    let spatial: Vec<Expr> = columns
        .iter()
        .map(|(name, class)| {
            let expr = match class {
                VariableClass::ExtremeMax => col(name.as_str()).max(),
                VariableClass::ExtremeMin => col(name.as_str()).min(),
                _ => col(name.as_str()).mean(),
            };
            expr.alias(name.as_str())
        })
        .collect();

    let collapsed = frame.lazy().group_by_stable(&keys).agg(spatial);

    let resampled = match plan.frequency.truncation() {
        None => collapsed,
        Some(every) => {
            let mut bucket_keys: Vec<Expr> =
                vec![col(TIME_COLUMN).dt().truncate(lit(every)).alias(TIME_COLUMN)];
            if plan.has_pressure_levels {
                bucket_keys.push(col(LEVEL_COLUMN));
            }
            for group in &plan.group_columns {
                bucket_keys.push(col(group.as_str()));
            }
            let temporal: Vec<Expr> = columns
                .iter()
                .map(|(name, class)| {
                    let expr = match class {
                        VariableClass::Cumulative => col(name.as_str()).sum(),
                        VariableClass::ExtremeMax => col(name.as_str()).max(),
                        VariableClass::ExtremeMin => col(name.as_str()).min(),
                        VariableClass::Intensive | VariableClass::Rate => {
                            col(name.as_str()).mean()
                        }
                    };
                    expr.alias(name.as_str())
                })
                .collect();
            collapsed.group_by_stable(bucket_keys).agg(temporal)
        }
    };

    let mut sort_names: Vec<PlSmallStr> = vec![TIME_COLUMN.into()];
    if plan.has_pressure_levels {
        sort_names.push(LEVEL_COLUMN.into());
    }
    for group in &plan.group_columns {
        sort_names.push(group.as_str().into());
    }
    // The bucket timestamp only orders the rows; the output carries the
    // calendar columns instead.
    let with_calendar = resampled
        .with_columns(calendar_columns(plan.frequency))
        .sort(sort_names, SortMultipleOptions::default())
        .drop([TIME_COLUMN]);

    let mut aggregated = with_calendar.collect()?;
    if plan.frequency.uses_monthly_product() {
        aggregated = adjust_cumulative_for_monthly_product(aggregated, &columns, plan.frequency)?;
    }
    info!(
        "Aggregated to {} {} rows",
        aggregated.height(),
        plan.frequency
    );
    Ok(aggregated)
}

/// Maps requested long names to the short data-column names and classes,
/// skipping variables the archive did not return.
fn resolve_columns(
    frame: &DataFrame,
    plan: &AggregationPlan<'_>,
) -> Result<Vec<(String, VariableClass)>, ProcessingError> {
    let mut columns = Vec::with_capacity(plan.variables.len());
    for name in plan.variables {
        let info = variables::lookup(name)
            .ok_or_else(|| ProcessingError::UnclassifiedVariable(name.clone()))?;
        let present = frame
            .get_column_names()
            .iter()
            .any(|c| c.as_str() == info.short_name);
        if !present {
            warn!(
                "Requested variable '{}' ('{}') is not in the downloaded data; skipping",
                name, info.short_name
            );
            continue;
        }
        columns.push((info.short_name.to_string(), info.class));
    }
    Ok(columns)
}

/// Calendar columns derived from the bucket timestamp, per frequency.
fn calendar_columns(frequency: Frequency) -> Vec<Expr> {
    let time = || col(TIME_COLUMN).dt();
    match frequency {
        Frequency::Hourly => vec![
            time().year().alias("year"),
            time().month().alias("month"),
            time().day().alias("day"),
            time().hour().alias("hour"),
        ],
        Frequency::Daily => vec![
            time().year().alias("year"),
            time().month().alias("month"),
            time().day().alias("day"),
            col(TIME_COLUMN).cast(DataType::Date).alias("date"),
        ],
        Frequency::Weekly => vec![
            time().year().alias("year"),
            time().week().alias("week"),
        ],
        Frequency::Monthly => vec![
            time().year().alias("year"),
            time().month().alias("month"),
        ],
        Frequency::Yearly => vec![time().year().alias("year")],
    }
}

/// Scales accumulation columns of a monthly-product run. Monthly rows are
/// multiplied by the number of days in their month, yearly rows by the mean
/// month length, turning mean daily totals back into period totals.
fn adjust_cumulative_for_monthly_product(
    frame: DataFrame,
    columns: &[(String, VariableClass)],
    frequency: Frequency,
) -> Result<DataFrame, ProcessingError> {
    let cumulative: Vec<&str> = columns
        .iter()
        .filter(|(_, class)| *class == VariableClass::Cumulative)
        .map(|(name, _)| name.as_str())
        .collect();
    if cumulative.is_empty() {
        return Ok(frame);
    }

    match frequency {
        Frequency::Yearly => {
            let exprs: Vec<Expr> = cumulative
                .iter()
                .map(|name| (col(*name) * lit(MEAN_DAYS_PER_MONTH)).alias(*name))
                .collect();
            Ok(frame.lazy().with_columns(exprs).collect()?)
        }
        Frequency::Monthly => {
            let years = frame.column("year")?.cast(&DataType::Int32)?;
            let years = years.i32()?;
            let months = frame.column("month")?.cast(&DataType::Int32)?;
            let months = months.i32()?;
            let mut factors: Vec<f64> = Vec::with_capacity(frame.height());
            for (year, month) in years.into_iter().zip(months) {
                let days = match (year, month) {
                    (Some(y), Some(m)) => NaiveDate::from_ymd_opt(y, m as u32, 1)
                        .map(|d| last_day_of_month(d).day() as f64)
                        .unwrap_or(MEAN_DAYS_PER_MONTH),
                    _ => MEAN_DAYS_PER_MONTH,
                };
                factors.push(days);
            }
            let mut frame = frame;
            frame.with_column(Column::new("__month_days".into(), factors))?;
            let exprs: Vec<Expr> = cumulative
                .iter()
                .map(|name| (col(*name) * col("__month_days")).alias(*name))
                .collect();
            let adjusted = frame
                .lazy()
                .with_columns(exprs)
                .drop(["__month_days"])
                .collect()?;
            Ok(adjusted)
        }
        _ => Ok(frame),
    }
}
