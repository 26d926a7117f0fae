//! Splits a requested date range into sub-ranges sized to respect the
//! archive's request limits.
//!
//! The hourly product accepts at most [`MAX_DAYS_PER_CHUNK`] days per
//! request; the monthly-means product at most [`MAX_MONTHS_PER_CHUNK`]
//! months. The plan is deterministic: identical inputs always produce the
//! identical chunk list, and the chunks partition the inclusive range with
//! no gaps or overlaps.

use crate::error::ClimatabError;
use chrono::{Datelike, Duration, NaiveDate};

pub const MAX_DAYS_PER_CHUNK: i64 = 14;
pub const MAX_MONTHS_PER_CHUNK: u32 = 100;

/// One retrievable sub-range of the requested date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkDescriptor {
    pub index: usize,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub monthly_product: bool,
}

/// Plans the ordered chunk list for `[start, end]` inclusive.
pub fn plan(
    start: NaiveDate,
    end: NaiveDate,
    monthly_product: bool,
) -> Result<Vec<ChunkDescriptor>, ClimatabError> {
    if start > end {
        return Err(ClimatabError::InvalidDateRange { start, end });
    }

    let mut chunks = Vec::new();
    let mut current = start;
    while current <= end {
        let chunk_end = if monthly_product {
            // 100 months counted from the current month; clip to the
            // requested end.
            last_day_of_month(add_months(current, MAX_MONTHS_PER_CHUNK - 1)).min(end)
        } else {
            (current + Duration::days(MAX_DAYS_PER_CHUNK - 1)).min(end)
        };
        chunks.push(ChunkDescriptor {
            index: chunks.len(),
            start: current,
            end: chunk_end,
            monthly_product,
        });
        current = chunk_end + Duration::days(1);
    }
    Ok(chunks)
}

fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    let zero_based = date.month0() + months;
    let year = date.year() + (zero_based / 12) as i32;
    let month = zero_based % 12 + 1;
    NaiveDate::from_ymd_opt(year, month, 1).expect("month arithmetic stays in range")
}

pub(crate) fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    add_months(date.with_day(1).expect("day 1 always valid"), 1) - Duration::days(1)
}
