//! Defines the target output frequency and the archive dataset kind, plus the
//! mapping from those onto the archive's dataset identifiers.

use std::fmt;

/// Time granularity of the aggregated output.
///
/// Hourly output keeps the native timestamps of the archive; all other
/// frequencies bucket timestamps by calendar truncation. Weekly buckets start
/// on Monday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frequency {
    /// One row per archive timestamp.
    Hourly,
    /// One row per calendar day.
    Daily,
    /// One row per calendar week (weeks start on Monday).
    Weekly,
    /// One row per calendar month.
    Monthly,
    /// One row per calendar year.
    Yearly,
}

impl Frequency {
    /// Monthly and yearly output is sourced from the archive's
    /// monthly-means product; everything else uses the hourly product.
    pub fn uses_monthly_product(&self) -> bool {
        matches!(self, Frequency::Monthly | Frequency::Yearly)
    }

    pub(crate) fn path_segment(&self) -> &'static str {
        match self {
            Frequency::Hourly => "hourly",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Yearly => "yearly",
        }
    }

    /// Polars truncation interval for the temporal bucket, or `None` for
    /// hourly output where the bucket is the timestamp itself.
    pub(crate) fn truncation(&self) -> Option<&'static str> {
        match self {
            Frequency::Hourly => None,
            Frequency::Daily => Some("1d"),
            Frequency::Weekly => Some("1w"),
            Frequency::Monthly => Some("1mo"),
            Frequency::Yearly => Some("1y"),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path_segment())
    }
}

/// Which family of archive datasets a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    /// Surface / single-level fields (2m temperature, precipitation, ...).
    SingleLevel,
    /// Fields on pressure levels; requests must name the levels.
    PressureLevel,
}

impl DatasetKind {
    /// Archive dataset identifier for this kind and frequency.
    pub fn dataset_id(&self, frequency: Frequency) -> &'static str {
        match (self, frequency.uses_monthly_product()) {
            (DatasetKind::SingleLevel, false) => "reanalysis-era5-single-levels",
            (DatasetKind::SingleLevel, true) => "reanalysis-era5-single-levels-monthly-means",
            (DatasetKind::PressureLevel, false) => "reanalysis-era5-pressure-levels",
            (DatasetKind::PressureLevel, true) => "reanalysis-era5-pressure-levels-monthly-means",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetKind::SingleLevel => write!(f, "single"),
            DatasetKind::PressureLevel => write!(f, "pressure"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monthly_and_yearly_use_monthly_product() {
        assert!(!Frequency::Hourly.uses_monthly_product());
        assert!(!Frequency::Daily.uses_monthly_product());
        assert!(!Frequency::Weekly.uses_monthly_product());
        assert!(Frequency::Monthly.uses_monthly_product());
        assert!(Frequency::Yearly.uses_monthly_product());
    }

    #[test]
    fn dataset_ids_follow_frequency() {
        assert_eq!(
            DatasetKind::SingleLevel.dataset_id(Frequency::Daily),
            "reanalysis-era5-single-levels"
        );
        assert_eq!(
            DatasetKind::SingleLevel.dataset_id(Frequency::Yearly),
            "reanalysis-era5-single-levels-monthly-means"
        );
        assert_eq!(
            DatasetKind::PressureLevel.dataset_id(Frequency::Hourly),
            "reanalysis-era5-pressure-levels"
        );
        assert_eq!(
            DatasetKind::PressureLevel.dataset_id(Frequency::Monthly),
            "reanalysis-era5-pressure-levels-monthly-means"
        );
    }
}
