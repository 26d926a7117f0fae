//! The validated request the pipeline runs against.

use crate::error::ClimatabError;
use crate::processing::error::ProcessingError;
use crate::region::RegionSpec;
use crate::types::frequency::{DatasetKind, Frequency};
use crate::variables;
use chrono::NaiveDate;

/// Everything the pipeline needs to know about one request.
///
/// Built by the [`crate::Climatab`] entry points; [`RequestSpec::validate`]
/// runs before any region resolution or network traffic.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    /// Caller-supplied identifier; names the output directory and files.
    pub request_id: String,
    /// Long archive variable names.
    pub variables: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub frequency: Frequency,
    /// Grid spacing in degrees.
    pub resolution: f64,
    pub dataset: DatasetKind,
    /// Levels in hPa, as the archive expects them; required for
    /// [`DatasetKind::PressureLevel`].
    pub pressure_levels: Vec<String>,
    pub region: RegionSpec,
    /// GeoJSON property names carried through as aggregation-group keys.
    pub dist_features: Vec<String>,
    pub save_raw: bool,
}

impl RequestSpec {
    /// Fails fast on inputs that can never produce a valid request:
    /// inverted date ranges, an empty variable list, a pressure-level
    /// request without levels, or a variable the registry cannot classify.
    pub fn validate(&self) -> Result<(), ClimatabError> {
        if self.start_date > self.end_date {
            return Err(ClimatabError::InvalidDateRange {
                start: self.start_date,
                end: self.end_date,
            });
        }
        if self.variables.is_empty() {
            return Err(ClimatabError::EmptyVariableList);
        }
        if self.dataset == DatasetKind::PressureLevel && self.pressure_levels.is_empty() {
            return Err(ClimatabError::MissingPressureLevels);
        }
        for name in &self.variables {
            if variables::classify(name).is_none() {
                return Err(ProcessingError::UnclassifiedVariable(name.clone()).into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;

    fn base_spec() -> RequestSpec {
        RequestSpec {
            request_id: "t".to_string(),
            variables: vec!["2m_temperature".to_string()],
            start_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2023, 1, 10).unwrap(),
            frequency: Frequency::Daily,
            resolution: 0.25,
            dataset: DatasetKind::SingleLevel,
            pressure_levels: vec![],
            region: RegionSpec::BoundingBox(BoundingBox::new(10.0, 5.0, 10.0, 5.0).unwrap()),
            dist_features: vec![],
            save_raw: false,
        }
    }

    #[test]
    fn valid_spec_passes() {
        assert!(base_spec().validate().is_ok());
    }

    #[test]
    fn inverted_dates_fail() {
        let mut spec = base_spec();
        spec.end_date = NaiveDate::from_ymd_opt(2022, 12, 31).unwrap();
        assert!(matches!(
            spec.validate(),
            Err(ClimatabError::InvalidDateRange { .. })
        ));
    }

    #[test]
    fn empty_variables_fail() {
        let mut spec = base_spec();
        spec.variables.clear();
        assert!(matches!(
            spec.validate(),
            Err(ClimatabError::EmptyVariableList)
        ));
    }

    #[test]
    fn pressure_dataset_requires_levels() {
        let mut spec = base_spec();
        spec.dataset = DatasetKind::PressureLevel;
        spec.variables = vec!["temperature".to_string()];
        assert!(matches!(
            spec.validate(),
            Err(ClimatabError::MissingPressureLevels)
        ));
        spec.pressure_levels = vec!["500".to_string()];
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn unclassified_variable_fails_before_anything_else_runs() {
        let mut spec = base_spec();
        spec.variables.push("made_up_variable".to_string());
        assert!(matches!(
            spec.validate(),
            Err(ClimatabError::Processing(
                ProcessingError::UnclassifiedVariable(_)
            ))
        ));
    }
}
