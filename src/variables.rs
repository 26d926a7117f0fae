//! Static variable registry: maps archive variable names to their short
//! (column) names, aggregation class, and a human-readable description.
//!
//! The aggregation class is the single most important correctness contract
//! in the crate: summing an intensive quantity or averaging a cumulative one
//! produces physically meaningless output. Lookups accept either the long
//! archive name (`2m_temperature`) or the short column name (`t2m`).

use serde::Serialize;
use std::fmt;

/// How a variable must be reduced across a time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VariableClass {
    /// Accumulated over each time step (precipitation, runoff, radiation
    /// energy); reduced by summation.
    Cumulative,
    /// Pointwise state (temperature, pressure, wind); reduced by averaging.
    Intensive,
    /// Running maximum since the previous post-processing step.
    ExtremeMax,
    /// Running minimum since the previous post-processing step.
    ExtremeMin,
    /// Already expressed per unit time; reduced by averaging.
    Rate,
}

impl fmt::Display for VariableClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VariableClass::Cumulative => "cumulative",
            VariableClass::Intensive => "intensive",
            VariableClass::ExtremeMax => "extreme-max",
            VariableClass::ExtremeMin => "extreme-min",
            VariableClass::Rate => "rate",
        };
        write!(f, "{name}")
    }
}

/// One registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VariableInfo {
    /// Long archive name, as used in retrieval requests.
    pub long_name: &'static str,
    /// Short name, as used for grid-file and CSV columns.
    pub short_name: &'static str,
    pub class: VariableClass,
    pub description: &'static str,
}

use VariableClass::*;

static REGISTRY: &[VariableInfo] = &[
    VariableInfo {
        long_name: "2m_temperature",
        short_name: "t2m",
        class: Intensive,
        description: "Air temperature at 2 m above the surface (K).",
    },
    VariableInfo {
        long_name: "2m_dewpoint_temperature",
        short_name: "d2m",
        class: Intensive,
        description: "Dew point temperature at 2 m above the surface (K).",
    },
    VariableInfo {
        long_name: "skin_temperature",
        short_name: "skt",
        class: Intensive,
        description: "Temperature of the surface skin layer (K).",
    },
    VariableInfo {
        long_name: "sea_surface_temperature",
        short_name: "sst",
        class: Intensive,
        description: "Temperature of the sea surface (K).",
    },
    VariableInfo {
        long_name: "mean_sea_level_pressure",
        short_name: "msl",
        class: Intensive,
        description: "Atmospheric pressure reduced to sea level (Pa).",
    },
    VariableInfo {
        long_name: "surface_pressure",
        short_name: "sp",
        class: Intensive,
        description: "Atmospheric pressure at the surface (Pa).",
    },
    VariableInfo {
        long_name: "10m_u_component_of_wind",
        short_name: "u10",
        class: Intensive,
        description: "Eastward wind component at 10 m (m/s).",
    },
    VariableInfo {
        long_name: "10m_v_component_of_wind",
        short_name: "v10",
        class: Intensive,
        description: "Northward wind component at 10 m (m/s).",
    },
    VariableInfo {
        long_name: "total_cloud_cover",
        short_name: "tcc",
        class: Intensive,
        description: "Fraction of the sky covered by cloud (0-1).",
    },
    VariableInfo {
        long_name: "snow_depth",
        short_name: "sd",
        class: Intensive,
        description: "Snow depth in water equivalent (m).",
    },
    VariableInfo {
        long_name: "volumetric_soil_water_layer_1",
        short_name: "swvl1",
        class: Intensive,
        description: "Volumetric soil water in the top soil layer (m3/m3).",
    },
    VariableInfo {
        long_name: "total_precipitation",
        short_name: "tp",
        class: Cumulative,
        description: "Accumulated precipitation per time step (m).",
    },
    VariableInfo {
        long_name: "convective_precipitation",
        short_name: "cp",
        class: Cumulative,
        description: "Accumulated precipitation from convective processes (m).",
    },
    VariableInfo {
        long_name: "large_scale_precipitation",
        short_name: "lsp",
        class: Cumulative,
        description: "Accumulated precipitation from large-scale processes (m).",
    },
    VariableInfo {
        long_name: "snowfall",
        short_name: "sf",
        class: Cumulative,
        description: "Accumulated snowfall in water equivalent (m).",
    },
    VariableInfo {
        long_name: "total_evaporation",
        short_name: "e",
        class: Cumulative,
        description: "Accumulated evaporation in water equivalent (m, negative upward).",
    },
    VariableInfo {
        long_name: "potential_evaporation",
        short_name: "pev",
        class: Cumulative,
        description: "Accumulated potential evaporation (m).",
    },
    VariableInfo {
        long_name: "runoff",
        short_name: "ro",
        class: Cumulative,
        description: "Accumulated total runoff (m).",
    },
    VariableInfo {
        long_name: "surface_runoff",
        short_name: "sro",
        class: Cumulative,
        description: "Accumulated surface runoff (m).",
    },
    VariableInfo {
        long_name: "surface_solar_radiation_downwards",
        short_name: "ssrd",
        class: Cumulative,
        description: "Accumulated downward solar radiation at the surface (J/m2).",
    },
    VariableInfo {
        long_name: "surface_thermal_radiation_downwards",
        short_name: "strd",
        class: Cumulative,
        description: "Accumulated downward thermal radiation at the surface (J/m2).",
    },
    VariableInfo {
        long_name: "maximum_2m_temperature_since_previous_post_processing",
        short_name: "mx2t",
        class: ExtremeMax,
        description: "Maximum 2 m temperature since the previous post-processing step (K).",
    },
    VariableInfo {
        long_name: "minimum_2m_temperature_since_previous_post_processing",
        short_name: "mn2t",
        class: ExtremeMin,
        description: "Minimum 2 m temperature since the previous post-processing step (K).",
    },
    VariableInfo {
        long_name: "10m_wind_gust_since_previous_post_processing",
        short_name: "fg10",
        class: ExtremeMax,
        description: "Maximum 10 m wind gust since the previous post-processing step (m/s).",
    },
    VariableInfo {
        long_name: "mean_total_precipitation_rate",
        short_name: "mtpr",
        class: Rate,
        description: "Mean precipitation rate over the time step (kg/m2/s).",
    },
    VariableInfo {
        long_name: "mean_convective_precipitation_rate",
        short_name: "mcpr",
        class: Rate,
        description: "Mean convective precipitation rate over the time step (kg/m2/s).",
    },
    // Pressure-level fields.
    VariableInfo {
        long_name: "temperature",
        short_name: "t",
        class: Intensive,
        description: "Air temperature on a pressure level (K).",
    },
    VariableInfo {
        long_name: "u_component_of_wind",
        short_name: "u",
        class: Intensive,
        description: "Eastward wind component on a pressure level (m/s).",
    },
    VariableInfo {
        long_name: "v_component_of_wind",
        short_name: "v",
        class: Intensive,
        description: "Northward wind component on a pressure level (m/s).",
    },
    VariableInfo {
        long_name: "specific_humidity",
        short_name: "q",
        class: Intensive,
        description: "Mass of water vapour per mass of moist air (kg/kg).",
    },
    VariableInfo {
        long_name: "relative_humidity",
        short_name: "r",
        class: Intensive,
        description: "Relative humidity on a pressure level (%).",
    },
    VariableInfo {
        long_name: "geopotential",
        short_name: "z",
        class: Intensive,
        description: "Geopotential on a pressure level (m2/s2).",
    },
];

/// Finds the registry entry for a long or short variable name.
pub fn lookup(name: &str) -> Option<&'static VariableInfo> {
    REGISTRY
        .iter()
        .find(|info| info.long_name == name || info.short_name == name)
}

/// Aggregation class for a variable, or `None` when unregistered.
pub fn classify(name: &str) -> Option<VariableClass> {
    lookup(name).map(|info| info.class)
}

/// Short column name for a variable, or `None` when unregistered.
pub fn short_name(name: &str) -> Option<&'static str> {
    lookup(name).map(|info| info.short_name)
}

/// Case-insensitive substring search over names and descriptions.
pub fn search_variables(term: &str) -> Vec<&'static VariableInfo> {
    let term = term.to_lowercase();
    REGISTRY
        .iter()
        .filter(|info| {
            info.long_name.contains(&term)
                || info.short_name.contains(&term)
                || info.description.to_lowercase().contains(&term)
        })
        .collect()
}

/// Full description of one variable.
pub fn describe_variable(name: &str) -> Option<&'static VariableInfo> {
    lookup(name)
}
