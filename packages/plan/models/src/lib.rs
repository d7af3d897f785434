#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Region configuration and general plan source types.
//!
//! Defines the TOML schema for the county -> city mapping that drives
//! every stage, the [`Priority`] tag used to resolve overlapping plan
//! matches, and the column names shared by the CSV tables the stages
//! exchange.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Column holding the serialized geometry in the merged plan table.
pub const GEOMETRY_COLUMN: &str = "geometry";
/// Column holding the city display name.
pub const CITY_COLUMN: &str = "city";
/// Column holding the numeric [`Priority`].
pub const PRIORITY_COLUMN: &str = "priority";
/// Plan attribute used as the join key against the zoning lookup.
pub const PLAN_NAME_COLUMN: &str = "general_plan_name";
/// Parcel identifier shared by the parcel geometry and attribute files.
pub const PARCEL_GID_COLUMN: &str = "gid";
/// Parcel identifier column in the joined output.
pub const PARCEL_ID_COLUMN: &str = "parcel_id";
/// Zone identifier property on the TAZ features.
pub const TAZ_ZONE_PROPERTY: &str = "ZONE_ID";
/// Zone identifier column in the joined output.
pub const ZONE_ID_COLUMN: &str = "zone_id";

/// Path marker identifying a land-use/zoning overlay dataset.
pub const LAND_USE_OVERLAY_MARKER: &str = "plu";

/// Errors loading a [`RegionConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// Path of the config file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Config file is not valid TOML or does not match the schema.
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        /// Path of the config file.
        path: String,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
}

/// The county -> cities mapping, deserialized from TOML.
///
/// ```toml
/// [counties]
/// alameda = ["oakland", "berkeley"]
/// ```
///
/// Counties iterate in name order so every run visits them identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionConfig {
    /// County directory name -> city directory names.
    #[serde(default)]
    pub counties: BTreeMap<String, Vec<String>>,
}

impl RegionConfig {
    /// Loads the config from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        toml::de::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Returns the configured county names.
    pub fn counties(&self) -> impl Iterator<Item = &str> {
        self.counties.keys().map(String::as_str)
    }

    /// Returns every `(county, city)` pair.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.counties.iter().flat_map(|(county, cities)| {
            cities
                .iter()
                .map(move |city| (county.as_str(), city.as_str()))
        })
    }
}

/// Converts a city directory name to its display name.
///
/// Underscores become spaces and each word is title-cased, so
/// `"san_francisco"` becomes `"San Francisco"`.
#[must_use]
pub fn city_display_name(city: &str) -> String {
    let mut out = String::with_capacity(city.len());
    let mut prev_alpha = false;

    for c in city.chars() {
        let c = if c == '_' { ' ' } else { c };
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }

    out
}

/// Resolves overlapping plan matches. Lower values win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    /// Land-use/zoning overlay source (`1`).
    LandUseOverlay,
    /// General plan source (`2`).
    GeneralPlan,
}

impl Priority {
    /// Tags a source file by its path.
    #[must_use]
    pub fn from_source_path(path: &str) -> Self {
        if path.contains(LAND_USE_OVERLAY_MARKER) {
            Self::LandUseOverlay
        } else {
            Self::GeneralPlan
        }
    }

    /// Returns the numeric value written to the `priority` column.
    #[must_use]
    pub const fn value(self) -> u8 {
        match self {
            Self::LandUseOverlay => 1,
            Self::GeneralPlan => 2,
        }
    }

    /// Maps a numeric value back to a priority.
    #[must_use]
    pub const fn from_value(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::LandUseOverlay),
            2 => Some(Self::GeneralPlan),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Error parsing a [`Priority`] from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid priority: {0:?}")]
pub struct ParsePriorityError(pub String);

impl FromStr for Priority {
    type Err = ParsePriorityError;

    /// Accepts `"1"`/`"2"` as well as float renderings like `"1.0"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let trimmed = trimmed.strip_suffix(".0").unwrap_or(trimmed);

        trimmed
            .parse::<u8>()
            .ok()
            .and_then(Self::from_value)
            .ok_or_else(|| ParsePriorityError(s.to_string()))
    }
}
