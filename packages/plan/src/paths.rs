//! Canonical file paths for every stage's inputs and outputs.
//!
//! All paths are relative to the data root passed on the command line.

use std::path::{Path, PathBuf};

/// Merged general plan table written by the aggregation stage.
pub const MERGED_PLAN_FILE: &str = "merged_general_plan_data.csv";
/// Joined parcel table written by the join stage.
pub const JOINED_PARCELS_FILE: &str = "parcels_joined_to_general_plans.csv";
/// Zoning records with no plan geometry, written by diagnostics.
pub const MISSING_ZONING_FILE: &str = "missing_zoning_ids.csv";
/// External zoning attribute lookup.
pub const ZONING_LOOKUP_FILE: &str = "zoning_lookup.csv";
/// External zoning -> parcel mapping.
pub const ZONING_PARCELS_FILE: &str = "2015_12_21_zoning_parcels.csv";
/// Source validation findings.
pub const VALIDATION_REPORT_FILE: &str = "validation_report.csv";
/// Default region config file name.
pub const REGION_CONFIG_FILE: &str = "cities_and_counties.toml";

/// Resolves stage paths against a data root.
#[derive(Debug, Clone)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    /// Creates paths rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the data root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the default region config path.
    #[must_use]
    pub fn region_config(&self) -> PathBuf {
        self.root.join(REGION_CONFIG_FILE)
    }

    /// Returns the `{county}/{city}` source directory.
    #[must_use]
    pub fn city_dir(&self, county: &str, city: &str) -> PathBuf {
        self.root.join(county).join(city)
    }

    /// Returns the county directory that parcel files live in.
    #[must_use]
    pub fn county_dir(&self, county: &str) -> PathBuf {
        self.root.join(county)
    }

    /// Returns the parcel geometry file for a county.
    #[must_use]
    pub fn parcels_geometry(&self, county: &str) -> PathBuf {
        self.county_dir(county)
            .join(format!("{county}_parcels_geom.geojson"))
    }

    /// Returns the parcel attribute table for a county.
    #[must_use]
    pub fn parcels_attributes(&self, county: &str) -> PathBuf {
        self.county_dir(county).join(format!("{county}_parcels.csv"))
    }

    /// Returns the TAZ boundary file.
    #[must_use]
    pub fn tazs(&self) -> PathBuf {
        self.root.join("data").join("tazs.json")
    }

    /// Returns the merged general plan table.
    #[must_use]
    pub fn merged_plans(&self) -> PathBuf {
        self.root.join(MERGED_PLAN_FILE)
    }

    /// Returns the joined parcel table.
    #[must_use]
    pub fn joined_parcels(&self) -> PathBuf {
        self.root.join(JOINED_PARCELS_FILE)
    }

    /// Returns the directory receiving per-zone outputs.
    #[must_use]
    pub fn zone_output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    /// Returns the per-zone output for a zone id.
    #[must_use]
    pub fn zone_output(&self, zone_id: i64) -> PathBuf {
        self.zone_output_dir()
            .join(format!("taz{zone_id}_zoning.csv"))
    }

    /// Returns the zoning lookup table.
    #[must_use]
    pub fn zoning_lookup(&self) -> PathBuf {
        self.root.join(ZONING_LOOKUP_FILE)
    }

    /// Returns the zoning -> parcel mapping table.
    #[must_use]
    pub fn zoning_parcels(&self) -> PathBuf {
        self.root.join(ZONING_PARCELS_FILE)
    }

    /// Returns the missing zoning id report.
    #[must_use]
    pub fn missing_zoning(&self) -> PathBuf {
        self.root.join(MISSING_ZONING_FILE)
    }

    /// Returns the `{county}/{juris}/general_plan` directory.
    #[must_use]
    pub fn general_plan_dir(&self, county: &str, juris: &str) -> PathBuf {
        self.city_dir(county, juris).join("general_plan")
    }

    /// Returns the validation report.
    #[must_use]
    pub fn validation_report(&self) -> PathBuf {
        self.root.join(VALIDATION_REPORT_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn county_paths() {
        let paths = DataPaths::new("/data");
        assert_eq!(
            paths.parcels_geometry("marin"),
            Path::new("/data/marin/marin_parcels_geom.geojson")
        );
        assert_eq!(
            paths.parcels_attributes("marin"),
            Path::new("/data/marin/marin_parcels.csv")
        );
        assert_eq!(
            paths.zone_output(42),
            Path::new("/data/output/taz42_zoning.csv")
        );
        assert_eq!(
            paths.general_plan_dir("sonoma", "petaluma"),
            Path::new("/data/sonoma/petaluma/general_plan")
        );
    }
}
