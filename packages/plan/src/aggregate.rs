//! Merges per-jurisdiction general plan `GeoJSON` into one [`PlanTable`].
//!
//! Every `*.geojson` file under `{root}/{county}/{city}/` contributes one
//! record per feature, stamped with the city's display name and a
//! [`Priority`] derived from the file path. A city with no files
//! contributes nothing; that is not an error.

use std::path::{Path, PathBuf};

use badata_plan_models::{Priority, RegionConfig, city_display_name};
use badata_spatial::features::read_features;

use crate::PipelineError;
use crate::paths::DataPaths;
use crate::plans::{PlanRecord, PlanTable};

/// Where the merged source files are published, for the discovery
/// listing.
pub const SOURCE_BASE_URL: &str = "http://oaklandanalytics.github.io/badata";

/// Recursively lists `*.geojson` files under `dir`, sorted by path.
///
/// A missing directory yields an empty list.
///
/// # Errors
///
/// Returns [`PipelineError::Io`] if an existing directory cannot be read.
pub fn discover_geojson_files(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut files = Vec::new();
    if dir.is_dir() {
        collect_geojson_files(dir, &mut files)?;
    }
    files.sort();
    Ok(files)
}

fn collect_geojson_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), PipelineError> {
    let io_err = |e| PipelineError::Io {
        path: dir.display().to_string(),
        source: e,
    };

    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let path = entry.path();
        let ft = entry.file_type().map_err(io_err)?;

        if ft.is_dir() {
            collect_geojson_files(&path, out)?;
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("geojson"))
        {
            out.push(path);
        }
    }

    Ok(())
}

/// Reads every configured city's plan files into a single table.
///
/// Records appear in county, city, then file order. The sorted list of
/// discovered files is logged for review.
///
/// # Errors
///
/// Returns [`PipelineError`] if a discovered file cannot be read or is not
/// a `GeoJSON` `FeatureCollection`.
pub fn aggregate_plans(
    config: &RegionConfig,
    paths: &DataPaths,
) -> Result<PlanTable, PipelineError> {
    let mut records = Vec::new();
    let mut listing = Vec::new();

    for (county, city) in config.pairs() {
        let display_name = city_display_name(city);
        let files = discover_geojson_files(&paths.city_dir(county, city))?;

        if files.is_empty() {
            log::debug!("{county}/{city}: no plan files");
        }

        for file in files {
            let relative = file
                .strip_prefix(paths.root())
                .unwrap_or(file.as_path())
                .to_string_lossy()
                .replace('\\', "/");

            let entry = format!("'{display_name}': '{SOURCE_BASE_URL}/{relative}',");
            log::debug!("{entry}");
            listing.push(entry);

            let priority = Priority::from_source_path(&relative);
            let features = read_features(&file)?;

            let mut without_geometry = 0u64;
            let before = records.len();
            for feature in features {
                if feature.geometry.is_none() {
                    without_geometry += 1;
                }
                records.push(PlanRecord::new(
                    display_name.clone(),
                    priority,
                    feature.properties,
                    feature.geometry,
                ));
            }

            if without_geometry > 0 {
                log::warn!(
                    "{relative}: {without_geometry} features have no geometry and will not match parcels"
                );
            }
            log::debug!(
                "{relative}: {} records at priority {priority}",
                records.len() - before
            );
        }
    }

    listing.sort();
    for entry in &listing {
        log::info!("{entry}");
    }

    log::info!(
        "Merged {} plan records from {} files",
        records.len(),
        listing.len()
    );

    Ok(PlanTable { records })
}
