//! County parcel loading and centroid reduction.
//!
//! Parcel shapes and assessor attributes arrive as two files sharing a
//! `gid` key. Both are mandatory; a missing file is recovered from a
//! sibling `.zip` archive when one exists.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use badata_plan_models::PARCEL_GID_COLUMN;
use badata_spatial::codec::centroid;
use badata_spatial::features::{SpatialFeature, read_features};
use geo::Point;

use crate::PipelineError;
use crate::archive::{ArchiveError, ensure_extracted};
use crate::paths::DataPaths;
use crate::table::{CsvTable, normalize_key};

/// A parcel reduced to its centroid, with its assessor attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct ParcelRecord {
    /// Parcel identifier (the source `gid`).
    pub parcel_id: String,
    /// Parcel centroid in EPSG:4326.
    pub centroid: Point<f64>,
    /// Shape properties and attribute table columns, excluding `gid`.
    pub attributes: BTreeMap<String, String>,
}

/// Resolves a county's parcel geometry and attribute files, extracting
/// them from their archives when needed.
///
/// # Errors
///
/// Returns [`PipelineError::MissingInput`] naming the expected file if
/// neither it nor its archive exists.
pub fn acquire_parcel_inputs(
    paths: &DataPaths,
    county: &str,
) -> Result<(PathBuf, PathBuf), PipelineError> {
    let geometry_path = paths.parcels_geometry(county);
    let attributes_path = paths.parcels_attributes(county);

    for path in [&geometry_path, &attributes_path] {
        match ensure_extracted(path) {
            Ok(_) => {}
            Err(ArchiveError::ArchiveNotFound(_)) => {
                return Err(PipelineError::MissingInput {
                    path: path.display().to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        if !path.exists() {
            return Err(PipelineError::MissingInput {
                path: path.display().to_string(),
            });
        }
    }

    Ok((geometry_path, attributes_path))
}

/// Loads parcel shapes, joins their attribute table on `gid`, and reduces
/// each shape to its centroid.
///
/// # Errors
///
/// Returns [`PipelineError`] if either file is unreadable, the attribute
/// table has no `gid` column, or a shape has no `gid`.
pub fn load_parcels(
    geometry_path: &Path,
    attributes_path: &Path,
) -> Result<Vec<ParcelRecord>, PipelineError> {
    let features = read_features(geometry_path)?;
    let attributes = CsvTable::read(attributes_path)?;
    join_attributes(features, &attributes, &geometry_path.display().to_string())
}

/// Inner-joins parcel shapes to attribute rows on `gid` and reduces each
/// shape to its centroid.
///
/// Shapes with no attribute row are dropped, as are shapes whose geometry
/// is null or empty. Attribute table values win over shape properties of
/// the same name.
///
/// # Errors
///
/// Returns [`PipelineError::MissingColumns`] if the attribute table has
/// no `gid` column and [`PipelineError::InvalidValue`] if a shape has no
/// `gid` property.
pub fn join_attributes(
    features: Vec<SpatialFeature>,
    attributes: &CsvTable,
    origin: &str,
) -> Result<Vec<ParcelRecord>, PipelineError> {
    let gid_idx = attributes.require_columns(&[PARCEL_GID_COLUMN])?[0];

    let mut rows_by_gid: HashMap<&str, &Vec<String>> = HashMap::with_capacity(attributes.len());
    let mut duplicate_rows = 0u64;
    for row in &attributes.rows {
        if rows_by_gid.insert(normalize_key(&row[gid_idx]), row).is_some() {
            duplicate_rows += 1;
        }
    }
    if duplicate_rows > 0 {
        log::warn!(
            "{}: {duplicate_rows} duplicate gid rows, keeping the last",
            attributes.origin
        );
    }

    let mut parcels = Vec::with_capacity(features.len());
    let (mut unmatched, mut no_geometry) = (0u64, 0u64);

    for (i, feature) in features.into_iter().enumerate() {
        let Some(gid) = feature.property(PARCEL_GID_COLUMN).map(normalize_key) else {
            return Err(PipelineError::InvalidValue {
                path: origin.to_string(),
                row: i + 1,
                message: format!("feature has no {PARCEL_GID_COLUMN}"),
            });
        };

        let Some(row) = rows_by_gid.get(gid) else {
            unmatched += 1;
            continue;
        };

        let Some(point) = feature.geometry.as_ref().and_then(centroid) else {
            no_geometry += 1;
            continue;
        };

        let parcel_id = gid.to_string();
        let mut merged = feature.properties;
        for (header, value) in attributes.headers.iter().zip(row.iter()) {
            merged.insert(header.clone(), value.clone());
        }
        merged.remove(PARCEL_GID_COLUMN);

        parcels.push(ParcelRecord {
            parcel_id,
            centroid: point,
            attributes: merged,
        });
    }

    if unmatched > 0 {
        log::warn!("{origin}: {unmatched} parcel shapes have no attribute row");
    }
    if no_geometry > 0 {
        log::warn!("{origin}: {no_geometry} parcel shapes have no usable geometry");
    }

    Ok(parcels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use badata_spatial::features::parse_features;
    use std::fs;

    const SHAPES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "geometry": {"type": "Polygon", "coordinates": [[[0,0],[2,0],[2,2],[0,2],[0,0]]]},
                "properties": {"gid": 1, "apn": "001-001"}
            },
            {
                "type": "Feature",
                "geometry": {"type": "Polygon", "coordinates": [[[4,4],[6,4],[6,6],[4,6],[4,4]]]},
                "properties": {"gid": 2}
            },
            {
                "type": "Feature",
                "geometry": {"type": "Polygon", "coordinates": [[[8,8],[9,8],[9,9],[8,9],[8,8]]]},
                "properties": {"gid": 3}
            },
            {
                "type": "Feature",
                "geometry": null,
                "properties": {"gid": 4}
            }
        ]
    }"#;

    #[test]
    fn reduces_to_centroids_and_inner_joins() {
        let features = parse_features(SHAPES, "shapes").unwrap();
        let attributes = CsvTable::from_reader(
            "gid,land_value,apn\n1,1000,001-001-A\n2,2000,\n4,4000,\n".as_bytes(),
            "attrs",
        )
        .unwrap();

        let parcels = join_attributes(features, &attributes, "shapes").unwrap();

        // gid 3 has no attribute row, gid 4 has no geometry.
        assert_eq!(parcels.len(), 2);

        let first = &parcels[0];
        assert_eq!(first.parcel_id, "1");
        assert!((first.centroid.x() - 1.0).abs() < 1e-9);
        assert!((first.centroid.y() - 1.0).abs() < 1e-9);
        assert_eq!(first.attributes.get("land_value").map(String::as_str), Some("1000"));
        assert_eq!(first.attributes.get("apn").map(String::as_str), Some("001-001-A"));
        assert!(!first.attributes.contains_key("gid"));

        assert!((parcels[1].centroid.x() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn shape_without_gid_is_an_error() {
        let features = parse_features(
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","geometry":{"type":"Point","coordinates":[0,0]},"properties":{}}
            ]}"#,
            "shapes",
        )
        .unwrap();
        let attributes = CsvTable::from_reader("gid\n1\n".as_bytes(), "attrs").unwrap();

        let err = join_attributes(features, &attributes, "shapes").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidValue { row: 1, .. }));
    }

    #[test]
    fn attribute_table_without_gid_is_an_error() {
        let attributes = CsvTable::from_reader("id\n1\n".as_bytes(), "attrs").unwrap();
        let err = join_attributes(Vec::new(), &attributes, "shapes").unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumns { .. }));
    }

    #[test]
    fn missing_inputs_name_the_expected_file() {
        let tmp = std::env::temp_dir().join("badata_parcels_missing_test");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("napa")).unwrap();

        let err = acquire_parcel_inputs(&DataPaths::new(&tmp), "napa").unwrap_err();
        match err {
            PipelineError::MissingInput { path } => {
                assert!(path.ends_with("napa_parcels_geom.geojson"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }
}
