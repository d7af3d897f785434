//! `GeoJSON` `FeatureCollection` loading.
//!
//! Flattens every feature into a geometry plus a string-valued property
//! map, which is the shape every downstream table works with.

use std::collections::BTreeMap;
use std::path::Path;

use geo::Geometry;
use geojson::GeoJson;

use crate::SpatialError;

/// A single feature with its properties rendered as text.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialFeature {
    /// Feature geometry, `None` when the feature has a null geometry.
    pub geometry: Option<Geometry<f64>>,
    /// Property name -> text value. Nulls become empty strings.
    pub properties: BTreeMap<String, String>,
}

impl SpatialFeature {
    /// Returns a property value, treating empty text as missing.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Reads every feature from a `GeoJSON` `FeatureCollection` file.
///
/// # Errors
///
/// Returns [`SpatialError`] if the file cannot be read, is not valid
/// `GeoJSON`, or is not a `FeatureCollection`.
pub fn read_features(path: &Path) -> Result<Vec<SpatialFeature>, SpatialError> {
    let content = std::fs::read_to_string(path).map_err(|e| SpatialError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_features(&content, &path.display().to_string())
}

/// Parses a `FeatureCollection` from text. `origin` names the source in
/// error messages.
///
/// # Errors
///
/// Returns [`SpatialError`] if the text is not a `FeatureCollection`.
pub fn parse_features(content: &str, origin: &str) -> Result<Vec<SpatialFeature>, SpatialError> {
    let geojson: GeoJson = content.parse().map_err(|e| SpatialError::GeoJson {
        path: origin.to_string(),
        source: Box::new(e),
    })?;

    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(SpatialError::NotFeatureCollection {
            path: origin.to_string(),
        });
    };

    let mut features = Vec::with_capacity(collection.features.len());
    let mut bad_geometries = 0u64;

    for feature in collection.features {
        let geometry = match feature.geometry {
            Some(geom) => match Geometry::<f64>::try_from(geom) {
                Ok(g) => Some(g),
                Err(e) => {
                    log::debug!("{origin}: unconvertible geometry: {e}");
                    bad_geometries += 1;
                    None
                }
            },
            None => None,
        };

        let properties = feature
            .properties
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| (key, property_text(&value)))
            .collect();

        features.push(SpatialFeature {
            geometry,
            properties,
        });
    }

    if bad_geometries > 0 {
        log::warn!("{origin}: {bad_geometries} features had unconvertible geometries");
    }

    Ok(features)
}

/// Renders a JSON property value as CSV-ready text.
#[must_use]
pub fn property_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLLECTION: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [-122.2, 37.8]},
                "properties": {"general_plan_name": "Mixed Use", "max_far": 4.5, "note": null}
            },
            {
                "type": "Feature",
                "geometry": null,
                "properties": {"general_plan_name": "Open Space"}
            }
        ]
    }"#;

    #[test]
    fn flattens_properties_to_text() {
        let features = parse_features(COLLECTION, "test").unwrap();
        assert_eq!(features.len(), 2);

        let first = &features[0];
        assert_eq!(first.property("general_plan_name"), Some("Mixed Use"));
        assert_eq!(first.property("max_far"), Some("4.5"));
        assert_eq!(first.property("note"), None);
        assert_eq!(first.properties.get("note").map(String::as_str), Some(""));
        assert!(matches!(first.geometry, Some(Geometry::Point(_))));

        assert!(features[1].geometry.is_none());
    }

    #[test]
    fn rejects_bare_geometry() {
        let err = parse_features(r#"{"type":"Point","coordinates":[0,0]}"#, "bare.json")
            .unwrap_err();
        assert!(matches!(err, SpatialError::NotFeatureCollection { .. }));
    }

    #[test]
    fn missing_file_names_path() {
        let err = read_features(Path::new("/nonexistent/tazs.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/tazs.json"));
    }
}
