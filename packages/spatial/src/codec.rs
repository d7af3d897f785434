//! Geometry <-> text conversion for the flat plan table.
//!
//! Geometries are stored as compact `GeoJSON` geometry objects, the same
//! representation the source files use, so a round trip never changes
//! coordinates.

use geo::{Centroid, Geometry, MultiPolygon, Point};
use geojson::GeoJson;

use crate::SpatialError;

/// Serializes a geometry to `GeoJSON` text.
///
/// # Errors
///
/// Returns [`SpatialError::GeometryText`] if serialization fails.
pub fn geometry_to_text(geometry: &Geometry<f64>) -> Result<String, SpatialError> {
    let geojson_geometry = geojson::Geometry::new(geojson::Value::from(geometry));
    serde_json::to_string(&geojson_geometry).map_err(|e| SpatialError::GeometryText {
        message: e.to_string(),
    })
}

/// Parses `GeoJSON` geometry text back into a geometry.
///
/// # Errors
///
/// Returns [`SpatialError::GeometryText`] if the text is not a `GeoJSON`
/// geometry object.
pub fn geometry_from_text(text: &str) -> Result<Geometry<f64>, SpatialError> {
    let geojson: GeoJson = text.parse().map_err(|e: geojson::Error| {
        SpatialError::GeometryText {
            message: e.to_string(),
        }
    })?;

    let GeoJson::Geometry(geom) = geojson else {
        return Err(SpatialError::GeometryText {
            message: "expected a geometry object".to_string(),
        });
    };

    geom.try_into()
        .map_err(|e: geojson::Error| SpatialError::GeometryText {
            message: e.to_string(),
        })
}

/// Normalizes areal geometries to a [`MultiPolygon`].
///
/// Returns `None` for points and lines, which cannot contain a point.
#[must_use]
pub fn into_multi_polygon(geometry: &Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        Geometry::MultiPolygon(mp) => Some(mp.clone()),
        Geometry::Polygon(p) => Some(MultiPolygon(vec![p.clone()])),
        Geometry::Rect(r) => Some(MultiPolygon(vec![r.to_polygon()])),
        Geometry::Triangle(t) => Some(MultiPolygon(vec![t.to_polygon()])),
        _ => None,
    }
}

/// Reduces a geometry to its centroid.
///
/// Returns `None` for empty geometries.
#[must_use]
pub fn centroid(geometry: &Geometry<f64>) -> Option<Point<f64>> {
    geometry.centroid()
}
