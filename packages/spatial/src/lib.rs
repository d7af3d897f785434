#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial index for point-in-polygon joins.
//!
//! Builds R-tree indexes over TAZ and general plan polygons and answers
//! "which polygons contain this parcel centroid" queries. Also hosts the
//! geometry text codec used by the merged plan CSV and the `GeoJSON`
//! feature loader shared by every stage.

pub mod codec;
pub mod features;

use geo::{BoundingRect, Contains, MultiPolygon, Point};
use rstar::{AABB, RTree, RTreeObject};

/// Errors from spatial loading and geometry conversion.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// File could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// File is not valid `GeoJSON`.
    #[error("Invalid GeoJSON in {path}: {source}")]
    GeoJson {
        /// Path that caused the error.
        path: String,
        /// Underlying parse error.
        source: Box<geojson::Error>,
    },

    /// `GeoJSON` parsed but is not a `FeatureCollection`.
    #[error("Expected a FeatureCollection in {path}")]
    NotFeatureCollection {
        /// Path that caused the error.
        path: String,
    },

    /// Geometry text could not be decoded.
    #[error("Invalid geometry text: {message}")]
    GeometryText {
        /// Description of what went wrong.
        message: String,
    },
}

/// A polygon stored in the R-tree with its payload.
struct IndexEntry<T> {
    value: T,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl<T> RTreeObject for IndexEntry<T> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// R-tree over polygons carrying an arbitrary payload (a zone id, a plan
/// row index).
///
/// Containment is strict: a point on a polygon boundary is not "within"
/// it.
pub struct PolygonIndex<T> {
    tree: RTree<IndexEntry<T>>,
}

impl<T> PolygonIndex<T> {
    /// Bulk-loads the index.
    pub fn new(entries: impl IntoIterator<Item = (MultiPolygon<f64>, T)>) -> Self {
        let entries: Vec<_> = entries
            .into_iter()
            .map(|(polygon, value)| IndexEntry {
                value,
                envelope: compute_envelope(&polygon),
                polygon,
            })
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Number of indexed polygons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Whether the index holds no polygons.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Returns the payload of every polygon containing `point`.
    ///
    /// Order follows the R-tree traversal and carries no meaning.
    #[must_use]
    pub fn containing(&self, point: Point<f64>) -> Vec<&T> {
        let query_env = AABB::from_point([point.x(), point.y()]);

        self.tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.contains(&point))
            .map(|entry| &entry.value)
            .collect()
    }

    /// Returns the payload of the first polygon found containing `point`.
    ///
    /// Intended for layers that tile without overlap, such as TAZs.
    #[must_use]
    pub fn first_containing(&self, point: Point<f64>) -> Option<&T> {
        let query_env = AABB::from_point([point.x(), point.y()]);

        for entry in self.tree.locate_in_envelope_intersecting(&query_env) {
            if entry.polygon.contains(&point) {
                return Some(&entry.value);
            }
        }
        None
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}
