//! The unified general plan table.
//!
//! One [`PlanRecord`] per source feature. The table is persisted as a flat
//! CSV with the geometry serialized as text, then re-hydrated and indexed
//! for the parcel join.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use badata_plan_models::{CITY_COLUMN, GEOMETRY_COLUMN, PRIORITY_COLUMN, Priority};
use badata_spatial::PolygonIndex;
use badata_spatial::codec::{geometry_from_text, geometry_to_text, into_multi_polygon};
use geo::Geometry;

use crate::PipelineError;
use crate::table::{CsvTable, write_csv};

/// Columns the stage stamps itself. Source properties with these names
/// are overwritten.
const RESERVED_COLUMNS: &[&str] = &[CITY_COLUMN, PRIORITY_COLUMN, GEOMETRY_COLUMN];

/// A single general plan shape with its attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanRecord {
    /// City display name (e.g. "San Francisco").
    pub city: String,
    /// Source priority; lower wins on overlap.
    pub priority: Priority,
    /// Source properties, keyed by column name. Never contains the
    /// reserved `city`/`priority`/`geometry` columns.
    pub attributes: BTreeMap<String, String>,
    /// Plan shape. `None` for source features with a null or
    /// unconvertible geometry; such rows keep their attributes but never
    /// match a parcel.
    pub geometry: Option<Geometry<f64>>,
}

impl PlanRecord {
    /// Builds a record, dropping source properties that collide with the
    /// stamped columns.
    #[must_use]
    pub fn new(
        city: String,
        priority: Priority,
        mut attributes: BTreeMap<String, String>,
        geometry: impl Into<Option<Geometry<f64>>>,
    ) -> Self {
        for reserved in RESERVED_COLUMNS {
            attributes.remove(*reserved);
        }

        Self {
            city,
            priority,
            attributes,
            geometry: geometry.into(),
        }
    }

    /// Returns an attribute value, empty when absent.
    #[must_use]
    pub fn attribute(&self, name: &str) -> &str {
        self.attributes.get(name).map_or("", String::as_str)
    }
}

/// The merged plan table, in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanTable {
    /// Records in the order they were read.
    pub records: Vec<PlanRecord>,
}

impl PlanTable {
    /// Number of plan records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Union of every record's attribute names, sorted.
    #[must_use]
    pub fn attribute_columns(&self) -> Vec<String> {
        self.records
            .iter()
            .flat_map(|r| r.attributes.keys())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Writes the table as CSV: attribute columns, then `city`,
    /// `priority`, and `geometry` as text. A record without geometry gets
    /// an empty `geometry` cell.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a geometry cannot be serialized or the
    /// file cannot be written.
    pub fn write_csv(&self, path: &Path) -> Result<(), PipelineError> {
        let attribute_columns = self.attribute_columns();

        let mut headers = attribute_columns.clone();
        headers.extend(RESERVED_COLUMNS.iter().map(|c| (*c).to_string()));

        let mut rows = Vec::with_capacity(self.records.len());
        for record in &self.records {
            let mut row: Vec<String> = attribute_columns
                .iter()
                .map(|c| record.attribute(c).to_string())
                .collect();
            row.push(record.city.clone());
            row.push(record.priority.to_string());
            row.push(
                record
                    .geometry
                    .as_ref()
                    .map(geometry_to_text)
                    .transpose()?
                    .unwrap_or_default(),
            );
            rows.push(row);
        }

        write_csv(path, &headers, rows)
    }

    /// Reads a table written by [`Self::write_csv`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingColumns`] if `city`, `priority`, or
    /// `geometry` is absent, and [`PipelineError::InvalidValue`] for rows
    /// with an unparseable priority or geometry.
    pub fn read_csv(path: &Path) -> Result<Self, PipelineError> {
        Self::from_csv_table(&CsvTable::read(path)?)
    }

    /// Re-hydrates records from an already-loaded CSV table.
    ///
    /// # Errors
    ///
    /// See [`Self::read_csv`].
    pub fn from_csv_table(table: &CsvTable) -> Result<Self, PipelineError> {
        let required = table.require_columns(RESERVED_COLUMNS)?;
        let (city_idx, priority_idx, geometry_idx) = (required[0], required[1], required[2]);

        let mut records = Vec::with_capacity(table.len());
        for (i, row) in table.rows.iter().enumerate() {
            let invalid = |message: String| PipelineError::InvalidValue {
                path: table.origin.clone(),
                row: i + 1,
                message,
            };

            let priority: Priority = row[priority_idx]
                .parse()
                .map_err(|e: badata_plan_models::ParsePriorityError| invalid(e.to_string()))?;

            let geometry_text = row[geometry_idx].trim();
            let geometry = if geometry_text.is_empty() {
                None
            } else {
                Some(geometry_from_text(geometry_text).map_err(|e| invalid(e.to_string()))?)
            };

            let attributes = table
                .headers
                .iter()
                .zip(row)
                .enumerate()
                .filter(|(idx, _)| ![city_idx, priority_idx, geometry_idx].contains(idx))
                .filter(|(_, (_, value))| !value.is_empty())
                .map(|(_, (header, value))| (header.clone(), value.clone()))
                .collect();

            records.push(PlanRecord {
                city: row[city_idx].clone(),
                priority,
                attributes,
                geometry,
            });
        }

        Ok(Self { records })
    }
}

/// The plan table plus an R-tree over its areal shapes, keyed by row.
pub struct PlanLayer {
    table: PlanTable,
    index: PolygonIndex<usize>,
}

impl PlanLayer {
    /// Indexes every polygonal record. Point and line shapes, and records
    /// with no geometry, stay in the table but can never contain a parcel
    /// centroid.
    #[must_use]
    pub fn new(table: PlanTable) -> Self {
        let entries: Vec<_> = table
            .records
            .iter()
            .enumerate()
            .filter_map(|(row, record)| {
                record
                    .geometry
                    .as_ref()
                    .and_then(into_multi_polygon)
                    .map(|mp| (mp, row))
            })
            .collect();

        let skipped = table.len() - entries.len();
        if skipped > 0 {
            log::warn!("{skipped} plan records have no polygon geometry and cannot match parcels");
        }

        log::info!("Indexed {} plan polygons", entries.len());

        Self {
            index: PolygonIndex::new(entries),
            table,
        }
    }

    /// Returns the underlying table.
    #[must_use]
    pub const fn table(&self) -> &PlanTable {
        &self.table
    }

    /// Returns the record at `row`.
    #[must_use]
    pub fn record(&self, row: usize) -> Option<&PlanRecord> {
        self.table.records.get(row)
    }

    /// Rows of every plan polygon containing `point`, in table order.
    #[must_use]
    pub fn rows_containing(&self, point: geo::Point<f64>) -> Vec<usize> {
        let mut rows: Vec<usize> = self.index.containing(point).into_iter().copied().collect();
        rows.sort_unstable();
        rows
    }
}
