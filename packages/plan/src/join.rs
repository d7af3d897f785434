//! Parcel -> TAZ -> general plan spatial join.
//!
//! Each county is processed independently: parcels are reduced to
//! centroids, assigned the TAZ containing them, then matched against every
//! plan polygon containing them. Overlapping plans yield several candidate
//! rows per parcel, which [`deduplicate`] collapses to one by
//! [`Priority`].
//!
//! A parcel outside every zone or plan is kept with empty values; only
//! missing input files are errors.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;

use badata_plan_models::{
    CITY_COLUMN, PARCEL_ID_COLUMN, PRIORITY_COLUMN, Priority, RegionConfig, TAZ_ZONE_PROPERTY,
    ZONE_ID_COLUMN,
};
use badata_spatial::PolygonIndex;
use badata_spatial::codec::into_multi_polygon;
use badata_spatial::features::{SpatialFeature, read_features};
use geo::Point;

use crate::PipelineError;
use crate::parcels::{ParcelRecord, acquire_parcel_inputs, load_parcels};
use crate::paths::DataPaths;
use crate::plans::{PlanLayer, PlanTable};
use crate::progress::ProgressCallback;
use crate::table::write_csv;

/// Traffic analysis zone identifier.
pub type ZoneId = i64;

/// Source bookkeeping columns that never reach the output.
const DROPPED_COLUMNS: &[&str] = &["id"];

/// TAZ polygons indexed for centroid lookup.
pub struct ZoneLayer {
    index: PolygonIndex<ZoneId>,
}

impl ZoneLayer {
    /// Loads TAZ boundaries from a `GeoJSON` file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the file is missing or unreadable, or
    /// a zone has no numeric `ZONE_ID`.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        if !path.exists() {
            return Err(PipelineError::MissingInput {
                path: path.display().to_string(),
            });
        }
        let layer = Self::from_features(read_features(path)?, &path.display().to_string())?;
        log::info!("Loaded {} TAZs from {}", layer.len(), path.display());
        Ok(layer)
    }

    /// Indexes already-parsed TAZ features.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidValue`] if a zone has no numeric
    /// `ZONE_ID`.
    pub fn from_features(features: Vec<SpatialFeature>, origin: &str) -> Result<Self, PipelineError> {
        let mut entries = Vec::with_capacity(features.len());
        let mut skipped = 0u64;

        for (i, feature) in features.into_iter().enumerate() {
            let zone_id = feature
                .property(TAZ_ZONE_PROPERTY)
                .and_then(parse_zone_id)
                .ok_or_else(|| PipelineError::InvalidValue {
                    path: origin.to_string(),
                    row: i + 1,
                    message: format!("zone has no numeric {TAZ_ZONE_PROPERTY}"),
                })?;

            match feature.geometry.as_ref().and_then(into_multi_polygon) {
                Some(polygon) => entries.push((polygon, zone_id)),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            log::warn!("{origin}: skipped {skipped} zones without polygon geometry");
        }

        Ok(Self {
            index: PolygonIndex::new(entries),
        })
    }

    /// Number of indexed zones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether no zones are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Returns the zone containing `point`.
    #[must_use]
    pub fn zone_of(&self, point: Point<f64>) -> Option<ZoneId> {
        self.index.first_containing(point).copied()
    }
}

/// Parses `"12"` or `"12.0"` as a zone id.
#[allow(clippy::cast_possible_truncation)]
fn parse_zone_id(text: &str) -> Option<ZoneId> {
    let text = text.trim();
    text.parse::<ZoneId>().ok().or_else(|| {
        text.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && v.fract() == 0.0)
            .map(|v| v as ZoneId)
    })
}

/// A parcel after the zone join.
#[derive(Debug, Clone, PartialEq)]
pub struct ZonedParcel {
    /// The parcel, unchanged.
    pub parcel: ParcelRecord,
    /// Containing zone, if any.
    pub zone_id: Option<ZoneId>,
}

/// One row of the parcel -> plan join, before deduplication.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanCandidate<'a> {
    /// The zoned parcel.
    pub parcel: &'a ZonedParcel,
    /// Row of the matched plan, `None` when no plan contains the parcel.
    pub plan_row: Option<usize>,
    /// Priority of the matched plan.
    pub priority: Option<Priority>,
}

/// A parcel with its zone and chosen plan. The output entity.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedParcel {
    /// Parcel identifier.
    pub parcel_id: String,
    /// Containing zone, if any.
    pub zone_id: Option<ZoneId>,
    /// Parcel attributes minus bookkeeping columns.
    pub attributes: BTreeMap<String, String>,
    /// Row of the chosen plan in the plan table.
    pub plan_row: Option<usize>,
    /// Centroid longitude.
    pub x: f64,
    /// Centroid latitude.
    pub y: f64,
}

/// Assigns each parcel the zone containing its centroid. Parcels outside
/// every zone are kept.
#[must_use]
pub fn assign_zones(parcels: Vec<ParcelRecord>, zones: &ZoneLayer) -> Vec<ZonedParcel> {
    parcels
        .into_iter()
        .map(|parcel| ZonedParcel {
            zone_id: zones.zone_of(parcel.centroid),
            parcel,
        })
        .collect()
}

/// Left-joins zoned parcels to every plan polygon containing them.
///
/// Candidates come out in parcel order, then plan table order.
#[must_use]
pub fn join_plans<'a>(zoned: &'a [ZonedParcel], plans: &PlanLayer) -> Vec<PlanCandidate<'a>> {
    let mut candidates = Vec::with_capacity(zoned.len());

    for parcel in zoned {
        let rows = plans.rows_containing(parcel.parcel.centroid);
        if rows.is_empty() {
            candidates.push(PlanCandidate {
                parcel,
                plan_row: None,
                priority: None,
            });
            continue;
        }

        for row in rows {
            candidates.push(PlanCandidate {
                parcel,
                plan_row: Some(row),
                priority: plans.record(row).map(|r| r.priority),
            });
        }
    }

    candidates
}

/// Keeps one candidate per parcel: stable-sorts by priority (unmatched
/// last) and keeps the first occurrence of each parcel id.
///
/// Among same-priority matches the earlier plan table row wins.
#[must_use]
pub fn deduplicate(mut candidates: Vec<PlanCandidate<'_>>) -> Vec<PlanCandidate<'_>> {
    candidates.sort_by_key(|c| (c.priority.is_none(), c.priority));

    let mut seen = HashSet::with_capacity(candidates.len());
    candidates.retain(|c| seen.insert(c.parcel.parcel.parcel_id.as_str()));
    candidates
}

/// Materializes centroid coordinates and drops bookkeeping columns.
#[must_use]
pub fn finalize(candidates: &[PlanCandidate<'_>]) -> Vec<JoinedParcel> {
    candidates
        .iter()
        .map(|c| {
            let parcel = &c.parcel.parcel;
            let mut attributes = parcel.attributes.clone();
            for dropped in DROPPED_COLUMNS {
                attributes.remove(*dropped);
            }

            JoinedParcel {
                parcel_id: parcel.parcel_id.clone(),
                zone_id: c.parcel.zone_id,
                attributes,
                plan_row: c.plan_row,
                x: parcel.centroid.x(),
                y: parcel.centroid.y(),
            }
        })
        .collect()
}

/// Runs zone join, plan join, dedup, and finalize over loaded parcels.
#[must_use]
pub fn join_parcels(
    parcels: Vec<ParcelRecord>,
    zones: &ZoneLayer,
    plans: &PlanLayer,
) -> Vec<JoinedParcel> {
    log::info!("  joining {} rows", parcels.len());

    log::debug!("  joining to TAZs");
    let zoned = assign_zones(parcels, zones);

    log::debug!("  joining to general plan data");
    let candidates = join_plans(&zoned, plans);
    let candidate_count = candidates.len();

    let kept = deduplicate(candidates);
    log::debug!(
        "  deduplicated {candidate_count} plan matches to {} parcels",
        kept.len()
    );

    finalize(&kept)
}

/// Acquires, loads, and joins one county's parcels.
///
/// # Errors
///
/// Returns [`PipelineError`] if the county's parcel inputs are missing or
/// malformed.
pub fn join_county(
    county: &str,
    paths: &DataPaths,
    zones: &ZoneLayer,
    plans: &PlanLayer,
) -> Result<Vec<JoinedParcel>, PipelineError> {
    log::info!("Joining parcels to general plan data for {county}");

    let (geometry_path, attributes_path) = acquire_parcel_inputs(paths, county)?;
    let parcels = load_parcels(&geometry_path, &attributes_path)?;

    Ok(join_parcels(parcels, zones, plans))
}

/// Joins every configured county, one blocking task per county, and
/// concatenates the results in county order.
///
/// # Errors
///
/// Returns the first county error in county order, or
/// [`PipelineError::Task`] if a join task panicked.
pub async fn join_counties(
    config: &RegionConfig,
    paths: &DataPaths,
    zones: Arc<ZoneLayer>,
    plans: Arc<PlanLayer>,
    progress: Arc<dyn ProgressCallback>,
) -> Result<Vec<JoinedParcel>, PipelineError> {
    let counties: Vec<String> = config.counties().map(str::to_string).collect();
    progress.set_total(counties.len() as u64);

    let mut handles = Vec::with_capacity(counties.len());
    for county in counties {
        let paths = paths.clone();
        let zones = Arc::clone(&zones);
        let plans = Arc::clone(&plans);
        let progress = Arc::clone(&progress);

        handles.push(tokio::task::spawn_blocking(move || {
            let result = join_county(&county, &paths, &zones, &plans);
            progress.inc(1);
            progress.set_message(format!("joined {county}"));
            result
        }));
    }

    let mut joined = Vec::new();
    for handle in handles {
        joined.extend(handle.await??);
    }

    progress.finish(format!("joined {} parcels", joined.len()));

    Ok(joined)
}

/// Output column layout shared by the combined and per-zone files.
struct JoinedSchema {
    parcel_columns: Vec<String>,
    plan_columns: Vec<String>,
    headers: Vec<String>,
}

impl JoinedSchema {
    fn new(rows: &[JoinedParcel], plans: &PlanTable) -> Self {
        let parcel_columns: Vec<String> = rows
            .iter()
            .flat_map(|r| r.attributes.keys())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let plan_columns: Vec<String> = plans
            .attribute_columns()
            .into_iter()
            .filter(|c| !DROPPED_COLUMNS.contains(&c.as_str()))
            .collect();

        let mut taken: BTreeSet<String> = parcel_columns.iter().cloned().collect();
        taken.extend(
            [PARCEL_ID_COLUMN, ZONE_ID_COLUMN, "x", "y"]
                .iter()
                .map(|c| (*c).to_string()),
        );

        let mut headers = vec![PARCEL_ID_COLUMN.to_string()];
        headers.extend(parcel_columns.iter().cloned());
        headers.push(ZONE_ID_COLUMN.to_string());
        for column in plan_columns
            .iter()
            .map(String::as_str)
            .chain([CITY_COLUMN, PRIORITY_COLUMN])
        {
            headers.push(if taken.contains(column) {
                format!("{column}_plan")
            } else {
                column.to_string()
            });
        }
        headers.push("x".to_string());
        headers.push("y".to_string());

        Self {
            parcel_columns,
            plan_columns,
            headers,
        }
    }

    fn row(&self, parcel: &JoinedParcel, plans: &PlanTable) -> Vec<String> {
        let plan = parcel.plan_row.and_then(|row| plans.records.get(row));

        let mut row = Vec::with_capacity(self.headers.len());
        row.push(parcel.parcel_id.clone());
        row.extend(
            self.parcel_columns
                .iter()
                .map(|c| parcel.attributes.get(c).cloned().unwrap_or_default()),
        );
        row.push(parcel.zone_id.map(|z| z.to_string()).unwrap_or_default());
        row.extend(
            self.plan_columns
                .iter()
                .map(|c| plan.map(|p| p.attribute(c).to_string()).unwrap_or_default()),
        );
        row.push(plan.map(|p| p.city.clone()).unwrap_or_default());
        row.push(plan.map(|p| p.priority.to_string()).unwrap_or_default());
        row.push(parcel.x.to_string());
        row.push(parcel.y.to_string());
        row
    }
}

/// Writes the combined joined table.
///
/// # Errors
///
/// Returns [`PipelineError`] if the file cannot be written.
pub fn write_joined(
    path: &Path,
    rows: &[JoinedParcel],
    plans: &PlanTable,
) -> Result<(), PipelineError> {
    let schema = JoinedSchema::new(rows, plans);
    write_csv(
        path,
        &schema.headers,
        rows.iter().map(|r| schema.row(r, plans)),
    )
}

/// Writes one `taz{zone_id}_zoning.csv` per zone. Parcels outside every
/// zone are not written. Returns the number of files written.
///
/// # Errors
///
/// Returns [`PipelineError`] if a file cannot be written.
pub fn write_zone_files(
    paths: &DataPaths,
    rows: &[JoinedParcel],
    plans: &PlanTable,
) -> Result<usize, PipelineError> {
    let schema = JoinedSchema::new(rows, plans);

    let mut by_zone: BTreeMap<ZoneId, Vec<&JoinedParcel>> = BTreeMap::new();
    for row in rows {
        if let Some(zone_id) = row.zone_id {
            by_zone.entry(zone_id).or_default().push(row);
        }
    }

    for (zone_id, group) in &by_zone {
        write_csv(
            &paths.zone_output(*zone_id),
            &schema.headers,
            group.iter().map(|r| schema.row(r, plans)),
        )?;
    }

    Ok(by_zone.len())
}

/// Counts from a completed join run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinSummary {
    /// Parcels written.
    pub parcels: usize,
    /// Parcels with no containing zone.
    pub without_zone: usize,
    /// Parcels with no containing plan.
    pub without_plan: usize,
    /// Per-zone files written.
    pub zone_files: usize,
}

/// Runs the whole parcel join: reads the merged plan table and TAZs,
/// joins every county, and writes the combined and per-zone outputs.
///
/// # Errors
///
/// Returns [`PipelineError`] if any mandatory input is missing or
/// malformed, or an output cannot be written.
pub async fn merge_parcels_and_gp_data(
    config: &RegionConfig,
    paths: &DataPaths,
    progress: Arc<dyn ProgressCallback>,
) -> Result<JoinSummary, PipelineError> {
    log::info!("Merging parcels and general plan data");

    let plan_table = PlanTable::read_csv(&paths.merged_plans())?;
    log::info!("Converted {} plan rows from text geometries", plan_table.len());

    let plans = Arc::new(PlanLayer::new(plan_table));
    let zones = Arc::new(ZoneLayer::load(&paths.tazs())?);

    let rows = join_counties(config, paths, zones, Arc::clone(&plans), progress).await?;

    let table = plans.table();
    write_joined(&paths.joined_parcels(), &rows, table)?;
    log::info!(
        "Wrote {} parcels to {}",
        rows.len(),
        paths.joined_parcels().display()
    );

    let zone_files = write_zone_files(paths, &rows, table)?;
    log::info!(
        "Wrote {zone_files} zone files to {}",
        paths.zone_output_dir().display()
    );

    Ok(JoinSummary {
        parcels: rows.len(),
        without_zone: rows.iter().filter(|r| r.zone_id.is_none()).count(),
        without_plan: rows.iter().filter(|r| r.plan_row.is_none()).count(),
        zone_files,
    })
}
