//! Reports zoning records that no general plan shape joins to.
//!
//! Zoning attributes live in a CSV keyed by `(city, name)`; plan shapes
//! carry `(city, general_plan_name)`. Any zoning id whose key has no
//! shape is written out so the gap can be fixed before the parcel join.

use std::collections::{BTreeSet, HashMap, HashSet};

use badata_plan_models::{CITY_COLUMN, PLAN_NAME_COLUMN};

use crate::PipelineError;
use crate::paths::DataPaths;
use crate::table::{CsvTable, normalize_key};

/// Zoning id column in the zoning lookup.
pub const ZONING_ID_COLUMN: &str = "id";
/// Zoning name column in the zoning lookup.
pub const ZONING_NAME_COLUMN: &str = "name";
/// Zoning id column in the zoning -> parcel mapping.
pub const MAPPING_ZONING_ID_COLUMN: &str = "zoning_id";
/// Column added to the zoning table with the number of linked parcels.
pub const PARCEL_COUNT_COLUMN: &str = "Parcel Count";

/// Collects the `(city, general_plan_name)` keys present in the merged
/// plan table.
///
/// A table with no `general_plan_name` column has no keys.
///
/// # Errors
///
/// Returns [`PipelineError::MissingColumns`] if the `city` column is
/// absent.
pub fn plan_keys(plans: &CsvTable) -> Result<BTreeSet<(String, String)>, PipelineError> {
    let city_idx = plans.require_columns(&[CITY_COLUMN])?[0];
    let Some(name_idx) = plans.column_index(PLAN_NAME_COLUMN) else {
        log::warn!(
            "{}: no {PLAN_NAME_COLUMN} column, no zoning record can match",
            plans.origin
        );
        return Ok(BTreeSet::new());
    };

    Ok(plans
        .rows
        .iter()
        .filter(|row| !row[name_idx].is_empty())
        .map(|row| (row[city_idx].clone(), row[name_idx].clone()))
        .collect())
}

/// Restricts the zoning table to ids linked to at least one parcel and
/// appends a `Parcel Count` column.
///
/// # Errors
///
/// Returns [`PipelineError::MissingColumns`] if either table lacks its id
/// column.
pub fn restrict_to_linked_parcels(
    zoning: &CsvTable,
    mapping: &CsvTable,
) -> Result<CsvTable, PipelineError> {
    let id_idx = zoning.require_columns(&[ZONING_ID_COLUMN])?[0];
    let mapping_idx = mapping.require_columns(&[MAPPING_ZONING_ID_COLUMN])?[0];

    let mut counts: HashMap<&str, u64> = HashMap::new();
    for row in &mapping.rows {
        *counts.entry(normalize_key(&row[mapping_idx])).or_default() += 1;
    }

    let mut headers = zoning.headers.clone();
    headers.push(PARCEL_COUNT_COLUMN.to_string());

    let rows = zoning
        .rows
        .iter()
        .filter_map(|row| {
            let count = counts.get(normalize_key(&row[id_idx]))?;
            let mut row = row.clone();
            row.push(count.to_string());
            Some(row)
        })
        .collect();

    Ok(CsvTable {
        headers,
        rows,
        origin: zoning.origin.clone(),
    })
}

/// Returns the zoning rows whose id does not appear among the rows that
/// join to a plan key on `(city, name)`.
///
/// The result carries a trailing `zoning_id` column copied from `id`
/// unless the zoning table already has one.
///
/// # Errors
///
/// Returns [`PipelineError::MissingColumns`] if the zoning table lacks
/// `id`, `city`, or `name`.
pub fn find_missing_zoning(
    zoning: &CsvTable,
    keys: &BTreeSet<(String, String)>,
) -> Result<CsvTable, PipelineError> {
    let idx = zoning.require_columns(&[ZONING_ID_COLUMN, CITY_COLUMN, ZONING_NAME_COLUMN])?;
    let (id_idx, city_idx, name_idx) = (idx[0], idx[1], idx[2]);

    let joined_ids: HashSet<&str> = zoning
        .rows
        .iter()
        .filter(|row| keys.contains(&(row[city_idx].clone(), row[name_idx].clone())))
        .map(|row| normalize_key(&row[id_idx]))
        .collect();

    log::info!(
        "Number of records in zoning data that have a shape to join to: {}",
        zoning
            .rows
            .iter()
            .filter(|row| joined_ids.contains(normalize_key(&row[id_idx])))
            .count()
    );

    let add_zoning_id = zoning.column_index(MAPPING_ZONING_ID_COLUMN).is_none();
    let mut headers = zoning.headers.clone();
    if add_zoning_id {
        headers.push(MAPPING_ZONING_ID_COLUMN.to_string());
    }

    let rows = zoning
        .rows
        .iter()
        .filter(|row| !joined_ids.contains(normalize_key(&row[id_idx])))
        .map(|row| {
            let mut row = row.clone();
            if add_zoning_id {
                row.push(row[id_idx].clone());
            }
            row
        })
        .collect();

    Ok(CsvTable {
        headers,
        rows,
        origin: zoning.origin.clone(),
    })
}

/// Runs the merge diagnosis and writes `missing_zoning_ids.csv`. Returns
/// the number of missing zoning ids.
///
/// # Errors
///
/// Returns [`PipelineError`] if an input is missing or lacks required
/// columns, or the report cannot be written.
pub fn diagnose_merge(paths: &DataPaths) -> Result<usize, PipelineError> {
    log::info!("Reading gp data");
    let plans = CsvTable::read(&paths.merged_plans())?;
    let keys = plan_keys(&plans)?;

    let zoning = CsvTable::read(&paths.zoning_lookup())?;
    let mapping = CsvTable::read(&paths.zoning_parcels())?;
    let zoning = restrict_to_linked_parcels(&zoning, &mapping)?;

    let missing = find_missing_zoning(&zoning, &keys)?;
    missing.write(&paths.missing_zoning())?;

    log::info!(
        "{} missing zoning ids (data written to {})",
        missing.len(),
        paths.missing_zoning().display()
    );

    Ok(missing.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn table(csv: &str) -> CsvTable {
        CsvTable::from_reader(csv.as_bytes(), "mem").unwrap()
    }

    #[test]
    fn reports_exactly_the_unjoined_id() {
        let zoning = table("id,city,name\n1,Oakland,Downtown\n2,Oakland,Hills\n3,Berkeley,Campus\n");
        let plans = table(
            "general_plan_name,city,priority,geometry\n\
             Downtown,Oakland,2,x\n\
             Hills,Oakland,1,x\n\
             Campus,Oakland,2,x\n",
        );

        let missing = find_missing_zoning(&zoning, &plan_keys(&plans).unwrap()).unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing.rows[0][0], "3");
    }

    #[test]
    fn plan_table_without_names_matches_nothing() {
        let zoning = table("id,city,name\n1,Oakland,Downtown\n");
        let plans = table("city,priority,geometry\nOakland,2,x\n");

        let missing = find_missing_zoning(&zoning, &plan_keys(&plans).unwrap()).unwrap();
        assert_eq!(missing.len(), 1);
    }

    #[test]
    fn missing_rows_carry_zoning_id_copied_from_id() {
        let zoning = table("id,city,name\n7,Napa,Vineyard\n");
        let missing = find_missing_zoning(&zoning, &BTreeSet::new()).unwrap();

        assert_eq!(missing.headers, ["id", "city", "name", "zoning_id"]);
        assert_eq!(missing.rows[0], ["7", "Napa", "Vineyard", "7"]);

        let zoning = table("id,zoning_id,city,name\n7,7,Napa,Vineyard\n");
        let missing = find_missing_zoning(&zoning, &BTreeSet::new()).unwrap();
        assert_eq!(missing.headers, ["id", "zoning_id", "city", "name"]);
    }

    #[test]
    fn zoning_without_name_column_is_an_error() {
        let zoning = table("id,city\n1,Oakland\n");
        let err = find_missing_zoning(&zoning, &BTreeSet::new()).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumns { .. }));
    }

    #[test]
    fn restricts_to_linked_ids_and_counts_parcels() {
        let zoning = table("id,city,name\n1,Oakland,A\n2,Oakland,B\n3,Oakland,C\n");
        let mapping = table("parcel_id,zoning_id\n10,1\n11,1\n12,3.0\n");

        let linked = restrict_to_linked_parcels(&zoning, &mapping).unwrap();
        assert_eq!(linked.headers.last().map(String::as_str), Some("Parcel Count"));
        assert_eq!(linked.len(), 2);
        assert_eq!(linked.rows[0], ["1", "Oakland", "A", "2"]);
        assert_eq!(linked.rows[1], ["3", "Oakland", "C", "1"]);
    }

    #[test]
    fn writes_missing_zoning_report() {
        let tmp = std::env::temp_dir().join("badata_diagnose_test");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();
        let paths = DataPaths::new(&tmp);

        fs::write(
            paths.merged_plans(),
            "general_plan_name,city,priority,geometry\nDowntown,Oakland,2,x\n",
        )
        .unwrap();
        fs::write(
            paths.zoning_lookup(),
            "id,city,name\n1,Oakland,Downtown\n2,Oakland,Hills\n3,Oakland,Unlinked\n",
        )
        .unwrap();
        fs::write(paths.zoning_parcels(), "zoning_id\n1\n2\n2\n").unwrap();

        assert_eq!(diagnose_merge(&paths).unwrap(), 1);

        let report = CsvTable::read(&paths.missing_zoning()).unwrap();
        assert_eq!(
            report.headers,
            ["id", "city", "name", "Parcel Count", "zoning_id"]
        );
        assert_eq!(report.rows, vec![vec!["2", "Oakland", "Hills", "2", "2"]]);

        let _ = fs::remove_dir_all(&tmp);
    }
}
