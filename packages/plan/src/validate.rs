//! Structural checks over the per-jurisdiction general plan sources.
//!
//! Each `{county}/{juris}/general_plan/` directory holds a `{juris}.csv`
//! of plan attributes keyed by `name` and a `{juris}.geojson` of shapes
//! keyed by `general_plan_name`. Findings are data-quality conditions:
//! they are collected into a report, never raised as errors.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use badata_plan_models::{PLAN_NAME_COLUMN, RegionConfig};
use badata_spatial::features::{SpatialFeature, read_features};

use crate::PipelineError;
use crate::paths::DataPaths;
use crate::table::{CsvTable, write_csv};

/// Shape count above which a jurisdiction is suspected of using parcels
/// as plan shapes.
pub const MAX_SHAPES: usize = 2000;

/// Jurisdictions that legitimately exceed [`MAX_SHAPES`].
pub const LARGE_JURISDICTIONS: &[&str] = &["san_francisco", "san_jose"];

/// Building type flag columns. Each must hold `0`, `1`, or nothing.
pub const BUILDING_TYPE_COLUMNS: &[&str] = &[
    "HS", "HT", "HM", "OF", "HO", "SC", "IL", "IW", "IH", "RS", "RB", "MR", "MT", "ME",
];

/// Numeric limit columns with their inclusive maximum. Empty cells count
/// as zero.
pub const RANGE_LIMITS: &[(&str, f64)] = &[
    ("max_far", 30.0),
    ("max_height", 1000.0),
    ("max_dua", 350.0),
    ("max_du_per_parcel", 10.0),
];

/// Columns every jurisdiction CSV must have besides the building types.
const BASE_COLUMNS: &[&str] = &[
    "name",
    "city",
    "max_far",
    "max_height",
    "max_dua",
    "max_du_per_parcel",
];

/// Category of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ViolationKind {
    /// An expected source file is absent.
    MissingFile,
    /// A source file could not be parsed.
    MalformedFile,
    /// More shapes than a general plan plausibly has.
    TooManyShapes,
    /// A shape has no `general_plan_name`.
    MissingPlanName,
    /// A `name` appears more than once in the CSV.
    DuplicateName,
    /// A shape's `general_plan_name` has no CSV row.
    UnknownPlanName,
    /// A required CSV column is absent.
    MissingColumn,
    /// A numeric column holds non-numeric text.
    NonNumeric,
    /// A building type column holds something other than 0/1.
    InvalidFlag,
    /// A numeric column is outside its allowed range.
    OutOfRange,
}

impl ViolationKind {
    /// Machine-readable label written to the report.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::MissingFile => "missing_file",
            Self::MalformedFile => "malformed_file",
            Self::TooManyShapes => "too_many_shapes",
            Self::MissingPlanName => "missing_plan_name",
            Self::DuplicateName => "duplicate_name",
            Self::UnknownPlanName => "unknown_plan_name",
            Self::MissingColumn => "missing_column",
            Self::NonNumeric => "non_numeric",
            Self::InvalidFlag => "invalid_flag",
            Self::OutOfRange => "out_of_range",
        }
    }

    /// Whether the finding concerns the CSV schema rather than the
    /// CSV/shape join.
    #[must_use]
    pub const fn is_schema(self) -> bool {
        matches!(
            self,
            Self::MissingColumn | Self::NonNumeric | Self::InvalidFlag | Self::OutOfRange
        )
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// County directory name.
    pub county: String,
    /// Jurisdiction directory name.
    pub juris: String,
    /// Finding category.
    pub kind: ViolationKind,
    /// Human-readable detail (column, value, offending names).
    pub detail: String,
}

/// Findings for one jurisdiction, before county/juris are attached.
type Findings = Vec<(ViolationKind, String)>;

/// Checks the CSV <-> shape join keys for one jurisdiction.
#[must_use]
pub fn check_join(juris: &str, csv: &CsvTable, shapes: &[SpatialFeature]) -> Findings {
    let mut findings = Vec::new();

    if shapes.len() >= MAX_SHAPES && !LARGE_JURISDICTIONS.contains(&juris) {
        findings.push((
            ViolationKind::TooManyShapes,
            format!("{} shapes (limit {MAX_SHAPES})", shapes.len()),
        ));
    }

    let unnamed = shapes
        .iter()
        .filter(|s| s.property(PLAN_NAME_COLUMN).is_none())
        .count();
    if unnamed > 0 {
        findings.push((
            ViolationKind::MissingPlanName,
            format!("{unnamed} shapes have no {PLAN_NAME_COLUMN}"),
        ));
    }

    let Some(name_idx) = csv.column_index("name") else {
        // Reported by the schema check.
        return findings;
    };

    let mut name_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for row in &csv.rows {
        *name_counts.entry(row[name_idx].as_str()).or_default() += 1;
    }

    let duplicated: Vec<&str> = name_counts
        .iter()
        .filter(|(_, count)| **count > 1)
        .map(|(name, _)| *name)
        .collect();
    if !duplicated.is_empty() {
        findings.push((ViolationKind::DuplicateName, duplicated.join("; ")));
    }

    let unknown: BTreeSet<&str> = shapes
        .iter()
        .filter_map(|s| s.property(PLAN_NAME_COLUMN))
        .filter(|name| !name_counts.contains_key(name))
        .collect();
    if !unknown.is_empty() {
        findings.push((
            ViolationKind::UnknownPlanName,
            unknown.into_iter().collect::<Vec<_>>().join("; "),
        ));
    }

    findings
}

/// Checks the jurisdiction CSV's columns, numeric types, flags, and
/// value ranges.
#[must_use]
pub fn check_schema(csv: &CsvTable) -> Findings {
    let mut findings = Vec::new();

    for column in BASE_COLUMNS.iter().chain(BUILDING_TYPE_COLUMNS) {
        if csv.column_index(column).is_none() {
            findings.push((ViolationKind::MissingColumn, (*column).to_string()));
        }
    }

    for (column, max) in RANGE_LIMITS {
        let Some(idx) = csv.column_index(column) else {
            continue;
        };

        let mut values = Vec::with_capacity(csv.len());
        for (i, row) in csv.rows.iter().enumerate() {
            let cell = row[idx].trim();
            if cell.is_empty() {
                values.push(0.0);
                continue;
            }
            match cell.parse::<f64>() {
                Ok(v) if !v.is_nan() => values.push(v),
                _ => findings.push((
                    ViolationKind::NonNumeric,
                    format!("{column} row {}: {cell:?}", i + 1),
                )),
            }
        }

        let min_value = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max_value = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if min_value < 0.0 {
            findings.push((
                ViolationKind::OutOfRange,
                format!("{column} min {min_value} < 0"),
            ));
        }
        if max_value > *max {
            findings.push((
                ViolationKind::OutOfRange,
                format!("{column} max {max_value} > {max}"),
            ));
        }
    }

    for column in BUILDING_TYPE_COLUMNS {
        let Some(idx) = csv.column_index(column) else {
            continue;
        };

        let bad: BTreeSet<&str> = csv
            .rows
            .iter()
            .map(|row| row[idx].trim())
            .filter(|cell| !is_flag(cell))
            .collect();
        if !bad.is_empty() {
            findings.push((
                ViolationKind::InvalidFlag,
                format!(
                    "{column}: {}",
                    bad.into_iter().collect::<Vec<_>>().join("; ")
                ),
            ));
        }
    }

    findings
}

fn is_flag(cell: &str) -> bool {
    matches!(cell, "" | "0" | "1" | "0.0" | "1.0")
}

/// Validates one `general_plan` directory.
#[must_use]
pub fn validate_jurisdiction(dir: &Path, juris: &str) -> Findings {
    let csv_path = dir.join(format!("{juris}.csv"));
    let geojson_path = dir.join(format!("{juris}.geojson"));

    let csv = match CsvTable::read(&csv_path) {
        Ok(csv) => csv,
        Err(PipelineError::MissingInput { path }) => {
            return vec![(ViolationKind::MissingFile, path)]
                .into_iter()
                .chain(missing_geojson(&geojson_path))
                .collect();
        }
        Err(e) => {
            return vec![(ViolationKind::MalformedFile, e.to_string())];
        }
    };

    let mut findings = Vec::new();
    let shapes = if geojson_path.exists() {
        match read_features(&geojson_path) {
            Ok(shapes) => Some(shapes),
            Err(e) => {
                findings.push((ViolationKind::MalformedFile, e.to_string()));
                None
            }
        }
    } else {
        findings.extend(missing_geojson(&geojson_path));
        None
    };

    if let Some(shapes) = &shapes {
        findings.extend(check_join(juris, &csv, shapes));
    }
    findings.extend(check_schema(&csv));

    findings
}

fn missing_geojson(path: &Path) -> Option<(ViolationKind, String)> {
    (!path.exists()).then(|| (ViolationKind::MissingFile, path.display().to_string()))
}

/// Outcome of a validation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Number of jurisdiction directories examined.
    pub jurisdictions: usize,
    /// Every finding, in county/jurisdiction order.
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    /// Writes the findings as CSV.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the file cannot be written.
    pub fn write_csv(&self, path: &Path) -> Result<(), PipelineError> {
        write_csv(
            path,
            &["county", "juris", "kind", "detail"],
            self.violations.iter().map(|v| {
                [
                    v.county.clone(),
                    v.juris.clone(),
                    v.kind.label().to_string(),
                    v.detail.clone(),
                ]
            }),
        )
    }
}

/// Lists jurisdiction directories under a county, sorted.
fn jurisdictions(county_dir: &Path) -> Result<Vec<String>, PipelineError> {
    if !county_dir.is_dir() {
        log::warn!("County directory {} does not exist", county_dir.display());
        return Ok(Vec::new());
    }

    let io_err = |e| PipelineError::Io {
        path: county_dir.display().to_string(),
        source: e,
    };

    let mut names = Vec::new();
    for entry in std::fs::read_dir(county_dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if entry.file_type().map_err(io_err)?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Validates every jurisdiction under every configured county and writes
/// `validation_report.csv`.
///
/// # Errors
///
/// Returns [`PipelineError`] only if a county directory cannot be listed
/// or the report cannot be written; findings never fail the run.
pub fn validate_sources(
    config: &RegionConfig,
    paths: &DataPaths,
) -> Result<ValidationReport, PipelineError> {
    let mut report = ValidationReport::default();

    for county in config.counties() {
        for juris in jurisdictions(&paths.county_dir(county))? {
            let dir = paths.general_plan_dir(county, &juris);
            report.jurisdictions += 1;

            let findings = validate_jurisdiction(&dir, &juris);
            if findings.is_empty() {
                log::debug!("{county}/{juris}: ok");
            }
            for (kind, detail) in findings {
                log::warn!("{county}/{juris}: {kind}: {detail}");
                report.violations.push(Violation {
                    county: county.to_string(),
                    juris: juris.clone(),
                    kind,
                    detail,
                });
            }
        }
    }

    report.write_csv(&paths.validation_report())?;
    log::info!(
        "Validated {} jurisdictions: {} findings (written to {})",
        report.jurisdictions,
        report.violations.len(),
        paths.validation_report().display()
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use badata_spatial::features::parse_features;
    use std::fs;

    const HEADER: &str = "name,city,max_far,max_height,max_dua,max_du_per_parcel,\
                          HS,HT,HM,OF,HO,SC,IL,IW,IH,RS,RB,MR,MT,ME";

    fn csv(body: &str) -> CsvTable {
        CsvTable::from_reader(format!("{HEADER}\n{body}").as_bytes(), "juris.csv").unwrap()
    }

    fn kinds(findings: &Findings) -> Vec<ViolationKind> {
        findings.iter().map(|(k, _)| *k).collect()
    }

    const SHAPES: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","geometry":null,"properties":{"general_plan_name":"Residential"}},
        {"type":"Feature","geometry":null,"properties":{"general_plan_name":"Commercial"}}
    ]}"#;

    #[test]
    fn clean_jurisdiction_has_no_findings() {
        let table = csv(
            "Residential,Petaluma,1.5,35,20,1,1,1,0,0,0,0,0,0,0,0,0,0,0,0\n\
             Commercial,Petaluma,,,,,0,0,0,1,0,0,0,0,0,1,0,0,0,0\n",
        );
        let shapes = parse_features(SHAPES, "juris.geojson").unwrap();

        assert!(check_schema(&table).is_empty());
        assert!(check_join("petaluma", &table, &shapes).is_empty());
    }

    #[test]
    fn missing_max_far_is_a_schema_violation() {
        let table = CsvTable::from_reader(
            "name,city,max_height,max_dua,max_du_per_parcel,HS,HT,HM,OF,HO,SC,IL,IW,IH,RS,RB,MR,MT,ME\n\
             Residential,Petaluma,35,20,1,1,1,0,0,0,0,0,0,0,0,0,0,0,0\n"
                .as_bytes(),
            "juris.csv",
        )
        .unwrap();

        let findings = check_schema(&table);
        assert_eq!(
            findings,
            vec![(ViolationKind::MissingColumn, "max_far".to_string())]
        );
        assert!(findings[0].0.is_schema());
    }

    #[test]
    fn height_of_2000_is_out_of_range() {
        let table = csv("Tower,Oakland,4,2000,100,1,0,0,0,0,0,0,0,0,0,0,0,0,0,0\n");
        let findings = check_schema(&table);

        assert_eq!(kinds(&findings), vec![ViolationKind::OutOfRange]);
        assert!(findings[0].1.contains("max_height"));
    }

    #[test]
    fn flags_non_numeric_negative_and_bad_flags() {
        let table = csv("A,Oakland,abc,-5,10,1,2,0,0,0,0,0,0,0,0,0,0,0,0,0\n");
        let findings = check_schema(&table);

        assert_eq!(
            kinds(&findings),
            vec![
                ViolationKind::NonNumeric,
                ViolationKind::OutOfRange,
                ViolationKind::InvalidFlag,
            ]
        );
        assert!(findings[1].1.contains("max_height"));
        assert!(findings[2].1.starts_with("HS"));
    }

    #[test]
    fn join_check_finds_duplicates_and_unknown_names() {
        let table = csv(
            "Residential,Napa,1,1,1,1,0,0,0,0,0,0,0,0,0,0,0,0,0,0\n\
             Residential,Napa,1,1,1,1,0,0,0,0,0,0,0,0,0,0,0,0,0,0\n",
        );
        let shapes = parse_features(
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","geometry":null,"properties":{"general_plan_name":"Residential"}},
                {"type":"Feature","geometry":null,"properties":{"general_plan_name":"Industrial"}},
                {"type":"Feature","geometry":null,"properties":{}}
            ]}"#,
            "juris.geojson",
        )
        .unwrap();

        let findings = check_join("napa", &table, &shapes);
        assert_eq!(
            findings,
            vec![
                (
                    ViolationKind::MissingPlanName,
                    "1 shapes have no general_plan_name".to_string()
                ),
                (ViolationKind::DuplicateName, "Residential".to_string()),
                (ViolationKind::UnknownPlanName, "Industrial".to_string()),
            ]
        );
    }

    #[test]
    fn large_shape_counts_allowed_only_for_big_cities() {
        let table = csv("");
        let shapes: Vec<SpatialFeature> = (0..MAX_SHAPES)
            .map(|_| SpatialFeature {
                geometry: None,
                properties: BTreeMap::new(),
            })
            .collect();

        let small = check_join("yountville", &table, &shapes);
        assert!(kinds(&small).contains(&ViolationKind::TooManyShapes));

        let big = check_join("san_jose", &table, &shapes);
        assert!(!kinds(&big).contains(&ViolationKind::TooManyShapes));
    }

    #[test]
    fn validates_directory_tree_and_writes_report() {
        let tmp = std::env::temp_dir().join("badata_validate_tree_test");
        let _ = fs::remove_dir_all(&tmp);
        let paths = DataPaths::new(&tmp);

        let good = paths.general_plan_dir("sonoma", "petaluma");
        fs::create_dir_all(&good).unwrap();
        fs::write(
            good.join("petaluma.csv"),
            format!(
                "{HEADER}\nResidential,Petaluma,1,35,20,1,1,0,0,0,0,0,0,0,0,0,0,0,0,0\n\
                 Commercial,Petaluma,1,35,20,1,0,0,0,0,0,0,0,0,0,0,0,0,0,0\n"
            ),
        )
        .unwrap();
        fs::write(good.join("petaluma.geojson"), SHAPES).unwrap();

        // A jurisdiction directory with no general plan files.
        fs::create_dir_all(tmp.join("sonoma").join("cotati")).unwrap();

        let config = RegionConfig {
            counties: [
                ("sonoma".to_string(), Vec::new()),
                ("lake".to_string(), Vec::new()),
            ]
            .into_iter()
            .collect(),
        };

        let report = validate_sources(&config, &paths).unwrap();
        assert_eq!(report.jurisdictions, 2);
        assert_eq!(report.violations.len(), 2);
        assert!(report.violations.iter().all(|v| v.juris == "cotati"));
        assert!(
            report
                .violations
                .iter()
                .all(|v| v.kind == ViolationKind::MissingFile)
        );

        let written = CsvTable::read(&paths.validation_report()).unwrap();
        assert_eq!(written.headers, ["county", "juris", "kind", "detail"]);
        assert_eq!(written.len(), 2);

        let _ = fs::remove_dir_all(&tmp);
    }
}
