//! Plain CSV tables with header-addressed columns.
//!
//! Every stage reads its CSV inputs through [`CsvTable`] and checks the
//! columns it depends on with [`CsvTable::require_columns`] before
//! touching any row.

use std::path::Path;

use crate::PipelineError;

/// A fully materialized CSV table. Every row has exactly
/// `headers.len()` cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvTable {
    /// Trimmed column names.
    pub headers: Vec<String>,
    /// Row cells, padded with empty strings for short rows.
    pub rows: Vec<Vec<String>>,
    /// Where the table came from, for error messages.
    pub origin: String,
}

impl CsvTable {
    /// Reads a CSV file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingInput`] if the file does not exist
    /// and [`PipelineError::Csv`] if it cannot be parsed.
    pub fn read(path: &Path) -> Result<Self, PipelineError> {
        if !path.exists() {
            return Err(PipelineError::MissingInput {
                path: path.display().to_string(),
            });
        }

        let file = std::fs::File::open(path).map_err(|e| PipelineError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_reader(file, &path.display().to_string())
    }

    /// Reads CSV data from any reader. `origin` names the source in error
    /// messages.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Csv`] if the data cannot be parsed.
    pub fn from_reader(reader: impl std::io::Read, origin: &str) -> Result<Self, PipelineError> {
        let csv_err = |e| PipelineError::Csv {
            path: origin.to_string(),
            source: e,
        };

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(|h| h.trim().to_owned())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            let mut row: Vec<String> = record.iter().map(str::to_owned).collect();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        Ok(Self {
            headers,
            rows,
            origin: origin.to_string(),
        })
    }

    /// Returns the index of a column.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Returns the indexes of every named column, in order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingColumns`] listing every absent
    /// column.
    pub fn require_columns(&self, names: &[&str]) -> Result<Vec<usize>, PipelineError> {
        let mut indexes = Vec::with_capacity(names.len());
        let mut missing = Vec::new();

        for name in names {
            match self.column_index(name) {
                Some(i) => indexes.push(i),
                None => missing.push((*name).to_string()),
            }
        }

        if missing.is_empty() {
            Ok(indexes)
        } else {
            Err(PipelineError::MissingColumns {
                path: self.origin.clone(),
                columns: missing,
            })
        }
    }

    /// Number of data rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no data rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Writes the table to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the file cannot be written.
    pub fn write(&self, path: &Path) -> Result<(), PipelineError> {
        write_csv(path, &self.headers, self.rows.iter())
    }
}

/// Writes a header and rows to a CSV file, creating parent directories.
///
/// # Errors
///
/// Returns [`PipelineError`] if the directory or file cannot be written.
pub fn write_csv<H, R, C>(
    path: &Path,
    headers: &[H],
    rows: impl IntoIterator<Item = R>,
) -> Result<(), PipelineError>
where
    H: AsRef<str>,
    R: IntoIterator<Item = C>,
    C: AsRef<str>,
{
    let csv_err = |e| PipelineError::Csv {
        path: path.display().to_string(),
        source: e,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::Io {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    writer
        .write_record(headers.iter().map(|h| h.as_ref().as_bytes()))
        .map_err(csv_err)?;

    for row in rows {
        writer
            .write_record(row.into_iter().map(|c| c.as_ref().as_bytes().to_vec()))
            .map_err(csv_err)?;
    }

    writer.flush().map_err(|e| PipelineError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

/// Normalizes an identifier cell so `"3"`, `" 3 "`, and `"3.0"` compare
/// equal.
#[must_use]
pub fn normalize_key(value: &str) -> &str {
    let trimmed = value.trim();
    trimmed.strip_suffix(".0").unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_short_rows() {
        let table = CsvTable::from_reader("a,b,c\n1,2\n4,5,6\n".as_bytes(), "mem").unwrap();
        assert_eq!(table.headers, ["a", "b", "c"]);
        assert_eq!(table.rows[0], ["1", "2", ""]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn reports_every_missing_column() {
        let table = CsvTable::from_reader("id,city\n1,Oakland\n".as_bytes(), "zoning.csv").unwrap();
        let err = table.require_columns(&["id", "name", "max_far"]).unwrap_err();

        match err {
            PipelineError::MissingColumns { path, columns } => {
                assert_eq!(path, "zoning.csv");
                assert_eq!(columns, ["name", "max_far"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_file_is_missing_input() {
        let err = CsvTable::read(Path::new("/nonexistent/zoning_lookup.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput { .. }));
    }

    #[test]
    fn write_then_read() {
        let tmp = std::env::temp_dir().join("badata_table_test");
        let _ = std::fs::remove_dir_all(&tmp);

        let path = tmp.join("nested").join("out.csv");
        write_csv(
            &path,
            &["id", "name"],
            vec![vec!["1", "Downtown, North"], vec!["2", ""]],
        )
        .unwrap();

        let table = CsvTable::read(&path).unwrap();
        assert_eq!(table.rows[0], ["1", "Downtown, North"]);
        assert_eq!(table.rows[1], ["2", ""]);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn normalizes_keys() {
        assert_eq!(normalize_key(" 3 "), "3");
        assert_eq!(normalize_key("3.0"), "3");
        assert_eq!(normalize_key("abc"), "abc");
    }
}
