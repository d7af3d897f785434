//! ZIP extraction for compressed parcel inputs.
//!
//! County parcel files ship as `.zip` archives next to where the plain
//! file is expected. Extraction happens in place, once: if the plain file
//! is already present the archive is never opened.

use std::path::Path;

/// Extracts every entry of a ZIP archive into `dest_dir`.
///
/// The target directory is created if it does not exist. Existing files
/// are overwritten by archive entries of the same name.
///
/// # Errors
///
/// Returns [`ArchiveError`] if the archive cannot be opened or an entry
/// cannot be written.
pub fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<usize, ArchiveError> {
    if !archive_path.exists() {
        return Err(ArchiveError::ArchiveNotFound(
            archive_path.display().to_string(),
        ));
    }

    log::info!(
        "Unzipping {} -> {}",
        archive_path.display(),
        dest_dir.display()
    );

    std::fs::create_dir_all(dest_dir).map_err(|e| ArchiveError::Io {
        path: dest_dir.display().to_string(),
        source: e,
    })?;

    let file = std::fs::File::open(archive_path).map_err(|e| ArchiveError::Io {
        path: archive_path.display().to_string(),
        source: e,
    })?;

    let mut archive = zip::ZipArchive::new(file).map_err(|e| ArchiveError::Zip {
        path: archive_path.display().to_string(),
        source: e,
    })?;

    let count = archive.len();
    archive.extract(dest_dir).map_err(|e| ArchiveError::Zip {
        path: archive_path.display().to_string(),
        source: e,
    })?;

    log::info!("  extracted {count} entries");

    Ok(count)
}

/// Makes sure `path` exists, extracting the sibling `.zip` archive into
/// the file's directory when it does not.
///
/// Returns `true` if an archive was extracted.
///
/// # Errors
///
/// Returns [`ArchiveError::ArchiveNotFound`] if neither the file nor its
/// archive exists, or any extraction error.
pub fn ensure_extracted(path: &Path) -> Result<bool, ArchiveError> {
    if path.exists() {
        return Ok(false);
    }

    let archive_path = path.with_extension("zip");
    let dest_dir = path.parent().unwrap_or_else(|| Path::new("."));
    extract_zip(&archive_path, dest_dir)?;

    Ok(true)
}

/// Errors from archive operations.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// Archive file not found.
    #[error("Archive not found: {0}")]
    ArchiveNotFound(String),

    /// Archive is not a readable ZIP file.
    #[error("Invalid zip archive {path}: {source}")]
    Zip {
        /// Path that caused the error.
        path: String,
        /// Underlying zip error.
        source: zip::result::ZipError,
    },

    /// I/O error during extraction.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    fn write_zip(zip_path: &Path, name: &str, data: &[u8]) {
        let file = fs::File::create(zip_path).unwrap();
        let mut zip_writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        zip_writer.start_file(name, options).unwrap();
        zip_writer.write_all(data).unwrap();
        zip_writer.finish().unwrap();
    }

    #[test]
    fn extracts_missing_file_from_sibling_zip() {
        let tmp = std::env::temp_dir().join("badata_archive_extract_test");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        write_zip(
            &tmp.join("marin_parcels.zip"),
            "marin_parcels.csv",
            b"gid,land_value\n1,100\n",
        );

        let target = tmp.join("marin_parcels.csv");
        assert!(ensure_extracted(&target).unwrap());
        assert_eq!(
            fs::read_to_string(&target).unwrap(),
            "gid,land_value\n1,100\n"
        );

        // Second call sees the extracted file and does nothing.
        assert!(!ensure_extracted(&target).unwrap());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_file_and_archive_is_an_error() {
        let tmp = std::env::temp_dir().join("badata_archive_missing_test");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        let err = ensure_extracted(&tmp.join("napa_parcels.csv")).unwrap_err();
        assert!(matches!(err, ArchiveError::ArchiveNotFound(ref p) if p.ends_with("napa_parcels.zip")));

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_non_zip_archive() {
        let tmp = std::env::temp_dir().join("badata_archive_corrupt_test");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        fs::write(tmp.join("solano_parcels.zip"), b"not a zip").unwrap();
        let err = ensure_extracted(&tmp.join("solano_parcels.csv")).unwrap_err();
        assert!(matches!(err, ArchiveError::Zip { .. }));

        let _ = fs::remove_dir_all(&tmp);
    }
}
