#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! General plan aggregation and parcel joins for Bay Area land-use data.
//!
//! The stages mirror the batch runs the CLI exposes:
//!
//! 1. [`aggregate`] merges per-jurisdiction general plan `GeoJSON` into a
//!    single plan table.
//! 2. [`join`] reduces parcels to centroids and joins them to TAZs and to
//!    the plan table, keeping one plan per parcel by [`Priority`].
//! 3. [`diagnose`] reports zoning records with no plan geometry.
//! 4. [`validate`] checks the per-jurisdiction source files.
//!
//! [`Priority`]: badata_plan_models::Priority

pub mod aggregate;
pub mod archive;
pub mod diagnose;
pub mod join;
pub mod parcels;
pub mod paths;
pub mod plans;
pub mod progress;
pub mod table;
pub mod validate;

use badata_plan_models::ConfigError;
use badata_spatial::SpatialError;
use thiserror::Error;

use crate::archive::ArchiveError;

/// Errors that can occur while running a pipeline stage.
///
/// Data-quality conditions (unmatched parcels, missing join keys,
/// validation findings) are reported through stage outputs and never
/// surface here.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Region config could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Geometry file or geometry text could not be decoded.
    #[error(transparent)]
    Spatial(#[from] SpatialError),

    /// Parcel archive could not be extracted.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// File system operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// CSV read or write failed.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// Path that caused the error.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// A mandatory input file is absent and no archive could supply it.
    #[error("Missing required input: {path}")]
    MissingInput {
        /// Path of the missing file.
        path: String,
    },

    /// A table lacks columns its stage requires.
    #[error("{path}: missing required column(s): {}", columns.join(", "))]
    MissingColumns {
        /// Path of the offending table.
        path: String,
        /// Names of the absent columns.
        columns: Vec<String>,
    },

    /// A row holds a value its stage cannot interpret.
    #[error("{path}: row {row}: {message}")]
    InvalidValue {
        /// Path of the offending table.
        path: String,
        /// 1-based data row number.
        row: usize,
        /// Description of the problem.
        message: String,
    },

    /// A blocking join task panicked or was cancelled.
    #[error("Join task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
