#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the badata general plan toolchain.
//!
//! Each `--mode` runs one batch stage against a data root laid out as
//! `{root}/{county}/{city}/...`. Log output is routed through
//! `indicatif-log-bridge` (via [`badata_cli_utils::init_logger`]) so the
//! per-county join bar and log lines share the terminal.

use std::path::PathBuf;
use std::time::Instant;

use badata_cli_utils::IndicatifProgress;
use badata_plan::aggregate::aggregate_plans;
use badata_plan::diagnose::diagnose_merge;
use badata_plan::join::merge_parcels_and_gp_data;
use badata_plan::paths::DataPaths;
use badata_plan::validate::validate_sources;
use badata_plan_models::RegionConfig;
use clap::Parser;

#[derive(Parser)]
#[command(name = "badata", about = "Bay Area general plan and parcel data tool")]
struct Cli {
    /// Stage to run (see the list printed when omitted)
    #[arg(long)]
    mode: Option<String>,

    /// Data root holding the county directories
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// County to city mapping (defaults to `{root}/cities_and_counties.toml`)
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Batch stages selectable with `--mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    MergeGpData,
    MergeParcelsAndGpData,
    DiagnoseMerge,
    ValidateSources,
}

impl Mode {
    const ALL: &[Self] = &[
        Self::MergeGpData,
        Self::MergeParcelsAndGpData,
        Self::DiagnoseMerge,
        Self::ValidateSources,
    ];

    const fn name(self) -> &'static str {
        match self {
            Self::MergeGpData => "merge_gp_data",
            Self::MergeParcelsAndGpData => "merge_parcels_and_gp_data",
            Self::DiagnoseMerge => "diagnose_merge",
            Self::ValidateSources => "validate_sources",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.name() == name)
    }
}

fn usage() -> String {
    let names: Vec<&str> = Mode::ALL.iter().map(|m| m.name()).collect();
    format!("Specify a mode with --mode, one of: {}", names.join(", "))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = badata_cli_utils::init_logger();
    let cli = Cli::parse();

    let Some(mode) = cli.mode.as_deref().and_then(Mode::parse) else {
        if let Some(unknown) = &cli.mode {
            println!("Unknown mode '{unknown}'");
        }
        println!("{}", usage());
        return Ok(());
    };

    let paths = DataPaths::new(cli.root);
    let config_path = cli.config.unwrap_or_else(|| paths.region_config());
    let start = Instant::now();

    match mode {
        Mode::MergeGpData => {
            let config = RegionConfig::load(&config_path)?;
            let table = aggregate_plans(&config, &paths)?;
            table.write_csv(&paths.merged_plans())?;
            log::info!(
                "Wrote {} plan records to {}",
                table.len(),
                paths.merged_plans().display()
            );
        }
        Mode::MergeParcelsAndGpData => {
            let config = RegionConfig::load(&config_path)?;
            let progress = IndicatifProgress::steps_bar(&multi, "Joining counties");
            let summary = merge_parcels_and_gp_data(&config, &paths, progress).await?;
            log::info!(
                "Joined {} parcels ({} without zone, {} without plan), {} zone files",
                summary.parcels,
                summary.without_zone,
                summary.without_plan,
                summary.zone_files
            );
        }
        Mode::DiagnoseMerge => {
            diagnose_merge(&paths)?;
        }
        Mode::ValidateSources => {
            let config = RegionConfig::load(&config_path)?;
            validate_sources(&config, &paths)?;
        }
    }

    log::info!("{} finished in {:.1?}", mode.name(), start.elapsed());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_mode_by_name() {
        for mode in Mode::ALL {
            assert_eq!(Mode::parse(mode.name()), Some(*mode));
        }
        assert_eq!(Mode::parse("merge_everything"), None);
    }

    #[test]
    fn usage_lists_all_modes() {
        let text = usage();
        for mode in Mode::ALL {
            assert!(text.contains(mode.name()));
        }
    }

    #[test]
    fn root_defaults_to_current_directory() {
        let cli = Cli::try_parse_from(["badata"]).unwrap();
        assert!(cli.mode.is_none());
        assert_eq!(cli.root, PathBuf::from("."));
        assert!(cli.config.is_none());
    }
}
