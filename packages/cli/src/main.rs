#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! SORA ground risk analysis from the command line.
//!
//! ```text
//! ground_risk analyze route.kml --height 120 [--crs EPSG:31983] [--format geojson]
//! ground_risk preview-grb --height 120
//! ground_risk interactive
//! ```
//!
//! Running `ground_risk` with no subcommand enters interactive mode.
//!
//! Log output goes through `indicatif-log-bridge` (via
//! [`ground_risk_cli_utils::init_logger`]) so that log lines and the stage
//! bar never fight for the terminal. Set `RUST_LOG=info` for stage timings.

mod config;
mod interactive;
mod pipeline;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use ground_risk_cli_utils::{MultiProgress, StageProgress};
use ground_risk_export::{CellFilter, ZoneFormat};
use ground_risk_geometry_models::{Crs, GeometryClass};
use ground_risk_spatial::{CellIndex, PopulationGrid};
use ground_risk_zones_models::{CornerStyle, FlightParameters};

use crate::config::AnalysisConfig;
use crate::pipeline::OutputOptions;

#[derive(Parser)]
#[command(
    name = "ground_risk",
    about = "Build SORA ground risk zones and measure the population under them"
)]
struct Cli {
    /// Analysis config (TOML). Built-in defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build zones for one flight geometry and aggregate population
    Analyze(AnalyzeArgs),
    /// Print zone distances for a flight height without any geometry
    PreviewGrb {
        /// Flight height (m)
        #[arg(long)]
        height: f64,
        /// Flight Geography size (m)
        #[arg(long, default_value_t = 50.0)]
        fg_size: f64,
        /// Contingency Volume size (m)
        #[arg(long, default_value_t = 50.0)]
        cv_size: f64,
        /// Distances for a polygon flight area instead of a point or path
        #[arg(long)]
        areal: bool,
    },
    /// Step-by-step wizard
    Interactive {
        /// Directory receiving output files
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
    },
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Flight geometry (.kml or .geojson)
    input: PathBuf,
    /// CRS of the input, overriding any declared in the file
    #[arg(long)]
    crs: Option<Crs>,
    /// Flight Geography size (m), ignored for polygon input
    #[arg(long, default_value_t = 50.0, allow_negative_numbers = true)]
    fg_size: f64,
    /// Flight height (m)
    #[arg(long, default_value_t = 100.0, allow_negative_numbers = true)]
    height: f64,
    /// Contingency Volume size (m)
    #[arg(long, default_value_t = 50.0, allow_negative_numbers = true)]
    cv_size: f64,
    /// Corner style: square or rounded
    #[arg(long, default_value_t = CornerStyle::Square)]
    corner_style: CornerStyle,
    /// Zone file format: kml or geojson
    #[arg(long, default_value_t = ZoneFormat::Kml)]
    format: ZoneFormat,
    /// Cells to export: all, populated or critical
    #[arg(long, default_value_t = CellFilter::All)]
    filter: CellFilter,
    /// Directory receiving output files
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,
    /// Population grid (.duckdb or .geojson), overriding the config
    #[arg(long)]
    grid: Option<PathBuf>,
    /// Only build and export zones
    #[arg(long)]
    no_population: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = ground_risk_cli_utils::init_logger();
    let cli = Cli::parse();
    let mut config = AnalysisConfig::load(cli.config.as_deref())?;

    let Some(command) = cli.command else {
        println!("SORA Ground Risk Analysis");
        return interactive::run(&multi, &config, &PathBuf::from("output"));
    };

    match command {
        Commands::Analyze(args) => {
            if let Some(grid) = &args.grid {
                config.grid.path.clone_from(grid);
            }
            analyze(&multi, &config, &args)?;
        }
        Commands::PreviewGrb {
            height,
            fg_size,
            cv_size,
            areal,
        } => {
            let builder = config.zone_builder()?;
            let params = FlightParameters {
                fg_size_m: fg_size,
                height_m: height,
                cv_size_m: cv_size,
                corner_style: CornerStyle::Square,
            };
            let class = if areal {
                GeometryClass::Areal
            } else {
                GeometryClass::Linear
            };
            let distances = builder.zone_distances(class, &params)?;

            println!(
                "Ground Risk Buffer width at {height} m: {:.1} m",
                builder.preview_grb_size(height)?
            );
            for (zone, distance) in distances.iter() {
                println!("  {:<20} {distance:>9.1} m", zone.to_string());
            }
        }
        Commands::Interactive { output_dir } => {
            interactive::run(&multi, &config, &output_dir)?;
        }
    }

    Ok(())
}

fn analyze(
    multi: &MultiProgress,
    config: &AnalysisConfig,
    args: &AnalyzeArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let builder = config.zone_builder()?;
    let params = FlightParameters {
        fg_size_m: args.fg_size,
        height_m: args.height,
        cv_size_m: args.cv_size,
        corner_style: args.corner_style,
    };
    params.validate()?;

    let mut progress = StageProgress::new(multi, pipeline::STAGES + 2);

    progress.start("Loading flight geometry");
    let geometry = ground_risk_geometry::load(&args.input, args.crs)
        .inspect_err(|_| progress.abandon())?;
    progress.complete();

    let grid = if args.no_population {
        progress.skip("Loading population grid");
        None
    } else {
        progress.start("Loading population grid");
        let grid = PopulationGrid::load(&config.grid).inspect_err(|_| progress.abandon())?;
        log::info!("{} population cells available", grid.len());
        progress.complete();
        Some(grid)
    };

    let outputs = OutputOptions {
        dir: args.output_dir.clone(),
        name: pipeline::output_name(&args.input),
        zone_format: args.format,
        filter: args.filter,
    };
    let outcome = pipeline::run(
        &mut progress,
        &builder,
        grid.as_ref().map(|g| g as &dyn CellIndex),
        &geometry,
        &params,
        &outputs,
    )?;
    progress.finish("Analysis complete");

    for line in pipeline::report_lines(&outcome) {
        println!("{line}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_analyze_flags() {
        let cli = Cli::try_parse_from([
            "ground_risk",
            "analyze",
            "route.geojson",
            "--crs",
            "EPSG:31983",
            "--height",
            "120",
            "--corner-style",
            "rounded",
            "--format",
            "geojson",
            "--filter",
            "critical",
        ])
        .unwrap();

        let Some(Commands::Analyze(args)) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(args.crs.map(Crs::epsg), Some(31983));
        assert!((args.height - 120.0).abs() < f64::EPSILON);
        assert!((args.fg_size - 50.0).abs() < f64::EPSILON);
        assert_eq!(args.corner_style, CornerStyle::Rounded);
        assert_eq!(args.format, ZoneFormat::GeoJson);
        assert_eq!(args.filter, CellFilter::Critical);
        assert!(!args.no_population);
    }

    #[test]
    fn rejects_unknown_crs_and_style() {
        let parse = |flag: &str, value: &str| {
            Cli::try_parse_from(["ground_risk", "analyze", "a.geojson", flag, value])
        };
        assert!(parse("--crs", "EPSG:3857").is_err());
        assert!(parse("--corner-style", "bevel").is_err());
        assert!(parse("--format", "shp").is_err());
        assert!(parse("--height", "-5").is_ok(), "range is checked by the builder");
    }

    #[test]
    fn no_subcommand_is_interactive() {
        let cli = Cli::try_parse_from(["ground_risk", "--config", "risk.toml"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, Some(PathBuf::from("risk.toml")));
    }
}
