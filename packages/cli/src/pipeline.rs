//! One analysis run: build zones, aggregate population, write outputs.
//!
//! Shared by the `analyze` subcommand and the interactive wizard. Input
//! loading and grid loading happen in the caller so the wizard can reuse a
//! loaded geometry and grid across runs.

use std::path::{Path, PathBuf};

use ground_risk_cli_utils::StageProgress;
use ground_risk_export::{CellFilter, SerializationError, ZoneFormat};
use ground_risk_geometry_models::NormalizedGeometry;
use ground_risk_population::AggregationError;
use ground_risk_population_models::{AnalysisResult, AssessmentSummary};
use ground_risk_spatial::CellIndex;
use ground_risk_zones::{BuildError, ZoneBuilder};
use ground_risk_zones_models::{FlightParameters, RiskVolume};
use thiserror::Error;

/// Number of stages [`run`] advances the progress bar by.
pub const STAGES: u64 = 4;

/// Errors raised by a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Zones could not be built.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Population aggregation failed.
    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    /// An output file could not be written.
    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

/// Where and how to write the outputs of a run.
#[derive(Debug, Clone)]
pub struct OutputOptions {
    /// Directory receiving every output file.
    pub dir: PathBuf,
    /// File name prefix, usually the input file stem.
    pub name: String,
    /// Zone file format.
    pub zone_format: ZoneFormat,
    /// Rows to keep in the per-zone cell tables.
    pub filter: CellFilter,
}

impl OutputOptions {
    /// `<dir>/<name>_zones.<kml|geojson>`
    #[must_use]
    pub fn zones_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}_zones.{}", self.name, self.zone_format))
    }

    /// `<dir>/<name>_analysis.json`
    #[must_use]
    pub fn report_path(&self) -> PathBuf {
        self.dir.join(format!("{}_analysis.json", self.name))
    }

    /// `<dir>/<name>_cells/`
    #[must_use]
    pub fn tables_dir(&self) -> PathBuf {
        self.dir.join(format!("{}_cells", self.name))
    }
}

/// Population part of an analysis.
#[derive(Debug, Clone)]
pub struct PopulationOutcome {
    /// Per-zone statistics.
    pub result: AnalysisResult,
    /// Derived assessment.
    pub summary: AssessmentSummary,
}

/// Everything one run produced.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    /// The built zones.
    pub volume: RiskVolume,
    /// `None` when the run had no population grid.
    pub population: Option<PopulationOutcome>,
    /// Every file written, zone file first.
    pub written: Vec<PathBuf>,
}

/// File stem used to name outputs for `input`.
#[must_use]
pub fn output_name(input: &Path) -> String {
    input
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("flight")
        .to_string()
}

/// Builds zones for `geometry`, writes the zone file and, when `grid` is
/// given, aggregates population and writes the report and cell tables.
///
/// Advances `progress` by [`STAGES`]; abandons it on failure.
///
/// # Errors
///
/// Returns a [`PipelineError`] from the first failing stage.
pub fn run(
    progress: &mut StageProgress,
    builder: &ZoneBuilder,
    grid: Option<&dyn CellIndex>,
    geometry: &NormalizedGeometry,
    params: &FlightParameters,
    outputs: &OutputOptions,
) -> Result<AnalysisOutcome, PipelineError> {
    let outcome = run_stages(progress, builder, grid, geometry, params, outputs);
    if outcome.is_err() {
        progress.abandon();
    }
    outcome
}

fn run_stages(
    progress: &mut StageProgress,
    builder: &ZoneBuilder,
    grid: Option<&dyn CellIndex>,
    geometry: &NormalizedGeometry,
    params: &FlightParameters,
    outputs: &OutputOptions,
) -> Result<AnalysisOutcome, PipelineError> {
    progress.start("Building zones");
    let volume = builder.build_zones(geometry, params)?;
    for zone in volume.iter() {
        log::info!(
            "{}: {:.1} m from the flight geometry",
            zone.name,
            zone.cumulative_distance_m
        );
    }
    progress.complete();

    progress.start("Writing zones");
    let zones_path = outputs.zones_path();
    ground_risk_export::write_zones(&zones_path, &volume)?;
    let mut written = vec![zones_path];
    progress.complete();

    let Some(grid) = grid else {
        progress.skip("Aggregating population");
        progress.skip("Writing reports");
        return Ok(AnalysisOutcome {
            volume,
            population: None,
            written,
        });
    };

    progress.start("Aggregating population");
    let result = ground_risk_population::aggregate(grid, &volume)?;
    let summary = ground_risk_population::assess(&result);
    progress.complete();

    progress.start("Writing reports");
    let report_path = outputs.report_path();
    ground_risk_export::write_analysis_json(&report_path, &result, &summary)?;
    written.push(report_path);
    written.extend(ground_risk_export::write_zone_tables(
        &outputs.tables_dir(),
        &result,
        outputs.filter,
    )?);
    progress.complete();

    Ok(AnalysisOutcome {
        volume,
        population: Some(PopulationOutcome { result, summary }),
        written,
    })
}

/// Human-readable summary of an outcome, one line per entry.
#[must_use]
pub fn report_lines(outcome: &AnalysisOutcome) -> Vec<String> {
    let mut lines = Vec::new();

    if outcome.volume.fg_size_ignored {
        lines.push(
            "Polygon input: fg_size ignored, the polygon is the Flight Geography".to_string(),
        );
    }
    lines.push(format!(
        "Ground Risk Buffer width: {:.1} m ({} corners)",
        outcome.volume.grb_size_m, outcome.volume.corner_style
    ));

    for zone in outcome.volume.iter() {
        let stats = outcome
            .population
            .as_ref()
            .map(|p| p.result.get(zone.name));
        let line = stats.map_or_else(
            || format!("  {:<20} {:>9.1} m", zone.name.to_string(), zone.cumulative_distance_m),
            |s| {
                format!(
                    "  {:<20} {:>9.1} m  {:>10.2} hab/km²  {:>6} cells  {:>4} > 5 hab/km²",
                    zone.name.to_string(),
                    zone.cumulative_distance_m,
                    s.mean_density_hab_km2,
                    s.cell_count_total,
                    s.cell_count_above_threshold
                )
            },
        );
        lines.push(line);
    }

    if let Some(population) = &outcome.population {
        let summary = &population.summary;
        lines.push(if summary.inhospitable {
            format!(
                "GRB mean density {:.2} hab/km² is below 1 hab/km²: inhospitable area",
                summary.grb_mean_density_hab_km2
            )
        } else {
            format!(
                "GRB mean density {:.2} hab/km² is not an inhospitable area",
                summary.grb_mean_density_hab_km2
            )
        });
        if summary.no_fly_zones_required {
            lines.push(format!(
                "{} GRB cells exceed 5 hab/km²: define no-fly zones over them",
                summary.grb_critical_cells
            ));
        }
        if summary.adjacent_area_exceeds {
            lines.push(format!(
                "Adjacent Area mean density {:.2} hab/km² exceeds 50 hab/km²",
                summary.adjacent_mean_density_hab_km2
            ));
        }
    } else {
        lines.push("No population grid loaded: densities not computed".to_string());
    }

    for path in &outcome.written {
        lines.push(format!("Wrote {}", path.display()));
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, MultiPolygon, Point, coord, polygon};
    use ground_risk_cli_utils::{MultiProgress, ProgressDrawTarget};
    use ground_risk_geometry_models::{Crs, Datum, FlightGeometry, GeometryClass};
    use ground_risk_population_models::PopulationCell;
    use ground_risk_projection::{Hemisphere, UtmZone};
    use ground_risk_spatial::PopulationGrid;

    fn zone() -> UtmZone {
        UtmZone::new(23, Hemisphere::South).unwrap()
    }

    fn line() -> NormalizedGeometry {
        NormalizedGeometry {
            geometry: FlightGeometry::LineString(LineString::from(vec![
                coord! { x: 190_000.0, y: 8_250_000.0 },
                coord! { x: 191_000.0, y: 8_250_000.0 },
            ])),
            source_crs: Crs::Utm(Datum::Sirgas2000, zone()),
            zone: zone(),
        }
    }

    /// A 100 m square cell whose south-west corner is at `(x, y)` metres.
    fn cell(id: &str, x: f64, y: f64, population: u64) -> PopulationCell {
        let square = MultiPolygon::new(vec![polygon![
            (x: x, y: y),
            (x: x + 100.0, y: y),
            (x: x + 100.0, y: y + 100.0),
            (x: x, y: y + 100.0),
        ]]);
        let (lon, lat) = zone().inverse(x + 50.0, y + 50.0);
        PopulationCell {
            cell_id: id.to_string(),
            polygon: zone().unproject(&square),
            population,
            area_km2: 0.01,
            centroid: Point::new(lon, lat),
        }
    }

    fn outputs(name: &str) -> OutputOptions {
        OutputOptions {
            dir: std::env::temp_dir()
                .join(format!("ground_risk_cli_{}_{name}", std::process::id())),
            name: "corridor".to_string(),
            zone_format: ZoneFormat::GeoJson,
            filter: CellFilter::All,
        }
    }

    fn hidden_progress() -> StageProgress {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        StageProgress::new(&multi, STAGES)
    }

    #[test]
    fn output_names_follow_input_stem() {
        assert_eq!(output_name(Path::new("/data/route 7.geojson")), "route 7");
        assert_eq!(output_name(Path::new("")), "flight");

        let options = outputs("names");
        assert!(options.zones_path().ends_with("corridor_zones.geojson"));
        assert!(options.report_path().ends_with("corridor_analysis.json"));
        assert!(options.tables_dir().ends_with("corridor_cells"));
    }

    #[test]
    fn full_run_writes_every_output() {
        // 130 m north of the line: outside CV (100 m), inside GRB (200 m).
        let grid = PopulationGrid::from_cells(vec![
            cell("grb", 190_400.0, 8_250_130.0, 40),
            cell("far", 400_000.0, 8_000_000.0, 1_000),
        ]);
        let options = outputs("full");
        let mut progress = hidden_progress();

        let outcome = run(
            &mut progress,
            &ZoneBuilder::default(),
            Some(&grid),
            &line(),
            &FlightParameters::default(),
            &options,
        )
        .unwrap();

        let population = outcome.population.as_ref().unwrap();
        let grb = &population.result.ground_risk_buffer;
        assert_eq!(grb.cell_count_total, 1);
        assert!((grb.mean_density_hab_km2 - 4000.0).abs() < 1e-6);
        assert!(population.summary.no_fly_zones_required);
        assert_eq!(population.result.flight_geography.cell_count_total, 0);

        assert_eq!(outcome.written.len(), 6, "zones, report, four tables");
        for path in &outcome.written {
            assert!(path.exists(), "{} was not written", path.display());
        }

        let lines = report_lines(&outcome);
        assert!(lines.iter().any(|l| l.contains("no-fly zones")));
        assert!(lines.iter().any(|l| l.contains("Ground Risk Buffer") && l.contains("200.0 m")));

        std::fs::remove_dir_all(&options.dir).ok();
    }

    #[test]
    fn run_without_grid_only_writes_zones() {
        let options = outputs("zones_only");
        let mut progress = hidden_progress();

        let outcome = run(
            &mut progress,
            &ZoneBuilder::default(),
            None,
            &line(),
            &FlightParameters::default(),
            &options,
        )
        .unwrap();

        assert!(outcome.population.is_none());
        assert_eq!(outcome.written, vec![options.zones_path()]);
        assert!(
            report_lines(&outcome)
                .iter()
                .any(|l| l.contains("No population grid"))
        );

        std::fs::remove_dir_all(&options.dir).ok();
    }

    #[test]
    fn kml_zone_file_loads_as_flight_geometry() {
        let options = OutputOptions {
            zone_format: ZoneFormat::Kml,
            ..outputs("kml_reload")
        };
        let mut progress = hidden_progress();

        run(
            &mut progress,
            &ZoneBuilder::default(),
            None,
            &line(),
            &FlightParameters::default(),
            &options,
        )
        .unwrap();

        let reloaded = ground_risk_geometry::load(&options.zones_path(), None).unwrap();
        assert_eq!(reloaded.class(), GeometryClass::Areal);
        assert_eq!(reloaded.zone, zone());

        std::fs::remove_dir_all(&options.dir).ok();
    }

    #[test]
    fn invalid_parameters_fail_before_writing() {
        let options = outputs("invalid");
        let mut progress = hidden_progress();
        let params = FlightParameters {
            cv_size_m: -1.0,
            ..FlightParameters::default()
        };

        let err = run(
            &mut progress,
            &ZoneBuilder::default(),
            None,
            &line(),
            &params,
            &options,
        )
        .unwrap_err();

        assert!(matches!(err, PipelineError::Build(BuildError::Validation(_))));
        assert!(!options.zones_path().exists());
    }
}
