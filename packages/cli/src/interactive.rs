//! Interactive wizard.
//!
//! Steps are an explicit state machine. [`WizardState::apply`] holds every
//! transition and is free of I/O; [`run`] prompts for the event that moves
//! the current state forward. Editing the input or the parameters returns
//! to the matching state and drops any previous result.

use std::path::{Path, PathBuf};

use dialoguer::{Confirm, Input, Select};
use ground_risk_cli_utils::{MultiProgress, StageProgress};
use ground_risk_export::{CellFilter, ZoneFormat};
use ground_risk_geometry_models::{Crs, GeometryClass, NormalizedGeometry};
use ground_risk_spatial::{CellIndex, PopulationGrid};
use ground_risk_zones::ZoneBuilder;
use ground_risk_zones_models::{CornerStyle, FlightParameters};

use crate::config::AnalysisConfig;
use crate::pipeline::{self, AnalysisOutcome, OutputOptions};

/// A loaded flight geometry and the file it came from.
#[derive(Debug, Clone)]
pub struct LoadedInput {
    /// Source file.
    pub path: PathBuf,
    /// Geometry ready for buffering.
    pub geometry: NormalizedGeometry,
}

/// Where the wizard is.
#[derive(Debug)]
pub enum WizardState {
    /// No geometry yet.
    AwaitingInput,
    /// Geometry loaded, parameters not yet entered.
    AwaitingParameters {
        /// The loaded geometry.
        input: LoadedInput,
    },
    /// Ready to run the analysis.
    Processing {
        /// The loaded geometry.
        input: LoadedInput,
        /// Validated parameters.
        params: FlightParameters,
    },
    /// Analysis finished.
    Done {
        /// The loaded geometry.
        input: LoadedInput,
        /// Parameters of the run.
        params: FlightParameters,
        /// What the run produced.
        outcome: Box<AnalysisOutcome>,
    },
    /// The user quit.
    Finished,
}

/// Something that moves the wizard.
#[derive(Debug)]
pub enum WizardEvent {
    /// A geometry file was loaded.
    InputLoaded(LoadedInput),
    /// Parameters were entered.
    ParametersEntered(FlightParameters),
    /// The analysis succeeded.
    AnalysisCompleted(Box<AnalysisOutcome>),
    /// The analysis failed; parameters must be revised.
    AnalysisFailed,
    /// Load a different geometry.
    EditInput,
    /// Change the parameters of the current geometry.
    EditParameters,
    /// Leave the wizard.
    Quit,
}

impl WizardState {
    /// Applies `event`. Events that do not apply to the current state
    /// leave it unchanged.
    #[must_use]
    pub fn apply(self, event: WizardEvent) -> Self {
        match (self, event) {
            (_, WizardEvent::Quit) => Self::Finished,
            (Self::Finished, _) => Self::Finished,

            (Self::AwaitingInput, WizardEvent::InputLoaded(input)) => {
                Self::AwaitingParameters { input }
            }
            (Self::AwaitingParameters { input }, WizardEvent::ParametersEntered(params)) => {
                Self::Processing { input, params }
            }
            (Self::Processing { input, params }, WizardEvent::AnalysisCompleted(outcome)) => {
                Self::Done {
                    input,
                    params,
                    outcome,
                }
            }
            (Self::Processing { input, .. }, WizardEvent::AnalysisFailed) => {
                Self::AwaitingParameters { input }
            }

            (
                Self::AwaitingInput
                | Self::AwaitingParameters { .. }
                | Self::Processing { .. }
                | Self::Done { .. },
                WizardEvent::EditInput,
            ) => Self::AwaitingInput,
            (
                Self::AwaitingParameters { input }
                | Self::Processing { input, .. }
                | Self::Done { input, .. },
                WizardEvent::EditParameters,
            ) => Self::AwaitingParameters { input },

            (state, event) => {
                log::warn!("Ignoring {event:?} in state {}", state.label());
                state
            }
        }
    }

    /// Short name of the state.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::AwaitingInput => "awaiting input",
            Self::AwaitingParameters { .. } => "awaiting parameters",
            Self::Processing { .. } => "processing",
            Self::Done { .. } => "done",
            Self::Finished => "finished",
        }
    }
}

/// Actions offered once an analysis is done.
enum DoneAction {
    EditParameters,
    EditInput,
    Quit,
}

impl DoneAction {
    const ALL: &[Self] = &[Self::EditParameters, Self::EditInput, Self::Quit];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::EditParameters => "Change flight parameters",
            Self::EditInput => "Load another flight geometry",
            Self::Quit => "Quit",
        }
    }
}

/// Runs the wizard until the user quits.
///
/// The population grid is loaded once up front and shared by every run.
///
/// # Errors
///
/// Returns an error if a prompt fails or if the grid cannot be loaded and
/// the user declines to continue without it.
pub fn run(
    multi: &MultiProgress,
    config: &AnalysisConfig,
    output_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let builder = config.zone_builder()?;
    let grid = load_grid(config)?;
    let grid = grid.as_ref().map(|g| g as &dyn CellIndex);

    let mut state = WizardState::AwaitingInput;
    loop {
        let event = match &state {
            WizardState::AwaitingInput => prompt_input()?,
            WizardState::AwaitingParameters { input } => prompt_parameters(&builder, input)?,
            WizardState::Processing { input, params } => {
                process(multi, &builder, grid, input, params, output_dir)?
            }
            WizardState::Done {
                params, outcome, ..
            } => prompt_done(params, outcome)?,
            WizardState::Finished => break,
        };
        state = state.apply(event);
        log::debug!("Wizard is {}", state.label());
    }

    Ok(())
}

fn load_grid(
    config: &AnalysisConfig,
) -> Result<Option<PopulationGrid>, Box<dyn std::error::Error>> {
    match PopulationGrid::load(&config.grid) {
        Ok(grid) => Ok(Some(grid)),
        Err(e) => {
            log::error!("Population grid unavailable: {e}");
            let proceed = Confirm::new()
                .with_prompt("Continue without population analysis?")
                .default(false)
                .interact()?;
            if proceed { Ok(None) } else { Err(e.into()) }
        }
    }
}

fn prompt_input() -> Result<WizardEvent, Box<dyn std::error::Error>> {
    println!();
    let path: String = Input::new()
        .with_prompt("Flight geometry file (.kml or .geojson, empty to quit)")
        .allow_empty(true)
        .interact_text()?;
    if path.trim().is_empty() {
        return Ok(WizardEvent::Quit);
    }

    let crs: String = Input::new()
        .with_prompt("CRS override (e.g. EPSG:31983, empty to use the file's)")
        .allow_empty(true)
        .validate_with(|value: &String| -> Result<(), String> {
            if value.trim().is_empty() {
                return Ok(());
            }
            value.parse::<Crs>().map(|_| ()).map_err(|e| e.to_string())
        })
        .interact_text()?;
    let crs = if crs.trim().is_empty() {
        None
    } else {
        Some(crs.parse::<Crs>()?)
    };

    let path = PathBuf::from(path.trim());
    match ground_risk_geometry::load(&path, crs) {
        Ok(geometry) => {
            println!(
                "Loaded {} in {} ({})",
                geometry.geometry.kind(),
                geometry.zone,
                geometry.source_crs
            );
            Ok(WizardEvent::InputLoaded(LoadedInput { path, geometry }))
        }
        Err(e) => {
            println!("Could not load {}: {e}", path.display());
            Ok(WizardEvent::EditInput)
        }
    }
}

fn prompt_distance(prompt: &str, default: f64) -> Result<f64, Box<dyn std::error::Error>> {
    let value: String = Input::new()
        .with_prompt(prompt)
        .default(default.to_string())
        .validate_with(|value: &String| -> Result<(), String> {
            match value.trim().parse::<f64>() {
                Ok(v) if v.is_finite() && v >= 0.0 => Ok(()),
                _ => Err("enter a number >= 0".to_string()),
            }
        })
        .interact_text()?;
    Ok(value.trim().parse()?)
}

fn prompt_parameters(
    builder: &ZoneBuilder,
    input: &LoadedInput,
) -> Result<WizardEvent, Box<dyn std::error::Error>> {
    let defaults = FlightParameters::default();

    let fg_size_m = if let Some(preset) = preset_fg_size(input.geometry.class()) {
        println!("Polygon input: the polygon is the Flight Geography");
        preset
    } else {
        prompt_distance("Flight Geography size (m)", defaults.fg_size_m)?
    };
    let height_m = prompt_distance("Flight height (m)", defaults.height_m)?;
    let cv_size_m = prompt_distance("Contingency Volume size (m)", defaults.cv_size_m)?;

    let styles = [CornerStyle::Square, CornerStyle::Rounded];
    let labels: Vec<String> = styles.iter().map(ToString::to_string).collect();
    let idx = Select::new()
        .with_prompt("Corner style")
        .items(&labels)
        .default(0)
        .interact()?;

    let params = FlightParameters {
        fg_size_m,
        height_m,
        cv_size_m,
        corner_style: styles[idx],
    };

    match builder.zone_distances(input.geometry.class(), &params) {
        Ok(distances) => {
            for (zone, distance) in distances.iter() {
                println!("  {:<20} {distance:>9.1} m", zone.to_string());
            }
        }
        Err(e) => {
            println!("Invalid parameters: {e}");
            return Ok(WizardEvent::EditParameters);
        }
    }

    let proceed = Confirm::new()
        .with_prompt("Run the analysis?")
        .default(true)
        .interact()?;
    Ok(confirmation(proceed, params))
}

/// Flight Geography size implied by the input, or `None` when the user
/// has to enter one.
const fn preset_fg_size(class: GeometryClass) -> Option<f64> {
    match class {
        GeometryClass::Linear => None,
        GeometryClass::Areal => Some(0.0),
    }
}

/// Declining to run keeps the geometry and asks for parameters again.
const fn confirmation(proceed: bool, params: FlightParameters) -> WizardEvent {
    if proceed {
        WizardEvent::ParametersEntered(params)
    } else {
        WizardEvent::EditParameters
    }
}

fn process(
    multi: &MultiProgress,
    builder: &ZoneBuilder,
    grid: Option<&dyn CellIndex>,
    input: &LoadedInput,
    params: &FlightParameters,
    output_dir: &Path,
) -> Result<WizardEvent, Box<dyn std::error::Error>> {
    let formats = [ZoneFormat::Kml, ZoneFormat::GeoJson];
    let labels: Vec<String> = formats.iter().map(ToString::to_string).collect();
    let format_idx = Select::new()
        .with_prompt("Zone file format")
        .items(&labels)
        .default(0)
        .interact()?;

    let filters = [CellFilter::All, CellFilter::Populated, CellFilter::Critical];
    let filter = if grid.is_some() {
        let labels: Vec<String> = filters.iter().map(ToString::to_string).collect();
        let idx = Select::new()
            .with_prompt("Cells to export")
            .items(&labels)
            .default(0)
            .interact()?;
        filters[idx]
    } else {
        CellFilter::All
    };

    let outputs = OutputOptions {
        dir: output_dir.to_path_buf(),
        name: pipeline::output_name(&input.path),
        zone_format: formats[format_idx],
        filter,
    };

    let mut progress = StageProgress::new(multi, pipeline::STAGES);
    match pipeline::run(&mut progress, builder, grid, &input.geometry, params, &outputs) {
        Ok(outcome) => {
            progress.finish("Analysis complete");
            Ok(WizardEvent::AnalysisCompleted(Box::new(outcome)))
        }
        Err(e) => {
            println!("Analysis failed: {e}");
            Ok(WizardEvent::AnalysisFailed)
        }
    }
}

fn prompt_done(
    params: &FlightParameters,
    outcome: &AnalysisOutcome,
) -> Result<WizardEvent, Box<dyn std::error::Error>> {
    println!();
    println!(
        "fg_size {} m, height {} m, cv_size {} m, {} corners",
        params.fg_size_m, params.height_m, params.cv_size_m, params.corner_style
    );
    for line in pipeline::report_lines(outcome) {
        println!("{line}");
    }
    println!();

    let labels: Vec<&str> = DoneAction::ALL.iter().map(DoneAction::label).collect();
    let idx = Select::new()
        .with_prompt("What next?")
        .items(&labels)
        .default(0)
        .interact()?;

    Ok(match DoneAction::ALL[idx] {
        DoneAction::EditParameters => WizardEvent::EditParameters,
        DoneAction::EditInput => WizardEvent::EditInput,
        DoneAction::Quit => WizardEvent::Quit,
    })
}
