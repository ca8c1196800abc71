#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Population grid and analysis result types.
//!
//! Grid cells are loaded once and shared read-only. Everything else here
//! is derived per analysis and discarded with it.

use geo::{MultiPolygon, Point};
use ground_risk_zones_models::{ZoneMap, ZoneName};
use serde::{Deserialize, Serialize};

/// Cells denser than this (hab/km²) are not inhospitable and need
/// no-fly-zone treatment.
pub const INHOSPITABLE_DENSITY_THRESHOLD: f64 = 5.0;

/// Ground Risk Buffer mean density below which the area counts as
/// inhospitable.
pub const INHOSPITABLE_MEAN_DENSITY: f64 = 1.0;

/// Adjacent Area mean density above which the operation needs extra
/// mitigation.
pub const ADJACENT_AREA_DENSITY_LIMIT: f64 = 50.0;

/// One cell of the national population grid. Coordinates are WGS84
/// longitude/latitude.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationCell {
    /// Dataset identifier of the cell.
    pub cell_id: String,
    /// Cell outline.
    pub polygon: MultiPolygon<f64>,
    /// Resident population.
    pub population: u64,
    /// Cell area.
    pub area_km2: f64,
    /// Centroid of [`Self::polygon`].
    pub centroid: Point<f64>,
}

impl PopulationCell {
    /// Inhabitants per km². Zero for cells without area.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn density(&self) -> f64 {
        if self.area_km2 > 0.0 {
            self.population as f64 / self.area_km2
        } else {
            0.0
        }
    }

    /// Snapshot of this cell for a detail table.
    #[must_use]
    pub fn to_record(&self) -> CellRecord {
        CellRecord {
            cell_id: self.cell_id.clone(),
            population: self.population,
            area_km2: self.area_km2,
            density_hab_km2: self.density(),
            latitude: self.centroid.y(),
            longitude: self.centroid.x(),
        }
    }
}

/// One row of a zone's detail table, at full precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    /// Dataset identifier of the cell.
    pub cell_id: String,
    /// Whole-cell population.
    pub population: u64,
    /// Whole-cell area.
    pub area_km2: f64,
    /// `population / area_km2`.
    pub density_hab_km2: f64,
    /// Centroid latitude.
    pub latitude: f64,
    /// Centroid longitude.
    pub longitude: f64,
}

impl CellRecord {
    /// Whether the cell is denser than [`INHOSPITABLE_DENSITY_THRESHOLD`].
    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.density_hab_km2 > INHOSPITABLE_DENSITY_THRESHOLD
    }

    /// Whether anyone lives in the cell.
    #[must_use]
    pub fn is_populated(&self) -> bool {
        self.density_hab_km2 > 0.0
    }
}

/// Population figures for one zone's ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneStatistics {
    /// Zone the figures belong to.
    pub zone_name: ZoneName,
    /// `sum(population) / sum(area_km2)` over the ring's cells; zero
    /// without cells.
    pub mean_density_hab_km2: f64,
    /// Cells touching the ring.
    pub cell_count_total: usize,
    /// Cells denser than [`INHOSPITABLE_DENSITY_THRESHOLD`].
    pub cell_count_above_threshold: usize,
    /// Every touching cell, ordered by `cell_id`.
    pub detailed_cells: Vec<CellRecord>,
}

impl ZoneStatistics {
    /// Statistics for a zone without any cells.
    #[must_use]
    pub const fn empty(zone_name: ZoneName) -> Self {
        Self {
            zone_name,
            mean_density_hab_km2: 0.0,
            cell_count_total: 0,
            cell_count_above_threshold: 0,
            detailed_cells: Vec::new(),
        }
    }

    /// Total population of the ring's cells.
    #[must_use]
    pub fn total_population(&self) -> u64 {
        self.detailed_cells.iter().map(|c| c.population).sum()
    }

    /// Cells with any population.
    #[must_use]
    pub fn populated_cells(&self) -> usize {
        self.detailed_cells.iter().filter(|c| c.is_populated()).count()
    }
}

/// Per-zone statistics of one analysis.
pub type AnalysisResult = ZoneMap<ZoneStatistics>;

/// Headline conclusions drawn from an [`AnalysisResult`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssessmentSummary {
    /// Mean density of the Ground Risk Buffer ring.
    pub grb_mean_density_hab_km2: f64,
    /// GRB mean density is below [`INHOSPITABLE_MEAN_DENSITY`].
    pub inhospitable: bool,
    /// GRB cells denser than [`INHOSPITABLE_DENSITY_THRESHOLD`].
    pub grb_critical_cells: usize,
    /// GRB cells with any population.
    pub grb_populated_cells: usize,
    /// At least one critical GRB cell must be excluded from the flight.
    pub no_fly_zones_required: bool,
    /// Mean density of the Adjacent Area ring.
    pub adjacent_mean_density_hab_km2: f64,
    /// Adjacent Area density is above [`ADJACENT_AREA_DENSITY_LIMIT`].
    pub adjacent_area_exceeds: bool,
}
