#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Population aggregation engine.
//!
//! Intersects each zone's exclusive ring with the population grid and
//! reports whole-cell figures: any contact with the ring flags a cell,
//! partial overlap is not down-weighted.

use geo::{Area, MultiPolygon};
use ground_risk_population_models::{
    ADJACENT_AREA_DENSITY_LIMIT, AnalysisResult, AssessmentSummary, CellRecord,
    INHOSPITABLE_MEAN_DENSITY, ZoneStatistics,
};
use ground_risk_spatial::{CellIndex, DataUnavailableError};
use ground_risk_zones_models::{RiskVolume, ZoneMap, ZoneName};
use thiserror::Error;

/// Rings with less area than this (m²) are treated as empty.
const MIN_RING_AREA_M2: f64 = 1e-6;

/// Errors raised while aggregating population.
#[derive(Debug, Error)]
pub enum AggregationError {
    /// The grid provider failed.
    #[error(transparent)]
    Grid(#[from] DataUnavailableError),
}

/// Computes per-zone population statistics for `volume`.
///
/// Rings are moved back to longitude/latitude before querying, as grid
/// cells are geographic. Empty rings produce zeroed statistics instead of
/// failing the analysis.
///
/// # Errors
///
/// Returns [`AggregationError::Grid`] if the grid provider fails.
pub fn aggregate<I: CellIndex + ?Sized>(
    index: &I,
    volume: &RiskVolume,
) -> Result<AnalysisResult, AggregationError> {
    ZoneMap::try_from_fn(|name| {
        let zone = &volume.zones[name];
        if zone.ring.unsigned_area() < MIN_RING_AREA_M2 {
            log::info!("{name}: ring is empty, no cells");
            return Ok(ZoneStatistics::empty(name));
        }

        let ring: MultiPolygon<f64> = volume.projection.unproject(&zone.ring);
        let cells = index.query_intersecting(&ring).inspect_err(|e| {
            log::error!("{name}: population grid query failed: {e}");
        })?;

        let records = cells.iter().map(|cell| cell.to_record()).collect();
        let stats = summarize(name, records);

        log::info!(
            "{name}: {} cells, {} above threshold, mean density {:.2} hab/km²",
            stats.cell_count_total,
            stats.cell_count_above_threshold,
            stats.mean_density_hab_km2
        );

        Ok(stats)
    })
}

/// Builds a zone's statistics from its detail rows.
///
/// The mean density is population-weighted: total population over total
/// area. Rows are ordered by `cell_id`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn summarize(zone_name: ZoneName, mut records: Vec<CellRecord>) -> ZoneStatistics {
    records.sort_by(|a, b| a.cell_id.cmp(&b.cell_id));

    let population: u64 = records.iter().map(|r| r.population).sum();
    let area: f64 = records.iter().map(|r| r.area_km2).sum();
    let mean_density_hab_km2 = if area > 0.0 {
        population as f64 / area
    } else {
        0.0
    };

    ZoneStatistics {
        zone_name,
        mean_density_hab_km2,
        cell_count_total: records.len(),
        cell_count_above_threshold: records.iter().filter(|r| r.is_critical()).count(),
        detailed_cells: records,
    }
}

/// Draws the headline conclusions from an analysis.
#[must_use]
pub fn assess(result: &AnalysisResult) -> AssessmentSummary {
    let grb = &result.ground_risk_buffer;
    let adjacent = &result.adjacent_area;

    AssessmentSummary {
        grb_mean_density_hab_km2: grb.mean_density_hab_km2,
        inhospitable: grb.mean_density_hab_km2 < INHOSPITABLE_MEAN_DENSITY,
        grb_critical_cells: grb.cell_count_above_threshold,
        grb_populated_cells: grb.populated_cells(),
        no_fly_zones_required: grb.cell_count_above_threshold > 0,
        adjacent_mean_density_hab_km2: adjacent.mean_density_hab_km2,
        adjacent_area_exceeds: adjacent.mean_density_hab_km2 > ADJACENT_AREA_DENSITY_LIMIT,
    }
}
