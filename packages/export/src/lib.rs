#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Output writers for one analysis.
//!
//! Zones go to KML or `GeoJSON` (one styled placemark / feature per
//! zone, WGS84 coordinates), per-zone cell tables go to CSV, and the
//! statistics plus assessment go to a JSON report. Files are written to a
//! temporary sibling and renamed into place.

pub mod cells;
pub mod features;
pub mod kml;

use std::path::Path;

use geo::MultiPolygon;
use ground_risk_population_models::{AnalysisResult, AssessmentSummary};
use ground_risk_zones_models::{RiskVolume, ZoneName};
use serde::Serialize;
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

pub use cells::{CellFilter, write_cells_csv, write_zone_tables};

/// Errors raised while writing output files.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// The file could not be written.
    #[error("I/O error writing {path}: {source}")]
    Io {
        /// Destination path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A CSV row could not be written.
    #[error("CSV error writing {path}: {source}")]
    Csv {
        /// Destination path.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// A JSON document could not be encoded.
    #[error("JSON error writing {path}: {source}")]
    Json {
        /// Destination path.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// The destination extension names no supported format.
    #[error("unsupported zone file format: {path} (expected .kml or .geojson)")]
    UnsupportedFormat {
        /// Destination path.
        path: String,
    },
}

/// Vector format for zone files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ZoneFormat {
    /// Keyhole Markup Language.
    Kml,
    /// RFC 7946 `FeatureCollection`.
    #[strum(to_string = "geojson", serialize = "json")]
    GeoJson,
}

impl ZoneFormat {
    /// Picks the format from the file extension.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError::UnsupportedFormat`] for any other
    /// extension.
    pub fn from_path(path: &Path) -> Result<Self, SerializationError> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse().ok())
            .ok_or_else(|| SerializationError::UnsupportedFormat {
                path: path.display().to_string(),
            })
    }
}

/// Display colour of a zone as `RRGGBB`.
#[must_use]
pub const fn zone_color(zone: ZoneName) -> &'static str {
    match zone {
        ZoneName::FlightGeography => "00ff00",
        ZoneName::ContingencyVolume => "ffff00",
        ZoneName::GroundRiskBuffer => "ff9800",
        ZoneName::AdjacentArea => "ff0000",
    }
}

/// Fill opacity of every zone polygon.
pub const FILL_OPACITY: f64 = 0.25;

/// Zone boundaries moved back to longitude/latitude, inner to outer.
fn boundaries_wgs84(volume: &RiskVolume) -> Vec<(ZoneName, f64, MultiPolygon<f64>)> {
    volume
        .iter()
        .map(|zone| {
            (
                zone.name,
                zone.cumulative_distance_m,
                volume.projection.unproject(&zone.boundary),
            )
        })
        .collect()
}

/// Writes the zone boundaries of `volume` to `path`, picking KML or
/// `GeoJSON` from the extension.
///
/// # Errors
///
/// Returns a [`SerializationError`] if the format is unknown or the file
/// cannot be written.
pub fn write_zones(path: &Path, volume: &RiskVolume) -> Result<(), SerializationError> {
    let format = ZoneFormat::from_path(path)?;
    let document = match format {
        ZoneFormat::Kml => kml::render(volume),
        ZoneFormat::GeoJson => features::render(volume).map_err(|source| {
            SerializationError::Json {
                path: path.display().to_string(),
                source,
            }
        })?,
    };
    write_atomic(path, document.as_bytes())?;
    log::info!("Wrote {format} zones to {}", path.display());
    Ok(())
}

#[derive(Serialize)]
struct AnalysisReport<'a> {
    summary: &'a AssessmentSummary,
    zones: &'a AnalysisResult,
}

/// Writes statistics and assessment as pretty-printed JSON.
///
/// # Errors
///
/// Returns a [`SerializationError`] if encoding or writing fails.
pub fn write_analysis_json(
    path: &Path,
    result: &AnalysisResult,
    summary: &AssessmentSummary,
) -> Result<(), SerializationError> {
    let report = AnalysisReport {
        summary,
        zones: result,
    };
    let contents =
        serde_json::to_string_pretty(&report).map_err(|source| SerializationError::Json {
            path: path.display().to_string(),
            source,
        })?;
    write_atomic(path, contents.as_bytes())?;
    log::info!("Wrote analysis report to {}", path.display());
    Ok(())
}

/// Writes to `<path>.tmp` and renames over `path`.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), SerializationError> {
    let io_err = |source| SerializationError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, contents).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)
}
