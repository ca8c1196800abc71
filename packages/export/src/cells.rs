//! CSV export of per-zone cell tables.

use std::path::{Path, PathBuf};

use ground_risk_population_models::{AnalysisResult, CellRecord};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::SerializationError;

/// Which rows of a cell table to export.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CellFilter {
    /// Every intersecting cell.
    #[default]
    All,
    /// Cells with any population.
    Populated,
    /// Cells above the inhospitable density threshold.
    Critical,
}

impl CellFilter {
    /// Whether `record` passes the filter.
    #[must_use]
    pub fn matches(self, record: &CellRecord) -> bool {
        match self {
            Self::All => true,
            Self::Populated => record.is_populated(),
            Self::Critical => record.is_critical(),
        }
    }
}

/// Writes the rows of `records` that pass `filter` to a CSV file.
///
/// Columns: `cell_id,population,area_km2,density_hab_km2,latitude,longitude`,
/// at full precision. Returns the number of rows written.
///
/// # Errors
///
/// Returns a [`SerializationError`] if the file cannot be created or a
/// row cannot be written.
pub fn write_cells_csv(
    path: &Path,
    records: &[CellRecord],
    filter: CellFilter,
) -> Result<usize, SerializationError> {
    let csv_err = |source| SerializationError::Csv {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| SerializationError::Io {
            path: parent.display().to_string(),
            source,
        })?;
    }

    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    let mut count = 0;
    for record in records.iter().filter(|r| filter.matches(r)) {
        writer.serialize(record).map_err(csv_err)?;
        count += 1;
    }
    if count == 0 {
        writer
            .write_record([
                "cell_id",
                "population",
                "area_km2",
                "density_hab_km2",
                "latitude",
                "longitude",
            ])
            .map_err(csv_err)?;
    }
    writer.flush().map_err(|source| SerializationError::Io {
        path: path.display().to_string(),
        source,
    })?;

    log::debug!("Wrote {count} {filter} cells to {}", path.display());
    Ok(count)
}

/// Writes one CSV per zone into `dir`, named after the zone
/// (`ground_risk_buffer.csv`, ...). Returns the written paths in zone
/// order.
///
/// # Errors
///
/// See [`write_cells_csv`].
pub fn write_zone_tables(
    dir: &Path,
    result: &AnalysisResult,
    filter: CellFilter,
) -> Result<Vec<PathBuf>, SerializationError> {
    let mut paths = Vec::new();
    for (zone, stats) in result.iter() {
        let path = dir.join(format!(
            "{}.csv",
            zone.as_ref().to_ascii_lowercase().replace(' ', "_")
        ));
        let rows = write_cells_csv(&path, &stats.detailed_cells, filter)?;
        log::info!("{zone}: wrote {rows} rows to {}", path.display());
        paths.push(path);
    }
    Ok(paths)
}
