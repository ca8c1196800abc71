#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial index over the national population grid.
//!
//! Loads grid cells from `DuckDB` or a `GeoJSON` file once at startup,
//! builds an R-tree over their bounding boxes, and answers polygon
//! intersection queries. The index is never mutated after loading, so a
//! single [`PopulationGrid`] can be shared across concurrent analyses.

use std::path::{Path, PathBuf};

use geo::{Area, BoundingRect, Centroid, Intersects, MultiPolygon};
use geojson::{GeoJson, JsonObject, JsonValue};
use ground_risk_population_models::PopulationCell;
use ground_risk_projection::UtmZone;
use rstar::{AABB, RTree, RTreeObject};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The population dataset could not be loaded.
#[derive(Debug, Error)]
pub enum DataUnavailableError {
    /// The dataset file could not be read.
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// Path of the dataset.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A `DuckDB` query failed.
    #[error("DuckDB error: {0}")]
    Database(#[from] duckdb::Error),

    /// The dataset is not valid `GeoJSON`.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The file extension does not name a supported format.
    #[error("unsupported population grid format: {path}")]
    UnsupportedFormat {
        /// Path of the dataset.
        path: String,
    },

    /// A cell is missing a field or carries an unusable value.
    #[error("invalid cell {cell}: {reason}")]
    InvalidCell {
        /// Identifier (or position) of the offending cell.
        cell: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The dataset loaded but contains no cells.
    #[error("population grid {source_name} contains no cells")]
    Empty {
        /// Where the cells were loaded from.
        source_name: String,
    },
}

/// Column / property names of the population dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridFields {
    /// `DuckDB` table holding the cells.
    pub table: String,
    /// Cell identifier.
    pub cell_id: String,
    /// Integer resident count.
    pub population: String,
    /// Cell area in km². Computed from the cell geometry when unset.
    pub area_km2: Option<String>,
    /// `GeoJSON` text column (`DuckDB` only; `GeoJSON` files carry the
    /// geometry on the feature).
    pub geometry: String,
}

impl Default for GridFields {
    fn default() -> Self {
        Self {
            table: "population_cells".to_string(),
            cell_id: "cell_id".to_string(),
            population: "population".to_string(),
            area_km2: Some("area_km2".to_string()),
            geometry: "boundary_geojson".to_string(),
        }
    }
}

/// Where to load the population grid from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// A `.duckdb` database or a `.geojson` file.
    pub path: PathBuf,
    /// Field names inside the dataset.
    pub fields: GridFields,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/ibge_2022_grid.duckdb"),
            fields: GridFields::default(),
        }
    }
}

/// Read access to grid cells by polygon.
///
/// Implementations must be safe for concurrent reads.
pub trait CellIndex: Send + Sync {
    /// Every cell whose polygon intersects `polygon`, boundary contact
    /// included. No duplicates, no particular order.
    ///
    /// # Errors
    ///
    /// Returns a [`DataUnavailableError`] if the backing data cannot be
    /// read.
    fn query_intersecting(
        &self,
        polygon: &MultiPolygon<f64>,
    ) -> Result<Vec<&PopulationCell>, DataUnavailableError>;
}

/// A population cell stored in the R-tree with its envelope.
struct CellEntry {
    envelope: AABB<[f64; 2]>,
    cell: PopulationCell,
}

impl RTreeObject for CellEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// The national population grid behind an R-tree.
pub struct PopulationGrid {
    cells: RTree<CellEntry>,
}

impl std::fmt::Debug for PopulationGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PopulationGrid")
            .field("cells", &self.cells.size())
            .finish()
    }
}

impl PopulationGrid {
    /// Indexes already-loaded cells.
    #[must_use]
    pub fn from_cells(cells: Vec<PopulationCell>) -> Self {
        let entries = cells
            .into_iter()
            .map(|cell| CellEntry {
                envelope: compute_envelope(&cell.polygon),
                cell,
            })
            .collect();
        Self {
            cells: RTree::bulk_load(entries),
        }
    }

    /// Number of indexed cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.size()
    }

    /// Whether the grid has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.size() == 0
    }

    /// Loads the grid described by `config`, picking the reader from the
    /// file extension.
    ///
    /// # Errors
    ///
    /// Returns a [`DataUnavailableError`] if the dataset is missing,
    /// unreadable, in an unknown format, or empty.
    pub fn load(config: &GridConfig) -> Result<Self, DataUnavailableError> {
        let path = &config.path;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("duckdb" | "db") => {
                if !path.exists() {
                    return Err(DataUnavailableError::Io {
                        path: path.display().to_string(),
                        source: std::io::Error::from(std::io::ErrorKind::NotFound),
                    });
                }
                let conn = duckdb::Connection::open_with_flags(
                    path,
                    duckdb::Config::default().access_mode(duckdb::AccessMode::ReadOnly)?,
                )?;
                Self::load_duckdb(&conn, &config.fields)
            }
            Some("geojson" | "json") => Self::load_geojson(path, &config.fields),
            _ => Err(DataUnavailableError::UnsupportedFormat {
                path: path.display().to_string(),
            }),
        }
    }

    /// Loads cells from a `DuckDB` table whose geometry is stored as
    /// `GeoJSON` text.
    ///
    /// # Errors
    ///
    /// Returns a [`DataUnavailableError`] if the query fails, a row is
    /// invalid, or the table is empty.
    pub fn load_duckdb(
        conn: &duckdb::Connection,
        fields: &GridFields,
    ) -> Result<Self, DataUnavailableError> {
        let area = fields
            .area_km2
            .as_deref()
            .map_or_else(|| "NULL::DOUBLE".to_string(), quote_identifier);
        let query = format!(
            "SELECT CAST({} AS VARCHAR), {}, {}, {} FROM {} WHERE {} IS NOT NULL",
            quote_identifier(&fields.cell_id),
            quote_identifier(&fields.population),
            area,
            quote_identifier(&fields.geometry),
            quote_identifier(&fields.table),
            quote_identifier(&fields.geometry),
        );

        let mut stmt = conn.prepare(&query)?;
        let mut rows = stmt.query([])?;
        let mut cells = Vec::new();

        while let Some(row) = rows.next()? {
            let cell_id: String = row.get(0)?;
            let population: Option<i64> = row.get(1)?;
            let area_km2: Option<f64> = row.get(2)?;
            let geojson_str: String = row.get(3)?;

            let population = u64::try_from(population.unwrap_or(0))
                .map_err(|_| invalid(&cell_id, "negative population"))?;

            let Some(polygon) = parse_geojson_to_multipolygon(&geojson_str) else {
                log::warn!("Skipping cell {cell_id}: geometry is not a polygon");
                continue;
            };

            cells.push(build_cell(cell_id, polygon, population, area_km2)?);
        }

        log::info!("Loaded {} population cells from DuckDB", cells.len());
        non_empty(cells, &fields.table)
    }

    /// Loads cells from a `GeoJSON` `FeatureCollection` in WGS84.
    ///
    /// # Errors
    ///
    /// Returns a [`DataUnavailableError`] if the file cannot be read or
    /// parsed, a feature is invalid, or there are no cells.
    pub fn load_geojson(path: &Path, fields: &GridFields) -> Result<Self, DataUnavailableError> {
        let text = std::fs::read_to_string(path).map_err(|source| DataUnavailableError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let cells = parse_geojson_cells(&text, fields)?;
        log::info!(
            "Loaded {} population cells from {}",
            cells.len(),
            path.display()
        );
        non_empty(cells, &path.display().to_string())
    }
}

impl CellIndex for PopulationGrid {
    fn query_intersecting(
        &self,
        polygon: &MultiPolygon<f64>,
    ) -> Result<Vec<&PopulationCell>, DataUnavailableError> {
        let Some(rect) = polygon.bounding_rect() else {
            return Ok(Vec::new());
        };
        let query_env =
            AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);

        Ok(self
            .cells
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.cell.polygon.intersects(polygon))
            .map(|entry| &entry.cell)
            .collect())
    }
}

fn parse_geojson_cells(
    text: &str,
    fields: &GridFields,
) -> Result<Vec<PopulationCell>, DataUnavailableError> {
    let GeoJson::FeatureCollection(fc) = text.parse::<GeoJson>()? else {
        return Err(invalid("<root>", "expected a FeatureCollection"));
    };

    let mut cells = Vec::with_capacity(fc.features.len());
    for (index, feature) in fc.features.into_iter().enumerate() {
        let empty = JsonObject::new();
        let properties = feature.properties.as_ref().unwrap_or(&empty);

        let cell_id = match properties.get(&fields.cell_id) {
            Some(JsonValue::String(s)) => s.clone(),
            Some(JsonValue::Number(n)) => n.to_string(),
            _ => format!("#{index}"),
        };

        let population = match properties.get(&fields.population) {
            None | Some(JsonValue::Null) => 0,
            Some(value) => whole_number(value)
                .ok_or_else(|| invalid(&cell_id, "population is not a non-negative integer"))?,
        };

        let area_km2 = fields
            .area_km2
            .as_ref()
            .and_then(|name| properties.get(name))
            .and_then(JsonValue::as_f64);

        let Some(polygon) = feature
            .geometry
            .and_then(|g| geo::Geometry::<f64>::try_from(g).ok())
            .and_then(into_multipolygon)
        else {
            log::warn!("Skipping cell {cell_id}: geometry is not a polygon");
            continue;
        };

        cells.push(build_cell(cell_id, polygon, population, area_km2)?);
    }
    Ok(cells)
}

/// Accepts integers, and floats without a fractional part as some grid
/// exports write counts as `12.0`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_number(value: &JsonValue) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0 && *v <= 9.0e15)
            .map(|v| v as u64)
    })
}

fn build_cell(
    cell_id: String,
    polygon: MultiPolygon<f64>,
    population: u64,
    area_km2: Option<f64>,
) -> Result<PopulationCell, DataUnavailableError> {
    let centroid = polygon
        .centroid()
        .ok_or_else(|| invalid(&cell_id, "empty geometry"))?;

    let area_km2 = match area_km2 {
        Some(area) if area.is_finite() && area >= 0.0 => area,
        Some(area) => return Err(invalid(&cell_id, &format!("invalid area {area}"))),
        None => {
            let zone = UtmZone::for_lon_lat(centroid.x(), centroid.y());
            zone.project(&polygon).unsigned_area() / 1_000_000.0
        }
    };

    Ok(PopulationCell {
        cell_id,
        polygon,
        population,
        area_km2,
        centroid,
    })
}

fn non_empty(
    cells: Vec<PopulationCell>,
    source: &str,
) -> Result<PopulationGrid, DataUnavailableError> {
    if cells.is_empty() {
        return Err(DataUnavailableError::Empty {
            source_name: source.to_string(),
        });
    }
    Ok(PopulationGrid::from_cells(cells))
}

fn invalid(cell: &str, reason: &str) -> DataUnavailableError {
    DataUnavailableError::InvalidCell {
        cell: cell.to_string(),
        reason: reason.to_string(),
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Parse a `GeoJSON` string into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
fn parse_geojson_to_multipolygon(geojson_str: &str) -> Option<MultiPolygon<f64>> {
    let geojson: GeoJson = geojson_str.parse().ok()?;
    match geojson {
        GeoJson::Geometry(geom) => geom.try_into().ok().and_then(into_multipolygon),
        GeoJson::Feature(feature) => feature
            .geometry
            .and_then(|g| g.try_into().ok())
            .and_then(into_multipolygon),
        GeoJson::FeatureCollection(_) => None,
    }
}

fn into_multipolygon(geometry: geo::Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        geo::Geometry::Rect(r) => Some(MultiPolygon(vec![r.to_polygon()])),
        _ => None,
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Point, Polygon, coord};

    fn square(x: f64, y: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![Polygon::new(
            LineString::from(vec![
                coord! { x: x, y: y },
                coord! { x: x + size, y: y },
                coord! { x: x + size, y: y + size },
                coord! { x: x, y: y + size },
                coord! { x: x, y: y },
            ]),
            vec![],
        )])
    }

    fn cell(id: &str, x: f64, y: f64) -> PopulationCell {
        PopulationCell {
            cell_id: id.to_string(),
            polygon: square(x, y, 1.0),
            population: 10,
            area_km2: 1.0,
            centroid: Point::new(x + 0.5, y + 0.5),
        }
    }

    fn grid_3x3() -> PopulationGrid {
        let mut cells = Vec::new();
        for i in 0..3 {
            for j in 0..3 {
                cells.push(cell(&format!("{i}{j}"), f64::from(i), f64::from(j)));
            }
        }
        PopulationGrid::from_cells(cells)
    }

    fn ids(cells: &[&PopulationCell]) -> Vec<String> {
        let mut ids: Vec<_> = cells.iter().map(|c| c.cell_id.clone()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn finds_overlapping_cells_only() {
        let grid = grid_3x3();
        let hits = grid
            .query_intersecting(&square(0.25, 0.25, 0.5))
            .unwrap();
        assert_eq!(ids(&hits), vec!["00"]);

        let hits = grid
            .query_intersecting(&square(0.5, 0.5, 1.0))
            .unwrap();
        assert_eq!(ids(&hits), vec!["00", "01", "10", "11"]);
    }

    #[test]
    fn includes_cells_touching_the_boundary() {
        let grid = grid_3x3();
        // Shares only the edge x = 1 with cells 10, 11, 12.
        let touching = square(-1.0, 0.0, 2.0);
        let hits = grid.query_intersecting(&touching).unwrap();
        assert!(
            ids(&hits).contains(&"10".to_string()),
            "edge-touching cells must be included, got {:?}",
            ids(&hits)
        );
    }

    #[test]
    fn envelope_hits_are_filtered_by_geometry() {
        // An L-shaped query whose bounding box covers the whole grid but
        // whose area skips the far corner cell.
        let grid = grid_3x3();
        let l_shape = MultiPolygon::new(vec![Polygon::new(
            LineString::from(vec![
                coord! { x: 0.1, y: 0.1 },
                coord! { x: 2.9, y: 0.1 },
                coord! { x: 2.9, y: 0.5 },
                coord! { x: 0.5, y: 0.5 },
                coord! { x: 0.5, y: 2.9 },
                coord! { x: 0.1, y: 2.9 },
                coord! { x: 0.1, y: 0.1 },
            ]),
            vec![],
        )]);
        let hits = grid.query_intersecting(&l_shape).unwrap();
        assert!(!ids(&hits).contains(&"22".to_string()));
        assert_eq!(hits.len(), 5);
    }

    #[test]
    fn empty_query_returns_nothing() {
        let grid = grid_3x3();
        let hits = grid.query_intersecting(&MultiPolygon::new(vec![])).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn grid_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PopulationGrid>();
    }

    #[test]
    fn parses_geojson_cells() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature",
                  "properties": { "cell_id": "200ME1", "population": 42, "area_km2": 0.04 },
                  "geometry": { "type": "Polygon", "coordinates": [[[-47.9, -15.8], [-47.898, -15.8], [-47.898, -15.798], [-47.9, -15.798], [-47.9, -15.8]]] } },
                { "type": "Feature",
                  "properties": { "cell_id": 7, "population": 3.0 },
                  "geometry": { "type": "Polygon", "coordinates": [[[-47.9, -15.8], [-47.89, -15.8], [-47.89, -15.79], [-47.9, -15.79], [-47.9, -15.8]]] } },
                { "type": "Feature", "properties": { "cell_id": "no-geom" }, "geometry": null }
            ]
        }"#;
        let cells = parse_geojson_cells(text, &GridFields::default()).unwrap();
        assert_eq!(cells.len(), 2, "features without polygons are skipped");

        assert_eq!(cells[0].cell_id, "200ME1");
        assert_eq!(cells[0].population, 42);
        assert!((cells[0].area_km2 - 0.04).abs() < f64::EPSILON);

        assert_eq!(cells[1].cell_id, "7");
        assert_eq!(cells[1].population, 3);
        // 0.01 x 0.01 degrees near 15.8S is about 1.07 km x 1.11 km.
        assert!(
            cells[1].area_km2 > 1.1 && cells[1].area_km2 < 1.25,
            "computed area {}",
            cells[1].area_km2
        );
        assert!((cells[1].centroid.x() + 47.895).abs() < 1e-9);
    }

    #[test]
    fn rejects_negative_population() {
        let text = r#"{ "type": "FeatureCollection", "features": [
            { "type": "Feature", "properties": { "cell_id": "x", "population": -1 },
              "geometry": { "type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]] } }
        ] }"#;
        assert!(matches!(
            parse_geojson_cells(text, &GridFields::default()),
            Err(DataUnavailableError::InvalidCell { .. })
        ));
    }

    #[test]
    fn load_reports_missing_and_unknown_sources() {
        let missing = GridConfig {
            path: PathBuf::from("/nonexistent/grid.geojson"),
            ..GridConfig::default()
        };
        assert!(matches!(
            PopulationGrid::load(&missing),
            Err(DataUnavailableError::Io { .. })
        ));

        let missing_db = GridConfig {
            path: PathBuf::from("/nonexistent/grid.duckdb"),
            ..GridConfig::default()
        };
        assert!(matches!(
            PopulationGrid::load(&missing_db),
            Err(DataUnavailableError::Io { .. })
        ));

        let unknown = GridConfig {
            path: PathBuf::from("grid.shp"),
            ..GridConfig::default()
        };
        assert!(matches!(
            PopulationGrid::load(&unknown),
            Err(DataUnavailableError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn load_rejects_empty_dataset() {
        let path = std::env::temp_dir().join(format!(
            "ground_risk_empty_grid_{}.geojson",
            std::process::id()
        ));
        std::fs::write(&path, r#"{ "type": "FeatureCollection", "features": [] }"#).unwrap();
        let result = PopulationGrid::load_geojson(&path, &GridFields::default());
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(DataUnavailableError::Empty { .. })));
    }

    #[test]
    fn grid_config_reads_toml() {
        let config: GridConfig = toml::from_str(
            r#"
            path = "grid.geojson"
            [fields]
            population = "pop"
            "#,
        )
        .unwrap();
        assert_eq!(config.path, PathBuf::from("grid.geojson"));
        assert_eq!(config.fields.population, "pop");
        assert_eq!(config.fields.cell_id, "cell_id", "unset fields keep defaults");
    }

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_identifier("pop"), "\"pop\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[cfg(feature = "duckdb-bundled")]
    #[test]
    fn loads_cells_from_duckdb() {
        let conn = duckdb::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"CREATE TABLE population_cells (
                cell_id TEXT,
                population BIGINT,
                area_km2 DOUBLE,
                boundary_geojson TEXT
            );
            INSERT INTO population_cells VALUES
                ('a', 12, 1.0, '{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}'),
                ('b', 0, 1.0, '{"type":"Polygon","coordinates":[[[1,0],[2,0],[2,1],[1,1],[1,0]]]}'),
                ('c', 5, 1.0, NULL);"#,
        )
        .unwrap();

        let grid = PopulationGrid::load_duckdb(&conn, &GridFields::default()).unwrap();
        assert_eq!(grid.len(), 2, "rows without geometry are excluded");

        let hits = grid.query_intersecting(&square(0.2, 0.2, 0.2)).unwrap();
        assert_eq!(ids(&hits), vec!["a"]);
        assert_eq!(hits[0].population, 12);
    }
}
