#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geometry normalization: the single entry point for flight shapes.
//!
//! Loads the input geometry, resolves its coordinate reference system,
//! rejects degenerate shapes, and reprojects everything into the UTM zone
//! that covers it. Metric buffering never happens on degree coordinates;
//! downstream crates only ever see [`NormalizedGeometry`].

pub mod input;

use std::path::Path;

use geo::{Area, BoundingRect, Coord, LineString, Polygon};
use ground_risk_geometry_models::{
    Crs, FlightGeometry, GeometryKind, NormalizedGeometry, UnknownCrsError,
};
use ground_risk_projection::UtmZone;
use thiserror::Error;

/// Polygons smaller than this (in m²) after reprojection are degenerate.
pub const MIN_POLYGON_AREA_M2: f64 = 1e-6;

/// Errors raised while loading or validating a flight geometry.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// The input file could not be read.
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// Path of the input file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The input is not valid `GeoJSON`.
    #[error("GeoJSON error: {0}")]
    Parse(#[from] geojson::Error),

    /// The input is not valid KML.
    #[error("KML error: {0}")]
    Kml(#[from] kml::Error),

    /// The file extension names no supported input format.
    #[error("unsupported flight geometry format: {path} (expected .kml or .geojson)")]
    UnsupportedFormat {
        /// Path of the input file.
        path: String,
    },

    /// The input contains no geometry at all.
    #[error("input contains no geometry")]
    Empty,

    /// Points, lines and polygons were mixed in one input.
    #[error("input mixes incompatible geometry types: {kinds}")]
    MixedTypes {
        /// The geometry kinds that were found.
        kinds: String,
    },

    /// The declared CRS is not supported.
    #[error(transparent)]
    Crs(#[from] UnknownCrsError),

    /// The `crs` member is present but cannot be read.
    #[error("unreadable crs member: {member}")]
    MalformedCrs {
        /// The raw member.
        member: String,
    },

    /// A coordinate is NaN or infinite.
    #[error("non-finite coordinate ({x}, {y})")]
    NonFinite {
        /// X / longitude.
        x: f64,
        /// Y / latitude.
        y: f64,
    },

    /// A coordinate lies outside the valid range of its CRS.
    #[error("coordinate ({x}, {y}) is out of range for {crs}")]
    OutOfRange {
        /// X / longitude.
        x: f64,
        /// Y / latitude.
        y: f64,
        /// The CRS the coordinate was interpreted in.
        crs: Crs,
    },

    /// The shape collapses to nothing (zero-length line, zero-area polygon).
    #[error("degenerate {kind}: {reason}")]
    Degenerate {
        /// Kind of the offending geometry.
        kind: GeometryKind,
        /// What makes it degenerate.
        reason: &'static str,
    },
}

/// Vector format of a flight geometry file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// RFC 7946 `GeoJSON`, optionally with a legacy `crs` member.
    GeoJson,
    /// Keyhole Markup Language, always WGS84.
    Kml,
}

impl InputFormat {
    /// Picks the format from the file extension.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::UnsupportedFormat`] for any extension other
    /// than `.kml`, `.geojson` or `.json`.
    pub fn from_path(path: &Path) -> Result<Self, GeometryError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("kml") => Ok(Self::Kml),
            Some("geojson" | "json") => Ok(Self::GeoJson),
            _ => Err(GeometryError::UnsupportedFormat {
                path: path.display().to_string(),
            }),
        }
    }
}

/// Reads a KML or `GeoJSON` file, chosen by extension, and normalizes its
/// geometry.
///
/// # Errors
///
/// Returns [`GeometryError::UnsupportedFormat`] for an unknown extension,
/// and otherwise any error from [`load_kml`] or [`load_geojson`].
pub fn load(
    path: &Path,
    crs_override: Option<Crs>,
) -> Result<NormalizedGeometry, GeometryError> {
    match InputFormat::from_path(path)? {
        InputFormat::Kml => load_kml(path, crs_override),
        InputFormat::GeoJson => load_geojson(path, crs_override),
    }
}

/// Reads a KML file and normalizes its geometry.
///
/// KML is WGS84 unless `crs_override` says otherwise.
///
/// # Errors
///
/// Returns [`GeometryError::Io`] if the file cannot be read, and any error
/// from [`input::read_kml`] or [`normalize`].
pub fn load_kml(
    path: &Path,
    crs_override: Option<Crs>,
) -> Result<NormalizedGeometry, GeometryError> {
    parse_kml(&read_file(path)?, crs_override)
}

/// Parses KML text and normalizes its geometry.
///
/// # Errors
///
/// See [`load_kml`].
pub fn parse_kml(
    text: &str,
    crs_override: Option<Crs>,
) -> Result<NormalizedGeometry, GeometryError> {
    let geometry = input::read_kml(text)?;
    normalize(geometry, crs_override.unwrap_or(Crs::WGS84))
}

/// Reads a `GeoJSON` file and normalizes its geometry.
///
/// `crs_override` takes precedence over any CRS declared in the file;
/// with neither, WGS84 is assumed as mandated by RFC 7946.
///
/// # Errors
///
/// Returns [`GeometryError::Io`] if the file cannot be read, and any error
/// from [`input::read_geojson`] or [`normalize`].
pub fn load_geojson(
    path: &Path,
    crs_override: Option<Crs>,
) -> Result<NormalizedGeometry, GeometryError> {
    parse_geojson(&read_file(path)?, crs_override)
}

fn read_file(path: &Path) -> Result<String, GeometryError> {
    std::fs::read_to_string(path).map_err(|source| GeometryError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Parses `GeoJSON` text and normalizes its geometry.
///
/// # Errors
///
/// See [`load_geojson`].
pub fn parse_geojson(
    text: &str,
    crs_override: Option<Crs>,
) -> Result<NormalizedGeometry, GeometryError> {
    let (geometry, declared) = input::read_geojson(text)?;
    let crs = crs_override.or(declared).unwrap_or(Crs::WGS84);
    normalize(geometry, crs)
}

/// Validates a geometry and moves it into a metric UTM zone.
///
/// Geographic input is projected into the zone covering the centre of
/// its bounding box; UTM input stays in its own zone.
///
/// # Errors
///
/// * [`GeometryError::NonFinite`] / [`GeometryError::OutOfRange`] for bad
///   coordinates
/// * [`GeometryError::Degenerate`] for zero-length lines and zero-area
///   polygons
pub fn normalize(geometry: FlightGeometry, crs: Crs) -> Result<NormalizedGeometry, GeometryError> {
    check_coordinates(&geometry, crs)?;

    let (projected, zone) = match crs {
        Crs::Geographic(_) => {
            let zone = zone_for(&geometry);
            (geometry.project(zone), zone)
        }
        Crs::Utm(_, zone) => (geometry, zone),
    };

    let cleaned = clean(projected)?;

    log::debug!(
        "Normalized {} from {crs} into {zone}",
        cleaned.kind()
    );

    Ok(NormalizedGeometry {
        geometry: cleaned,
        source_crs: crs,
        zone,
    })
}

fn zone_for(geometry: &FlightGeometry) -> UtmZone {
    geometry.to_geometry().bounding_rect().map_or_else(
        || UtmZone::for_lon_lat(0.0, 0.0),
        |rect| {
            let center = rect.center();
            UtmZone::for_lon_lat(center.x, center.y)
        },
    )
}

fn check_coordinates(geometry: &FlightGeometry, crs: Crs) -> Result<(), GeometryError> {
    use geo::CoordsIter as _;

    for c in geometry.to_geometry().coords_iter() {
        if !c.x.is_finite() || !c.y.is_finite() {
            return Err(GeometryError::NonFinite { x: c.x, y: c.y });
        }
        if crs.is_geographic() && (c.x.abs() > 180.0 || c.y.abs() > 90.0) {
            return Err(GeometryError::OutOfRange { x: c.x, y: c.y, crs });
        }
    }
    Ok(())
}

/// Rejects zero-length lines and zero-area polygons without modifying the
/// geometry.
///
/// # Errors
///
/// Returns [`GeometryError::Degenerate`] if any part collapses.
pub fn check_degenerate(geometry: &FlightGeometry) -> Result<(), GeometryError> {
    clean(geometry.clone()).map(|_| ())
}

/// Drops consecutive duplicate vertices and rejects shapes that collapse.
fn clean(geometry: FlightGeometry) -> Result<FlightGeometry, GeometryError> {
    let kind = geometry.kind();
    match geometry {
        FlightGeometry::Point(p) => Ok(FlightGeometry::Point(p)),
        FlightGeometry::MultiPoint(mp) => Ok(FlightGeometry::MultiPoint(mp)),
        FlightGeometry::LineString(ls) => clean_line(&ls, kind).map(FlightGeometry::LineString),
        FlightGeometry::MultiLineString(mls) => mls
            .0
            .iter()
            .map(|ls| clean_line(ls, kind))
            .collect::<Result<Vec<_>, _>>()
            .map(|lines| FlightGeometry::MultiLineString(geo::MultiLineString(lines))),
        FlightGeometry::Polygon(p) => clean_polygon(&p, kind).map(FlightGeometry::Polygon),
        FlightGeometry::MultiPolygon(mp) => mp
            .0
            .iter()
            .map(|p| clean_polygon(p, kind))
            .collect::<Result<Vec<_>, _>>()
            .map(|polygons| FlightGeometry::MultiPolygon(geo::MultiPolygon(polygons))),
    }
}

fn dedup(ls: &LineString<f64>) -> LineString<f64> {
    let mut coords: Vec<Coord<f64>> = ls.0.clone();
    coords.dedup();
    LineString(coords)
}

fn clean_line(ls: &LineString<f64>, kind: GeometryKind) -> Result<LineString<f64>, GeometryError> {
    let line = dedup(ls);
    if line.0.len() < 2 {
        return Err(GeometryError::Degenerate {
            kind,
            reason: "line has zero length",
        });
    }
    Ok(line)
}

fn clean_polygon(p: &Polygon<f64>, kind: GeometryKind) -> Result<Polygon<f64>, GeometryError> {
    let polygon = Polygon::new(
        dedup(p.exterior()),
        p.interiors().iter().map(dedup).collect(),
    );
    if polygon.exterior().0.len() < 4 || polygon.unsigned_area() < MIN_POLYGON_AREA_M2 {
        return Err(GeometryError::Degenerate {
            kind,
            reason: "polygon has zero area",
        });
    }
    Ok(polygon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Point, coord};
    use ground_risk_geometry_models::GeometryClass;
    use ground_risk_projection::Hemisphere;

    const LINE_WGS84: &str = r#"{
        "type": "Feature",
        "properties": {},
        "geometry": { "type": "LineString", "coordinates": [[-47.90, -15.80], [-47.89, -15.80]] }
    }"#;

    #[test]
    fn projects_geographic_input_into_covering_zone() {
        let normalized = parse_geojson(LINE_WGS84, None).unwrap();
        assert_eq!(normalized.source_crs, Crs::WGS84);
        assert_eq!(normalized.zone.number(), 23);
        assert_eq!(normalized.zone.hemisphere(), Hemisphere::South);
        assert_eq!(normalized.class(), GeometryClass::Linear);

        let FlightGeometry::LineString(ls) = &normalized.geometry else {
            panic!("expected LineString");
        };
        // 0.01 degree of longitude at 15.8S is ~1071 m.
        let dx = ls.0[1].x - ls.0[0].x;
        assert!(dx > 1050.0 && dx < 1090.0, "got {dx}");
        assert!(ls.0[0].y > 8_000_000.0, "southern northing expected");
    }

    #[test]
    fn keeps_projected_input_in_its_zone() {
        let geometry = FlightGeometry::Point(Point::new(190_000.0, 8_250_000.0));
        let crs: Crs = "EPSG:31983".parse().unwrap();
        let normalized = normalize(geometry.clone(), crs).unwrap();
        assert_eq!(normalized.geometry, geometry);
        assert_eq!(normalized.zone.number(), 23);
    }

    #[test]
    fn override_wins_over_declared_crs() {
        let text = r#"{
            "type": "Feature",
            "crs": { "type": "name", "properties": { "name": "EPSG:4326" } },
            "properties": {},
            "geometry": { "type": "Point", "coordinates": [190000, 8250000] }
        }"#;
        assert!(matches!(
            parse_geojson(text, None),
            Err(GeometryError::OutOfRange { .. })
        ));

        let crs: Crs = "EPSG:32723".parse().unwrap();
        let normalized = parse_geojson(text, Some(crs)).unwrap();
        assert_eq!(normalized.source_crs, crs);
    }

    #[test]
    fn rejects_zero_length_line() {
        let geometry = FlightGeometry::LineString(LineString::from(vec![
            coord! { x: -47.9, y: -15.8 },
            coord! { x: -47.9, y: -15.8 },
        ]));
        let err = normalize(geometry, Crs::WGS84).unwrap_err();
        assert!(
            matches!(err, GeometryError::Degenerate { kind: GeometryKind::LineString, .. }),
            "got {err:?}"
        );
    }

    #[test]
    fn rejects_zero_area_polygon() {
        let geometry = FlightGeometry::Polygon(Polygon::new(
            LineString::from(vec![
                coord! { x: 0.0, y: 0.0 },
                coord! { x: 10.0, y: 0.0 },
                coord! { x: 20.0, y: 0.0 },
                coord! { x: 0.0, y: 0.0 },
            ]),
            vec![],
        ));
        let crs: Crs = "EPSG:32723".parse().unwrap();
        assert!(matches!(
            normalize(geometry, crs),
            Err(GeometryError::Degenerate { kind: GeometryKind::Polygon, .. })
        ));
    }

    #[test]
    fn rejects_non_finite_coordinates() {
        let geometry = FlightGeometry::Point(Point::new(f64::NAN, 0.0));
        assert!(matches!(
            normalize(geometry, Crs::WGS84),
            Err(GeometryError::NonFinite { .. })
        ));
    }

    #[test]
    fn removes_repeated_vertices() {
        let geometry = FlightGeometry::LineString(LineString::from(vec![
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 100.0, y: 0.0 },
        ]));
        let crs: Crs = "EPSG:32723".parse().unwrap();
        let normalized = normalize(geometry, crs).unwrap();
        let FlightGeometry::LineString(ls) = normalized.geometry else {
            panic!("expected LineString");
        };
        assert_eq!(ls.0.len(), 2);
    }

    #[test]
    fn reports_missing_file() {
        let err = load_geojson(Path::new("/nonexistent/flight.geojson"), None).unwrap_err();
        assert!(matches!(err, GeometryError::Io { .. }));

        let err = load(Path::new("/nonexistent/flight.KML"), None).unwrap_err();
        assert!(matches!(err, GeometryError::Io { .. }));
    }

    #[test]
    fn picks_reader_from_extension() {
        assert_eq!(
            InputFormat::from_path(Path::new("route.kml")).unwrap(),
            InputFormat::Kml
        );
        assert_eq!(
            InputFormat::from_path(Path::new("route.GeoJSON")).unwrap(),
            InputFormat::GeoJson
        );
        assert!(matches!(
            load(Path::new("route.shp"), None),
            Err(GeometryError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn kml_is_geographic_and_projected() {
        let text = r#"<kml xmlns="http://www.opengis.net/kml/2.2"><Placemark>
            <LineString><coordinates>-47.90,-15.80,0 -47.89,-15.80,0</coordinates></LineString>
        </Placemark></kml>"#;
        let normalized = parse_kml(text, None).unwrap();
        assert_eq!(normalized.source_crs, Crs::WGS84);
        assert_eq!(normalized.zone.number(), 23);
        assert_eq!(normalized.class(), GeometryClass::Linear);

        let FlightGeometry::LineString(ls) = &normalized.geometry else {
            panic!("expected LineString");
        };
        let dx = ls.0[1].x - ls.0[0].x;
        assert!(dx > 1050.0 && dx < 1090.0, "got {dx}");
    }

    #[test]
    fn kml_polygon_is_areal() {
        let text = r#"<kml xmlns="http://www.opengis.net/kml/2.2"><Document><Placemark>
            <Polygon><outerBoundaryIs><LinearRing><coordinates>
                -47.90,-15.80 -47.89,-15.80 -47.89,-15.79 -47.90,-15.79 -47.90,-15.80
            </coordinates></LinearRing></outerBoundaryIs></Polygon>
        </Placemark></Document></kml>"#;
        let normalized = parse_kml(text, None).unwrap();
        assert_eq!(normalized.class(), GeometryClass::Areal);
        assert!(matches!(
            parse_kml(
                "<kml><Placemark><Point><coordinates>east,south</coordinates></Point></Placemark></kml>",
                None
            ),
            Err(GeometryError::Kml(_))
        ));
    }
}
