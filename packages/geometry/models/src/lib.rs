#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Flight geometry and coordinate reference system types.
//!
//! A [`FlightGeometry`] is the user-supplied shape of a flight: a point,
//! a path, an area, or one of their multi-forms. After normalization it
//! always lives in a metric UTM zone ([`NormalizedGeometry`]); everything
//! downstream of the normalizer works on polygons only.

use std::str::FromStr;

use geo::{LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use ground_risk_projection::{Hemisphere, UtmZone};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Shape family of a flight geometry.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum GeometryKind {
    /// Single position (hover or take-off point).
    Point,
    /// Flight path.
    LineString,
    /// Flight area.
    Polygon,
    /// Several positions.
    MultiPoint,
    /// Several flight paths.
    MultiLineString,
    /// Several flight areas.
    MultiPolygon,
}

impl GeometryKind {
    /// Whether this kind describes an area (already a Flight Geography).
    #[must_use]
    pub const fn class(self) -> GeometryClass {
        match self {
            Self::Polygon | Self::MultiPolygon => GeometryClass::Areal,
            Self::Point | Self::LineString | Self::MultiPoint | Self::MultiLineString => {
                GeometryClass::Linear
            }
        }
    }
}

/// How the Flight Geography is obtained from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryClass {
    /// Polygonal input: the input itself is the Flight Geography.
    Areal,
    /// Point or line input: the Flight Geography is a buffer of it.
    Linear,
}

/// The user-supplied flight shape.
#[derive(Debug, Clone, PartialEq)]
pub enum FlightGeometry {
    /// Single position.
    Point(Point<f64>),
    /// Flight path.
    LineString(LineString<f64>),
    /// Flight area.
    Polygon(Polygon<f64>),
    /// Several positions.
    MultiPoint(MultiPoint<f64>),
    /// Several flight paths.
    MultiLineString(MultiLineString<f64>),
    /// Several flight areas.
    MultiPolygon(MultiPolygon<f64>),
}

impl FlightGeometry {
    /// The variant tag of this geometry.
    #[must_use]
    pub const fn kind(&self) -> GeometryKind {
        match self {
            Self::Point(_) => GeometryKind::Point,
            Self::LineString(_) => GeometryKind::LineString,
            Self::Polygon(_) => GeometryKind::Polygon,
            Self::MultiPoint(_) => GeometryKind::MultiPoint,
            Self::MultiLineString(_) => GeometryKind::MultiLineString,
            Self::MultiPolygon(_) => GeometryKind::MultiPolygon,
        }
    }

    /// Areal or linear.
    #[must_use]
    pub const fn class(&self) -> GeometryClass {
        self.kind().class()
    }

    /// Converts into a plain [`geo::Geometry`].
    #[must_use]
    pub fn to_geometry(&self) -> geo::Geometry<f64> {
        match self {
            Self::Point(g) => geo::Geometry::Point(*g),
            Self::LineString(g) => geo::Geometry::LineString(g.clone()),
            Self::Polygon(g) => geo::Geometry::Polygon(g.clone()),
            Self::MultiPoint(g) => geo::Geometry::MultiPoint(g.clone()),
            Self::MultiLineString(g) => geo::Geometry::MultiLineString(g.clone()),
            Self::MultiPolygon(g) => geo::Geometry::MultiPolygon(g.clone()),
        }
    }

    /// Projects longitude/latitude coordinates into `zone`.
    #[must_use]
    pub fn project(&self, zone: UtmZone) -> Self {
        match self {
            Self::Point(g) => Self::Point(zone.project(g)),
            Self::LineString(g) => Self::LineString(zone.project(g)),
            Self::Polygon(g) => Self::Polygon(zone.project(g)),
            Self::MultiPoint(g) => Self::MultiPoint(zone.project(g)),
            Self::MultiLineString(g) => Self::MultiLineString(zone.project(g)),
            Self::MultiPolygon(g) => Self::MultiPolygon(zone.project(g)),
        }
    }

    /// Moves coordinates in `zone` back to longitude/latitude.
    #[must_use]
    pub fn unproject(&self, zone: UtmZone) -> Self {
        match self {
            Self::Point(g) => Self::Point(zone.unproject(g)),
            Self::LineString(g) => Self::LineString(zone.unproject(g)),
            Self::Polygon(g) => Self::Polygon(zone.unproject(g)),
            Self::MultiPoint(g) => Self::MultiPoint(zone.unproject(g)),
            Self::MultiLineString(g) => Self::MultiLineString(zone.unproject(g)),
            Self::MultiPolygon(g) => Self::MultiPolygon(zone.unproject(g)),
        }
    }
}

/// Geodetic datum of a CRS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum Datum {
    /// World Geodetic System 1984.
    #[strum(serialize = "WGS 84")]
    Wgs84,
    /// Sistema de Referência Geocêntrico para as Américas 2000 (GRS80,
    /// coincident with WGS84 at the sub-metre level).
    #[strum(serialize = "SIRGAS 2000")]
    Sirgas2000,
}

/// Coordinate reference system of an input geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Crs {
    /// Longitude/latitude in degrees.
    Geographic(Datum),
    /// UTM easting/northing in metres.
    Utm(Datum, UtmZone),
}

impl Crs {
    /// WGS84 longitude/latitude, the `GeoJSON` default.
    pub const WGS84: Self = Self::Geographic(Datum::Wgs84);

    /// Whether coordinates are in degrees and must be projected before
    /// any metric operation.
    #[must_use]
    pub const fn is_geographic(self) -> bool {
        matches!(self, Self::Geographic(_))
    }

    /// EPSG code of this CRS.
    #[must_use]
    pub fn epsg(self) -> u32 {
        match self {
            Self::Geographic(Datum::Wgs84) => 4326,
            Self::Geographic(Datum::Sirgas2000) => 4674,
            Self::Utm(Datum::Wgs84, zone) => zone.epsg(),
            Self::Utm(Datum::Sirgas2000, zone) => match zone.hemisphere() {
                Hemisphere::North => 31954 + u32::from(zone.number()),
                Hemisphere::South => 31960 + u32::from(zone.number()),
            },
        }
    }

    /// Resolves an EPSG code.
    ///
    /// # Errors
    ///
    /// Returns an error if the code is not one of the supported
    /// geographic or UTM systems.
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_epsg(code: u32) -> Result<Self, UnknownCrsError> {
        let utm = |datum, number: u32, hemisphere| {
            UtmZone::new(number as u8, hemisphere)
                .map(|zone| Self::Utm(datum, zone))
                .map_err(|_| UnknownCrsError {
                    identifier: format!("EPSG:{code}"),
                })
        };

        match code {
            4326 => Ok(Self::WGS84),
            4674 => Ok(Self::Geographic(Datum::Sirgas2000)),
            32601..=32660 => utm(Datum::Wgs84, code - 32600, Hemisphere::North),
            32701..=32760 => utm(Datum::Wgs84, code - 32700, Hemisphere::South),
            // SIRGAS 2000 / UTM zone 18N..22N
            31972..=31976 => utm(Datum::Sirgas2000, code - 31954, Hemisphere::North),
            // SIRGAS 2000 / UTM zone 17S..25S
            31977..=31985 => utm(Datum::Sirgas2000, code - 31960, Hemisphere::South),
            _ => Err(UnknownCrsError {
                identifier: format!("EPSG:{code}"),
            }),
        }
    }
}

impl FromStr for Crs {
    type Err = UnknownCrsError;

    /// Parses `EPSG:4326`, `urn:ogc:def:crs:EPSG::31983`,
    /// `urn:ogc:def:crs:OGC:1.3:CRS84` and similar identifiers.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let unknown = || UnknownCrsError {
            identifier: trimmed.to_string(),
        };

        let upper = trimmed.to_ascii_uppercase();
        if upper.ends_with("CRS84") {
            return Ok(Self::WGS84);
        }

        let code = upper
            .strip_prefix("EPSG:")
            .or_else(|| upper.strip_prefix("URN:OGC:DEF:CRS:EPSG:"))
            .map(|rest| rest.trim_start_matches(':'))
            .map(|rest| rest.rsplit(':').next().unwrap_or(rest))
            .ok_or_else(unknown)?;

        let code: u32 = code.parse().map_err(|_| unknown())?;
        Self::from_epsg(code)
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

/// Error returned for an unsupported or malformed CRS identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCrsError {
    /// The identifier as it appeared in the input.
    pub identifier: String,
}

impl std::fmt::Display for UnknownCrsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unsupported coordinate reference system '{}'", self.identifier)
    }
}

impl std::error::Error for UnknownCrsError {}

/// A validated flight geometry in a metric UTM zone.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedGeometry {
    /// Geometry in easting/northing metres of [`Self::zone`].
    pub geometry: FlightGeometry,
    /// CRS the input was supplied in.
    pub source_crs: Crs,
    /// Planar zone used for buffering.
    pub zone: UtmZone,
}

impl NormalizedGeometry {
    /// Areal or linear.
    #[must_use]
    pub const fn class(&self) -> GeometryClass {
        self.geometry.class()
    }
}
