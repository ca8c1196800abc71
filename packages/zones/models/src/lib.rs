#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Risk zone types shared by the builder, the aggregation engine and the
//! exporters.
//!
//! The four SORA zones form a closed, ordered set. [`ZoneMap`] holds
//! exactly one value per zone, so a missing zone is impossible to
//! construct rather than a lookup failure.

use geo::MultiPolygon;
use ground_risk_projection::UtmZone;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Distance the Adjacent Area extends past the Ground Risk Buffer.
pub const ADJACENT_AREA_BUFFER_M: f64 = 5000.0;

/// One of the four nested SORA risk zones, in fixed inner-to-outer order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
pub enum ZoneName {
    /// Area directly traversed by the flight.
    #[strum(serialize = "Flight Geography")]
    FlightGeography,
    /// Buffer around the Flight Geography for contingency procedures.
    #[strum(serialize = "Contingency Volume")]
    ContingencyVolume,
    /// Buffer sized from flight height bounding credible ground impact.
    #[strum(serialize = "Ground Risk Buffer")]
    GroundRiskBuffer,
    /// Fixed-width outer context ring.
    #[strum(serialize = "Adjacent Area")]
    AdjacentArea,
}

impl ZoneName {
    /// All zones, inner to outer.
    pub const ALL: [Self; 4] = [
        Self::FlightGeography,
        Self::ContingencyVolume,
        Self::GroundRiskBuffer,
        Self::AdjacentArea,
    ];

    /// Position in the fixed order (0 = Flight Geography).
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The zone immediately inside this one.
    #[must_use]
    pub const fn previous(self) -> Option<Self> {
        match self {
            Self::FlightGeography => None,
            Self::ContingencyVolume => Some(Self::FlightGeography),
            Self::GroundRiskBuffer => Some(Self::ContingencyVolume),
            Self::AdjacentArea => Some(Self::GroundRiskBuffer),
        }
    }
}

/// Exactly one `T` per [`ZoneName`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneMap<T> {
    /// Flight Geography entry.
    pub flight_geography: T,
    /// Contingency Volume entry.
    pub contingency_volume: T,
    /// Ground Risk Buffer entry.
    pub ground_risk_buffer: T,
    /// Adjacent Area entry.
    pub adjacent_area: T,
}

impl<T> ZoneMap<T> {
    /// Builds a map by calling `f` once per zone, inner to outer.
    pub fn from_fn(mut f: impl FnMut(ZoneName) -> T) -> Self {
        Self {
            flight_geography: f(ZoneName::FlightGeography),
            contingency_volume: f(ZoneName::ContingencyVolume),
            ground_risk_buffer: f(ZoneName::GroundRiskBuffer),
            adjacent_area: f(ZoneName::AdjacentArea),
        }
    }

    /// Fallible [`Self::from_fn`]; stops at the first error.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `f`.
    pub fn try_from_fn<E>(mut f: impl FnMut(ZoneName) -> Result<T, E>) -> Result<Self, E> {
        Ok(Self {
            flight_geography: f(ZoneName::FlightGeography)?,
            contingency_volume: f(ZoneName::ContingencyVolume)?,
            ground_risk_buffer: f(ZoneName::GroundRiskBuffer)?,
            adjacent_area: f(ZoneName::AdjacentArea)?,
        })
    }

    /// Entry for `zone`.
    #[must_use]
    pub const fn get(&self, zone: ZoneName) -> &T {
        match zone {
            ZoneName::FlightGeography => &self.flight_geography,
            ZoneName::ContingencyVolume => &self.contingency_volume,
            ZoneName::GroundRiskBuffer => &self.ground_risk_buffer,
            ZoneName::AdjacentArea => &self.adjacent_area,
        }
    }

    /// Entries in zone order.
    pub fn iter(&self) -> impl Iterator<Item = (ZoneName, &T)> {
        ZoneName::ALL.into_iter().map(move |zone| (zone, self.get(zone)))
    }

    /// Transforms every entry, keeping the zone association.
    pub fn map<U>(&self, mut f: impl FnMut(ZoneName, &T) -> U) -> ZoneMap<U> {
        ZoneMap::from_fn(|zone| f(zone, self.get(zone)))
    }
}

impl<T> std::ops::Index<ZoneName> for ZoneMap<T> {
    type Output = T;

    fn index(&self, zone: ZoneName) -> &T {
        self.get(zone)
    }
}

/// Corner treatment applied to every buffer ring.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CornerStyle {
    /// Mitred convex corners and flat line ends.
    #[default]
    Square,
    /// Circular-arc corners and round line ends.
    Rounded,
}

/// A parameter was outside its valid range.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid {parameter} = {value}: {reason}")]
pub struct ValidationError {
    /// Name of the offending parameter.
    pub parameter: &'static str,
    /// The rejected value.
    pub value: f64,
    /// Which constraint it violates.
    pub reason: &'static str,
}

impl ValidationError {
    /// Checks that `value` is finite and not negative.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] naming `parameter` otherwise.
    pub fn check_non_negative(parameter: &'static str, value: f64) -> Result<f64, Self> {
        if !value.is_finite() {
            return Err(Self {
                parameter,
                value,
                reason: "must be a finite number",
            });
        }
        if value < 0.0 {
            return Err(Self {
                parameter,
                value,
                reason: "must be >= 0",
            });
        }
        Ok(value)
    }
}

/// Operational parameters of one analysis. Distances are in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlightParameters {
    /// Flight Geography buffer around a point/line input. Ignored for
    /// polygon input.
    pub fg_size_m: f64,
    /// Flight height above ground.
    pub height_m: f64,
    /// Contingency Volume width.
    pub cv_size_m: f64,
    /// Corner treatment.
    pub corner_style: CornerStyle,
}

impl Default for FlightParameters {
    fn default() -> Self {
        Self {
            fg_size_m: 50.0,
            height_m: 100.0,
            cv_size_m: 50.0,
            corner_style: CornerStyle::Square,
        }
    }
}

impl FlightParameters {
    /// Validates every parameter.
    ///
    /// # Errors
    ///
    /// Returns the first parameter that is negative or not finite.
    pub fn validate(&self) -> Result<(), ValidationError> {
        ValidationError::check_non_negative("fg_size", self.fg_size_m)?;
        ValidationError::check_non_negative("height", self.height_m)?;
        ValidationError::check_non_negative("cv_size", self.cv_size_m)?;
        Ok(())
    }
}

/// One nested buffer ring. Geometry is in the metric UTM zone of the
/// owning [`RiskVolume`].
#[derive(Debug, Clone, PartialEq)]
pub struct RiskZone {
    /// Which zone this is.
    pub name: ZoneName,
    /// Outward offset of the base geometry by `cumulative_distance_m`.
    pub boundary: MultiPolygon<f64>,
    /// Offset distance from the base geometry.
    pub cumulative_distance_m: f64,
    /// Area belonging exclusively to this zone: `boundary` minus the
    /// previous zone's boundary (equal to `boundary` for the Flight
    /// Geography).
    pub ring: MultiPolygon<f64>,
}

/// The complete, nested set of risk zones for one flight.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskVolume {
    /// The four zones.
    pub zones: ZoneMap<RiskZone>,
    /// Planar zone all geometry is expressed in.
    pub projection: UtmZone,
    /// Corner style the rings were built with.
    pub corner_style: CornerStyle,
    /// Ground Risk Buffer width derived from the flight height.
    pub grb_size_m: f64,
    /// Set when a Flight Geography buffer was supplied for polygon input
    /// and therefore ignored.
    pub fg_size_ignored: bool,
}

impl RiskVolume {
    /// Zones in fixed inner-to-outer order.
    pub fn iter(&self) -> impl Iterator<Item = &RiskZone> {
        self.zones.iter().map(|(_, zone)| zone)
    }
}
