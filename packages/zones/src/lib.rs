#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Risk-volume builder.
//!
//! Turns a [`NormalizedGeometry`] and the operational
//! [`FlightParameters`] into the four nested SORA zones. All work happens
//! in the geometry's UTM zone, so every distance is in metres.

pub mod buffer;
pub mod policy;

use std::sync::Arc;

use geo::{Area, BooleanOps, MultiPolygon};
use ground_risk_geometry::GeometryError;
use ground_risk_geometry_models::{GeometryClass, NormalizedGeometry};
use ground_risk_zones_models::{
    ADJACENT_AREA_BUFFER_M, FlightParameters, RiskVolume, RiskZone, ValidationError, ZoneMap,
    ZoneName,
};
use thiserror::Error;

pub use buffer::BufferSettings;
pub use policy::{GrbBand, GrbPolicy, GrbPolicyConfig};

/// Errors raised while building a risk volume.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A parameter is out of range.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The base geometry cannot be buffered.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Builds nested risk zones with a fixed GRB policy and buffer settings.
///
/// The builder holds no per-analysis state; one instance can serve any
/// number of analyses.
#[derive(Debug, Clone)]
pub struct ZoneBuilder {
    policy: Arc<dyn GrbPolicy>,
    buffer: BufferSettings,
}

impl Default for ZoneBuilder {
    fn default() -> Self {
        Self::new(Arc::new(GrbPolicyConfig::default()), BufferSettings::default())
    }
}

impl ZoneBuilder {
    /// Creates a builder from an arbitrary policy implementation.
    #[must_use]
    pub fn new(policy: Arc<dyn GrbPolicy>, buffer: BufferSettings) -> Self {
        Self { policy, buffer }
    }

    /// Creates a builder from configuration, validating both parts.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the policy or the buffer settings
    /// are invalid.
    pub fn from_config(
        policy: GrbPolicyConfig,
        buffer: BufferSettings,
    ) -> Result<Self, ValidationError> {
        policy.validate()?;
        buffer.validate()?;
        Ok(Self::new(Arc::new(policy), buffer))
    }

    /// Buffer settings in use.
    #[must_use]
    pub const fn buffer_settings(&self) -> &BufferSettings {
        &self.buffer
    }

    /// Ground Risk Buffer width for a flight at `height_m`, without
    /// building any geometry.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if `height_m` is negative or not
    /// finite, or if the policy produces an unusable distance.
    pub fn preview_grb_size(&self, height_m: f64) -> Result<f64, ValidationError> {
        let height_m = ValidationError::check_non_negative("height", height_m)?;
        ValidationError::check_non_negative("grb_size", self.policy.grb_size_m(height_m))
    }

    /// Cumulative offset distance of every zone from the base geometry.
    ///
    /// Areal input is already the Flight Geography, so its first distance
    /// is zero regardless of `fg_size_m`.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for invalid parameters.
    pub fn zone_distances(
        &self,
        class: GeometryClass,
        params: &FlightParameters,
    ) -> Result<ZoneMap<f64>, ValidationError> {
        params.validate()?;
        let grb = self.preview_grb_size(params.height_m)?;

        let fg = match class {
            GeometryClass::Linear => params.fg_size_m,
            GeometryClass::Areal => 0.0,
        };
        let cv = fg + params.cv_size_m;
        let grb = cv + grb;

        Ok(ZoneMap {
            flight_geography: fg,
            contingency_volume: cv,
            ground_risk_buffer: grb,
            adjacent_area: grb + ADJACENT_AREA_BUFFER_M,
        })
    }

    /// Builds the four nested zones around `base`.
    ///
    /// Each boundary is the offset of the base geometry at the zone's
    /// cumulative distance, unioned with the previous boundary so nesting
    /// holds even where the offset routine approximates arcs. Each ring
    /// is its boundary minus the previous boundary.
    ///
    /// # Errors
    ///
    /// * [`BuildError::Validation`] for out-of-range parameters
    /// * [`BuildError::Geometry`] for degenerate base geometry
    pub fn build_zones(
        &self,
        base: &NormalizedGeometry,
        params: &FlightParameters,
    ) -> Result<RiskVolume, BuildError> {
        let class = base.class();
        let distances = self.zone_distances(class, params)?;
        ground_risk_geometry::check_degenerate(&base.geometry)?;

        let fg_size_ignored = class == GeometryClass::Areal && params.fg_size_m > 0.0;
        if fg_size_ignored {
            log::info!(
                "Input is a {}: using it as the Flight Geography, fg_size {} m ignored",
                base.geometry.kind(),
                params.fg_size_m
            );
        }

        let mut previous: Option<MultiPolygon<f64>> = None;
        let zones = ZoneMap::from_fn(|name| {
            let distance = distances[name];
            let offset = buffer::offset(&base.geometry, distance, params.corner_style, &self.buffer);

            let (boundary, ring) = match previous.take() {
                Some(prev) if !prev.0.is_empty() => {
                    let boundary = if offset.0.is_empty() {
                        prev.clone()
                    } else {
                        offset.union(&prev)
                    };
                    let ring = boundary.difference(&prev);
                    (boundary, ring)
                }
                _ => (offset.clone(), offset),
            };

            log::debug!(
                "{name}: {distance} m, boundary {:.1} m², ring {:.1} m²",
                boundary.unsigned_area(),
                ring.unsigned_area()
            );

            previous = Some(boundary.clone());
            RiskZone {
                name,
                boundary,
                cumulative_distance_m: distance,
                ring,
            }
        });

        log::info!(
            "Built {} zones in {} ({} corners, GRB {} m)",
            ZoneName::ALL.len(),
            base.zone,
            params.corner_style,
            distances.ground_risk_buffer - distances.contingency_volume
        );

        Ok(RiskVolume {
            zones,
            projection: base.zone,
            corner_style: params.corner_style,
            grb_size_m: distances.ground_risk_buffer - distances.contingency_volume,
            fg_size_ignored,
        })
    }
}
