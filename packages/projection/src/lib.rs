#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Universal Transverse Mercator projection on the WGS84 ellipsoid.
//!
//! Buffers are always computed in metres, so every flight geometry is
//! moved into the UTM zone covering it before any offsetting happens and
//! moved back to longitude/latitude only for output and grid lookups.
//!
//! The forward and inverse transforms use the 6th-order Krüger series
//! (Karney 2011), which is accurate to well under a millimetre inside a
//! zone.

use std::sync::LazyLock;

use geo::{Coord, MapCoords};
use serde::{Deserialize, Serialize};

/// WGS84 semi-major axis in metres.
const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening.
const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// UTM central scale factor.
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

static WGS84_SERIES: LazyLock<Series> = LazyLock::new(Series::wgs84);

/// Hemisphere of a UTM zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hemisphere {
    /// Northern hemisphere (EPSG 326zz).
    North,
    /// Southern hemisphere (EPSG 327zz).
    South,
}

/// A UTM zone: 6-degree longitude band plus hemisphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UtmZone {
    number: u8,
    hemisphere: Hemisphere,
}

/// Error returned for a zone number outside `1..=60`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidZoneError {
    /// The rejected zone number.
    pub number: u8,
}

impl std::fmt::Display for InvalidZoneError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid UTM zone {}: expected 1-60", self.number)
    }
}

impl std::error::Error for InvalidZoneError {}

impl UtmZone {
    /// Creates a zone from its number and hemisphere.
    ///
    /// # Errors
    ///
    /// Returns an error if `number` is not in `1..=60`.
    pub const fn new(number: u8, hemisphere: Hemisphere) -> Result<Self, InvalidZoneError> {
        if number == 0 || number > 60 {
            return Err(InvalidZoneError { number });
        }
        Ok(Self { number, hemisphere })
    }

    /// Picks the zone that contains the given WGS84 position.
    ///
    /// Uses the regular 6-degree grid without the Norway/Svalbard
    /// exceptions.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn for_lon_lat(lon: f64, lat: f64) -> Self {
        let number = (((lon + 180.0) / 6.0).floor() as i64 + 1).clamp(1, 60) as u8;
        let hemisphere = if lat < 0.0 {
            Hemisphere::South
        } else {
            Hemisphere::North
        };
        Self { number, hemisphere }
    }

    /// Zone number (1-60).
    #[must_use]
    pub const fn number(self) -> u8 {
        self.number
    }

    /// Zone hemisphere.
    #[must_use]
    pub const fn hemisphere(self) -> Hemisphere {
        self.hemisphere
    }

    /// EPSG code of the WGS84 / UTM CRS for this zone.
    #[must_use]
    pub fn epsg(self) -> u32 {
        let base = match self.hemisphere {
            Hemisphere::North => 32600,
            Hemisphere::South => 32700,
        };
        base + u32::from(self.number)
    }

    /// Longitude of the zone's central meridian in degrees.
    #[must_use]
    pub fn central_meridian(self) -> f64 {
        f64::from(self.number).mul_add(6.0, -183.0)
    }

    /// Projects a WGS84 longitude/latitude (degrees) to easting/northing
    /// (metres).
    #[must_use]
    pub fn forward(self, lon: f64, lat: f64) -> (f64, f64) {
        let series = &*WGS84_SERIES;
        let e = series.e;

        let phi = lat.to_radians();
        let lambda = (lon - self.central_meridian()).to_radians();

        let (sin_l, cos_l) = lambda.sin_cos();
        let tau = phi.tan();
        let sigma = (e * (e * tau / tau.hypot(1.0)).atanh()).sinh();
        let tau_p = tau.mul_add(sigma.hypot(1.0), -(sigma * tau.hypot(1.0)));

        let xi_p = tau_p.atan2(cos_l);
        let eta_p = (sin_l / tau_p.hypot(cos_l)).asinh();

        let mut xi = xi_p;
        let mut eta = eta_p;
        let mut k = 0.0;
        for alpha in series.alpha {
            k += 2.0;
            xi += alpha * (k * xi_p).sin() * (k * eta_p).cosh();
            eta += alpha * (k * xi_p).cos() * (k * eta_p).sinh();
        }

        let easting = K0 * series.big_a * eta + FALSE_EASTING;
        let mut northing = K0 * series.big_a * xi;
        if self.hemisphere == Hemisphere::South {
            northing += FALSE_NORTHING_SOUTH;
        }

        (easting, northing)
    }

    /// Inverse of [`Self::forward`]: easting/northing (metres) back to
    /// WGS84 longitude/latitude (degrees).
    #[must_use]
    pub fn inverse(self, easting: f64, northing: f64) -> (f64, f64) {
        let series = &*WGS84_SERIES;
        let e = series.e;
        let e2 = e * e;

        let x = easting - FALSE_EASTING;
        let y = match self.hemisphere {
            Hemisphere::North => northing,
            Hemisphere::South => northing - FALSE_NORTHING_SOUTH,
        };

        let eta = x / (K0 * series.big_a);
        let xi = y / (K0 * series.big_a);

        let mut xi_p = xi;
        let mut eta_p = eta;
        let mut k = 0.0;
        for beta in series.beta {
            k += 2.0;
            xi_p -= beta * (k * xi).sin() * (k * eta).cosh();
            eta_p -= beta * (k * xi).cos() * (k * eta).sinh();
        }

        let sinh_eta_p = eta_p.sinh();
        let (sin_xi_p, cos_xi_p) = xi_p.sin_cos();
        let tau_p = sin_xi_p / sinh_eta_p.hypot(cos_xi_p);

        // Newton-Raphson on the conformal latitude.
        let mut tau = tau_p;
        for _ in 0..16 {
            let sigma = (e * (e * tau / tau.hypot(1.0)).atanh()).sinh();
            let tau_i = tau.mul_add(sigma.hypot(1.0), -(sigma * tau.hypot(1.0)));
            let delta = (tau_p - tau_i) / tau_i.hypot(1.0)
                * (1.0 - e2).mul_add(tau * tau, 1.0)
                / ((1.0 - e2) * tau.hypot(1.0));
            tau += delta;
            if delta.abs() < 1e-12 {
                break;
            }
        }

        let lat = tau.atan().to_degrees();
        let lon = sinh_eta_p.atan2(cos_xi_p).to_degrees() + self.central_meridian();

        (lon, lat)
    }

    fn forward_coord(self, c: Coord<f64>) -> Coord<f64> {
        let (x, y) = self.forward(c.x, c.y);
        Coord { x, y }
    }

    fn inverse_coord(self, c: Coord<f64>) -> Coord<f64> {
        let (x, y) = self.inverse(c.x, c.y);
        Coord { x, y }
    }

    /// Projects every coordinate of a longitude/latitude geometry into
    /// this zone.
    #[must_use]
    pub fn project<G>(self, geometry: &G) -> G::Output
    where
        G: MapCoords<f64, f64>,
    {
        geometry.map_coords(move |c| self.forward_coord(c))
    }

    /// Moves every coordinate of a geometry in this zone back to
    /// longitude/latitude.
    #[must_use]
    pub fn unproject<G>(self, geometry: &G) -> G::Output
    where
        G: MapCoords<f64, f64>,
    {
        geometry.map_coords(move |c| self.inverse_coord(c))
    }
}

impl std::fmt::Display for UtmZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let h = match self.hemisphere {
            Hemisphere::North => 'N',
            Hemisphere::South => 'S',
        };
        write!(f, "UTM {}{h} (EPSG:{})", self.number, self.epsg())
    }
}

/// Krüger series coefficients for one ellipsoid.
struct Series {
    e: f64,
    big_a: f64,
    alpha: [f64; 6],
    beta: [f64; 6],
}

impl Series {
    #[allow(clippy::suboptimal_flops)]
    fn wgs84() -> Self {
        let f = WGS84_F;
        let e = (f * (2.0 - f)).sqrt();
        let n = f / (2.0 - f);
        let n2 = n * n;
        let n3 = n2 * n;
        let n4 = n3 * n;
        let n5 = n4 * n;
        let n6 = n5 * n;

        let big_a = WGS84_A / (1.0 + n) * (1.0 + n2 / 4.0 + n4 / 64.0 + n6 / 256.0);

        let alpha = [
            n / 2.0 - 2.0 / 3.0 * n2 + 5.0 / 16.0 * n3 + 41.0 / 180.0 * n4
                - 127.0 / 288.0 * n5
                + 7891.0 / 37800.0 * n6,
            13.0 / 48.0 * n2 - 3.0 / 5.0 * n3 + 557.0 / 1440.0 * n4 + 281.0 / 630.0 * n5
                - 1_983_433.0 / 1_935_360.0 * n6,
            61.0 / 240.0 * n3 - 103.0 / 140.0 * n4
                + 15061.0 / 26880.0 * n5
                + 167_603.0 / 181_440.0 * n6,
            49561.0 / 161_280.0 * n4 - 179.0 / 168.0 * n5 + 6_601_661.0 / 7_257_600.0 * n6,
            34729.0 / 80640.0 * n5 - 3_418_889.0 / 1_995_840.0 * n6,
            212_378_941.0 / 319_334_400.0 * n6,
        ];

        let beta = [
            n / 2.0 - 2.0 / 3.0 * n2 + 37.0 / 96.0 * n3 - 1.0 / 360.0 * n4 - 81.0 / 512.0 * n5
                + 96199.0 / 604_800.0 * n6,
            n2 / 48.0 + n3 / 15.0 - 437.0 / 1440.0 * n4 + 46.0 / 105.0 * n5
                - 1_118_711.0 / 3_870_720.0 * n6,
            17.0 / 480.0 * n3 - 37.0 / 840.0 * n4 - 209.0 / 4480.0 * n5 + 5569.0 / 90720.0 * n6,
            4397.0 / 161_280.0 * n4 - 11.0 / 504.0 * n5 - 830_251.0 / 7_257_600.0 * n6,
            4583.0 / 161_280.0 * n5 - 108_847.0 / 3_991_680.0 * n6,
            20_648_693.0 / 638_668_800.0 * n6,
        ];

        Self {
            e,
            big_a,
            alpha,
            beta,
        }
    }
}
