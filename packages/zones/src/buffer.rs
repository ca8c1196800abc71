//! Outward offsetting of flight geometries with exact corner control.
//!
//! An offset by distance `d` is built as the union of simple pieces:
//!
//! * one rectangle of half-width `d` per segment,
//! * one join per vertex on the convex side of the turn (a mitre quad,
//!   or a bevel triangle once the mitre would exceed the limit),
//! * a full circle per vertex and line end for rounded corners,
//! * the input polygons themselves for areal input,
//! * a square or circle for point input.
//!
//! Square style uses flat caps: a line's offset stops exactly at its end
//! points.

use geo::orient::{Direction, Orient};
use geo::{BooleanOps, Coord, LineString, MultiPolygon, Polygon};
use ground_risk_geometry_models::FlightGeometry;
use ground_risk_zones_models::{CornerStyle, ValidationError};
use serde::{Deserialize, Serialize};

/// Directions shorter than this are treated as zero-length.
const EPSILON: f64 = 1e-12;

/// Tunables for the offset construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferSettings {
    /// Maximum ratio of mitre length to offset distance. Sharper corners
    /// are bevelled.
    pub miter_limit: f64,
    /// Segments per quarter circle for rounded corners and caps.
    pub quadrant_segments: u32,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            miter_limit: 5.0,
            quadrant_segments: 16,
        }
    }
}

impl BufferSettings {
    /// Checks that the settings describe a usable offset.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the mitre limit is below 1 or no
    /// arc segments are requested.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.miter_limit.is_finite() || self.miter_limit < 1.0 {
            return Err(ValidationError {
                parameter: "miter_limit",
                value: self.miter_limit,
                reason: "must be a finite number >= 1",
            });
        }
        if self.quadrant_segments == 0 {
            return Err(ValidationError {
                parameter: "quadrant_segments",
                value: 0.0,
                reason: "must be >= 1",
            });
        }
        Ok(())
    }
}

/// Offsets `geometry` outward by `distance` metres.
///
/// A distance of zero yields the input polygons for areal input and an
/// empty result for points and lines.
#[must_use]
pub fn offset(
    geometry: &FlightGeometry,
    distance: f64,
    style: CornerStyle,
    settings: &BufferSettings,
) -> MultiPolygon<f64> {
    if distance <= 0.0 {
        return match geometry {
            FlightGeometry::Polygon(p) => MultiPolygon::new(vec![p.clone()]),
            FlightGeometry::MultiPolygon(mp) => mp.clone(),
            FlightGeometry::Point(_)
            | FlightGeometry::LineString(_)
            | FlightGeometry::MultiPoint(_)
            | FlightGeometry::MultiLineString(_) => MultiPolygon::new(Vec::new()),
        };
    }

    let ctx = Offsetter {
        distance,
        style,
        settings,
    };
    let mut pieces = Vec::new();

    match geometry {
        FlightGeometry::Point(p) => pieces.push(ctx.point(p.0)),
        FlightGeometry::MultiPoint(mp) => pieces.extend(mp.iter().map(|p| ctx.point(p.0))),
        FlightGeometry::LineString(ls) => ctx.line(ls, &mut pieces),
        FlightGeometry::MultiLineString(mls) => {
            for ls in mls {
                ctx.line(ls, &mut pieces);
            }
        }
        FlightGeometry::Polygon(p) => ctx.polygon(p, &mut pieces),
        FlightGeometry::MultiPolygon(mp) => {
            for p in mp {
                ctx.polygon(p, &mut pieces);
            }
        }
    }

    log::debug!(
        "Offsetting {} by {distance} m from {} pieces",
        geometry.kind(),
        pieces.len()
    );

    union_all(pieces)
}

/// Cascaded pairwise union: halves the piece count each round so every
/// boolean operation works on inputs of similar size.
#[must_use]
pub fn union_all(pieces: Vec<Polygon<f64>>) -> MultiPolygon<f64> {
    let mut layer: Vec<MultiPolygon<f64>> = pieces
        .into_iter()
        .map(|p| MultiPolygon::new(vec![p]))
        .collect();

    while layer.len() > 1 {
        let mut next = Vec::with_capacity(layer.len().div_ceil(2));
        let mut iter = layer.into_iter();
        while let Some(a) = iter.next() {
            match iter.next() {
                Some(b) => next.push(a.union(&b)),
                None => next.push(a),
            }
        }
        layer = next;
    }

    layer.pop().unwrap_or_else(|| MultiPolygon::new(Vec::new()))
}

/// Which turns of a path get a mitre join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinSide {
    /// Open path: both sides are outside.
    Both,
    /// Oriented polygon ring: only left turns open onto the outside.
    Outside,
}

struct Offsetter<'a> {
    distance: f64,
    style: CornerStyle,
    settings: &'a BufferSettings,
}

impl Offsetter<'_> {
    fn point(&self, c: Coord<f64>) -> Polygon<f64> {
        match self.style {
            CornerStyle::Square => {
                let d = self.distance;
                ring(vec![
                    Coord { x: c.x - d, y: c.y - d },
                    Coord { x: c.x + d, y: c.y - d },
                    Coord { x: c.x + d, y: c.y + d },
                    Coord { x: c.x - d, y: c.y + d },
                ])
            }
            CornerStyle::Rounded => self.circle(c),
        }
    }

    fn line(&self, ls: &LineString<f64>, pieces: &mut Vec<Polygon<f64>>) {
        let coords = &ls.0;
        let Some((first, last)) = coords.first().zip(coords.last()) else {
            return;
        };

        self.segments(coords, pieces);
        for w in coords.windows(3) {
            self.join(w[0], w[1], w[2], JoinSide::Both, pieces);
        }

        if self.style == CornerStyle::Rounded {
            pieces.push(self.circle(*first));
            pieces.push(self.circle(*last));
        }
    }

    /// Rings are walked with the material on their left (exterior CCW,
    /// holes CW), so a right turn is a reflex vertex.
    fn polygon(&self, p: &Polygon<f64>, pieces: &mut Vec<Polygon<f64>>) {
        let p = p.orient(Direction::Default);
        self.closed_ring(p.exterior(), pieces);
        for interior in p.interiors() {
            self.closed_ring(interior, pieces);
        }
        pieces.push(p);
    }

    fn closed_ring(&self, ls: &LineString<f64>, pieces: &mut Vec<Polygon<f64>>) {
        self.segments(&ls.0, pieces);

        // Vertices of a closed ring, without the repeated closing one.
        let mut vertices = ls.0.as_slice();
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices = &vertices[..vertices.len() - 1];
        }
        let n = vertices.len();
        if n < 3 {
            return;
        }
        for i in 0..n {
            self.join(
                vertices[(i + n - 1) % n],
                vertices[i],
                vertices[(i + 1) % n],
                JoinSide::Outside,
                pieces,
            );
        }
    }

    fn segments(&self, coords: &[Coord<f64>], pieces: &mut Vec<Polygon<f64>>) {
        for w in coords.windows(2) {
            let (a, b) = (w[0], w[1]);
            let Some(dir) = unit(b - a) else {
                continue;
            };
            let n = left_normal(dir) * self.distance;
            pieces.push(ring(vec![a - n, b - n, b + n, a + n]));
        }
    }

    fn join(
        &self,
        prev: Coord<f64>,
        vertex: Coord<f64>,
        next: Coord<f64>,
        side: JoinSide,
        pieces: &mut Vec<Polygon<f64>>,
    ) {
        if self.style == CornerStyle::Rounded {
            pieces.push(self.circle(vertex));
            return;
        }

        let (Some(d1), Some(d2)) = (unit(vertex - prev), unit(next - vertex)) else {
            return;
        };
        let cross = d1.x.mul_add(d2.y, -(d1.y * d2.x));
        if cross.abs() < EPSILON {
            // Straight continuation needs no join; a full reversal is
            // closed by the flat ends of both segments.
            return;
        }

        // The gap between the two segment rectangles opens on the
        // outside of the turn.
        let (n1, n2) = if cross > 0.0 {
            (right_normal(d1), right_normal(d2))
        } else {
            (left_normal(d1), left_normal(d2))
        };

        let d = self.distance;
        let a = vertex + n1 * d;
        let b = vertex + n2 * d;
        let cos = n1.x.mul_add(n2.x, n1.y * n2.y);
        let denom = 1.0 + cos;

        // On the material side of a reflex vertex a mitre would reach
        // through thin parts of the polygon; the bevel stays within `d`.
        let reflex = side == JoinSide::Outside && cross < 0.0;
        let within_limit = !reflex
            && denom > EPSILON
            && (2.0 / denom).sqrt() <= self.settings.miter_limit;
        if within_limit {
            let miter = vertex + (n1 + n2) * (d / denom);
            pieces.push(ring(vec![vertex, a, miter, b]));
        } else {
            pieces.push(ring(vec![vertex, a, b]));
        }
    }

    fn circle(&self, center: Coord<f64>) -> Polygon<f64> {
        let n = 4 * self.settings.quadrant_segments.max(1);
        let step = std::f64::consts::TAU / f64::from(n);
        ring(
            (0..n)
                .map(|i| {
                    let (sin, cos) = (step * f64::from(i)).sin_cos();
                    Coord {
                        x: self.distance.mul_add(cos, center.x),
                        y: self.distance.mul_add(sin, center.y),
                    }
                })
                .collect(),
        )
    }
}

fn ring(coords: Vec<Coord<f64>>) -> Polygon<f64> {
    Polygon::new(LineString::from(coords), Vec::new()).orient(Direction::Default)
}

fn unit(v: Coord<f64>) -> Option<Coord<f64>> {
    let len = v.x.hypot(v.y);
    (len > EPSILON).then(|| v / len)
}

const fn left_normal(dir: Coord<f64>) -> Coord<f64> {
    Coord {
        x: -dir.y,
        y: dir.x,
    }
}

const fn right_normal(dir: Coord<f64>) -> Coord<f64> {
    Coord {
        x: dir.y,
        y: -dir.x,
    }
}
