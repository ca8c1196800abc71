//! KML rendering of a risk volume.
//!
//! One `Folder` per zone holding a single `Placemark` whose geometry is a
//! `MultiGeometry` of the zone's boundary polygons.

use std::fmt::Write as _;

use geo::{LineString, MultiPolygon};
use ground_risk_zones_models::{RiskVolume, ZoneName};

use crate::{FILL_OPACITY, boundaries_wgs84, zone_color};

/// Renders `volume` as a KML document.
#[must_use]
pub fn render(volume: &RiskVolume) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<kml xmlns=\"http://www.opengis.net/kml/2.2\">\n<Document>\n");
    out.push_str("<name>SORA risk volume</name>\n");

    for zone in ZoneName::ALL {
        push_style(&mut out, zone);
    }

    for (zone, distance, boundary) in boundaries_wgs84(volume) {
        let _ = writeln!(out, "<Folder>\n<name>{zone}</name>");
        let _ = writeln!(out, "<Placemark>\n<name>{zone}</name>");
        let _ = writeln!(
            out,
            "<description>{distance} m from the flight geometry ({} corners)</description>",
            volume.corner_style
        );
        let _ = writeln!(out, "<styleUrl>#{}</styleUrl>", style_id(zone));
        push_multi_polygon(&mut out, &boundary);
        out.push_str("</Placemark>\n</Folder>\n");
    }

    out.push_str("</Document>\n</kml>\n");
    out
}

fn style_id(zone: ZoneName) -> String {
    zone.as_ref().to_ascii_lowercase().replace(' ', "_")
}

/// KML colours are `aabbggrr`.
fn kml_color(zone: ZoneName, alpha: f64) -> String {
    let rgb = zone_color(zone);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let alpha = (alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
    format!("{alpha:02x}{}{}{}", &rgb[4..6], &rgb[2..4], &rgb[0..2])
}

fn push_style(out: &mut String, zone: ZoneName) {
    let _ = writeln!(out, "<Style id=\"{}\">", style_id(zone));
    let _ = writeln!(
        out,
        "<LineStyle><color>{}</color><width>2</width></LineStyle>",
        kml_color(zone, 1.0)
    );
    let _ = writeln!(
        out,
        "<PolyStyle><color>{}</color></PolyStyle>",
        kml_color(zone, FILL_OPACITY)
    );
    out.push_str("</Style>\n");
}

fn push_multi_polygon(out: &mut String, mp: &MultiPolygon<f64>) {
    out.push_str("<MultiGeometry>\n");
    for polygon in mp {
        out.push_str("<Polygon>\n<outerBoundaryIs>");
        push_ring(out, polygon.exterior());
        out.push_str("</outerBoundaryIs>\n");
        for interior in polygon.interiors() {
            out.push_str("<innerBoundaryIs>");
            push_ring(out, interior);
            out.push_str("</innerBoundaryIs>\n");
        }
        out.push_str("</Polygon>\n");
    }
    out.push_str("</MultiGeometry>\n");
}

fn push_ring(out: &mut String, ring: &LineString<f64>) {
    out.push_str("<LinearRing><coordinates>");
    for (i, c) in ring.coords().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:.8},{:.8}", c.x, c.y);
    }
    out.push_str("</coordinates></LinearRing>");
}
