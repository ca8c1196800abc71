//! Reads a flight geometry out of a `GeoJSON` or KML document.
//!
//! `GeoJSON` may be a `FeatureCollection`, a single `Feature` or a bare
//! geometry. KML placemarks are collected from every document and folder.
//! Parts of the same shape family are merged into the family's
//! multi-form; parts of different families cannot be reconciled.

use geo::{LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use geojson::{GeoJson, JsonObject};
use kml::Kml;
use ground_risk_geometry_models::{Crs, FlightGeometry, GeometryKind};

use crate::GeometryError;

/// Geometry parts collected from every feature of a document.
#[derive(Default)]
struct Parts {
    points: Vec<Point<f64>>,
    lines: Vec<LineString<f64>>,
    polygons: Vec<Polygon<f64>>,
}

impl Parts {
    fn push(&mut self, geometry: geo::Geometry<f64>) {
        match geometry {
            geo::Geometry::Point(p) => self.points.push(p),
            geo::Geometry::MultiPoint(mp) => self.points.extend(mp.0),
            geo::Geometry::Line(l) => self.lines.push(LineString::from(vec![l.start, l.end])),
            geo::Geometry::LineString(ls) => self.lines.push(ls),
            geo::Geometry::MultiLineString(mls) => self.lines.extend(mls.0),
            geo::Geometry::Polygon(p) => self.polygons.push(p),
            geo::Geometry::MultiPolygon(mp) => self.polygons.extend(mp.0),
            geo::Geometry::Rect(r) => self.polygons.push(r.to_polygon()),
            geo::Geometry::Triangle(t) => self.polygons.push(t.to_polygon()),
            geo::Geometry::GeometryCollection(gc) => {
                for g in gc.0 {
                    self.push(g);
                }
            }
        }
    }

    fn into_flight_geometry(self) -> Result<FlightGeometry, GeometryError> {
        let mut found = Vec::new();
        if !self.points.is_empty() {
            found.push(if self.points.len() == 1 {
                GeometryKind::Point
            } else {
                GeometryKind::MultiPoint
            });
        }
        if !self.lines.is_empty() {
            found.push(if self.lines.len() == 1 {
                GeometryKind::LineString
            } else {
                GeometryKind::MultiLineString
            });
        }
        if !self.polygons.is_empty() {
            found.push(if self.polygons.len() == 1 {
                GeometryKind::Polygon
            } else {
                GeometryKind::MultiPolygon
            });
        }

        match found.as_slice() {
            [] => Err(GeometryError::Empty),
            [GeometryKind::Point] => Ok(FlightGeometry::Point(self.points[0])),
            [GeometryKind::MultiPoint] => Ok(FlightGeometry::MultiPoint(MultiPoint(self.points))),
            [GeometryKind::LineString] => Ok(FlightGeometry::LineString(
                self.lines.into_iter().next().ok_or(GeometryError::Empty)?,
            )),
            [GeometryKind::MultiLineString] => {
                Ok(FlightGeometry::MultiLineString(MultiLineString(self.lines)))
            }
            [GeometryKind::Polygon] => Ok(FlightGeometry::Polygon(
                self.polygons.into_iter().next().ok_or(GeometryError::Empty)?,
            )),
            [GeometryKind::MultiPolygon] => {
                Ok(FlightGeometry::MultiPolygon(MultiPolygon(self.polygons)))
            }
            kinds => Err(GeometryError::MixedTypes {
                kinds: kinds
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }
}

/// Parses a `GeoJSON` document into a flight geometry and the CRS it
/// declares (if any).
///
/// # Errors
///
/// * [`GeometryError::Parse`] if the text is not valid `GeoJSON`
/// * [`GeometryError::Empty`] if no feature carries a geometry
/// * [`GeometryError::MixedTypes`] if points, lines and polygons are mixed
/// * [`GeometryError::Crs`] / [`GeometryError::MalformedCrs`] for a `crs`
///   member that cannot be resolved
pub fn read_geojson(text: &str) -> Result<(FlightGeometry, Option<Crs>), GeometryError> {
    let geojson: GeoJson = text.parse()?;
    let mut parts = Parts::default();

    let crs = match geojson {
        GeoJson::FeatureCollection(fc) => {
            let crs = declared_crs(fc.foreign_members.as_ref())?;
            for (index, feature) in fc.features.into_iter().enumerate() {
                let Some(geometry) = feature.geometry else {
                    log::warn!("Skipping feature {index}: no geometry");
                    continue;
                };
                parts.push(geometry.try_into()?);
            }
            crs
        }
        GeoJson::Feature(feature) => {
            let crs = declared_crs(feature.foreign_members.as_ref())?;
            if let Some(geometry) = feature.geometry {
                parts.push(geometry.try_into()?);
            }
            crs
        }
        GeoJson::Geometry(geometry) => {
            let crs = declared_crs(geometry.foreign_members.as_ref())?;
            parts.push(geometry.try_into()?);
            crs
        }
    };

    Ok((parts.into_flight_geometry()?, crs))
}

/// Parses a KML document into a flight geometry.
///
/// KML coordinates are always WGS84 longitude/latitude; altitudes are
/// dropped.
///
/// # Errors
///
/// * [`GeometryError::Kml`] if the text is not valid KML
/// * [`GeometryError::Empty`] if no placemark carries a geometry
/// * [`GeometryError::MixedTypes`] if points, lines and polygons are mixed
pub fn read_kml(text: &str) -> Result<FlightGeometry, GeometryError> {
    let document: Kml<f64> = text.parse()?;
    let collection = kml::quick_collection(document)?;

    let mut parts = Parts::default();
    for geometry in collection.0 {
        parts.push(geometry);
    }
    parts.into_flight_geometry()
}

/// Resolves the legacy `GeoJSON` 2008 `crs` member.
///
/// Supports both the `name` form (`{"type":"name","properties":{"name":"EPSG:4326"}}`)
/// and the `EPSG` form (`{"type":"EPSG","properties":{"code":4326}}`).
fn declared_crs(members: Option<&JsonObject>) -> Result<Option<Crs>, GeometryError> {
    let Some(member) = members.and_then(|m| m.get("crs")) else {
        return Ok(None);
    };
    if member.is_null() {
        return Ok(None);
    }

    let malformed = || GeometryError::MalformedCrs {
        member: member.to_string(),
    };

    let properties = member.get("properties").ok_or_else(malformed)?;
    match member.get("type").and_then(serde_json::Value::as_str) {
        Some("name") => {
            let name = properties
                .get("name")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(malformed)?;
            Ok(Some(name.parse()?))
        }
        Some("EPSG" | "epsg") => {
            let code = properties
                .get("code")
                .and_then(serde_json::Value::as_u64)
                .and_then(|c| u32::try_from(c).ok())
                .ok_or_else(malformed)?;
            Ok(Some(Crs::from_epsg(code)?))
        }
        _ => Err(malformed()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ground_risk_geometry_models::Datum;

    #[test]
    fn reads_single_line_feature() {
        let text = r#"{
            "type": "Feature",
            "properties": {},
            "geometry": { "type": "LineString", "coordinates": [[-47.9, -15.8], [-47.8, -15.8]] }
        }"#;
        let (geometry, crs) = read_geojson(text).unwrap();
        assert_eq!(geometry.kind(), GeometryKind::LineString);
        assert_eq!(crs, None);
    }

    #[test]
    fn merges_same_family_features() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "properties": {}, "geometry": { "type": "Polygon",
                  "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]] } },
                { "type": "Feature", "properties": {}, "geometry": { "type": "Polygon",
                  "coordinates": [[[2, 2], [3, 2], [3, 3], [2, 2]]] } },
                { "type": "Feature", "properties": {}, "geometry": null }
            ]
        }"#;
        let (geometry, _) = read_geojson(text).unwrap();
        let FlightGeometry::MultiPolygon(mp) = geometry else {
            panic!("expected MultiPolygon, got {:?}", geometry.kind());
        };
        assert_eq!(mp.0.len(), 2);
    }

    #[test]
    fn rejects_empty_collection() {
        let text = r#"{ "type": "FeatureCollection", "features": [] }"#;
        assert!(matches!(read_geojson(text), Err(GeometryError::Empty)));
    }

    #[test]
    fn rejects_mixed_families() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "properties": {}, "geometry": { "type": "Point", "coordinates": [0, 0] } },
                { "type": "Feature", "properties": {}, "geometry": { "type": "Polygon",
                  "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]] } }
            ]
        }"#;
        let err = read_geojson(text).unwrap_err();
        let GeometryError::MixedTypes { kinds } = err else {
            panic!("expected MixedTypes, got {err:?}");
        };
        assert_eq!(kinds, "Point, Polygon");
    }

    #[test]
    fn flattens_geometry_collections() {
        let text = r#"{ "type": "GeometryCollection", "geometries": [
            { "type": "LineString", "coordinates": [[0, 0], [1, 1]] },
            { "type": "LineString", "coordinates": [[1, 1], [2, 0]] }
        ] }"#;
        let (geometry, _) = read_geojson(text).unwrap();
        assert_eq!(geometry.kind(), GeometryKind::MultiLineString);
    }

    #[test]
    fn reads_named_crs_member() {
        let text = r#"{
            "type": "FeatureCollection",
            "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::31983" } },
            "features": [
                { "type": "Feature", "properties": {}, "geometry": { "type": "Point", "coordinates": [190000, 8250000] } }
            ]
        }"#;
        let (_, crs) = read_geojson(text).unwrap();
        assert!(matches!(crs, Some(Crs::Utm(Datum::Sirgas2000, _))));
    }

    #[test]
    fn reads_epsg_crs_member() {
        let text = r#"{
            "type": "Feature",
            "crs": { "type": "EPSG", "properties": { "code": 4674 } },
            "properties": {},
            "geometry": { "type": "Point", "coordinates": [-47.9, -15.8] }
        }"#;
        let (_, crs) = read_geojson(text).unwrap();
        assert_eq!(crs, Some(Crs::Geographic(Datum::Sirgas2000)));
    }

    #[test]
    fn rejects_unreadable_crs_member() {
        let text = r#"{
            "type": "Feature",
            "crs": { "type": "link", "properties": { "href": "http://example.com/crs" } },
            "properties": {},
            "geometry": { "type": "Point", "coordinates": [-47.9, -15.8] }
        }"#;
        assert!(matches!(
            read_geojson(text),
            Err(GeometryError::MalformedCrs { .. })
        ));

        let text = r#"{
            "type": "Feature",
            "crs": { "type": "name", "properties": { "name": "EPSG:3857" } },
            "properties": {},
            "geometry": { "type": "Point", "coordinates": [-47.9, -15.8] }
        }"#;
        assert!(matches!(read_geojson(text), Err(GeometryError::Crs(_))));
    }

    fn kml_document(placemarks: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <name>flight</name>
    <Folder>
      {placemarks}
    </Folder>
  </Document>
</kml>"#
        )
    }

    const KML_LINE: &str = r"<Placemark><name>route</name><LineString>
        <coordinates>-47.90,-15.80,120 -47.89,-15.80,120 -47.89,-15.79,120</coordinates>
    </LineString></Placemark>";

    const KML_POLYGON: &str = r"<Placemark><name>area</name><Polygon><outerBoundaryIs><LinearRing>
        <coordinates>-47.90,-15.80 -47.89,-15.80 -47.89,-15.79 -47.90,-15.80</coordinates>
    </LinearRing></outerBoundaryIs></Polygon></Placemark>";

    #[test]
    fn reads_kml_line_string() {
        let geometry = read_kml(&kml_document(KML_LINE)).unwrap();
        let FlightGeometry::LineString(ls) = geometry else {
            panic!("expected LineString, got {:?}", geometry.kind());
        };
        assert_eq!(ls.0.len(), 3);
        assert!((ls.0[0].x + 47.90).abs() < 1e-12);
        assert!((ls.0[2].y + 15.79).abs() < 1e-12);
    }

    #[test]
    fn reads_kml_polygon() {
        let geometry = read_kml(&kml_document(KML_POLYGON)).unwrap();
        let FlightGeometry::Polygon(polygon) = geometry else {
            panic!("expected Polygon, got {:?}", geometry.kind());
        };
        assert_eq!(polygon.exterior().0.len(), 4);
        assert!(polygon.interiors().is_empty());
    }

    #[test]
    fn merges_kml_placemarks_of_one_family() {
        let text = kml_document(&format!("{KML_LINE}{KML_LINE}"));
        assert_eq!(
            read_kml(&text).unwrap().kind(),
            GeometryKind::MultiLineString
        );
    }

    #[test]
    fn rejects_mixed_kml_placemarks() {
        let text = kml_document(&format!("{KML_LINE}{KML_POLYGON}"));
        let err = read_kml(&text).unwrap_err();
        let GeometryError::MixedTypes { kinds } = err else {
            panic!("expected MixedTypes, got {err:?}");
        };
        assert_eq!(kinds, "LineString, Polygon");
    }

    #[test]
    fn rejects_kml_without_geometry() {
        let text = kml_document("<Placemark><name>empty</name></Placemark>");
        assert!(matches!(read_kml(&text), Err(GeometryError::Empty)));
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(matches!(
            read_geojson("{ not json"),
            Err(GeometryError::Parse(_))
        ));
    }
}
