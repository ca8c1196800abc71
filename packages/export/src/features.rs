//! `GeoJSON` rendering of a risk volume: one feature per zone with
//! simplestyle properties.

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue};
use ground_risk_zones_models::RiskVolume;

use crate::{FILL_OPACITY, boundaries_wgs84, zone_color};

/// Renders `volume` as a pretty-printed `FeatureCollection`.
///
/// # Errors
///
/// Returns an error if the collection cannot be encoded.
pub fn render(volume: &RiskVolume) -> Result<String, serde_json::Error> {
    let features = boundaries_wgs84(volume)
        .into_iter()
        .map(|(zone, distance, boundary)| -> Result<Feature, serde_json::Error> {
            let mut properties = JsonObject::new();
            properties.insert("name".to_string(), JsonValue::from(zone.to_string()));
            properties.insert("zone".to_string(), serde_json::to_value(zone)?);
            properties.insert("cumulative_distance_m".to_string(), JsonValue::from(distance));
            properties.insert(
                "corner_style".to_string(),
                JsonValue::from(volume.corner_style.to_string()),
            );
            let color = format!("#{}", zone_color(zone));
            properties.insert("stroke".to_string(), JsonValue::from(color.clone()));
            properties.insert("fill".to_string(), JsonValue::from(color));
            properties.insert("fill-opacity".to_string(), JsonValue::from(FILL_OPACITY));

            Ok(Feature {
                bbox: None,
                geometry: Some(Geometry::new(geojson::Value::from(&boundary))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    serde_json::to_string_pretty(&FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}
