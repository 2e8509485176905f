//! GeoJSON export of published objects for map clients.

use crate::model::geometry::GeometryShape;
use crate::model::water_object::{CanonicalId, ObjectTypeKind, RecordId, WaterObjectSummary};
use serde::Serialize;

/// GeoJSON `FeatureCollection` with a small metadata block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub features: Vec<Feature>,
    pub metadata: CollectionMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub geometry: GeometryShape,
    pub properties: FeatureProperties,
}

/// Summary attributes carried by every feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureProperties {
    pub id: RecordId,
    pub canonical_id: CanonicalId,
    pub version: u32,
    pub name_kz: String,
    pub name_ru: Option<String>,
    pub name_en: Option<String>,
    pub object_type: ObjectTypeKind,
    pub length_km: Option<f64>,
    pub area_km2: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CollectionMetadata {
    pub total: usize,
}

impl FeatureCollection {
    /// Builds a collection preserving the order of `items`.
    pub fn from_summaries(items: &[WaterObjectSummary]) -> Self {
        let features: Vec<Feature> = items.iter().map(Feature::from_summary).collect();
        Self {
            kind: "FeatureCollection",
            metadata: CollectionMetadata {
                total: features.len(),
            },
            features,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl Feature {
    fn from_summary(summary: &WaterObjectSummary) -> Self {
        Self {
            kind: "Feature",
            geometry: summary.geometry.clone(),
            properties: FeatureProperties {
                id: summary.id,
                canonical_id: summary.canonical_id,
                version: summary.version,
                name_kz: summary.name_kz.clone(),
                name_ru: summary.name_ru.clone(),
                name_en: summary.name_en.clone(),
                object_type: summary.object_type,
                length_km: summary.length_km,
                area_km2: summary.area_km2,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FeatureCollection;
    use crate::model::geometry::{GeometryShape, Position};
    use crate::model::lifecycle::ObjectStatus;
    use crate::model::water_object::{ObjectTypeKind, WaterObjectSummary};
    use serde_json::{json, Value};
    use uuid::Uuid;

    fn spring(id: i64, name: &str) -> WaterObjectSummary {
        WaterObjectSummary {
            id,
            canonical_id: Uuid::nil(),
            version: 2,
            name_kz: name.to_string(),
            name_ru: None,
            name_en: Some("Spring".to_string()),
            object_type: ObjectTypeKind::Spring,
            geometry: GeometryShape::Point(Position::new(76.9, 43.2)),
            status: ObjectStatus::Published,
            length_km: None,
            area_km2: None,
            created_by: 1,
            updated_at: 0,
            published_at: Some(0),
        }
    }

    #[test]
    fn collection_uses_geojson_layout() {
        let collection = FeatureCollection::from_summaries(&[spring(3, "Бұлақ"), spring(4, "Көз")]);
        let value: Value =
            serde_json::from_str(&collection.to_json().expect("serializable")).expect("json");

        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["metadata"]["total"], 2);
        assert_eq!(value["features"][0]["type"], "Feature");
        assert_eq!(
            value["features"][0]["geometry"],
            json!({"type": "Point", "coordinates": [76.9, 43.2]})
        );
        assert_eq!(value["features"][1]["properties"]["id"], 4);
        assert_eq!(value["features"][1]["properties"]["object_type"], "spring");
        assert_eq!(value["features"][1]["properties"]["name_ru"], Value::Null);
    }

    #[test]
    fn empty_collection_has_zero_total() {
        let collection = FeatureCollection::from_summaries(&[]);
        assert!(collection.features.is_empty());
        assert_eq!(collection.metadata.total, 0);
    }
}
