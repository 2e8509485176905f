//! GeoJSON-shaped geometry model.
//!
//! # Responsibility
//! - Represent the small fixed catalog of supported shapes.
//! - Map 1:1 onto the GeoJSON wire form `{"type": .., "coordinates": ..}`.
//!
//! # Invariants
//! - Positions are `(longitude, latitude)` pairs; extra ordinates on input
//!   are dropped.
//! - Polygon rings are closed (first position equals last) and hold at least
//!   four positions once accepted by the validator.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};

/// One `(longitude, latitude)` coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub lon: f64,
    pub lat: f64,
}

impl Position {
    pub const fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    pub fn is_finite(&self) -> bool {
        self.lon.is_finite() && self.lat.is_finite()
    }
}

impl Serialize for Position {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        [self.lon, self.lat].serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Position {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let values = Vec::<f64>::deserialize(deserializer)?;
        match values.as_slice() {
            [lon, lat, ..] => Ok(Self::new(*lon, *lat)),
            _ => Err(D::Error::custom(format!(
                "position needs at least 2 numbers, got {}",
                values.len()
            ))),
        }
    }
}

/// Shape discriminator, serialized as the GeoJSON `type` member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeTag {
    Point,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
}

impl ShapeTag {
    /// Stable GeoJSON type name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Point => "Point",
            Self::LineString => "LineString",
            Self::MultiLineString => "MultiLineString",
            Self::Polygon => "Polygon",
            Self::MultiPolygon => "MultiPolygon",
        }
    }

    /// Parses an exact GeoJSON type name. Other GeoJSON types
    /// (`MultiPoint`, `GeometryCollection`) are not supported.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Point" => Some(Self::Point),
            "LineString" => Some(Self::LineString),
            "MultiLineString" => Some(Self::MultiLineString),
            "Polygon" => Some(Self::Polygon),
            "MultiPolygon" => Some(Self::MultiPolygon),
            _ => None,
        }
    }
}

impl Display for ShapeTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported geometry shapes.
///
/// Polygons are a list of linear rings; the first ring is the exterior and
/// any further rings are holes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum GeometryShape {
    Point(Position),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl GeometryShape {
    pub fn tag(&self) -> ShapeTag {
        match self {
            Self::Point(_) => ShapeTag::Point,
            Self::LineString(_) => ShapeTag::LineString,
            Self::MultiLineString(_) => ShapeTag::MultiLineString,
            Self::Polygon(_) => ShapeTag::Polygon,
            Self::MultiPolygon(_) => ShapeTag::MultiPolygon,
        }
    }

    /// All positions in document order.
    pub fn positions(&self) -> Vec<Position> {
        match self {
            Self::Point(position) => vec![*position],
            Self::LineString(line) => line.clone(),
            Self::MultiLineString(parts) | Self::Polygon(parts) => {
                parts.iter().flatten().copied().collect()
            }
            Self::MultiPolygon(polygons) => polygons.iter().flatten().flatten().copied().collect(),
        }
    }

    /// Axis-aligned bounds of every position, `None` for an empty shape.
    pub fn bounding_box(&self) -> Option<BBox> {
        BBox::from_positions(&self.positions())
    }

    /// Serializes to the GeoJSON wire form.
    pub fn to_geojson(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Axis-aligned bounding box in `(lon, lat)` space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BBox {
    pub const fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    pub fn from_positions(positions: &[Position]) -> Option<Self> {
        let (first, rest) = positions.split_first()?;
        let mut bbox = Self::new(first.lon, first.lat, first.lon, first.lat);
        for position in rest {
            bbox.min_lon = bbox.min_lon.min(position.lon);
            bbox.min_lat = bbox.min_lat.min(position.lat);
            bbox.max_lon = bbox.max_lon.max(position.lon);
            bbox.max_lat = bbox.max_lat.max(position.lat);
        }
        Some(bbox)
    }

    pub fn center(&self) -> Position {
        Position::new(
            (self.min_lon + self.max_lon) / 2.0,
            (self.min_lat + self.max_lat) / 2.0,
        )
    }

    /// Inclusive containment test.
    pub fn contains(&self, position: Position) -> bool {
        position.lon >= self.min_lon
            && position.lon <= self.max_lon
            && position.lat >= self.min_lat
            && position.lat <= self.max_lat
    }
}

#[cfg(test)]
mod tests {
    use super::{BBox, GeometryShape, Position, ShapeTag};

    #[test]
    fn point_uses_geojson_wire_form() {
        let shape = GeometryShape::Point(Position::new(71.4, 51.1));
        let json = shape.to_geojson().expect("point should serialize");
        assert_eq!(json, r#"{"type":"Point","coordinates":[71.4,51.1]}"#);

        let parsed: GeometryShape = serde_json::from_str(&json).expect("point should parse");
        assert_eq!(parsed, shape);
    }

    #[test]
    fn position_drops_altitude() {
        let parsed: GeometryShape =
            serde_json::from_str(r#"{"type":"Point","coordinates":[71.4,51.1,350.0]}"#)
                .expect("3d point should parse");
        assert_eq!(parsed, GeometryShape::Point(Position::new(71.4, 51.1)));
    }

    #[test]
    fn position_rejects_single_number() {
        let result =
            serde_json::from_str::<GeometryShape>(r#"{"type":"Point","coordinates":[71.4]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn bounding_box_covers_every_ring() {
        let shape = GeometryShape::Polygon(vec![vec![
            Position::new(60.0, 45.0),
            Position::new(62.0, 45.0),
            Position::new(62.0, 47.0),
            Position::new(60.0, 45.0),
        ]]);
        let bbox = shape.bounding_box().expect("non-empty polygon has bounds");
        assert_eq!(bbox, BBox::new(60.0, 45.0, 62.0, 47.0));
        assert_eq!(bbox.center(), Position::new(61.0, 46.0));
    }

    #[test]
    fn empty_shape_has_no_bounds() {
        assert!(GeometryShape::LineString(Vec::new()).bounding_box().is_none());
    }

    #[test]
    fn shape_tag_parse_is_exact() {
        assert_eq!(ShapeTag::parse("Polygon"), Some(ShapeTag::Polygon));
        assert_eq!(ShapeTag::parse("polygon"), None);
        assert_eq!(ShapeTag::parse("MultiPoint"), None);
    }
}
