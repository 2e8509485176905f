//! Geometry validation.
//!
//! # Responsibility
//! - Decode GeoJSON geometry text into a `GeometryShape`.
//! - Reject shapes that are empty, malformed, of the wrong kind for the
//!   object type, centered outside the service region, or whose polygon
//!   exterior rings cross themselves.
//!
//! # Invariants
//! - Checks run in a fixed order and the first failure wins:
//!   structure, type compatibility, regional bounds, self-intersection.
//! - Only exterior rings are checked for self-intersection. Holes are not
//!   validated; this is a known limitation kept for compatibility with
//!   existing data.

use crate::model::geometry::{BBox, GeometryShape, Position, ShapeTag};
use crate::model::water_object::ObjectTypeKind;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service region rectangle in `(lon, lat)` order, bounds inclusive.
pub const REGION_BOUNDS: BBox = BBox::new(46.49, 40.57, 87.36, 55.44);

const MIN_LINE_POSITIONS: usize = 2;
const MIN_RING_POSITIONS: usize = 4;

/// Geometry rejection reasons.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// No geometry text, `null`, or a coordinate payload without positions.
    EmptyGeometry,
    /// Payload does not decode into a supported shape.
    InvalidStructure(String),
    /// Shape is not permitted for the object type.
    TypeMismatch {
        expected: &'static [ShapeTag],
        got: ShapeTag,
    },
    /// Bounding-box center lies outside `REGION_BOUNDS`.
    OutsideBounds { center: Position },
    /// Exterior ring of the polygon at `polygon_index` crosses itself.
    SelfIntersecting { polygon_index: usize },
}

impl GeometryError {
    /// Stable machine-readable code for logs and API envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyGeometry => "empty_geometry",
            Self::InvalidStructure(_) => "invalid_geojson",
            Self::TypeMismatch { .. } => "geometry_type_mismatch",
            Self::OutsideBounds { .. } => "outside_bounds",
            Self::SelfIntersecting { .. } => "self_intersecting",
        }
    }
}

impl Display for GeometryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyGeometry => write!(f, "geometry is empty"),
            Self::InvalidStructure(details) => write!(f, "invalid geojson structure: {details}"),
            Self::TypeMismatch { expected, got } => {
                let expected = expected
                    .iter()
                    .map(|tag| tag.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(
                    f,
                    "geometry type does not match object type: expected [{expected}], got {got}"
                )
            }
            Self::OutsideBounds { center } => write!(
                f,
                "geometry center ({}, {}) is outside the service region",
                center.lon, center.lat
            ),
            Self::SelfIntersecting { polygon_index } => {
                write!(f, "polygon {polygon_index} is self-intersecting")
            }
        }
    }
}

impl Error for GeometryError {}

/// Validates raw GeoJSON geometry text for an object type.
pub fn validate(raw_geometry: &str, object_type: ObjectTypeKind) -> Result<(), GeometryError> {
    parse_and_validate(raw_geometry, object_type).map(|_| ())
}

/// Validates raw GeoJSON geometry text and returns the decoded shape.
pub fn parse_and_validate(
    raw_geometry: &str,
    object_type: ObjectTypeKind,
) -> Result<GeometryShape, GeometryError> {
    let shape = parse_geometry(raw_geometry)?;
    check_placement(&shape, object_type)?;
    Ok(shape)
}

/// Validates an already decoded shape for an object type.
///
/// Runs the same checks as `validate`, including the structural ones, so
/// shapes built in code get no shortcut.
pub fn validate_shape(
    shape: &GeometryShape,
    object_type: ObjectTypeKind,
) -> Result<(), GeometryError> {
    check_structure(shape)?;
    check_placement(shape, object_type)
}

/// Structural parse of GeoJSON geometry text.
pub fn parse_geometry(raw_geometry: &str) -> Result<GeometryShape, GeometryError> {
    if raw_geometry.trim().is_empty() {
        return Err(GeometryError::EmptyGeometry);
    }

    let value: Value = serde_json::from_str(raw_geometry)
        .map_err(|err| GeometryError::InvalidStructure(err.to_string()))?;
    let object = match &value {
        Value::Null => return Err(GeometryError::EmptyGeometry),
        Value::Object(object) => object,
        _ => {
            return Err(GeometryError::InvalidStructure(
                "geometry must be a JSON object".to_string(),
            ))
        }
    };

    let type_name = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| GeometryError::InvalidStructure("missing `type` member".to_string()))?;
    if ShapeTag::parse(type_name).is_none() {
        return Err(GeometryError::InvalidStructure(format!(
            "unsupported geometry type `{type_name}`"
        )));
    }

    match object.get("coordinates") {
        None | Some(Value::Null) => return Err(GeometryError::EmptyGeometry),
        Some(coordinates) if !contains_number(coordinates) => {
            return Err(GeometryError::EmptyGeometry)
        }
        Some(_) => {}
    }

    let shape: GeometryShape = serde_json::from_value(value)
        .map_err(|err| GeometryError::InvalidStructure(err.to_string()))?;
    check_structure(&shape)?;
    Ok(shape)
}

/// Whether an exterior ring has two non-adjacent edges that properly cross.
///
/// The ring is expected closed (last position equals first). For `n`
/// positions there are `n - 1` edges; edges sharing a vertex, including the
/// first/last pair joined at the closing vertex, are never compared.
/// Touching or collinear edges are not reported.
pub fn ring_is_self_intersecting(ring: &[Position]) -> bool {
    let n = ring.len();
    if n < MIN_RING_POSITIONS {
        return false;
    }

    for i in 0..n - 1 {
        for j in (i + 2)..(n - 1) {
            if i == 0 && j == n - 2 {
                continue;
            }
            if segments_cross(ring[i], ring[i + 1], ring[j], ring[j + 1]) {
                return true;
            }
        }
    }
    false
}

fn check_placement(shape: &GeometryShape, object_type: ObjectTypeKind) -> Result<(), GeometryError> {
    let tag = shape.tag();
    if !object_type.permits(tag) {
        return Err(GeometryError::TypeMismatch {
            expected: object_type.permitted_shapes(),
            got: tag,
        });
    }

    let bbox = shape.bounding_box().ok_or(GeometryError::EmptyGeometry)?;
    let center = bbox.center();
    if !REGION_BOUNDS.contains(center) {
        return Err(GeometryError::OutsideBounds { center });
    }

    match shape {
        GeometryShape::Polygon(rings) => check_exterior_ring(rings, 0),
        GeometryShape::MultiPolygon(polygons) => polygons
            .iter()
            .enumerate()
            .try_for_each(|(index, rings)| check_exterior_ring(rings, index)),
        _ => Ok(()),
    }
}

fn check_exterior_ring(rings: &[Vec<Position>], polygon_index: usize) -> Result<(), GeometryError> {
    match rings.first() {
        Some(exterior) if ring_is_self_intersecting(exterior) => {
            Err(GeometryError::SelfIntersecting { polygon_index })
        }
        _ => Ok(()),
    }
}

fn check_structure(shape: &GeometryShape) -> Result<(), GeometryError> {
    let positions = shape.positions();
    if positions.is_empty() {
        return Err(GeometryError::EmptyGeometry);
    }
    if positions.iter().any(|position| !position.is_finite()) {
        return Err(GeometryError::InvalidStructure(
            "coordinates must be finite numbers".to_string(),
        ));
    }

    match shape {
        GeometryShape::Point(_) => Ok(()),
        GeometryShape::LineString(line) => check_line(line),
        GeometryShape::MultiLineString(lines) => lines.iter().try_for_each(|line| check_line(line)),
        GeometryShape::Polygon(rings) => check_polygon(rings),
        GeometryShape::MultiPolygon(polygons) => {
            polygons.iter().try_for_each(|rings| check_polygon(rings))
        }
    }
}

fn check_line(line: &[Position]) -> Result<(), GeometryError> {
    if line.is_empty() {
        return Err(GeometryError::EmptyGeometry);
    }
    if line.len() < MIN_LINE_POSITIONS {
        return Err(GeometryError::InvalidStructure(format!(
            "line needs at least {MIN_LINE_POSITIONS} positions, got {}",
            line.len()
        )));
    }
    Ok(())
}

fn check_polygon(rings: &[Vec<Position>]) -> Result<(), GeometryError> {
    if rings.is_empty() {
        return Err(GeometryError::EmptyGeometry);
    }
    for ring in rings {
        if ring.is_empty() {
            return Err(GeometryError::EmptyGeometry);
        }
        if ring.len() < MIN_RING_POSITIONS {
            return Err(GeometryError::InvalidStructure(format!(
                "ring needs at least {MIN_RING_POSITIONS} positions, got {}",
                ring.len()
            )));
        }
        if ring.first() != ring.last() {
            return Err(GeometryError::InvalidStructure(
                "ring is not closed".to_string(),
            ));
        }
    }
    Ok(())
}

fn contains_number(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::Array(items) => items.iter().any(contains_number),
        _ => false,
    }
}

/// Proper crossing test: each segment's endpoints lie strictly on opposite
/// sides of the other segment's supporting line.
fn segments_cross(a: Position, b: Position, c: Position, d: Position) -> bool {
    let d1 = orientation(c, d, a);
    let d2 = orientation(c, d, b);
    let d3 = orientation(a, b, c);
    let d4 = orientation(a, b, d);

    strictly_opposite(d1, d2) && strictly_opposite(d3, d4)
}

fn strictly_opposite(left: f64, right: f64) -> bool {
    (left > 0.0 && right < 0.0) || (left < 0.0 && right > 0.0)
}

fn orientation(a: Position, b: Position, c: Position) -> f64 {
    (c.lon - a.lon) * (b.lat - a.lat) - (b.lon - a.lon) * (c.lat - a.lat)
}
