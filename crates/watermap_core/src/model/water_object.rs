//! Water object domain model.
//!
//! # Responsibility
//! - Define the versioned record shared by every lifecycle state.
//! - Define the object type catalog and its permitted geometry shapes.
//! - Validate attribute-level invariants before persistence.
//!
//! # Invariants
//! - `canonical_id` is generated once per logical object and never reused.
//! - `version` starts at 1 and increases by exactly one per edit or revision.
//! - `rejection_reason` is set if and only if `status == Rejected`.
//! - `name_kz` is required and must not be blank.

use crate::model::geometry::{GeometryShape, ShapeTag};
use crate::model::lifecycle::ObjectStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Storage row id of one version.
pub type RecordId = i64;

/// Stable identity shared by every version of one logical object.
pub type CanonicalId = Uuid;

/// Externally issued user id.
pub type UserId = i64;

/// Catalog of supported water object kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectTypeKind {
    River,
    Lake,
    Reservoir,
    Canal,
    Glacier,
    Spring,
}

const LINEAR_SHAPES: &[ShapeTag] = &[ShapeTag::LineString, ShapeTag::MultiLineString];
const AREAL_SHAPES: &[ShapeTag] = &[ShapeTag::Polygon, ShapeTag::MultiPolygon];
const POINT_SHAPES: &[ShapeTag] = &[ShapeTag::Point];

impl ObjectTypeKind {
    pub const ALL: [ObjectTypeKind; 6] = [
        Self::River,
        Self::Lake,
        Self::Reservoir,
        Self::Canal,
        Self::Glacier,
        Self::Spring,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::River => "river",
            Self::Lake => "lake",
            Self::Reservoir => "reservoir",
            Self::Canal => "canal",
            Self::Glacier => "glacier",
            Self::Spring => "spring",
        }
    }

    /// Parses the stable wire value.
    ///
    /// # Errors
    /// - `ValidationError::UnknownObjectType` for anything outside the catalog.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value.trim() {
            "river" => Ok(Self::River),
            "lake" => Ok(Self::Lake),
            "reservoir" => Ok(Self::Reservoir),
            "canal" => Ok(Self::Canal),
            "glacier" => Ok(Self::Glacier),
            "spring" => Ok(Self::Spring),
            other => Err(ValidationError::UnknownObjectType(other.to_string())),
        }
    }

    /// Geometry shapes an object of this kind may carry. Never empty.
    pub fn permitted_shapes(self) -> &'static [ShapeTag] {
        match self {
            Self::River | Self::Canal => LINEAR_SHAPES,
            Self::Lake | Self::Reservoir | Self::Glacier => AREAL_SHAPES,
            Self::Spring => POINT_SHAPES,
        }
    }

    pub fn permits(self, tag: ShapeTag) -> bool {
        self.permitted_shapes().contains(&tag)
    }
}

impl Display for ObjectTypeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute-level validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `name_kz` is empty after trim.
    NameRequired,
    /// Object type string is not in the catalog.
    UnknownObjectType(String),
    /// Measurement is NaN, infinite or negative.
    InvalidMeasurement(&'static str),
    /// Rejection requires a non-blank reason.
    RejectionReasonRequired,
    /// Persisted record breaks a record-level invariant.
    InvariantViolated(&'static str),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NameRequired => write!(f, "name_kz is required"),
            Self::UnknownObjectType(value) => write!(f, "invalid object type: `{value}`"),
            Self::InvalidMeasurement(field) => {
                write!(f, "measurement `{field}` must be a finite non-negative number")
            }
            Self::RejectionReasonRequired => write!(f, "rejection reason is required"),
            Self::InvariantViolated(details) => write!(f, "record invariant violated: {details}"),
        }
    }
}

impl Error for ValidationError {}

/// Editable attributes of one version.
///
/// Field names match the JSON request/response schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterObjectAttributes {
    pub name_kz: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_ru: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_en: Option<String>,

    pub object_type: ObjectTypeKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_km: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_km2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_depth_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub water_volume_km3: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basin_area_km2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_discharge_m3s: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salinity_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pollution_index: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ecological_status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_kz: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_ru: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub historical_notes: Option<String>,
}

impl WaterObjectAttributes {
    /// Creates attributes with only the required fields set.
    pub fn new(name_kz: impl Into<String>, object_type: ObjectTypeKind) -> Self {
        Self {
            name_kz: name_kz.into(),
            name_ru: None,
            name_en: None,
            object_type,
            length_km: None,
            area_km2: None,
            max_depth_m: None,
            avg_depth_m: None,
            water_volume_km3: None,
            basin_area_km2: None,
            avg_discharge_m3s: None,
            salinity_level: None,
            pollution_index: None,
            ecological_status: None,
            description_kz: None,
            description_ru: None,
            description_en: None,
            historical_notes: None,
        }
    }

    /// Checks attribute invariants.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name_kz.trim().is_empty() {
            return Err(ValidationError::NameRequired);
        }

        let measurements = [
            ("length_km", self.length_km),
            ("area_km2", self.area_km2),
            ("max_depth_m", self.max_depth_m),
            ("avg_depth_m", self.avg_depth_m),
            ("water_volume_km3", self.water_volume_km3),
            ("basin_area_km2", self.basin_area_km2),
            ("avg_discharge_m3s", self.avg_discharge_m3s),
        ];
        for (field, value) in measurements {
            if let Some(value) = value {
                if !value.is_finite() || value < 0.0 {
                    return Err(ValidationError::InvalidMeasurement(field));
                }
            }
        }
        if let Some(index) = self.pollution_index {
            if !index.is_finite() {
                return Err(ValidationError::InvalidMeasurement("pollution_index"));
            }
        }

        Ok(())
    }
}

/// JSON object of attributes plus geometry, the unit compared by diffs.
pub fn content_snapshot(attributes: &WaterObjectAttributes, geometry: &GeometryShape) -> Value {
    let mut snapshot = serde_json::to_value(attributes).unwrap_or(Value::Null);
    if let Value::Object(fields) = &mut snapshot {
        fields.insert(
            "geometry".to_string(),
            serde_json::to_value(geometry).unwrap_or(Value::Null),
        );
    }
    snapshot
}

/// Full record projection of one version row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterObject {
    pub id: RecordId,
    pub canonical_id: CanonicalId,
    pub version: u32,
    #[serde(flatten)]
    pub attributes: WaterObjectAttributes,
    pub geometry: GeometryShape,
    pub status: ObjectStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_by: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<UserId>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub updated_at: i64,
    /// Unix epoch milliseconds; set when the version was published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<i64>,
}

impl WaterObject {
    /// Checks record-level invariants of a persisted row.
    pub fn check_invariants(&self) -> Result<(), ValidationError> {
        self.attributes.validate()?;
        if self.version == 0 {
            return Err(ValidationError::InvariantViolated("version must be >= 1"));
        }
        let rejected = self.status == ObjectStatus::Rejected;
        if rejected != self.rejection_reason.is_some() {
            return Err(ValidationError::InvariantViolated(
                "rejection_reason must be set exactly when status is rejected",
            ));
        }
        Ok(())
    }

    pub fn content_snapshot(&self) -> Value {
        content_snapshot(&self.attributes, &self.geometry)
    }
}

/// List projection used by map, history and author dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterObjectSummary {
    pub id: RecordId,
    pub canonical_id: CanonicalId,
    pub version: u32,
    pub name_kz: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_ru: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_en: Option<String>,
    pub object_type: ObjectTypeKind,
    pub geometry: GeometryShape,
    pub status: ObjectStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_km: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_km2: Option<f64>,
    pub created_by: UserId,
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::{ObjectTypeKind, ValidationError, WaterObjectAttributes};
    use crate::model::geometry::ShapeTag;

    #[test]
    fn every_object_type_permits_at_least_one_shape() {
        for kind in ObjectTypeKind::ALL {
            assert!(!kind.permitted_shapes().is_empty(), "{kind} has no shapes");
            assert_eq!(ObjectTypeKind::parse(kind.as_str()), Ok(kind));
        }
    }

    #[test]
    fn river_is_linear_and_spring_is_point() {
        assert!(ObjectTypeKind::River.permits(ShapeTag::LineString));
        assert!(ObjectTypeKind::River.permits(ShapeTag::MultiLineString));
        assert!(!ObjectTypeKind::River.permits(ShapeTag::Point));
        assert_eq!(ObjectTypeKind::Spring.permitted_shapes(), &[ShapeTag::Point]);
    }

    #[test]
    fn unknown_object_type_is_reported() {
        assert_eq!(
            ObjectTypeKind::parse("ocean"),
            Err(ValidationError::UnknownObjectType("ocean".to_string()))
        );
        assert_eq!(ObjectTypeKind::parse(" river "), Ok(ObjectTypeKind::River));
    }

    #[test]
    fn blank_name_is_rejected() {
        let attributes = WaterObjectAttributes::new("   ", ObjectTypeKind::Lake);
        assert_eq!(attributes.validate(), Err(ValidationError::NameRequired));
    }

    #[test]
    fn negative_measurement_is_rejected() {
        let mut attributes = WaterObjectAttributes::new("Балқаш", ObjectTypeKind::Lake);
        attributes.max_depth_m = Some(-1.0);
        assert_eq!(
            attributes.validate(),
            Err(ValidationError::InvalidMeasurement("max_depth_m"))
        );
    }
}
