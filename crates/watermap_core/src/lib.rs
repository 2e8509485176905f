//! Core domain logic for the water object registry.
//!
//! Geometry validation, the versioned editorial lifecycle and its audit
//! trail live here; transport, authentication and account management do not.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod validator;

pub use config::{ConfigError, CoreConfig};
pub use db::{open_db, open_db_in_memory, open_db_with_timeout, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::audit::{ChangeAction, ChangeLogEntry, FieldChange};
pub use model::geometry::{BBox, GeometryShape, Position, ShapeTag};
pub use model::lifecycle::{ObjectStatus, Transition};
pub use model::role::{Actor, UserRole};
pub use model::water_object::{
    CanonicalId, ObjectTypeKind, RecordId, UserId, ValidationError, WaterObject,
    WaterObjectAttributes, WaterObjectSummary,
};
pub use repo::{
    ChangeLogRepository, Promotion, PublishedQuery, RepoError, RepoResult,
    SqliteChangeLogRepository, SqliteWaterObjectRepository, WaterObjectRepository,
};
pub use service::export::FeatureCollection;
pub use service::lifecycle_service::{
    Capability, LifecycleError, LifecycleResult, LifecycleService, LookupKey, ReviewDiff,
};
pub use validator::geometry::{validate as validate_geometry, GeometryError, REGION_BOUNDS};

/// Minimal health-check API for probes.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
