//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define storage contracts for versioned water objects and their audit log.
//! - Keep SQLite query details out of the lifecycle service.
//!
//! # Invariants
//! - Write paths validate attributes and geometry before any SQL mutation.
//! - Every lifecycle transition and its audit entries commit in one
//!   `BEGIN IMMEDIATE` transaction, or not at all.
//! - Read paths reject invalid persisted state instead of masking it.

pub mod change_log_repo;
mod schema;
pub mod water_object_repo;

pub use change_log_repo::{ChangeLogRepository, SqliteChangeLogRepository};
pub use water_object_repo::{
    normalize_published_limit, Promotion, PublishedQuery, RepoError, RepoResult,
    SqliteWaterObjectRepository, WaterObjectRepository,
};
