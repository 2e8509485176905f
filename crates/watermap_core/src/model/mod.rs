//! Domain model for versioned water objects.
//!
//! # Responsibility
//! - Define canonical data structures used by validation, storage and
//!   lifecycle orchestration.
//! - Keep status transition rules as pure data, free of storage concerns.
//!
//! # Invariants
//! - Every logical water object is identified by a stable `CanonicalId`.
//! - Every version of an object is one storage row addressed by `RecordId`.
//! - At most one version per `CanonicalId` is `Published` at any time.

pub mod audit;
pub mod geometry;
pub mod lifecycle;
pub mod role;
pub mod water_object;
