//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate validator and repository calls into lifecycle operations.
//! - Translate storage failures into the caller-facing error taxonomy.

pub mod export;
pub mod lifecycle_service;
