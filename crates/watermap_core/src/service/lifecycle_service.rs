//! Lifecycle use-case service.
//!
//! # Responsibility
//! - Expose create/update/revise/submit/approve/reject/delete and the read
//!   paths used by map, author and reviewer screens.
//! - Parse and validate raw GeoJSON before anything reaches storage.
//! - Enforce role capabilities; ownership and state guards are applied by
//!   the repository inside each transition's transaction.
//!
//! # Invariants
//! - Absent, wrong-state and foreign rows all surface as `NotFound`.
//! - Lock timeouts surface as `Conflict`, the only retryable error.
//! - Log lines carry ids, versions and timings only, never content.

use crate::model::audit::{diff_snapshots, ChangeLogEntry, FieldChange};
use crate::model::lifecycle::ObjectStatus;
use crate::model::role::{Actor, UserRole};
use crate::model::water_object::{
    CanonicalId, RecordId, UserId, ValidationError, WaterObject, WaterObjectAttributes,
    WaterObjectSummary,
};
use crate::repo::change_log_repo::{ChangeLogRepository, SqliteChangeLogRepository};
use crate::repo::water_object_repo::{
    Promotion, PublishedQuery, RepoError, SqliteWaterObjectRepository, WaterObjectRepository,
};
use crate::service::export::FeatureCollection;
use crate::validator::geometry::{parse_and_validate, GeometryError};
use log::{error, info, warn};
use rusqlite::Connection;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Identifier a failed lookup was addressed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKey {
    Record(RecordId),
    Canonical(CanonicalId),
}

impl Display for LookupKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Record(id) => write!(f, "record_id={id}"),
            Self::Canonical(id) => write!(f, "canonical_id={id}"),
        }
    }
}

/// Capability an operation requires from the caller's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Edit,
    Review,
}

impl Capability {
    fn granted_to(self, role: UserRole) -> bool {
        match self {
            Self::Edit => role.can_edit(),
            Self::Review => role.can_review(),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Edit => "edit",
            Self::Review => "review",
        }
    }
}

/// Service error for lifecycle use-cases.
#[derive(Debug)]
pub enum LifecycleError {
    /// Attribute input is invalid; fix and resubmit.
    Validation(ValidationError),
    /// Geometry input is invalid; fix and resubmit.
    Geometry(GeometryError),
    /// Target absent, in the wrong state, or owned by someone else.
    NotFound(LookupKey),
    /// Caller's role lacks the capability.
    Forbidden {
        user_id: UserId,
        role: UserRole,
        required: Capability,
    },
    /// A revision of the canonical object is already in progress.
    RevisionOpen {
        canonical_id: CanonicalId,
        record_id: RecordId,
    },
    /// Lost a race for the write lock; the whole operation may be retried.
    Conflict(String),
    /// Persistence-layer failure.
    Storage(RepoError),
    /// Internal consistency mismatch between write and read-back.
    InconsistentState(&'static str),
}

impl LifecycleError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Geometry(err) => err.code(),
            Self::NotFound(_) => "not_found",
            Self::Forbidden { .. } => "forbidden",
            Self::RevisionOpen { .. } => "revision_open",
            Self::Conflict(_) => "conflict",
            Self::Storage(_) => "storage_error",
            Self::InconsistentState(_) => "inconsistent_state",
        }
    }

    /// Whether repeating the same call unchanged may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl Display for LifecycleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Geometry(err) => write!(f, "{err}"),
            Self::NotFound(key) => write!(f, "water object not found: {key}"),
            Self::Forbidden {
                user_id,
                role,
                required,
            } => write!(
                f,
                "user {user_id} with role `{role}` may not {}",
                required.as_str()
            ),
            Self::RevisionOpen {
                canonical_id,
                record_id,
            } => write!(
                f,
                "canonical object {canonical_id} already has an open version {record_id}"
            ),
            Self::Conflict(details) => write!(f, "concurrent transition conflict: {details}"),
            Self::Storage(err) => write!(f, "{err}"),
            Self::InconsistentState(details) => {
                write!(f, "inconsistent lifecycle state: {details}")
            }
        }
    }
}

impl Error for LifecycleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Geometry(err) => Some(err),
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for LifecycleError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<GeometryError> for LifecycleError {
    fn from(value: GeometryError) -> Self {
        Self::Geometry(value)
    }
}

impl From<RepoError> for LifecycleError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err),
            RepoError::Geometry(err) => Self::Geometry(err),
            RepoError::NotFound(id) => Self::NotFound(LookupKey::Record(id)),
            RepoError::CanonicalNotFound(id) => Self::NotFound(LookupKey::Canonical(id)),
            RepoError::RevisionOpen {
                canonical_id,
                record_id,
            } => Self::RevisionOpen {
                canonical_id,
                record_id,
            },
            other if other.is_busy() => Self::Conflict(other.to_string()),
            other => Self::Storage(other),
        }
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// A pending version next to the version it would replace.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewDiff {
    pub pending: WaterObject,
    pub published: Option<WaterObject>,
    /// Field-level changes from `published` (or nothing) to `pending`.
    pub changes: Vec<FieldChange>,
}

/// Lifecycle facade over repository implementations.
pub struct LifecycleService<R: WaterObjectRepository, L: ChangeLogRepository> {
    repo: R,
    change_log: L,
}

impl<'conn> LifecycleService<SqliteWaterObjectRepository<'conn>, SqliteChangeLogRepository<'conn>> {
    /// Builds a service over one migrated SQLite connection.
    pub fn for_connection(conn: &'conn Connection) -> LifecycleResult<Self> {
        Ok(Self::new(
            SqliteWaterObjectRepository::try_new(conn)?,
            SqliteChangeLogRepository::try_new(conn)?,
        ))
    }
}

impl<R: WaterObjectRepository, L: ChangeLogRepository> LifecycleService<R, L> {
    pub fn new(repo: R, change_log: L) -> Self {
        Self { repo, change_log }
    }

    /// Creates version 1 of a new canonical object in `Draft`.
    pub fn create(
        &self,
        attributes: &WaterObjectAttributes,
        raw_geometry: &str,
        actor: Actor,
    ) -> LifecycleResult<WaterObject> {
        let started_at = Instant::now();
        let result = (|| -> LifecycleResult<WaterObject> {
            require(actor, Capability::Edit)?;
            attributes.validate()?;
            let geometry = parse_and_validate(raw_geometry, attributes.object_type)?;
            Ok(self.repo.insert_draft(attributes, &geometry, actor.user_id)?)
        })();
        traced("create", None, started_at, result)
    }

    /// Replaces content of an owned draft or rejected version.
    ///
    /// The version number is bumped and a rejection is withdrawn.
    pub fn update(
        &self,
        id: RecordId,
        attributes: &WaterObjectAttributes,
        raw_geometry: &str,
        actor: Actor,
    ) -> LifecycleResult<WaterObject> {
        let started_at = Instant::now();
        let result = (|| -> LifecycleResult<WaterObject> {
            require(actor, Capability::Edit)?;
            attributes.validate()?;
            let geometry = parse_and_validate(raw_geometry, attributes.object_type)?;
            Ok(self
                .repo
                .update_editable(id, attributes, &geometry, actor.user_id)?)
        })();
        traced("update", Some(LookupKey::Record(id)), started_at, result)
    }

    /// Opens a new draft version of a published object.
    pub fn revise(
        &self,
        canonical_id: CanonicalId,
        attributes: &WaterObjectAttributes,
        raw_geometry: &str,
        actor: Actor,
    ) -> LifecycleResult<WaterObject> {
        let started_at = Instant::now();
        let result = (|| -> LifecycleResult<WaterObject> {
            require(actor, Capability::Edit)?;
            attributes.validate()?;
            let geometry = parse_and_validate(raw_geometry, attributes.object_type)?;
            Ok(self
                .repo
                .insert_revision(canonical_id, attributes, &geometry, actor.user_id)?)
        })();
        traced(
            "revise",
            Some(LookupKey::Canonical(canonical_id)),
            started_at,
            result,
        )
    }

    /// Sends an owned draft or rejected version to review.
    pub fn submit(&self, id: RecordId, actor: Actor) -> LifecycleResult<WaterObject> {
        let started_at = Instant::now();
        let result = (|| -> LifecycleResult<WaterObject> {
            require(actor, Capability::Edit)?;
            Ok(self.repo.submit(id, actor.user_id)?)
        })();
        traced("submit", Some(LookupKey::Record(id)), started_at, result)
    }

    /// Publishes a pending version, archiving the previous published one.
    pub fn approve(&self, id: RecordId, actor: Actor) -> LifecycleResult<Promotion> {
        let started_at = Instant::now();
        let result = (|| -> LifecycleResult<Promotion> {
            require(actor, Capability::Review)?;
            let promotion = self.repo.approve(id, actor.user_id)?;
            if promotion.published.status != ObjectStatus::Published {
                return Err(LifecycleError::InconsistentState(
                    "approved version is not published in read-back",
                ));
            }
            Ok(promotion)
        })();
        traced("approve", Some(LookupKey::Record(id)), started_at, result)
    }

    /// Returns a pending version to its author with a reason.
    pub fn reject(&self, id: RecordId, actor: Actor, reason: &str) -> LifecycleResult<WaterObject> {
        let started_at = Instant::now();
        let result = (|| -> LifecycleResult<WaterObject> {
            require(actor, Capability::Review)?;
            if reason.trim().is_empty() {
                return Err(ValidationError::RejectionReasonRequired.into());
            }
            Ok(self.repo.reject(id, actor.user_id, reason)?)
        })();
        traced("reject", Some(LookupKey::Record(id)), started_at, result)
    }

    /// Deletes an owned draft.
    pub fn delete(&self, id: RecordId, actor: Actor) -> LifecycleResult<()> {
        let started_at = Instant::now();
        let result = (|| -> LifecycleResult<WaterObject> {
            require(actor, Capability::Edit)?;
            Ok(self.repo.delete_draft(id, actor.user_id)?)
        })();
        traced("delete", Some(LookupKey::Record(id)), started_at, result).map(|_| ())
    }

    /// Published objects for the public map.
    pub fn get_published(&self, query: &PublishedQuery) -> LifecycleResult<Vec<WaterObjectSummary>> {
        Ok(self.repo.list_published(query)?)
    }

    /// Published objects as a GeoJSON feature collection.
    pub fn published_feature_collection(
        &self,
        query: &PublishedQuery,
    ) -> LifecycleResult<FeatureCollection> {
        let items = self.repo.list_published(query)?;
        Ok(FeatureCollection::from_summaries(&items))
    }

    pub fn get_by_canonical(
        &self,
        canonical_id: CanonicalId,
        status: ObjectStatus,
    ) -> LifecycleResult<Option<WaterObject>> {
        Ok(self.repo.get_by_canonical(canonical_id, status)?)
    }

    pub fn get_by_id(&self, id: RecordId) -> LifecycleResult<Option<WaterObject>> {
        Ok(self.repo.get_by_id(id)?)
    }

    /// Review queue, oldest first.
    pub fn get_pending(&self) -> LifecycleResult<Vec<WaterObject>> {
        Ok(self.repo.list_pending()?)
    }

    /// Every stored version of an object, newest first.
    pub fn get_version_history(
        &self,
        canonical_id: CanonicalId,
    ) -> LifecycleResult<Vec<WaterObjectSummary>> {
        Ok(self.repo.version_history(canonical_id)?)
    }

    /// The caller's draft, pending and rejected versions, newest first.
    pub fn get_drafts_by_user(&self, user_id: UserId) -> LifecycleResult<Vec<WaterObjectSummary>> {
        Ok(self.repo.list_open_by_author(user_id)?)
    }

    /// Audit trail of an object, oldest first.
    pub fn get_change_log(&self, canonical_id: CanonicalId) -> LifecycleResult<Vec<ChangeLogEntry>> {
        Ok(self.change_log.list_changes(canonical_id)?)
    }

    /// Compares a pending version with the currently published one.
    pub fn review_diff(&self, id: RecordId, actor: Actor) -> LifecycleResult<ReviewDiff> {
        require(actor, Capability::Review)?;

        let pending = self
            .repo
            .get_by_id(id)?
            .filter(|record| record.status == ObjectStatus::Pending)
            .ok_or(LifecycleError::NotFound(LookupKey::Record(id)))?;
        let published = self
            .repo
            .get_by_canonical(pending.canonical_id, ObjectStatus::Published)?;

        let before = published
            .as_ref()
            .map_or(Value::Null, WaterObject::content_snapshot);
        let changes = diff_snapshots(&before, &pending.content_snapshot());

        Ok(ReviewDiff {
            pending,
            published,
            changes,
        })
    }
}

fn require(actor: Actor, capability: Capability) -> LifecycleResult<()> {
    if capability.granted_to(actor.role) {
        return Ok(());
    }
    Err(LifecycleError::Forbidden {
        user_id: actor.user_id,
        role: actor.role,
        required: capability,
    })
}

/// Values whose identity is worth logging after a transition.
trait Traced {
    fn log_fields(&self) -> String;
}

impl Traced for WaterObject {
    fn log_fields(&self) -> String {
        format!(
            "record_id={} canonical_id={} version={} to={}",
            self.id, self.canonical_id, self.version, self.status
        )
    }
}

impl Traced for Promotion {
    fn log_fields(&self) -> String {
        let archived = self
            .archived
            .map_or_else(|| "none".to_string(), |id| id.to_string());
        format!("{} archived_id={archived}", self.published.log_fields())
    }
}

fn traced<T: Traced>(
    operation: &'static str,
    target: Option<LookupKey>,
    started_at: Instant,
    result: LifecycleResult<T>,
) -> LifecycleResult<T> {
    let duration_ms = started_at.elapsed().as_millis();
    match &result {
        Ok(value) => info!(
            "event=lifecycle_{operation} module=service status=ok {} duration_ms={duration_ms}",
            value.log_fields()
        ),
        Err(err) => {
            let target = target.map_or_else(|| "target=new".to_string(), |key| key.to_string());
            match err {
                LifecycleError::Storage(_) | LifecycleError::InconsistentState(_) => error!(
                    "event=lifecycle_{operation} module=service status=error {target} duration_ms={duration_ms} error_code={} error={err}",
                    err.code()
                ),
                _ => warn!(
                    "event=lifecycle_{operation} module=service status=error {target} duration_ms={duration_ms} error_code={}",
                    err.code()
                ),
            }
        }
    }
    result
}
