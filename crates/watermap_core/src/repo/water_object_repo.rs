//! Water object repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist one row per version of every canonical object.
//! - Run each lifecycle transition as a single immediate transaction that
//!   also appends its audit entries.
//!
//! # Invariants
//! - Attributes and geometry are validated before every insert or update.
//! - Transition guards (status, authorship) are re-checked in the `WHERE`
//!   clause of the mutating statement, not only on the loaded row.
//! - Rows that are absent, in the wrong state or owned by someone else are
//!   all reported as `NotFound`.

use crate::db::DbError;
use crate::model::audit::{diff_snapshots, ChangeAction, NewChangeLogEntry};
use crate::model::geometry::GeometryShape;
use crate::model::lifecycle::{ObjectStatus, Transition};
use crate::model::water_object::{
    content_snapshot, CanonicalId, ObjectTypeKind, RecordId, UserId, ValidationError, WaterObject,
    WaterObjectAttributes, WaterObjectSummary,
};
use crate::repo::change_log_repo::append_change;
use crate::repo::schema::ensure_table_ready;
use crate::validator::geometry::{validate_shape, GeometryError};
use rusqlite::types::Value;
use rusqlite::{
    named_params, params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row,
    Transaction, TransactionBehavior,
};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const RECORD_SELECT_SQL: &str = "SELECT
    id,
    canonical_id,
    version,
    name_kz,
    name_ru,
    name_en,
    object_type,
    length_km,
    area_km2,
    max_depth_m,
    avg_depth_m,
    water_volume_km3,
    basin_area_km2,
    avg_discharge_m3s,
    salinity_level,
    pollution_index,
    ecological_status,
    description_kz,
    description_ru,
    description_en,
    historical_notes,
    geometry,
    status,
    rejection_reason,
    created_by,
    updated_by,
    reviewed_by,
    created_at,
    updated_at,
    published_at
FROM water_objects";

const SUMMARY_SELECT_SQL: &str = "SELECT
    id,
    canonical_id,
    version,
    name_kz,
    name_ru,
    name_en,
    object_type,
    geometry,
    status,
    length_km,
    area_km2,
    created_by,
    updated_at,
    published_at
FROM water_objects";

const REQUIRED_COLUMNS: &[&str] = &[
    "id",
    "canonical_id",
    "version",
    "name_kz",
    "object_type",
    "geometry",
    "status",
    "rejection_reason",
    "created_by",
    "updated_by",
    "reviewed_by",
    "created_at",
    "updated_at",
    "published_at",
];

const PUBLISHED_DEFAULT_LIMIT: u32 = 500;
const PUBLISHED_LIMIT_MAX: u32 = 500;

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from water object and change log persistence.
#[derive(Debug)]
pub enum RepoError {
    /// Attributes failed validation; nothing was written.
    Validation(ValidationError),
    /// Geometry failed validation; nothing was written.
    Geometry(GeometryError),
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Row is absent, in the wrong state, or not owned by the caller.
    NotFound(RecordId),
    /// No published version exists for the canonical object.
    CanonicalNotFound(CanonicalId),
    /// Canonical object already has a draft, pending or rejected version.
    RevisionOpen {
        canonical_id: CanonicalId,
        record_id: RecordId,
    },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl RepoError {
    /// Whether the store refused the write lock within the busy timeout.
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Db(DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _))) => {
                matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
            }
            _ => false,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Geometry(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "water object not found: {id}"),
            Self::CanonicalNotFound(id) => {
                write!(f, "no published version for canonical object {id}")
            }
            Self::RevisionOpen {
                canonical_id,
                record_id,
            } => write!(
                f,
                "canonical object {canonical_id} already has an open version {record_id}"
            ),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "water object repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "water object repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "water object repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted water object data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Geometry(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<GeometryError> for RepoError {
    fn from(value: GeometryError) -> Self {
        Self::Geometry(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Filter for the public map listing.
#[derive(Debug, Clone, Default)]
pub struct PublishedQuery {
    pub object_type: Option<ObjectTypeKind>,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Outcome of an approval.
#[derive(Debug, Clone, PartialEq)]
pub struct Promotion {
    /// The newly published version.
    pub published: WaterObject,
    /// Row id of the version demoted to archived, if one was published.
    pub archived: Option<RecordId>,
}

/// Storage contract for versioned water objects.
///
/// Ownership and state guards live here so that every implementation
/// applies them inside its own transaction.
pub trait WaterObjectRepository {
    /// Inserts version 1 of a new canonical object as a draft.
    fn insert_draft(
        &self,
        attributes: &WaterObjectAttributes,
        geometry: &GeometryShape,
        author: UserId,
    ) -> RepoResult<WaterObject>;

    /// Opens a new draft version of a published canonical object.
    fn insert_revision(
        &self,
        canonical_id: CanonicalId,
        attributes: &WaterObjectAttributes,
        geometry: &GeometryShape,
        author: UserId,
    ) -> RepoResult<WaterObject>;

    /// Replaces content of an editable row owned by `editor` and bumps its version.
    fn update_editable(
        &self,
        id: RecordId,
        attributes: &WaterObjectAttributes,
        geometry: &GeometryShape,
        editor: UserId,
    ) -> RepoResult<WaterObject>;

    fn submit(&self, id: RecordId, author: UserId) -> RepoResult<WaterObject>;

    /// Archives the current published version and publishes `id`, atomically.
    fn approve(&self, id: RecordId, reviewer: UserId) -> RepoResult<Promotion>;

    fn reject(&self, id: RecordId, reviewer: UserId, reason: &str) -> RepoResult<WaterObject>;

    /// Removes a draft owned by `author`; returns the removed row.
    fn delete_draft(&self, id: RecordId, author: UserId) -> RepoResult<WaterObject>;

    fn get_by_id(&self, id: RecordId) -> RepoResult<Option<WaterObject>>;

    /// Newest version of `canonical_id` currently in `status`.
    fn get_by_canonical(
        &self,
        canonical_id: CanonicalId,
        status: ObjectStatus,
    ) -> RepoResult<Option<WaterObject>>;

    fn list_published(&self, query: &PublishedQuery) -> RepoResult<Vec<WaterObjectSummary>>;

    /// Pending rows, oldest update first.
    fn list_pending(&self) -> RepoResult<Vec<WaterObject>>;

    /// Draft, pending and rejected rows authored by `author`, newest first.
    fn list_open_by_author(&self, author: UserId) -> RepoResult<Vec<WaterObjectSummary>>;

    /// Every stored version of `canonical_id`, newest first.
    fn version_history(&self, canonical_id: CanonicalId) -> RepoResult<Vec<WaterObjectSummary>>;
}

/// SQLite-backed water object repository.
pub struct SqliteWaterObjectRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteWaterObjectRepository<'conn> {
    /// Wraps a migrated connection.
    ///
    /// # Errors
    /// - `UninitializedConnection` when migrations have not been applied.
    /// - `MissingRequiredTable` / `MissingRequiredColumn` on schema drift.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_table_ready(conn, "water_objects", REQUIRED_COLUMNS)?;
        Ok(Self { conn })
    }

    fn begin(&self) -> RepoResult<Transaction<'conn>> {
        Ok(Transaction::new_unchecked(
            self.conn,
            TransactionBehavior::Immediate,
        )?)
    }
}

impl WaterObjectRepository for SqliteWaterObjectRepository<'_> {
    fn insert_draft(
        &self,
        attributes: &WaterObjectAttributes,
        geometry: &GeometryShape,
        author: UserId,
    ) -> RepoResult<WaterObject> {
        let geometry_json = validated_geometry_json(attributes, geometry)?;
        let canonical_id = Uuid::new_v4();

        let tx = self.begin()?;
        let id = insert_version(&tx, canonical_id, 1, attributes, &geometry_json, author)?;
        append_change(
            &tx,
            &NewChangeLogEntry::new(id, canonical_id, 1, ChangeAction::Create, author),
        )?;
        let record = load_required(&tx, id)?;
        tx.commit()?;

        Ok(record)
    }

    fn insert_revision(
        &self,
        canonical_id: CanonicalId,
        attributes: &WaterObjectAttributes,
        geometry: &GeometryShape,
        author: UserId,
    ) -> RepoResult<WaterObject> {
        let geometry_json = validated_geometry_json(attributes, geometry)?;

        let tx = self.begin()?;
        let published = load_by_canonical(&tx, canonical_id, ObjectStatus::Published)?
            .ok_or(RepoError::CanonicalNotFound(canonical_id))?;
        if let Some(record_id) = find_open_version(&tx, canonical_id)? {
            return Err(RepoError::RevisionOpen {
                canonical_id,
                record_id,
            });
        }

        let version = next_version(&tx, canonical_id)?;
        let id = insert_version(
            &tx,
            canonical_id,
            version,
            attributes,
            &geometry_json,
            author,
        )?;
        let changes = diff_snapshots(
            &published.content_snapshot(),
            &content_snapshot(attributes, geometry),
        );
        append_change(
            &tx,
            &NewChangeLogEntry::new(id, canonical_id, version, ChangeAction::Create, author)
                .with_changes(changes)
                .with_notes(format!("revision of version {}", published.version)),
        )?;
        let record = load_required(&tx, id)?;
        tx.commit()?;

        Ok(record)
    }

    fn update_editable(
        &self,
        id: RecordId,
        attributes: &WaterObjectAttributes,
        geometry: &GeometryShape,
        editor: UserId,
    ) -> RepoResult<WaterObject> {
        let geometry_json = validated_geometry_json(attributes, geometry)?;

        let tx = self.begin()?;
        let current = load_for_transition(&tx, id, Transition::Update, Some(editor))?;
        let version = next_version(&tx, current.canonical_id)?;

        let changed = tx.execute(
            &format!(
                "UPDATE water_objects
                 SET
                    version = :version,
                    name_kz = :name_kz,
                    name_ru = :name_ru,
                    name_en = :name_en,
                    object_type = :object_type,
                    length_km = :length_km,
                    area_km2 = :area_km2,
                    max_depth_m = :max_depth_m,
                    avg_depth_m = :avg_depth_m,
                    water_volume_km3 = :water_volume_km3,
                    basin_area_km2 = :basin_area_km2,
                    avg_discharge_m3s = :avg_discharge_m3s,
                    salinity_level = :salinity_level,
                    pollution_index = :pollution_index,
                    ecological_status = :ecological_status,
                    description_kz = :description_kz,
                    description_ru = :description_ru,
                    description_en = :description_en,
                    historical_notes = :historical_notes,
                    geometry = :geometry,
                    status = {to_status},
                    rejection_reason = NULL,
                    updated_by = :editor,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = :id
                   AND created_by = :editor
                   AND status IN {};",
                Transition::Update.sql_status_list(),
                to_status = target_literal(Transition::Update)?,
            ),
            named_params! {
                ":version": version,
                ":name_kz": attributes.name_kz.as_str(),
                ":name_ru": attributes.name_ru.as_deref(),
                ":name_en": attributes.name_en.as_deref(),
                ":object_type": attributes.object_type.as_str(),
                ":length_km": attributes.length_km,
                ":area_km2": attributes.area_km2,
                ":max_depth_m": attributes.max_depth_m,
                ":avg_depth_m": attributes.avg_depth_m,
                ":water_volume_km3": attributes.water_volume_km3,
                ":basin_area_km2": attributes.basin_area_km2,
                ":avg_discharge_m3s": attributes.avg_discharge_m3s,
                ":salinity_level": attributes.salinity_level.as_deref(),
                ":pollution_index": attributes.pollution_index,
                ":ecological_status": attributes.ecological_status.as_deref(),
                ":description_kz": attributes.description_kz.as_deref(),
                ":description_ru": attributes.description_ru.as_deref(),
                ":description_en": attributes.description_en.as_deref(),
                ":historical_notes": attributes.historical_notes.as_deref(),
                ":geometry": geometry_json.as_str(),
                ":editor": editor,
                ":id": id,
            },
        )?;
        if changed != 1 {
            return Err(RepoError::NotFound(id));
        }

        let changes = diff_snapshots(
            &current.content_snapshot(),
            &content_snapshot(attributes, geometry),
        );
        append_change(
            &tx,
            &NewChangeLogEntry::new(
                id,
                current.canonical_id,
                version,
                Transition::Update.audit_action(),
                editor,
            )
            .with_changes(changes),
        )?;
        let record = load_required(&tx, id)?;
        tx.commit()?;

        Ok(record)
    }

    fn submit(&self, id: RecordId, author: UserId) -> RepoResult<WaterObject> {
        let tx = self.begin()?;
        load_for_transition(&tx, id, Transition::Submit, Some(author))?;

        let changed = tx.execute(
            &format!(
                "UPDATE water_objects
                 SET
                    status = {to_status},
                    rejection_reason = NULL,
                    updated_by = ?2,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1
                   AND created_by = ?2
                   AND status IN {};",
                Transition::Submit.sql_status_list(),
                to_status = target_literal(Transition::Submit)?,
            ),
            params![id, author],
        )?;
        if changed != 1 {
            return Err(RepoError::NotFound(id));
        }

        let record = load_required(&tx, id)?;
        append_change(
            &tx,
            &NewChangeLogEntry::new(
                id,
                record.canonical_id,
                record.version,
                Transition::Submit.audit_action(),
                author,
            ),
        )?;
        tx.commit()?;

        Ok(record)
    }

    fn approve(&self, id: RecordId, reviewer: UserId) -> RepoResult<Promotion> {
        let tx = self.begin()?;
        let target = load_for_transition(&tx, id, Transition::Approve, None)?;

        let previous = load_by_canonical(&tx, target.canonical_id, ObjectStatus::Published)?;
        if let Some(previous) = &previous {
            let archived = tx.execute(
                &format!(
                    "UPDATE water_objects
                     SET
                        status = {to_status},
                        updated_at = (strftime('%s', 'now') * 1000)
                     WHERE id = ?1
                       AND status IN {};",
                    Transition::Archive.sql_status_list(),
                    to_status = target_literal(Transition::Archive)?,
                ),
                [previous.id],
            )?;
            if archived != 1 {
                return Err(RepoError::NotFound(previous.id));
            }
            append_change(
                &tx,
                &NewChangeLogEntry::new(
                    previous.id,
                    previous.canonical_id,
                    previous.version,
                    Transition::Archive.audit_action(),
                    reviewer,
                )
                .with_notes(format!("superseded by version {}", target.version)),
            )?;
        }

        let changed = tx.execute(
            &format!(
                "UPDATE water_objects
                 SET
                    status = {to_status},
                    reviewed_by = ?2,
                    published_at = (strftime('%s', 'now') * 1000),
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1
                   AND status IN {};",
                Transition::Approve.sql_status_list(),
                to_status = target_literal(Transition::Approve)?,
            ),
            params![id, reviewer],
        )?;
        if changed != 1 {
            return Err(RepoError::NotFound(id));
        }
        append_change(
            &tx,
            &NewChangeLogEntry::new(
                id,
                target.canonical_id,
                target.version,
                Transition::Approve.audit_action(),
                reviewer,
            ),
        )?;

        let published = load_required(&tx, id)?;
        tx.commit()?;

        Ok(Promotion {
            published,
            archived: previous.map(|record| record.id),
        })
    }

    fn reject(&self, id: RecordId, reviewer: UserId, reason: &str) -> RepoResult<WaterObject> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ValidationError::RejectionReasonRequired.into());
        }

        let tx = self.begin()?;
        let target = load_for_transition(&tx, id, Transition::Reject, None)?;

        let changed = tx.execute(
            &format!(
                "UPDATE water_objects
                 SET
                    status = {to_status},
                    rejection_reason = ?3,
                    reviewed_by = ?2,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1
                   AND status IN {};",
                Transition::Reject.sql_status_list(),
                to_status = target_literal(Transition::Reject)?,
            ),
            params![id, reviewer, reason],
        )?;
        if changed != 1 {
            return Err(RepoError::NotFound(id));
        }
        append_change(
            &tx,
            &NewChangeLogEntry::new(
                id,
                target.canonical_id,
                target.version,
                Transition::Reject.audit_action(),
                reviewer,
            )
            .with_notes(reason),
        )?;

        let record = load_required(&tx, id)?;
        tx.commit()?;

        Ok(record)
    }

    fn delete_draft(&self, id: RecordId, author: UserId) -> RepoResult<WaterObject> {
        let tx = self.begin()?;
        let target = load_for_transition(&tx, id, Transition::Delete, Some(author))?;

        append_change(
            &tx,
            &NewChangeLogEntry::new(
                id,
                target.canonical_id,
                target.version,
                Transition::Delete.audit_action(),
                author,
            ),
        )?;
        let changed = tx.execute(
            &format!(
                "DELETE FROM water_objects
                 WHERE id = ?1
                   AND created_by = ?2
                   AND status IN {};",
                Transition::Delete.sql_status_list()
            ),
            params![id, author],
        )?;
        if changed != 1 {
            return Err(RepoError::NotFound(id));
        }
        tx.commit()?;

        Ok(target)
    }

    fn get_by_id(&self, id: RecordId) -> RepoResult<Option<WaterObject>> {
        load_record(self.conn, id)
    }

    fn get_by_canonical(
        &self,
        canonical_id: CanonicalId,
        status: ObjectStatus,
    ) -> RepoResult<Option<WaterObject>> {
        load_by_canonical(self.conn, canonical_id, status)
    }

    fn list_published(&self, query: &PublishedQuery) -> RepoResult<Vec<WaterObjectSummary>> {
        let mut sql = format!("{SUMMARY_SELECT_SQL} WHERE status = ?");
        let mut bind_values = vec![Value::Text(ObjectStatus::Published.as_str().to_string())];

        if let Some(kind) = query.object_type {
            sql.push_str(" AND object_type = ?");
            bind_values.push(Value::Text(kind.as_str().to_string()));
        }

        sql.push_str(" ORDER BY name_kz ASC, id ASC LIMIT ? OFFSET ?");
        bind_values.push(Value::Integer(i64::from(normalize_published_limit(
            query.limit,
        ))));
        bind_values.push(Value::Integer(i64::from(query.offset)));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut summaries = Vec::new();
        while let Some(row) = rows.next()? {
            summaries.push(parse_summary_row(row)?);
        }
        Ok(summaries)
    }

    fn list_pending(&self) -> RepoResult<Vec<WaterObject>> {
        let mut stmt = self.conn.prepare(&format!(
            "{RECORD_SELECT_SQL}
             WHERE status = ?1
             ORDER BY updated_at ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([ObjectStatus::Pending.as_str()])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_record_row(row)?);
        }
        Ok(records)
    }

    fn list_open_by_author(&self, author: UserId) -> RepoResult<Vec<WaterObjectSummary>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SUMMARY_SELECT_SQL}
             WHERE created_by = ?1
               AND status IN {}
             ORDER BY updated_at DESC, id DESC;",
            ObjectStatus::open_sql_list()
        ))?;
        let mut rows = stmt.query([author])?;
        let mut summaries = Vec::new();
        while let Some(row) = rows.next()? {
            summaries.push(parse_summary_row(row)?);
        }
        Ok(summaries)
    }

    fn version_history(&self, canonical_id: CanonicalId) -> RepoResult<Vec<WaterObjectSummary>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SUMMARY_SELECT_SQL}
             WHERE canonical_id = ?1
             ORDER BY version DESC;"
        ))?;
        let mut rows = stmt.query([canonical_id.to_string()])?;
        let mut summaries = Vec::new();
        while let Some(row) = rows.next()? {
            summaries.push(parse_summary_row(row)?);
        }
        Ok(summaries)
    }
}

/// Normalizes the published listing limit: unset or zero means the maximum.
pub fn normalize_published_limit(limit: Option<u32>) -> u32 {
    match limit {
        Some(0) | None => PUBLISHED_DEFAULT_LIMIT,
        Some(value) => value.min(PUBLISHED_LIMIT_MAX),
    }
}

fn validated_geometry_json(
    attributes: &WaterObjectAttributes,
    geometry: &GeometryShape,
) -> RepoResult<String> {
    attributes.validate()?;
    validate_shape(geometry, attributes.object_type)?;
    geometry
        .to_geojson()
        .map_err(|err| RepoError::InvalidData(format!("cannot encode geometry: {err}")))
}

fn insert_version(
    conn: &Connection,
    canonical_id: CanonicalId,
    version: u32,
    attributes: &WaterObjectAttributes,
    geometry_json: &str,
    author: UserId,
) -> RepoResult<RecordId> {
    conn.execute(
        "INSERT INTO water_objects (
            canonical_id,
            version,
            name_kz,
            name_ru,
            name_en,
            object_type,
            length_km,
            area_km2,
            max_depth_m,
            avg_depth_m,
            water_volume_km3,
            basin_area_km2,
            avg_discharge_m3s,
            salinity_level,
            pollution_index,
            ecological_status,
            description_kz,
            description_ru,
            description_en,
            historical_notes,
            geometry,
            status,
            created_by,
            created_at,
            updated_at
        ) VALUES (
            :canonical_id,
            :version,
            :name_kz,
            :name_ru,
            :name_en,
            :object_type,
            :length_km,
            :area_km2,
            :max_depth_m,
            :avg_depth_m,
            :water_volume_km3,
            :basin_area_km2,
            :avg_discharge_m3s,
            :salinity_level,
            :pollution_index,
            :ecological_status,
            :description_kz,
            :description_ru,
            :description_en,
            :historical_notes,
            :geometry,
            :status,
            :author,
            (strftime('%s', 'now') * 1000),
            (strftime('%s', 'now') * 1000)
        );",
        named_params! {
            ":canonical_id": canonical_id.to_string(),
            ":version": version,
            ":name_kz": attributes.name_kz.as_str(),
            ":name_ru": attributes.name_ru.as_deref(),
            ":name_en": attributes.name_en.as_deref(),
            ":object_type": attributes.object_type.as_str(),
            ":length_km": attributes.length_km,
            ":area_km2": attributes.area_km2,
            ":max_depth_m": attributes.max_depth_m,
            ":avg_depth_m": attributes.avg_depth_m,
            ":water_volume_km3": attributes.water_volume_km3,
            ":basin_area_km2": attributes.basin_area_km2,
            ":avg_discharge_m3s": attributes.avg_discharge_m3s,
            ":salinity_level": attributes.salinity_level.as_deref(),
            ":pollution_index": attributes.pollution_index,
            ":ecological_status": attributes.ecological_status.as_deref(),
            ":description_kz": attributes.description_kz.as_deref(),
            ":description_ru": attributes.description_ru.as_deref(),
            ":description_en": attributes.description_en.as_deref(),
            ":historical_notes": attributes.historical_notes.as_deref(),
            ":geometry": geometry_json,
            ":status": ObjectStatus::Draft.as_str(),
            ":author": author,
        },
    )?;
    Ok(conn.last_insert_rowid())
}

/// Quoted status a transition leaves its row in.
fn target_literal(transition: Transition) -> RepoResult<String> {
    transition
        .target()
        .map(|status| format!("'{}'", status.as_str()))
        .ok_or_else(|| RepoError::InvalidData(format!("{transition:?} leaves no row behind")))
}

/// Loads the row a transition targets and applies its guards.
fn load_for_transition(
    conn: &Connection,
    id: RecordId,
    transition: Transition,
    actor: Option<UserId>,
) -> RepoResult<WaterObject> {
    let record = load_record(conn, id)?.ok_or(RepoError::NotFound(id))?;
    if !transition.permits(record.status) {
        return Err(RepoError::NotFound(id));
    }
    if transition.requires_author() && actor != Some(record.created_by) {
        return Err(RepoError::NotFound(id));
    }
    Ok(record)
}

fn next_version(conn: &Connection, canonical_id: CanonicalId) -> RepoResult<u32> {
    let current: Option<u32> = conn.query_row(
        "SELECT MAX(version) FROM water_objects WHERE canonical_id = ?1;",
        [canonical_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(current.unwrap_or(0) + 1)
}

fn find_open_version(conn: &Connection, canonical_id: CanonicalId) -> RepoResult<Option<RecordId>> {
    let id = conn
        .query_row(
            &format!(
                "SELECT id
                 FROM water_objects
                 WHERE canonical_id = ?1
                   AND status IN {}
                 ORDER BY version DESC
                 LIMIT 1;",
                ObjectStatus::open_sql_list()
            ),
            [canonical_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

fn load_record(conn: &Connection, id: RecordId) -> RepoResult<Option<WaterObject>> {
    let mut stmt = conn.prepare(&format!("{RECORD_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_record_row(row)?));
    }
    Ok(None)
}

fn load_required(conn: &Connection, id: RecordId) -> RepoResult<WaterObject> {
    load_record(conn, id)?.ok_or(RepoError::NotFound(id))
}

fn load_by_canonical(
    conn: &Connection,
    canonical_id: CanonicalId,
    status: ObjectStatus,
) -> RepoResult<Option<WaterObject>> {
    let mut stmt = conn.prepare(&format!(
        "{RECORD_SELECT_SQL}
         WHERE canonical_id = ?1
           AND status = ?2
         ORDER BY version DESC
         LIMIT 1;"
    ))?;
    let mut rows = stmt.query(params![canonical_id.to_string(), status.as_str()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_record_row(row)?));
    }
    Ok(None)
}

fn parse_record_row(row: &Row<'_>) -> RepoResult<WaterObject> {
    let attributes = WaterObjectAttributes {
        name_kz: row.get("name_kz")?,
        name_ru: row.get("name_ru")?,
        name_en: row.get("name_en")?,
        object_type: parse_object_type(row)?,
        length_km: row.get("length_km")?,
        area_km2: row.get("area_km2")?,
        max_depth_m: row.get("max_depth_m")?,
        avg_depth_m: row.get("avg_depth_m")?,
        water_volume_km3: row.get("water_volume_km3")?,
        basin_area_km2: row.get("basin_area_km2")?,
        avg_discharge_m3s: row.get("avg_discharge_m3s")?,
        salinity_level: row.get("salinity_level")?,
        pollution_index: row.get("pollution_index")?,
        ecological_status: row.get("ecological_status")?,
        description_kz: row.get("description_kz")?,
        description_ru: row.get("description_ru")?,
        description_en: row.get("description_en")?,
        historical_notes: row.get("historical_notes")?,
    };

    let record = WaterObject {
        id: row.get("id")?,
        canonical_id: parse_canonical_id(row)?,
        version: row.get("version")?,
        attributes,
        geometry: parse_geometry_column(row)?,
        status: parse_status(row)?,
        rejection_reason: row.get("rejection_reason")?,
        created_by: row.get("created_by")?,
        updated_by: row.get("updated_by")?,
        reviewed_by: row.get("reviewed_by")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        published_at: row.get("published_at")?,
    };
    record.check_invariants()?;
    Ok(record)
}

fn parse_summary_row(row: &Row<'_>) -> RepoResult<WaterObjectSummary> {
    Ok(WaterObjectSummary {
        id: row.get("id")?,
        canonical_id: parse_canonical_id(row)?,
        version: row.get("version")?,
        name_kz: row.get("name_kz")?,
        name_ru: row.get("name_ru")?,
        name_en: row.get("name_en")?,
        object_type: parse_object_type(row)?,
        geometry: parse_geometry_column(row)?,
        status: parse_status(row)?,
        length_km: row.get("length_km")?,
        area_km2: row.get("area_km2")?,
        created_by: row.get("created_by")?,
        updated_at: row.get("updated_at")?,
        published_at: row.get("published_at")?,
    })
}

fn parse_canonical_id(row: &Row<'_>) -> RepoResult<CanonicalId> {
    let value: String = row.get("canonical_id")?;
    Uuid::parse_str(&value).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid uuid `{value}` in water_objects.canonical_id"
        ))
    })
}

fn parse_object_type(row: &Row<'_>) -> RepoResult<ObjectTypeKind> {
    let value: String = row.get("object_type")?;
    ObjectTypeKind::parse(&value).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid object type `{value}` in water_objects.object_type"
        ))
    })
}

fn parse_status(row: &Row<'_>) -> RepoResult<ObjectStatus> {
    let value: String = row.get("status")?;
    ObjectStatus::parse(&value).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid status `{value}` in water_objects.status"))
    })
}

fn parse_geometry_column(row: &Row<'_>) -> RepoResult<GeometryShape> {
    let value: String = row.get("geometry")?;
    serde_json::from_str(&value).map_err(|err| {
        RepoError::InvalidData(format!("invalid geojson in water_objects.geometry: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::{normalize_published_limit, target_literal, RepoError};
    use crate::db::DbError;
    use crate::model::lifecycle::Transition;
    use rusqlite::ffi;

    #[test]
    fn published_limit_defaults_and_clamps() {
        assert_eq!(normalize_published_limit(None), 500);
        assert_eq!(normalize_published_limit(Some(0)), 500);
        assert_eq!(normalize_published_limit(Some(20)), 20);
        assert_eq!(normalize_published_limit(Some(10_000)), 500);
    }

    #[test]
    fn busy_and_locked_failures_are_detected() {
        let busy = RepoError::Db(DbError::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_BUSY),
            None,
        )));
        assert!(busy.is_busy());

        let locked = RepoError::Db(DbError::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_LOCKED),
            None,
        )));
        assert!(locked.is_busy());

        let constraint = RepoError::Db(DbError::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_CONSTRAINT),
            None,
        )));
        assert!(!constraint.is_busy());
        assert!(!RepoError::NotFound(7).is_busy());
    }

    #[test]
    fn target_literal_quotes_the_resulting_status() {
        assert_eq!(target_literal(Transition::Archive).unwrap(), "'archived'");
        assert_eq!(target_literal(Transition::Update).unwrap(), "'draft'");
        assert!(matches!(
            target_literal(Transition::Delete),
            Err(RepoError::InvalidData(_))
        ));
    }
}
