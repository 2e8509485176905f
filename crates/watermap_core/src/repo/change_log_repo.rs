//! Change log persistence.
//!
//! Entries are appended by the water object repository inside the
//! transaction of the transition they describe. Storage triggers refuse
//! updates and deletes on `change_log`.

use crate::model::audit::{ChangeAction, ChangeLogEntry, FieldChange, NewChangeLogEntry};
use crate::model::water_object::CanonicalId;
use crate::repo::schema::ensure_table_ready;
use crate::repo::water_object_repo::{RepoError, RepoResult};
use rusqlite::{named_params, Connection, Row};
use uuid::Uuid;

const REQUIRED_COLUMNS: &[&str] = &[
    "id",
    "record_id",
    "canonical_id",
    "version",
    "action",
    "changed_fields",
    "notes",
    "performed_by",
    "performed_at",
];

/// Read contract for the audit trail.
pub trait ChangeLogRepository {
    /// Entries for every version of `canonical_id`, oldest first.
    fn list_changes(&self, canonical_id: CanonicalId) -> RepoResult<Vec<ChangeLogEntry>>;
}

/// SQLite-backed change log reader.
pub struct SqliteChangeLogRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteChangeLogRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_table_ready(conn, "change_log", REQUIRED_COLUMNS)?;
        Ok(Self { conn })
    }
}

impl ChangeLogRepository for SqliteChangeLogRepository<'_> {
    fn list_changes(&self, canonical_id: CanonicalId) -> RepoResult<Vec<ChangeLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                id,
                record_id,
                canonical_id,
                version,
                action,
                changed_fields,
                notes,
                performed_by,
                performed_at
             FROM change_log
             WHERE canonical_id = ?1
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([canonical_id.to_string()])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_change_row(row)?);
        }
        Ok(entries)
    }
}

/// Appends one audit entry on the caller's connection or transaction.
pub(crate) fn append_change(conn: &Connection, entry: &NewChangeLogEntry) -> RepoResult<i64> {
    let changed_fields = match &entry.changed_fields {
        Some(changes) => Some(serde_json::to_string(changes).map_err(|err| {
            RepoError::InvalidData(format!("cannot encode change_log.changed_fields: {err}"))
        })?),
        None => None,
    };

    conn.execute(
        "INSERT INTO change_log (
            record_id,
            canonical_id,
            version,
            action,
            changed_fields,
            notes,
            performed_by,
            performed_at
        ) VALUES (
            :record_id,
            :canonical_id,
            :version,
            :action,
            :changed_fields,
            :notes,
            :performed_by,
            (strftime('%s', 'now') * 1000)
        );",
        named_params! {
            ":record_id": entry.record_id,
            ":canonical_id": entry.canonical_id.to_string(),
            ":version": entry.version,
            ":action": entry.action.as_str(),
            ":changed_fields": changed_fields,
            ":notes": entry.notes.as_deref(),
            ":performed_by": entry.performed_by,
        },
    )?;
    Ok(conn.last_insert_rowid())
}

fn parse_change_row(row: &Row<'_>) -> RepoResult<ChangeLogEntry> {
    let canonical_text: String = row.get("canonical_id")?;
    let canonical_id = Uuid::parse_str(&canonical_text).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid uuid `{canonical_text}` in change_log.canonical_id"
        ))
    })?;

    let action_text: String = row.get("action")?;
    let action = ChangeAction::parse(&action_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid action `{action_text}` in change_log.action"))
    })?;

    let changed_fields = match row.get::<_, Option<String>>("changed_fields")? {
        Some(text) => Some(
            serde_json::from_str::<Vec<FieldChange>>(&text).map_err(|err| {
                RepoError::InvalidData(format!("invalid json in change_log.changed_fields: {err}"))
            })?,
        ),
        None => None,
    };

    Ok(ChangeLogEntry {
        id: row.get("id")?,
        record_id: row.get("record_id")?,
        canonical_id,
        version: row.get("version")?,
        action,
        changed_fields,
        notes: row.get("notes")?,
        performed_by: row.get("performed_by")?,
        performed_at: row.get("performed_at")?,
    })
}
