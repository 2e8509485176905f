//! Change audit records.
//!
//! # Responsibility
//! - Describe one append-only audit row per successful lifecycle transition.
//! - Provide the field-level diff used by update entries and review screens.
//!
//! # Invariants
//! - Audit rows are never mutated or deleted after they are written.
//! - `changed_fields` only lists fields whose JSON value differs.

use crate::model::water_object::{CanonicalId, RecordId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

/// Lifecycle action recorded by an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Create,
    Update,
    Submit,
    Approve,
    Reject,
    Archive,
    Delete,
}

impl ChangeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Submit => "submit",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Archive => "archive",
            Self::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "submit" => Some(Self::Submit),
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            "archive" => Some(Self::Archive),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl Display for ChangeAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One changed field between two content snapshots.
///
/// A missing field is represented as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub before: Value,
    pub after: Value,
}

/// Audit entry as written by a transition, before storage assigns id/time.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChangeLogEntry {
    pub record_id: RecordId,
    pub canonical_id: CanonicalId,
    pub version: u32,
    pub action: ChangeAction,
    pub changed_fields: Option<Vec<FieldChange>>,
    pub notes: Option<String>,
    pub performed_by: UserId,
}

impl NewChangeLogEntry {
    pub fn new(
        record_id: RecordId,
        canonical_id: CanonicalId,
        version: u32,
        action: ChangeAction,
        performed_by: UserId,
    ) -> Self {
        Self {
            record_id,
            canonical_id,
            version,
            action,
            changed_fields: None,
            notes: None,
            performed_by,
        }
    }

    pub fn with_changes(mut self, changes: Vec<FieldChange>) -> Self {
        self.changed_fields = Some(changes);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Persisted audit entry read model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub id: i64,
    pub record_id: RecordId,
    pub canonical_id: CanonicalId,
    pub version: u32,
    pub action: ChangeAction,
    pub changed_fields: Option<Vec<FieldChange>>,
    pub notes: Option<String>,
    pub performed_by: UserId,
    /// Unix epoch milliseconds.
    pub performed_at: i64,
}

/// Compares two JSON object snapshots field by field.
///
/// Output is sorted by field name. Non-object inputs are treated as empty
/// objects.
pub fn diff_snapshots(before: &Value, after: &Value) -> Vec<FieldChange> {
    let empty = Map::new();
    let before = before.as_object().unwrap_or(&empty);
    let after = after.as_object().unwrap_or(&empty);

    let fields: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    fields
        .into_iter()
        .filter_map(|field| {
            let old = before.get(field).unwrap_or(&Value::Null);
            let new = after.get(field).unwrap_or(&Value::Null);
            if old == new {
                return None;
            }
            Some(FieldChange {
                field: field.clone(),
                before: old.clone(),
                after: new.clone(),
            })
        })
        .collect()
}
