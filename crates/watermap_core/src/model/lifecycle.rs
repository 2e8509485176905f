//! Editorial lifecycle state machine.
//!
//! ```text
//!            submit              approve
//!   Draft ───────────▶ Pending ───────────▶ Published ──▶ Archived
//!     ▲                   │                  (demoted when a newer
//!     │ update            │ reject            version is approved)
//!     │                   ▼
//!     └──────────────  Rejected ── submit ──▶ Pending
//! ```
//!
//! Transitions are checked at runtime against the persisted status; the
//! rules here are pure and shared by every storage implementation.

use crate::model::audit::ChangeAction;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Lifecycle status of one version row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectStatus {
    /// Authored, mutable, visible to its author only.
    Draft,
    /// Submitted and waiting for a reviewer.
    Pending,
    /// The single public version of its canonical object.
    Published,
    /// A formerly published version, kept for history.
    Archived,
    /// Returned to the author with a reason.
    Rejected,
}

impl ObjectStatus {
    pub const ALL: [ObjectStatus; 5] = [
        Self::Draft,
        Self::Pending,
        Self::Published,
        Self::Archived,
        Self::Rejected,
    ];

    /// Stable storage/wire value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Published => "published",
            Self::Archived => "archived",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "pending" => Some(Self::Pending),
            "published" => Some(Self::Published),
            "archived" => Some(Self::Archived),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Whether the version is still moving through review.
    ///
    /// At most one open version exists per canonical object.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Draft | Self::Pending | Self::Rejected)
    }

    /// SQL list literal of every open status, e.g. `('draft', 'pending')`.
    pub fn open_sql_list() -> String {
        sql_list(Self::ALL.into_iter().filter(|status| status.is_open()))
    }

    /// Whether geometry and attributes may be replaced in place.
    pub fn is_editable(self) -> bool {
        Transition::Update.permits(self)
    }
}

impl Display for ObjectStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status-changing operation on an existing version row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Update,
    Submit,
    Approve,
    Reject,
    Archive,
    Delete,
}

impl Transition {
    /// Source statuses this transition accepts.
    pub fn allowed_from(self) -> &'static [ObjectStatus] {
        match self {
            Self::Update | Self::Submit => &[ObjectStatus::Draft, ObjectStatus::Rejected],
            Self::Approve | Self::Reject => &[ObjectStatus::Pending],
            Self::Archive => &[ObjectStatus::Published],
            Self::Delete => &[ObjectStatus::Draft],
        }
    }

    /// Status after the transition; `None` when the row is removed.
    pub fn target(self) -> Option<ObjectStatus> {
        match self {
            Self::Update => Some(ObjectStatus::Draft),
            Self::Submit => Some(ObjectStatus::Pending),
            Self::Approve => Some(ObjectStatus::Published),
            Self::Reject => Some(ObjectStatus::Rejected),
            Self::Archive => Some(ObjectStatus::Archived),
            Self::Delete => None,
        }
    }

    pub fn permits(self, from: ObjectStatus) -> bool {
        self.allowed_from().contains(&from)
    }

    /// Whether only the original author may trigger the transition.
    pub fn requires_author(self) -> bool {
        matches!(self, Self::Update | Self::Submit | Self::Delete)
    }

    /// Audit action recorded for a successful transition.
    pub fn audit_action(self) -> ChangeAction {
        match self {
            Self::Update => ChangeAction::Update,
            Self::Submit => ChangeAction::Submit,
            Self::Approve => ChangeAction::Approve,
            Self::Reject => ChangeAction::Reject,
            Self::Archive => ChangeAction::Archive,
            Self::Delete => ChangeAction::Delete,
        }
    }

    /// SQL list literal of the accepted source statuses, e.g.
    /// `('draft', 'rejected')`. Built from static values only.
    pub fn sql_status_list(self) -> String {
        sql_list(self.allowed_from().iter().copied())
    }
}

fn sql_list(statuses: impl Iterator<Item = ObjectStatus>) -> String {
    let values = statuses
        .map(|status| format!("'{}'", status.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("({values})")
}

#[cfg(test)]
mod tests {
    use super::{ObjectStatus, Transition};

    #[test]
    fn status_string_roundtrip_covers_all_variants() {
        for status in ObjectStatus::ALL {
            assert_eq!(ObjectStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ObjectStatus::parse("Published"), None);
    }

    #[test]
    fn only_draft_and_rejected_are_editable() {
        let editable: Vec<_> = ObjectStatus::ALL
            .into_iter()
            .filter(|status| status.is_editable())
            .collect();
        assert_eq!(editable, vec![ObjectStatus::Draft, ObjectStatus::Rejected]);
    }

    #[test]
    fn review_transitions_start_from_pending_only() {
        for status in ObjectStatus::ALL {
            let expected = status == ObjectStatus::Pending;
            assert_eq!(Transition::Approve.permits(status), expected);
            assert_eq!(Transition::Reject.permits(status), expected);
        }
    }

    #[test]
    fn published_and_archived_rows_are_frozen_for_authors() {
        for transition in [Transition::Update, Transition::Submit, Transition::Delete] {
            assert!(!transition.permits(ObjectStatus::Published));
            assert!(!transition.permits(ObjectStatus::Archived));
            assert!(!transition.permits(ObjectStatus::Pending));
        }
    }

    #[test]
    fn delete_has_no_target_status() {
        assert_eq!(Transition::Delete.target(), None);
        assert_eq!(Transition::Update.target(), Some(ObjectStatus::Draft));
        assert_eq!(Transition::Archive.target(), Some(ObjectStatus::Archived));
    }

    #[test]
    fn sql_status_list_quotes_storage_values() {
        assert_eq!(
            Transition::Submit.sql_status_list(),
            "('draft', 'rejected')"
        );
        assert_eq!(Transition::Approve.sql_status_list(), "('pending')");
        assert_eq!(Transition::Archive.sql_status_list(), "('published')");
    }

    #[test]
    fn open_statuses_are_the_ones_still_in_review() {
        assert_eq!(
            ObjectStatus::open_sql_list(),
            "('draft', 'pending', 'rejected')"
        );
        assert!(!ObjectStatus::Published.is_open());
        assert!(!ObjectStatus::Archived.is_open());
    }
}
