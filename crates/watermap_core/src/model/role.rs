//! Caller roles and capabilities.
//!
//! Authentication happens outside the core; callers hand in an already
//! resolved `Actor`. The core only asks two questions of a role.

use crate::model::water_object::UserId;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Closed set of user roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Map reader, no editorial rights.
    User,
    /// Authors and edits drafts.
    Expert,
    /// Authors drafts and reviews submissions.
    Admin,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Expert => "expert",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "user" => Some(Self::User),
            "expert" => Some(Self::Expert),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// May create, edit, submit and delete own drafts.
    pub fn can_edit(self) -> bool {
        matches!(self, Self::Expert | Self::Admin)
    }

    /// May approve or reject pending submissions.
    pub fn can_review(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl Display for UserRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated caller of a lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: UserRole,
}

impl Actor {
    pub fn new(user_id: UserId, role: UserRole) -> Self {
        Self { user_id, role }
    }

    pub fn expert(user_id: UserId) -> Self {
        Self::new(user_id, UserRole::Expert)
    }

    pub fn admin(user_id: UserId) -> Self {
        Self::new(user_id, UserRole::Admin)
    }
}
