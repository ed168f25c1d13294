use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Role;

/// Coarse action a caller asks to perform inside a workspace.
///
/// This is the complete vocabulary: there are no per-resource permissions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Write,
    Delete,
    Admin,
    Owner,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Read,
        Action::Write,
        Action::Delete,
        Action::Admin,
        Action::Owner,
    ];

    /// Lowest role allowed to perform this action (fixed policy).
    ///
    /// `Delete` and `Admin` deliberately share the same threshold.
    pub const fn minimum_role(self) -> Role {
        match self {
            Action::Read => Role::Viewer,
            Action::Write => Role::Editor,
            Action::Delete => Role::Admin,
            Action::Admin => Role::Admin,
            Action::Owner => Role::Owner,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Delete => "delete",
            Action::Admin => "admin",
            Action::Owner => "owner",
        }
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid action: {0}")]
pub struct ParseActionError(pub String);

impl FromStr for Action {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Action::Read),
            "write" => Ok(Action::Write),
            "delete" => Ok(Action::Delete),
            "admin" => Ok(Action::Admin),
            "owner" => Ok(Action::Owner),
            other => Err(ParseActionError(other.to_string())),
        }
    }
}
