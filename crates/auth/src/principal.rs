use serde::{Deserialize, Serialize};

use cashbook_core::{UserId, WorkspaceId};

use crate::Role;

/// Identity of a caller, as vouched for by the external identity provider.
///
/// Credentials are never seen here: by the time one of these exists, the
/// identity layer has already authenticated the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl AuthenticatedUser {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            email: None,
            display_name: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Resolved (user, workspace, role) triple for one request.
///
/// This is an authorization boundary object: it states *which workspace* the
/// caller is acting within and which role they hold there. It lives for one
/// operation and is never persisted or cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    user: AuthenticatedUser,
    workspace_id: WorkspaceId,
    role: Role,
}

impl CallerContext {
    pub fn new(user: AuthenticatedUser, workspace_id: WorkspaceId, role: Role) -> Self {
        Self {
            user,
            workspace_id,
            role,
        }
    }

    pub fn user(&self) -> &AuthenticatedUser {
        &self.user
    }

    pub fn user_id(&self) -> &UserId {
        &self.user.user_id
    }

    pub fn workspace_id(&self) -> &WorkspaceId {
        &self.workspace_id
    }

    pub fn role(&self) -> Role {
        self.role
    }
}
