//! Access and invitation error taxonomy.

use thiserror::Error;

use cashbook_auth::{Action, AuthzError, Role};
use cashbook_core::{UserId, WorkspaceId};

use crate::store::StoreError;

/// How a boundary should treat an [`AccessError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Severity {
    /// An ordinary refusal: the caller lacks access.
    Denied,
    /// Stored state breaks an invariant. Operators must look at it.
    Alert,
    /// The backing store failed; retrying may succeed.
    Transient,
}

/// Failure to establish or check a caller's access to a workspace.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("caller is not authenticated")]
    Unauthenticated,

    #[error("caller is not a member of workspace {workspace_id}")]
    NotAMember { workspace_id: WorkspaceId },

    #[error("insufficient permission: '{action}' requires role '{required}'")]
    InsufficientPermission { action: Action, required: Role },

    /// More than one membership for a single (workspace, user) pair.
    #[error(
        "membership integrity breach: {count} memberships for user {user_id} in workspace {workspace_id}"
    )]
    Integrity {
        workspace_id: WorkspaceId,
        user_id: UserId,
        count: usize,
    },

    /// The workspace's recorded owner cannot lose their membership.
    #[error("the owner of workspace {workspace_id} cannot be removed")]
    OwnerProtected { workspace_id: WorkspaceId },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AccessError {
    pub fn severity(&self) -> Severity {
        match self {
            AccessError::Unauthenticated
            | AccessError::NotAMember { .. }
            | AccessError::InsufficientPermission { .. }
            | AccessError::OwnerProtected { .. } => Severity::Denied,
            AccessError::Integrity { .. } => Severity::Alert,
            AccessError::Store(_) => Severity::Transient,
        }
    }

    /// Generic text safe to show an end user.
    ///
    /// Never names workspaces, users or roles.
    pub fn public_message(&self) -> &'static str {
        match self {
            AccessError::Unauthenticated => "sign in again",
            AccessError::NotAMember { .. } | AccessError::InsufficientPermission { .. } => {
                "insufficient permissions"
            }
            AccessError::OwnerProtected { .. } => "the workspace owner cannot be removed",
            AccessError::Integrity { .. } | AccessError::Store(_) => {
                "something went wrong, please try again later"
            }
        }
    }
}

impl From<AuthzError> for AccessError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::Forbidden { action, required } => {
                AccessError::InsufficientPermission { action, required }
            }
        }
    }
}

/// Failure of an invitation lifecycle operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvitationError {
    /// Unknown, expired or already-accepted token. Deliberately indistinguishable.
    #[error("invitation is invalid or has expired")]
    InvalidOrExpired,

    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl InvitationError {
    pub fn public_message(&self) -> &'static str {
        match self {
            InvitationError::InvalidOrExpired => "this invitation is invalid or has expired",
            InvitationError::InvalidEmail(_) => "please enter a valid email address",
            InvitationError::Access(err) => err.public_message(),
            InvitationError::Store(_) => "something went wrong, please try again later",
        }
    }
}
