//! Core records for workspace membership.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use cashbook_auth::{Role, TokenHash};
use cashbook_core::{EmailAddress, InvitationId, MembershipId, UserId, WorkspaceId};

/// How long an invitation stays redeemable. Fixed policy.
pub const INVITATION_TTL_DAYS: i64 = 7;

pub fn invitation_ttl() -> Duration {
    Duration::days(INVITATION_TTL_DAYS)
}

/// A workspace is the tenant boundary: the unit of data isolation.
///
/// Created during onboarding outside this crate and never mutated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    /// ISO-4217 code of the workspace's home currency.
    pub currency: String,
    pub owner_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// Binds one user to one workspace with a role.
///
/// At most one membership exists per `(workspace_id, user_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: MembershipId,
    pub workspace_id: WorkspaceId,
    pub user_id: UserId,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Data for a membership about to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMembership {
    pub workspace_id: WorkspaceId,
    pub user_id: UserId,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// A pending offer to join a workspace with a given role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: InvitationId,
    pub workspace_id: WorkspaceId,
    pub email: EmailAddress,
    pub role: Role,
    /// Keyed digest of the invitation token; the token itself is never stored.
    #[serde(skip_serializing)]
    pub token_hash: TokenHash,
    pub invited_by: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl Invitation {
    /// Expired once `now` is past `expires_at`; the instant itself is still valid.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted_at.is_some()
    }

    /// Unaccepted and unexpired.
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        !self.is_accepted() && !self.is_expired(now)
    }
}

/// Data for an invitation about to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInvitation {
    pub workspace_id: WorkspaceId,
    pub email: EmailAddress,
    pub role: Role,
    pub token_hash: TokenHash,
    pub invited_by: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
