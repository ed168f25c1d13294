//! Membership store access.
//!
//! The backing store is a document/row collection reachable through a few
//! narrow operations: equality-filtered lists, create/update/delete by id and
//! a limit/cursor mechanism. Every adapter (in-memory, Postgres, ...) implements
//! these traits; the resolver, guard and invitation manager depend on nothing
//! else.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cashbook_auth::{Role, TokenHash};
use cashbook_core::{EmailAddress, InvitationId, MembershipId, UserId, WorkspaceId};

use crate::types::{Invitation, Membership, NewInvitation, NewMembership, Workspace};

/// Default page size for consumer-facing listings.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Hard cap on page size.
pub const MAX_PAGE_LIMIT: u32 = 1000;

/// Store operation error.
///
/// These are **infrastructure errors** as opposed to authorization outcomes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("record not found: {0}")]
    NotFound(String),

    /// Anything else the backend reported (connection, decoding, poisoning).
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Limit/cursor pagination for consumers iterating large result sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub limit: u32,
    /// Opaque cursor returned by the previous page.
    pub cursor: Option<String>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            cursor: None,
        }
    }
}

impl PageRequest {
    pub fn new(limit: Option<u32>, cursor: Option<String>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
            cursor,
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Present when more items may follow.
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    async fn get_workspace(&self, id: &WorkspaceId) -> Result<Option<Workspace>, StoreError>;

    /// Used by onboarding and tooling; the authority itself never creates workspaces.
    async fn insert_workspace(&self, workspace: Workspace) -> Result<(), StoreError>;
}

#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Every membership matching `(workspace_id, user_id)`.
    ///
    /// Callers expect zero or one; more is a uniqueness breach they must report.
    async fn find_memberships(
        &self,
        workspace_id: &WorkspaceId,
        user_id: &UserId,
    ) -> Result<Vec<Membership>, StoreError>;

    /// Any one membership of the user, in no particular order.
    async fn first_membership_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Membership>, StoreError>;

    async fn list_workspace_members(
        &self,
        workspace_id: &WorkspaceId,
        page: &PageRequest,
    ) -> Result<Page<Membership>, StoreError>;

    /// Fails with [`StoreError::Conflict`] if the pair already has a membership.
    async fn create_membership(&self, new: NewMembership) -> Result<Membership, StoreError>;

    async fn update_membership_role(
        &self,
        id: &MembershipId,
        role: Role,
    ) -> Result<Membership, StoreError>;

    /// Deleting a missing membership is not an error.
    async fn delete_membership(&self, id: &MembershipId) -> Result<(), StoreError>;
}

#[async_trait]
pub trait InvitationStore: Send + Sync {
    async fn get_invitation(&self, id: &InvitationId) -> Result<Option<Invitation>, StoreError>;

    /// The unaccepted invitation carrying this token hash, if any.
    async fn find_unaccepted_by_hash(
        &self,
        token_hash: &TokenHash,
    ) -> Result<Option<Invitation>, StoreError>;

    async fn find_unaccepted_for_email(
        &self,
        workspace_id: &WorkspaceId,
        email: &EmailAddress,
    ) -> Result<Vec<Invitation>, StoreError>;

    /// Every unaccepted invitation of a workspace, expired ones included.
    async fn list_unaccepted(&self, workspace_id: &WorkspaceId) -> Result<Vec<Invitation>, StoreError>;

    async fn create_invitation(&self, new: NewInvitation) -> Result<Invitation, StoreError>;

    /// Stamps `accepted_at` unless already stamped; the first stamp wins.
    async fn mark_accepted(&self, id: &InvitationId, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Deleting a missing invitation is not an error.
    async fn delete_invitation(&self, id: &InvitationId) -> Result<(), StoreError>;
}

/// The per-user "preferred active workspace", owned by the identity layer.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn preferred_workspace(&self, user_id: &UserId) -> Result<Option<WorkspaceId>, StoreError>;

    async fn set_preferred_workspace(
        &self,
        user_id: &UserId,
        workspace_id: &WorkspaceId,
    ) -> Result<(), StoreError>;
}
