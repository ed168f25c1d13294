//! The surface other parts of the application consume.

use std::sync::Arc;

use cashbook_auth::{Action, AuthenticatedUser, InvitationToken, Role, TokenCodec};
use cashbook_core::{Clock, InvitationId, UserId, WorkspaceId};

use crate::admin::WorkspaceAdmin;
use crate::error::{AccessError, InvitationError};
use crate::guard::PermissionGuard;
use crate::invitations::{InvitationManager, InvitationPreview, IssuedInvitation};
use crate::resolver::{ContextResolver, Resolution};
use crate::store::{InvitationStore, MembershipStore, PreferenceStore, WorkspaceStore};
use crate::types::Invitation;

/// Workspace membership and invitation authority.
///
/// Wires the resolver, guard, invitation manager and admin facade over one
/// shared store. Cheap to clone; every component holds the store by `Arc`.
pub struct MembershipAuthority<S> {
    resolver: ContextResolver<S>,
    guard: PermissionGuard<S>,
    invitations: InvitationManager<S>,
    admin: WorkspaceAdmin<S>,
}

impl<S> Clone for MembershipAuthority<S> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            guard: self.guard.clone(),
            invitations: self.invitations.clone(),
            admin: self.admin.clone(),
        }
    }
}

impl<S> MembershipAuthority<S>
where
    S: WorkspaceStore + MembershipStore + InvitationStore + PreferenceStore,
{
    pub fn new(store: Arc<S>, codec: TokenCodec, clock: Arc<dyn Clock>) -> Self {
        let guard = PermissionGuard::new(Arc::clone(&store));
        let invitations = InvitationManager::new(Arc::clone(&store), codec, clock);
        let admin = WorkspaceAdmin::new(Arc::clone(&store), guard.clone(), invitations.clone());
        Self {
            resolver: ContextResolver::new(store),
            guard,
            invitations,
            admin,
        }
    }

    pub async fn resolve_context(&self, user: &AuthenticatedUser) -> Result<Resolution, AccessError> {
        self.resolver.resolve(user).await
    }

    pub async fn require_permission(
        &self,
        workspace_id: &WorkspaceId,
        user_id: &UserId,
        action: Action,
    ) -> Result<Role, AccessError> {
        self.guard
            .require_permission(workspace_id, user_id, action)
            .await
    }

    /// Unguarded issuance; the issuer must already have passed `admin`.
    pub async fn create_invitation(
        &self,
        workspace_id: &WorkspaceId,
        email: &str,
        role: Role,
        issuer: &UserId,
    ) -> Result<IssuedInvitation, InvitationError> {
        self.invitations
            .create(workspace_id, email, role, issuer)
            .await
    }

    /// Callable without an authenticated caller.
    pub async fn verify_invitation_token(
        &self,
        token: &InvitationToken,
    ) -> Result<Invitation, InvitationError> {
        self.invitations.verify(token).await
    }

    pub async fn preview_invitation(
        &self,
        token: &InvitationToken,
    ) -> Result<InvitationPreview, InvitationError> {
        self.invitations.preview(token).await
    }

    pub async fn accept_invitation(
        &self,
        invitation: &Invitation,
        user_id: &UserId,
    ) -> Result<(), InvitationError> {
        self.invitations.accept(invitation, user_id).await
    }

    /// Unguarded cancellation; see [`WorkspaceAdmin::cancel_invitation`].
    pub async fn cancel_invitation(&self, invitation_id: &InvitationId) -> Result<(), InvitationError> {
        self.invitations.cancel(invitation_id).await
    }

    pub async fn list_pending_invitations(
        &self,
        workspace_id: &WorkspaceId,
    ) -> Result<Vec<Invitation>, InvitationError> {
        self.invitations.list_pending(workspace_id).await
    }

    pub fn resolver(&self) -> &ContextResolver<S> {
        &self.resolver
    }

    pub fn guard(&self) -> &PermissionGuard<S> {
        &self.guard
    }

    pub fn invitations(&self) -> &InvitationManager<S> {
        &self.invitations
    }

    pub fn admin(&self) -> &WorkspaceAdmin<S> {
        &self.admin
    }
}
