//! Invitation Lifecycle Manager.
//!
//! `pending -> accepted` is terminal; `pending -> cancelled` is a deletion.
//! Expiry is never stored as a state: it is evaluated against the injected
//! clock whenever an invitation is read.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use cashbook_auth::{InvitationToken, Role, TokenCodec};
use cashbook_core::{Clock, EmailAddress, InvitationId, UserId, WorkspaceId};

use crate::error::{AccessError, InvitationError};
use crate::guard::lookup_membership;
use crate::store::{InvitationStore, MembershipStore, StoreError, WorkspaceStore};
use crate::types::{Invitation, NewInvitation, NewMembership, invitation_ttl};

/// Result of issuing an invitation.
///
/// `token` is the only copy of the raw token; deliver it and drop it.
#[derive(Debug, Clone)]
pub struct IssuedInvitation {
    pub token: InvitationToken,
    pub invitation: Invitation,
}

/// What an invitee sees before accepting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvitationPreview {
    pub invitation: Invitation,
    pub workspace_name: String,
    pub role: Role,
}

pub struct InvitationManager<S> {
    store: Arc<S>,
    codec: TokenCodec,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for InvitationManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            codec: self.codec.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S> InvitationManager<S>
where
    S: InvitationStore + MembershipStore + WorkspaceStore,
{
    pub fn new(store: Arc<S>, codec: TokenCodec, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            codec,
            clock,
        }
    }

    /// Issue an invitation, superseding any pending one for the same address.
    ///
    /// The issuer is assumed to hold `admin` on the workspace; use
    /// [`crate::WorkspaceAdmin::invite`] to have that checked.
    pub async fn create(
        &self,
        workspace_id: &WorkspaceId,
        email: &str,
        role: Role,
        issuer: &UserId,
    ) -> Result<IssuedInvitation, InvitationError> {
        let email = EmailAddress::parse(email)
            .map_err(|_| InvitationError::InvalidEmail(email.trim().to_string()))?;

        let superseded = self
            .store
            .find_unaccepted_for_email(workspace_id, &email)
            .await?;
        for old in &superseded {
            self.store.delete_invitation(&old.id).await?;
        }
        if !superseded.is_empty() {
            debug!(
                %workspace_id,
                count = superseded.len(),
                "superseded pending invitations"
            );
        }

        let token = self.codec.generate();
        let now = self.clock.now();
        let invitation = self
            .store
            .create_invitation(NewInvitation {
                workspace_id: workspace_id.clone(),
                email,
                role,
                token_hash: self.codec.hash(&token),
                invited_by: issuer.clone(),
                created_at: now,
                expires_at: now + invitation_ttl(),
            })
            .await?;

        info!(
            %workspace_id,
            invitation_id = %invitation.id,
            role = %role,
            invited_by = %issuer,
            "invitation issued"
        );
        Ok(IssuedInvitation { token, invitation })
    }

    /// Look up the pending invitation a token refers to.
    ///
    /// Unknown, accepted and expired tokens all fail the same way.
    pub async fn verify(&self, token: &InvitationToken) -> Result<Invitation, InvitationError> {
        let hash = self.codec.hash(token);
        let invitation = self
            .store
            .find_unaccepted_by_hash(&hash)
            .await?
            .ok_or(InvitationError::InvalidOrExpired)?;

        if !invitation.is_redeemable(self.clock.now()) {
            debug!(invitation_id = %invitation.id, "invitation expired");
            return Err(InvitationError::InvalidOrExpired);
        }
        Ok(invitation)
    }

    /// [`Self::verify`] plus the workspace name, for the invitation landing page.
    pub async fn preview(
        &self,
        token: &InvitationToken,
    ) -> Result<InvitationPreview, InvitationError> {
        let invitation = self.verify(token).await?;
        let Some(workspace) = self.store.get_workspace(&invitation.workspace_id).await? else {
            warn!(
                workspace_id = %invitation.workspace_id,
                invitation_id = %invitation.id,
                "invitation refers to a missing workspace"
            );
            return Err(InvitationError::InvalidOrExpired);
        };
        Ok(InvitationPreview {
            role: invitation.role,
            workspace_name: workspace.name,
            invitation,
        })
    }

    /// Grant the invitation's role to `user_id` and mark it accepted.
    ///
    /// Idempotent: an existing membership is left untouched, and the
    /// membership is always in place before the invitation is stamped.
    /// The record is re-read first, so an invitation cancelled, superseded
    /// or accepted since it was verified grants nothing to a non-member.
    /// The first acceptance stamp is kept on repeat calls.
    pub async fn accept(
        &self,
        invitation: &Invitation,
        user_id: &UserId,
    ) -> Result<(), InvitationError> {
        let workspace_id = &invitation.workspace_id;
        let current = self.store.get_invitation(&invitation.id).await?;
        let already_member =
            match lookup_membership(self.store.as_ref(), workspace_id, user_id).await {
                Ok(_) => true,
                Err(AccessError::NotAMember { .. }) => false,
                Err(err) => return Err(err.into()),
            };

        if already_member {
            debug!(%workspace_id, %user_id, "already a member");
        } else {
            match &current {
                Some(stored) if stored.accepted_at.is_none() => {}
                Some(_) => {
                    warn!(
                        invitation_id = %invitation.id,
                        %user_id,
                        "invitation already used by another account"
                    );
                    return Err(InvitationError::InvalidOrExpired);
                }
                None => {
                    debug!(invitation_id = %invitation.id, "invitation no longer exists");
                    return Err(InvitationError::InvalidOrExpired);
                }
            }

            let created = self
                .store
                .create_membership(NewMembership {
                    workspace_id: workspace_id.clone(),
                    user_id: user_id.clone(),
                    role: invitation.role,
                    created_at: self.clock.now(),
                })
                .await;
            match created {
                Ok(membership) => info!(
                    %workspace_id,
                    %user_id,
                    role = %membership.role,
                    "membership created from invitation"
                ),
                // A concurrent accept got there first.
                Err(StoreError::Conflict(_)) => {
                    debug!(%workspace_id, %user_id, "membership already created")
                }
                Err(err) => return Err(err.into()),
            }
        }

        if current.is_some() {
            match self
                .store
                .mark_accepted(&invitation.id, self.clock.now())
                .await
            {
                Ok(()) => {}
                Err(StoreError::NotFound(_)) => {
                    warn!(
                        invitation_id = %invitation.id,
                        "invitation removed before it could be stamped"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        info!(invitation_id = %invitation.id, %workspace_id, %user_id, "invitation accepted");
        Ok(())
    }

    /// Delete an invitation. Missing invitations are not an error.
    ///
    /// The caller is assumed to hold `admin` on the invitation's workspace.
    pub async fn cancel(&self, invitation_id: &InvitationId) -> Result<(), InvitationError> {
        self.store.delete_invitation(invitation_id).await?;
        info!(%invitation_id, "invitation cancelled");
        Ok(())
    }

    /// Unaccepted, unexpired invitations of a workspace.
    pub async fn list_pending(
        &self,
        workspace_id: &WorkspaceId,
    ) -> Result<Vec<Invitation>, InvitationError> {
        let now = self.clock.now();
        let mut pending: Vec<Invitation> = self
            .store
            .list_unaccepted(workspace_id)
            .await?
            .into_iter()
            .filter(|inv| inv.is_redeemable(now))
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(pending)
    }

    /// Delete expired, unaccepted invitations. Returns how many were removed.
    pub async fn purge_expired(&self, workspace_id: &WorkspaceId) -> Result<usize, InvitationError> {
        let now = self.clock.now();
        let expired: Vec<Invitation> = self
            .store
            .list_unaccepted(workspace_id)
            .await?
            .into_iter()
            .filter(|inv| inv.is_expired(now))
            .collect();

        for inv in &expired {
            self.store.delete_invitation(&inv.id).await?;
        }
        if !expired.is_empty() {
            info!(%workspace_id, count = expired.len(), "purged expired invitations");
        }
        Ok(expired.len())
    }
}
