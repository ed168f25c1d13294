//! Guarded workspace administration.
//!
//! Every operation here runs the Permission Guard first, so the
//! preconditions the invitation manager documents are enforced rather than
//! assumed.

use std::sync::Arc;

use tracing::{info, warn};

use cashbook_auth::{Action, Role};
use cashbook_core::{InvitationId, UserId, WorkspaceId};

use crate::error::{AccessError, InvitationError};
use crate::guard::{PermissionGuard, lookup_membership};
use crate::invitations::{InvitationManager, IssuedInvitation};
use crate::store::{InvitationStore, MembershipStore, Page, PageRequest, WorkspaceStore};
use crate::types::{Invitation, Membership};

/// Privilege escalation check: nobody grants a role above their own.
fn ensure_can_grant(
    workspace_id: &WorkspaceId,
    actor: &UserId,
    actor_role: Role,
    granted: Role,
) -> Result<(), AccessError> {
    if actor_role.includes(granted) {
        return Ok(());
    }
    warn!(
        %workspace_id,
        user_id = %actor,
        role = %actor_role,
        granted = %granted,
        "role grant above own role refused"
    );
    Err(AccessError::InsufficientPermission {
        action: Action::Admin,
        required: granted,
    })
}

pub struct WorkspaceAdmin<S> {
    store: Arc<S>,
    guard: PermissionGuard<S>,
    invitations: InvitationManager<S>,
}

impl<S> Clone for WorkspaceAdmin<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            guard: self.guard.clone(),
            invitations: self.invitations.clone(),
        }
    }
}

impl<S> WorkspaceAdmin<S>
where
    S: WorkspaceStore + MembershipStore + InvitationStore,
{
    pub fn new(store: Arc<S>, guard: PermissionGuard<S>, invitations: InvitationManager<S>) -> Self {
        Self {
            store,
            guard,
            invitations,
        }
    }

    /// Invite `email` at `role`. The issuer must be an admin holding at least `role`.
    pub async fn invite(
        &self,
        workspace_id: &WorkspaceId,
        issuer: &UserId,
        email: &str,
        role: Role,
    ) -> Result<IssuedInvitation, InvitationError> {
        let issuer_role = self
            .guard
            .require_permission(workspace_id, issuer, Action::Admin)
            .await?;
        ensure_can_grant(workspace_id, issuer, issuer_role, role)?;
        self.invitations
            .create(workspace_id, email, role, issuer)
            .await
    }

    /// Cancel an invitation after checking `admin` on its workspace.
    ///
    /// An unknown id is a no-op.
    pub async fn cancel_invitation(
        &self,
        caller: &UserId,
        invitation_id: &InvitationId,
    ) -> Result<(), InvitationError> {
        let Some(invitation) = self.store.get_invitation(invitation_id).await? else {
            return Ok(());
        };
        self.guard
            .require_permission(&invitation.workspace_id, caller, Action::Admin)
            .await?;
        self.invitations.cancel(invitation_id).await
    }

    pub async fn pending_invitations(
        &self,
        workspace_id: &WorkspaceId,
        caller: &UserId,
    ) -> Result<Vec<Invitation>, InvitationError> {
        self.guard
            .require_permission(workspace_id, caller, Action::Admin)
            .await?;
        self.invitations.list_pending(workspace_id).await
    }

    pub async fn list_members(
        &self,
        workspace_id: &WorkspaceId,
        caller: &UserId,
        page: &PageRequest,
    ) -> Result<Page<Membership>, AccessError> {
        self.guard
            .require_permission(workspace_id, caller, Action::Read)
            .await?;
        Ok(self.store.list_workspace_members(workspace_id, page).await?)
    }

    /// Change a member's role.
    ///
    /// Only owners touch an owner's role, and nobody grants above their own.
    /// The workspace's recorded owner always keeps `owner`.
    pub async fn change_role(
        &self,
        workspace_id: &WorkspaceId,
        caller: &UserId,
        member: &UserId,
        role: Role,
    ) -> Result<Membership, AccessError> {
        let caller_role = self
            .guard
            .require_permission(workspace_id, caller, Action::Admin)
            .await?;
        let target = lookup_membership(self.store.as_ref(), workspace_id, member).await?;

        if role != Role::Owner {
            if let Some(workspace) = self.store.get_workspace(workspace_id).await? {
                if &workspace.owner_id == member {
                    warn!(%workspace_id, user_id = %caller, "demotion of workspace owner refused");
                    return Err(AccessError::OwnerProtected {
                        workspace_id: workspace_id.clone(),
                    });
                }
            }
        }
        if target.role == Role::Owner && caller_role != Role::Owner {
            warn!(%workspace_id, user_id = %caller, member = %member, "owner role change refused");
            return Err(AccessError::InsufficientPermission {
                action: Action::Owner,
                required: Role::Owner,
            });
        }
        ensure_can_grant(workspace_id, caller, caller_role, role)?;

        let updated = self.store.update_membership_role(&target.id, role).await?;
        info!(
            %workspace_id,
            user_id = %member,
            from = %target.role,
            to = %role,
            changed_by = %caller,
            "member role changed"
        );
        Ok(updated)
    }

    /// Remove a member. Owners can only be removed by owners, and the
    /// workspace's recorded owner never.
    pub async fn remove_member(
        &self,
        workspace_id: &WorkspaceId,
        caller: &UserId,
        member: &UserId,
    ) -> Result<(), AccessError> {
        let caller_role = self
            .guard
            .require_permission(workspace_id, caller, Action::Admin)
            .await?;
        let target = lookup_membership(self.store.as_ref(), workspace_id, member).await?;

        if let Some(workspace) = self.store.get_workspace(workspace_id).await? {
            if &workspace.owner_id == member {
                warn!(%workspace_id, user_id = %caller, "removal of workspace owner refused");
                return Err(AccessError::OwnerProtected {
                    workspace_id: workspace_id.clone(),
                });
            }
        }
        if target.role == Role::Owner && caller_role != Role::Owner {
            warn!(%workspace_id, user_id = %caller, member = %member, "owner removal refused");
            return Err(AccessError::InsufficientPermission {
                action: Action::Owner,
                required: Role::Owner,
            });
        }

        self.store.delete_membership(&target.id).await?;
        info!(%workspace_id, user_id = %member, removed_by = %caller, "member removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use cashbook_auth::{TokenCodec, TokenSecret};
    use cashbook_core::SystemClock;

    use super::*;
    use crate::in_memory::InMemoryStore;
    use crate::types::{NewMembership, Workspace};

    async fn setup(members: &[(&'static str, Role)]) -> (Arc<InMemoryStore>, WorkspaceAdmin<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_workspace(Workspace {
                id: "W1".into(),
                name: "Bakery".into(),
                currency: "USD".into(),
                owner_id: "u-founder".into(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        for (user, role) in members {
            store
                .create_membership(NewMembership {
                    workspace_id: "W1".into(),
                    user_id: (*user).into(),
                    role: *role,
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        let guard = PermissionGuard::new(Arc::clone(&store));
        let manager = InvitationManager::new(
            Arc::clone(&store),
            TokenCodec::new(TokenSecret::new(vec![1u8; 32])),
            Arc::new(SystemClock),
        );
        let admin = WorkspaceAdmin::new(Arc::clone(&store), guard, manager);
        (store, admin)
    }

    #[tokio::test]
    async fn editors_cannot_invite() {
        let (_, admin) = setup(&[("u-ed", Role::Editor)]).await;
        let err = admin
            .invite(&"W1".into(), &"u-ed".into(), "x@example.com", Role::Viewer)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            InvitationError::Access(AccessError::InsufficientPermission {
                action: Action::Admin,
                required: Role::Admin
            })
        );
    }

    #[tokio::test]
    async fn admins_cannot_invite_owners() {
        let (_, admin) = setup(&[("u-adm", Role::Admin)]).await;
        let err = admin
            .invite(&"W1".into(), &"u-adm".into(), "x@example.com", Role::Owner)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InvitationError::Access(AccessError::InsufficientPermission {
                required: Role::Owner,
                ..
            })
        ));

        admin
            .invite(&"W1".into(), &"u-adm".into(), "x@example.com", Role::Admin)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cancel_checks_the_invitations_workspace() {
        let (store, admin) = setup(&[("u-adm", Role::Admin), ("u-view", Role::Viewer)]).await;
        let issued = admin
            .invite(&"W1".into(), &"u-adm".into(), "x@example.com", Role::Viewer)
            .await
            .unwrap();

        let err = admin
            .cancel_invitation(&"u-view".into(), &issued.invitation.id)
            .await
            .unwrap_err();
        assert!(matches!(err, InvitationError::Access(_)));
        assert!(store.get_invitation(&issued.invitation.id).await.unwrap().is_some());

        admin
            .cancel_invitation(&"u-adm".into(), &issued.invitation.id)
            .await
            .unwrap();
        assert!(store.get_invitation(&issued.invitation.id).await.unwrap().is_none());

        // Already gone: no-op, even for a non-admin.
        admin
            .cancel_invitation(&"u-view".into(), &issued.invitation.id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn pending_invitations_require_admin() {
        let (_, admin) = setup(&[("u-adm", Role::Admin), ("u-ed", Role::Editor)]).await;
        admin
            .invite(&"W1".into(), &"u-adm".into(), "x@example.com", Role::Viewer)
            .await
            .unwrap();

        assert_eq!(
            admin
                .pending_invitations(&"W1".into(), &"u-adm".into())
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(
            admin
                .pending_invitations(&"W1".into(), &"u-ed".into())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn members_are_listed_to_any_member() {
        let (_, admin) = setup(&[("u-founder", Role::Owner), ("u-view", Role::Viewer)]).await;
        let page = admin
            .list_members(&"W1".into(), &"u-view".into(), &PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);

        let err = admin
            .list_members(&"W1".into(), &"u-stranger".into(), &PageRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::NotAMember { .. }));
    }

    #[tokio::test]
    async fn admins_promote_up_to_their_own_role() {
        let (_, admin) = setup(&[("u-adm", Role::Admin), ("u-view", Role::Viewer)]).await;
        let updated = admin
            .change_role(&"W1".into(), &"u-adm".into(), &"u-view".into(), Role::Admin)
            .await
            .unwrap();
        assert_eq!(updated.role, Role::Admin);

        let err = admin
            .change_role(&"W1".into(), &"u-adm".into(), &"u-view".into(), Role::Owner)
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::InsufficientPermission { .. }));
    }

    #[tokio::test]
    async fn only_owners_change_owner_roles() {
        let (_, admin) = setup(&[
            ("u-founder", Role::Owner),
            ("u-co", Role::Owner),
            ("u-adm", Role::Admin),
        ])
        .await;

        let err = admin
            .change_role(&"W1".into(), &"u-adm".into(), &"u-co".into(), Role::Viewer)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AccessError::InsufficientPermission {
                action: Action::Owner,
                required: Role::Owner
            }
        );

        let updated = admin
            .change_role(&"W1".into(), &"u-founder".into(), &"u-co".into(), Role::Editor)
            .await
            .unwrap();
        assert_eq!(updated.role, Role::Editor);
    }

    #[tokio::test]
    async fn recorded_owner_cannot_be_demoted() {
        let (store, admin) = setup(&[("u-founder", Role::Owner), ("u-co", Role::Owner)]).await;

        let err = admin
            .change_role(&"W1".into(), &"u-co".into(), &"u-founder".into(), Role::Viewer)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AccessError::OwnerProtected {
                workspace_id: "W1".into()
            }
        );

        let err = admin
            .change_role(&"W1".into(), &"u-founder".into(), &"u-founder".into(), Role::Admin)
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::OwnerProtected { .. }));

        let found = store
            .find_memberships(&"W1".into(), &"u-founder".into())
            .await
            .unwrap();
        assert_eq!(found[0].role, Role::Owner);

        admin
            .change_role(&"W1".into(), &"u-co".into(), &"u-founder".into(), Role::Owner)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn removal_rules() {
        let (store, admin) = setup(&[
            ("u-founder", Role::Owner),
            ("u-co", Role::Owner),
            ("u-adm", Role::Admin),
            ("u-view", Role::Viewer),
        ])
        .await;

        admin
            .remove_member(&"W1".into(), &"u-adm".into(), &"u-view".into())
            .await
            .unwrap();
        assert_eq!(store.membership_count(&"W1".into(), &"u-view".into()), 0);

        let err = admin
            .remove_member(&"W1".into(), &"u-adm".into(), &"u-co".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::InsufficientPermission { .. }));

        let err = admin
            .remove_member(&"W1".into(), &"u-co".into(), &"u-founder".into())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AccessError::OwnerProtected {
                workspace_id: "W1".into()
            }
        );

        admin
            .remove_member(&"W1".into(), &"u-founder".into(), &"u-co".into())
            .await
            .unwrap();
        assert_eq!(store.membership_count(&"W1".into(), &"u-co".into()), 0);
    }
}
