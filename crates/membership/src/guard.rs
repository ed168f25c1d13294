//! Permission Guard: the single checkpoint in front of tenant-scoped work.

use std::sync::Arc;

use tracing::{debug, error, warn};

use cashbook_auth::{Action, CallerContext, Decision, Role, explain_authorization};
use cashbook_core::{UserId, WorkspaceId};

use crate::error::AccessError;
use crate::store::MembershipStore;
use crate::types::Membership;

/// Fetch the unique membership for `(workspace_id, user_id)`.
///
/// Zero records is `NotAMember`; more than one is an integrity breach and is
/// never resolved by picking one.
pub(crate) async fn lookup_membership<S>(
    store: &S,
    workspace_id: &WorkspaceId,
    user_id: &UserId,
) -> Result<Membership, AccessError>
where
    S: MembershipStore + ?Sized,
{
    let mut found = store.find_memberships(workspace_id, user_id).await?;
    match found.len() {
        0 => {
            debug!(%workspace_id, %user_id, "no membership found");
            Err(AccessError::NotAMember {
                workspace_id: workspace_id.clone(),
            })
        }
        1 => Ok(found.remove(0)),
        count => {
            error!(
                %workspace_id,
                %user_id,
                count,
                "membership uniqueness breached"
            );
            Err(AccessError::Integrity {
                workspace_id: workspace_id.clone(),
                user_id: user_id.clone(),
                count,
            })
        }
    }
}

fn check(
    workspace_id: &WorkspaceId,
    user_id: &UserId,
    role: Role,
    action: Action,
) -> Result<Role, AccessError> {
    let explanation = explain_authorization(role, action);
    match explanation.decision {
        Decision::Allow => Ok(role),
        Decision::Deny => {
            warn!(
                %workspace_id,
                %user_id,
                %action,
                role = %role,
                required = %explanation.required_role,
                reason = %explanation.reason,
                "permission denied"
            );
            Err(AccessError::InsufficientPermission {
                action,
                required: explanation.required_role,
            })
        }
    }
}

/// Re-reads the membership store on every call and evaluates the role found.
pub struct PermissionGuard<S> {
    store: Arc<S>,
}

impl<S> Clone for PermissionGuard<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> PermissionGuard<S>
where
    S: MembershipStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns the caller's actual role when it satisfies `action`.
    pub async fn require_permission(
        &self,
        workspace_id: &WorkspaceId,
        user_id: &UserId,
        action: Action,
    ) -> Result<Role, AccessError> {
        let membership = lookup_membership(self.store.as_ref(), workspace_id, user_id).await?;
        check(workspace_id, user_id, membership.role, action)
    }

    /// Same check for an already-resolved context.
    ///
    /// The context's role is not trusted; the store is read again.
    pub async fn require_context(
        &self,
        ctx: &CallerContext,
        action: Action,
    ) -> Result<Role, AccessError> {
        self.require_permission(ctx.workspace_id(), ctx.user_id(), action)
            .await
    }
}
