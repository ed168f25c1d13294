//! Context Resolver: turns an authenticated caller into a [`CallerContext`].

use std::sync::Arc;

use tracing::{debug, info};

use cashbook_auth::{AuthenticatedUser, CallerContext};
use cashbook_core::WorkspaceId;

use crate::error::AccessError;
use crate::guard::lookup_membership;
use crate::store::{MembershipStore, PreferenceStore};

/// Outcome of resolving a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Ready(CallerContext),
    /// The caller belongs to no workspace yet. Not an error.
    NeedsOnboarding,
}

impl Resolution {
    pub fn context(&self) -> Option<&CallerContext> {
        match self {
            Resolution::Ready(ctx) => Some(ctx),
            Resolution::NeedsOnboarding => None,
        }
    }
}

/// Unwraps an optional identity from the identity layer.
pub fn require_user(user: Option<&AuthenticatedUser>) -> Result<&AuthenticatedUser, AccessError> {
    user.ok_or(AccessError::Unauthenticated)
}

pub struct ContextResolver<S> {
    store: Arc<S>,
}

impl<S> Clone for ContextResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> ContextResolver<S>
where
    S: MembershipStore + PreferenceStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Determine which workspace the caller acts in, and with what role.
    ///
    /// A stored preference wins. Without one, any membership of the user is
    /// adopted and written back as the preference.
    pub async fn resolve(&self, user: &AuthenticatedUser) -> Result<Resolution, AccessError> {
        let user_id = &user.user_id;

        let workspace_id = match self.store.preferred_workspace(user_id).await? {
            Some(preferred) => preferred,
            None => match self.store.first_membership_for_user(user_id).await? {
                Some(membership) => {
                    self.store
                        .set_preferred_workspace(user_id, &membership.workspace_id)
                        .await?;
                    info!(
                        %user_id,
                        workspace_id = %membership.workspace_id,
                        "adopted workspace preference"
                    );
                    membership.workspace_id
                }
                None => {
                    debug!(%user_id, "caller has no workspace");
                    return Ok(Resolution::NeedsOnboarding);
                }
            },
        };

        let membership = lookup_membership(self.store.as_ref(), &workspace_id, user_id).await?;
        Ok(Resolution::Ready(CallerContext::new(
            user.clone(),
            membership.workspace_id,
            membership.role,
        )))
    }

    /// Point the caller's preference at another workspace they belong to.
    pub async fn switch_workspace(
        &self,
        user: &AuthenticatedUser,
        workspace_id: &WorkspaceId,
    ) -> Result<CallerContext, AccessError> {
        let membership = lookup_membership(self.store.as_ref(), workspace_id, &user.user_id).await?;
        self.store
            .set_preferred_workspace(&user.user_id, workspace_id)
            .await?;
        info!(user_id = %user.user_id, %workspace_id, "switched workspace");
        Ok(CallerContext::new(
            user.clone(),
            membership.workspace_id,
            membership.role,
        ))
    }
}
