use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use cashbook_auth::{Role, TokenHash};
use cashbook_core::{EmailAddress, InvitationId, MembershipId, UserId, WorkspaceId};

use crate::store::{
    InvitationStore, MembershipStore, Page, PageRequest, PreferenceStore, StoreError,
    WorkspaceStore,
};
use crate::types::{Invitation, Membership, NewInvitation, NewMembership, Workspace};

#[derive(Debug, Default)]
struct State {
    workspaces: HashMap<WorkspaceId, Workspace>,
    // Vecs keep insertion order, so "first membership" is the oldest one.
    memberships: Vec<Membership>,
    invitations: Vec<Invitation>,
    preferences: HashMap<UserId, WorkspaceId>,
}

/// In-memory store for tests/dev.
///
/// Enforces the `(workspace, user)` uniqueness constraint on
/// [`MembershipStore::create_membership`], like a real backend would. Not
/// optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a membership bypassing the uniqueness constraint.
    ///
    /// Exists to simulate a breached constraint in tests.
    pub fn insert_membership_unchecked(&self, membership: Membership) -> Result<(), StoreError> {
        self.write()?.memberships.push(membership);
        Ok(())
    }

    /// Number of stored memberships for a pair (test inspection).
    pub fn membership_count(&self, workspace_id: &WorkspaceId, user_id: &UserId) -> usize {
        self.read()
            .map(|s| {
                s.memberships
                    .iter()
                    .filter(|m| &m.workspace_id == workspace_id && &m.user_id == user_id)
                    .count()
            })
            .unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait]
impl WorkspaceStore for InMemoryStore {
    async fn get_workspace(&self, id: &WorkspaceId) -> Result<Option<Workspace>, StoreError> {
        Ok(self.read()?.workspaces.get(id).cloned())
    }

    async fn insert_workspace(&self, workspace: Workspace) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.workspaces.contains_key(&workspace.id) {
            return Err(StoreError::Conflict(format!("workspace {} exists", workspace.id)));
        }
        state.workspaces.insert(workspace.id.clone(), workspace);
        Ok(())
    }
}

#[async_trait]
impl MembershipStore for InMemoryStore {
    async fn find_memberships(
        &self,
        workspace_id: &WorkspaceId,
        user_id: &UserId,
    ) -> Result<Vec<Membership>, StoreError> {
        Ok(self
            .read()?
            .memberships
            .iter()
            .filter(|m| &m.workspace_id == workspace_id && &m.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn first_membership_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Membership>, StoreError> {
        Ok(self
            .read()?
            .memberships
            .iter()
            .find(|m| &m.user_id == user_id)
            .cloned())
    }

    async fn list_workspace_members(
        &self,
        workspace_id: &WorkspaceId,
        page: &PageRequest,
    ) -> Result<Page<Membership>, StoreError> {
        let state = self.read()?;
        let mut members: Vec<&Membership> = state
            .memberships
            .iter()
            .filter(|m| &m.workspace_id == workspace_id)
            .filter(|m| match &page.cursor {
                Some(cursor) => m.id.as_str() > cursor.as_str(),
                None => true,
            })
            .collect();
        members.sort_by(|a, b| a.id.cmp(&b.id));

        let limit = page.limit as usize;
        let has_more = members.len() > limit;
        let items: Vec<Membership> = members.into_iter().take(limit).cloned().collect();
        let next_cursor = if has_more {
            items.last().map(|m| m.id.to_string())
        } else {
            None
        };

        Ok(Page { items, next_cursor })
    }

    async fn create_membership(&self, new: NewMembership) -> Result<Membership, StoreError> {
        let mut state = self.write()?;
        let exists = state
            .memberships
            .iter()
            .any(|m| m.workspace_id == new.workspace_id && m.user_id == new.user_id);
        if exists {
            return Err(StoreError::Conflict(format!(
                "membership exists for workspace {} and user {}",
                new.workspace_id, new.user_id
            )));
        }

        let membership = Membership {
            id: MembershipId::generate(),
            workspace_id: new.workspace_id,
            user_id: new.user_id,
            role: new.role,
            created_at: new.created_at,
        };
        state.memberships.push(membership.clone());
        Ok(membership)
    }

    async fn update_membership_role(
        &self,
        id: &MembershipId,
        role: Role,
    ) -> Result<Membership, StoreError> {
        let mut state = self.write()?;
        let membership = state
            .memberships
            .iter_mut()
            .find(|m| &m.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("membership {id}")))?;
        membership.role = role;
        Ok(membership.clone())
    }

    async fn delete_membership(&self, id: &MembershipId) -> Result<(), StoreError> {
        self.write()?.memberships.retain(|m| &m.id != id);
        Ok(())
    }
}

#[async_trait]
impl InvitationStore for InMemoryStore {
    async fn get_invitation(&self, id: &InvitationId) -> Result<Option<Invitation>, StoreError> {
        Ok(self.read()?.invitations.iter().find(|i| &i.id == id).cloned())
    }

    async fn find_unaccepted_by_hash(
        &self,
        token_hash: &TokenHash,
    ) -> Result<Option<Invitation>, StoreError> {
        Ok(self
            .read()?
            .invitations
            .iter()
            .find(|i| !i.is_accepted() && i.token_hash.matches(token_hash))
            .cloned())
    }

    async fn find_unaccepted_for_email(
        &self,
        workspace_id: &WorkspaceId,
        email: &EmailAddress,
    ) -> Result<Vec<Invitation>, StoreError> {
        Ok(self
            .read()?
            .invitations
            .iter()
            .filter(|i| &i.workspace_id == workspace_id && &i.email == email && !i.is_accepted())
            .cloned()
            .collect())
    }

    async fn list_unaccepted(&self, workspace_id: &WorkspaceId) -> Result<Vec<Invitation>, StoreError> {
        Ok(self
            .read()?
            .invitations
            .iter()
            .filter(|i| &i.workspace_id == workspace_id && !i.is_accepted())
            .cloned()
            .collect())
    }

    async fn create_invitation(&self, new: NewInvitation) -> Result<Invitation, StoreError> {
        let invitation = Invitation {
            id: InvitationId::generate(),
            workspace_id: new.workspace_id,
            email: new.email,
            role: new.role,
            token_hash: new.token_hash,
            invited_by: new.invited_by,
            created_at: new.created_at,
            expires_at: new.expires_at,
            accepted_at: None,
        };
        self.write()?.invitations.push(invitation.clone());
        Ok(invitation)
    }

    async fn mark_accepted(&self, id: &InvitationId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let invitation = state
            .invitations
            .iter_mut()
            .find(|i| &i.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("invitation {id}")))?;
        invitation.accepted_at.get_or_insert(at);
        Ok(())
    }

    async fn delete_invitation(&self, id: &InvitationId) -> Result<(), StoreError> {
        self.write()?.invitations.retain(|i| &i.id != id);
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for InMemoryStore {
    async fn preferred_workspace(&self, user_id: &UserId) -> Result<Option<WorkspaceId>, StoreError> {
        Ok(self.read()?.preferences.get(user_id).cloned())
    }

    async fn set_preferred_workspace(
        &self,
        user_id: &UserId,
        workspace_id: &WorkspaceId,
    ) -> Result<(), StoreError> {
        self.write()?
            .preferences
            .insert(user_id.clone(), workspace_id.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_membership(ws: &str, user: &str, role: Role) -> NewMembership {
        NewMembership {
            workspace_id: WorkspaceId::new(ws).unwrap(),
            user_id: UserId::new(user).unwrap(),
            role,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_membership_is_a_conflict() {
        let store = InMemoryStore::new();
        store
            .create_membership(new_membership("W1", "u-1", Role::Viewer))
            .await
            .unwrap();

        let err = store
            .create_membership(new_membership("W1", "u-1", Role::Admin))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.membership_count(&"W1".into(), &"u-1".into()), 1);
    }

    #[tokio::test]
    async fn unchecked_insert_bypasses_uniqueness() {
        let store = InMemoryStore::new();
        let m = store
            .create_membership(new_membership("W1", "u-1", Role::Viewer))
            .await
            .unwrap();
        store
            .insert_membership_unchecked(Membership {
                id: MembershipId::generate(),
                ..m
            })
            .unwrap();

        let found = store
            .find_memberships(&"W1".into(), &"u-1".into())
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn workspace_members_are_paginated() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store
                .create_membership(new_membership("W1", &format!("u-{i}"), Role::Viewer))
                .await
                .unwrap();
        }
        store
            .create_membership(new_membership("W2", "u-other", Role::Owner))
            .await
            .unwrap();

        let first = store
            .list_workspace_members(&"W1".into(), &PageRequest::new(Some(3), None))
            .await
            .unwrap();
        assert_eq!(first.items.len(), 3);
        assert!(first.next_cursor.is_some());

        let second = store
            .list_workspace_members(&"W1".into(), &PageRequest::new(Some(3), first.next_cursor))
            .await
            .unwrap();
        assert_eq!(second.items.len(), 2);
        assert!(second.next_cursor.is_none());

        let mut seen: Vec<String> = first
            .items
            .iter()
            .chain(second.items.iter())
            .map(|m| m.user_id.to_string())
            .collect();
        seen.sort();
        assert_eq!(seen, vec!["u-0", "u-1", "u-2", "u-3", "u-4"]);
    }

    #[tokio::test]
    async fn first_stamp_wins() {
        let store = InMemoryStore::new();
        let first_at = Utc::now();
        let inv = store
            .create_invitation(NewInvitation {
                workspace_id: "W1".into(),
                email: EmailAddress::parse("bob@example.com").unwrap(),
                role: Role::Editor,
                token_hash: TokenHash::from_stored("h"),
                invited_by: "u-ann".into(),
                created_at: first_at,
                expires_at: first_at + chrono::Duration::days(7),
            })
            .await
            .unwrap();

        store.mark_accepted(&inv.id, first_at).await.unwrap();
        store
            .mark_accepted(&inv.id, first_at + chrono::Duration::minutes(1))
            .await
            .unwrap();

        let stored = store.get_invitation(&inv.id).await.unwrap().unwrap();
        assert_eq!(stored.accepted_at, Some(first_at));
        assert!(store
            .find_unaccepted_by_hash(&TokenHash::from_stored("h"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn deleting_missing_records_is_not_an_error() {
        let store = InMemoryStore::new();
        store.delete_invitation(&"nope".into()).await.unwrap();
        store.delete_membership(&"nope".into()).await.unwrap();
    }
}
