use std::sync::Arc;

use chrono::{Duration, Utc};

use cashbook_auth::{Action, AuthenticatedUser, Role, TokenCodec, TokenSecret};
use cashbook_core::{ManualClock, UserId, WorkspaceId};
use cashbook_membership::{
    AccessError, InMemoryStore, InvitationError, MembershipAuthority, MembershipStore,
    NewMembership, PreferenceStore, Resolution, Workspace, WorkspaceStore,
};

struct World {
    store: Arc<InMemoryStore>,
    clock: Arc<ManualClock>,
    authority: MembershipAuthority<InMemoryStore>,
}

/// W1 "Corner Shop", with u-ann as its admin.
async fn world() -> World {
    let store = Arc::new(InMemoryStore::new());
    store
        .insert_workspace(Workspace {
            id: "W1".into(),
            name: "Corner Shop".into(),
            currency: "EUR".into(),
            owner_id: "u-owner".into(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    store
        .create_membership(NewMembership {
            workspace_id: "W1".into(),
            user_id: "u-ann".into(),
            role: Role::Admin,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let clock = Arc::new(ManualClock::starting_now());
    let codec = TokenCodec::new(TokenSecret::new(b"e2e-secret-e2e-secret-e2e-secret".to_vec()));
    let authority = MembershipAuthority::new(Arc::clone(&store), codec, clock.clone());
    World {
        store,
        clock,
        authority,
    }
}

fn w1() -> WorkspaceId {
    WorkspaceId::from("W1")
}

#[tokio::test]
async fn invited_editor_can_write_but_not_delete() {
    let w = world().await;
    let ann = UserId::from("u-ann");
    let bob = UserId::from("u-bob");

    let issued = w
        .authority
        .admin()
        .invite(&w1(), &ann, "bob@example.com", Role::Editor)
        .await
        .unwrap();

    let preview = w
        .authority
        .preview_invitation(&issued.token)
        .await
        .unwrap();
    assert_eq!(preview.role, Role::Editor);
    assert_eq!(preview.workspace_name, "Corner Shop");

    let invitation = w
        .authority
        .verify_invitation_token(&issued.token)
        .await
        .unwrap();
    w.authority
        .accept_invitation(&invitation, &bob)
        .await
        .unwrap();

    let memberships = w.store.find_memberships(&w1(), &bob).await.unwrap();
    assert_eq!(memberships.len(), 1);
    assert_eq!(memberships[0].workspace_id, w1());
    assert_eq!(memberships[0].role, Role::Editor);

    assert_eq!(
        w.authority
            .require_permission(&w1(), &bob, Action::Write)
            .await
            .unwrap(),
        Role::Editor
    );
    assert_eq!(
        w.authority
            .require_permission(&w1(), &bob, Action::Delete)
            .await
            .unwrap_err(),
        AccessError::InsufficientPermission {
            action: Action::Delete,
            required: Role::Admin
        }
    );

    // Bob's first request resolves into W1 and remembers it.
    let resolution = w
        .authority
        .resolve_context(&AuthenticatedUser::new(bob.clone()))
        .await
        .unwrap();
    let ctx = resolution.context().unwrap();
    assert_eq!(ctx.workspace_id(), &w1());
    assert_eq!(ctx.role(), Role::Editor);
    assert_eq!(w.store.preferred_workspace(&bob).await.unwrap(), Some(w1()));

    // The token is spent.
    assert_eq!(
        w.authority
            .verify_invitation_token(&issued.token)
            .await
            .unwrap_err(),
        InvitationError::InvalidOrExpired
    );
}

#[tokio::test]
async fn cancelled_invitation_no_longer_verifies() {
    let w = world().await;
    let issued = w
        .authority
        .create_invitation(&w1(), "carol@example.com", Role::Viewer, &"u-ann".into())
        .await
        .unwrap();

    w.authority
        .cancel_invitation(&issued.invitation.id)
        .await
        .unwrap();

    assert_eq!(
        w.authority
            .verify_invitation_token(&issued.token)
            .await
            .unwrap_err(),
        InvitationError::InvalidOrExpired
    );
    assert!(
        w.authority
            .list_pending_invitations(&w1())
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn second_invitation_replaces_the_first() {
    let w = world().await;
    let first = w
        .authority
        .create_invitation(&w1(), "dan@example.com", Role::Viewer, &"u-ann".into())
        .await
        .unwrap();
    let second = w
        .authority
        .create_invitation(&w1(), "dan@example.com", Role::Editor, &"u-ann".into())
        .await
        .unwrap();

    let pending = w.authority.list_pending_invitations(&w1()).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, second.invitation.id);
    assert!(w.authority.verify_invitation_token(&first.token).await.is_err());
}

#[tokio::test]
async fn invitation_expires_after_seven_days() {
    let w = world().await;
    let issued = w
        .authority
        .create_invitation(&w1(), "erin@example.com", Role::Viewer, &"u-ann".into())
        .await
        .unwrap();

    w.clock.advance(Duration::days(7) - Duration::seconds(1));
    assert!(w.authority.verify_invitation_token(&issued.token).await.is_ok());

    w.clock.advance(Duration::seconds(1));
    assert!(w.authority.verify_invitation_token(&issued.token).await.is_ok());

    w.clock.advance(Duration::seconds(1));
    assert_eq!(
        w.authority
            .verify_invitation_token(&issued.token)
            .await
            .unwrap_err(),
        InvitationError::InvalidOrExpired
    );
}

#[tokio::test]
async fn concurrent_accepts_leave_one_membership() {
    let w = world().await;
    let issued = w
        .authority
        .create_invitation(&w1(), "fay@example.com", Role::Editor, &"u-ann".into())
        .await
        .unwrap();
    let fay = UserId::from("u-fay");

    let a = w.authority.clone();
    let b = w.authority.clone();
    let (inv_a, inv_b) = (issued.invitation.clone(), issued.invitation.clone());
    let (fay_a, fay_b) = (fay.clone(), fay.clone());
    let (ra, rb) = tokio::join!(
        async move { a.accept_invitation(&inv_a, &fay_a).await },
        async move { b.accept_invitation(&inv_b, &fay_b).await },
    );
    ra.unwrap();
    rb.unwrap();

    assert_eq!(w.store.membership_count(&w1(), &fay), 1);
}

#[tokio::test]
async fn non_members_and_breached_pairs_are_refused() {
    let w = world().await;
    let stranger = UserId::from("u-stranger");
    assert_eq!(
        w.authority
            .require_permission(&w1(), &stranger, Action::Read)
            .await
            .unwrap_err(),
        AccessError::NotAMember { workspace_id: w1() }
    );

    let existing = w
        .store
        .find_memberships(&w1(), &"u-ann".into())
        .await
        .unwrap()
        .remove(0);
    w.store
        .insert_membership_unchecked(cashbook_membership::Membership {
            id: cashbook_core::MembershipId::generate(),
            ..existing
        })
        .unwrap();

    let err = w
        .authority
        .require_permission(&w1(), &"u-ann".into(), Action::Read)
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::Integrity { count: 2, .. }));
    assert_eq!(err.severity(), cashbook_membership::Severity::Alert);
}

#[tokio::test]
async fn newcomer_needs_onboarding() {
    let w = world().await;
    let resolution = w
        .authority
        .resolve_context(&AuthenticatedUser::new("u-new".into()))
        .await
        .unwrap();
    assert_eq!(resolution, Resolution::NeedsOnboarding);
}
