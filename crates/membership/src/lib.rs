//! `cashbook-membership` — workspace membership and invitation authority.
//!
//! Answers "who is this caller, which workspace are they acting in, and with
//! what role", guards every tenant-scoped operation on that answer, and runs
//! the invitation lifecycle. Storage sits behind the traits in [`store`].

pub mod admin;
pub mod authority;
pub mod error;
pub mod guard;
pub mod in_memory;
pub mod invitations;
pub mod resolver;
pub mod store;
pub mod types;

pub use admin::WorkspaceAdmin;
pub use authority::MembershipAuthority;
pub use error::{AccessError, InvitationError, Severity};
pub use guard::PermissionGuard;
pub use in_memory::InMemoryStore;
pub use invitations::{InvitationManager, InvitationPreview, IssuedInvitation};
pub use resolver::{ContextResolver, Resolution, require_user};
pub use store::{
    DEFAULT_PAGE_LIMIT, InvitationStore, MAX_PAGE_LIMIT, MembershipStore, Page, PageRequest,
    PreferenceStore, StoreError, WorkspaceStore,
};
pub use types::{
    INVITATION_TTL_DAYS, Invitation, Membership, NewInvitation, NewMembership, Workspace,
    invitation_ttl,
};
