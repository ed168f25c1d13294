//! `cashbook-auth` — pure authorization boundary (zero-trust).
//!
//! This crate is intentionally decoupled from HTTP and storage: it holds the
//! role hierarchy, the permission evaluator, the invitation token codec and
//! the per-request caller context.

pub mod authorize;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod token;

pub use authorize::{
    AuthorizationExplanation, AuthzError, Decision, authorize, evaluate, explain_authorization,
};
pub use permissions::{Action, ParseActionError};
pub use principal::{AuthenticatedUser, CallerContext};
pub use roles::{ParseRoleError, Role};
pub use token::{InvitationToken, TokenCodec, TokenHash, TokenSecret};
