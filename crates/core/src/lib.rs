//! `cashbook-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod clock;
pub mod email;
pub mod error;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use email::EmailAddress;
pub use error::{DomainError, DomainResult};
pub use id::{InvitationId, MembershipId, UserId, WorkspaceId};
