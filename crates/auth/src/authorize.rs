use serde::Serialize;
use thiserror::Error;

use crate::{Action, Role};

/// Outcome of a permission evaluation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: action '{action}' requires role '{required}'")]
    Forbidden { action: Action, required: Role },
}

/// Evaluate a role against a requested action.
///
/// - No IO
/// - No panics
/// - Total over every (role, action) pair
pub fn evaluate(role: Role, action: Action) -> Decision {
    if role.ordinal() >= action.minimum_role().ordinal() {
        Decision::Allow
    } else {
        Decision::Deny
    }
}

/// [`evaluate`] as a `Result`, naming the missing threshold on denial.
pub fn authorize(role: Role, action: Action) -> Result<(), AuthzError> {
    match evaluate(role, action) {
        Decision::Allow => Ok(()),
        Decision::Deny => Err(AuthzError::Forbidden {
            action,
            required: action.minimum_role(),
        }),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an authorization decision.
///
/// Attached to denial logs so an operator can see *why* a request was
/// refused without reproducing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationExplanation {
    pub action: Action,
    pub decision: Decision,
    pub role: Role,
    pub required_role: Role,
    pub reason: String,
}

/// Explain why an authorization decision was made (or would be made).
pub fn explain_authorization(role: Role, action: Action) -> AuthorizationExplanation {
    let required_role = action.minimum_role();
    let decision = evaluate(role, action);

    let reason = match decision {
        Decision::Allow if role == required_role => {
            format!("role '{role}' is exactly the minimum for '{action}'")
        }
        Decision::Allow => format!("role '{role}' outranks '{required_role}' required for '{action}'"),
        Decision::Deny => format!(
            "role '{role}' (rank {}) is below '{required_role}' (rank {}) required for '{action}'",
            role.ordinal(),
            required_role.ordinal()
        ),
    };

    AuthorizationExplanation {
        action,
        decision,
        role,
        required_role,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// The policy table, written out independently of `minimum_role`.
    fn expected(role: Role, action: Action) -> bool {
        match (role, action) {
            (_, Action::Read) => true,
            (Role::Viewer, _) => false,
            (_, Action::Write) => true,
            (Role::Editor, _) => false,
            (Role::Admin, Action::Delete | Action::Admin) => true,
            (Role::Admin, Action::Owner) => false,
            (Role::Owner, _) => true,
        }
    }

    #[test]
    fn every_pair_matches_policy_table() {
        for role in Role::ALL {
            for action in Action::ALL {
                assert_eq!(
                    evaluate(role, action).is_allowed(),
                    expected(role, action),
                    "{role} / {action}"
                );
            }
        }
    }

    #[test]
    fn owner_passes_every_action() {
        for action in Action::ALL {
            assert_eq!(evaluate(Role::Owner, action), Decision::Allow);
        }
    }

    #[test]
    fn viewer_passes_only_read() {
        let allowed: Vec<Action> = Action::ALL
            .into_iter()
            .filter(|a| evaluate(Role::Viewer, *a).is_allowed())
            .collect();
        assert_eq!(allowed, vec![Action::Read]);
    }

    #[test]
    fn editor_can_write_but_not_delete() {
        assert!(authorize(Role::Editor, Action::Write).is_ok());
        assert_eq!(
            authorize(Role::Editor, Action::Delete),
            Err(AuthzError::Forbidden {
                action: Action::Delete,
                required: Role::Admin
            })
        );
    }

    #[test]
    fn explanation_names_the_gap() {
        let explanation = explain_authorization(Role::Viewer, Action::Admin);
        assert_eq!(explanation.decision, Decision::Deny);
        assert_eq!(explanation.required_role, Role::Admin);
        assert!(explanation.reason.contains("rank 0"));

        let json = serde_json::to_value(&explanation).unwrap();
        assert_eq!(json["decision"], "deny");
        assert_eq!(json["required_role"], "admin");
    }

    fn any_role() -> impl Strategy<Value = Role> {
        prop::sample::select(Role::ALL.to_vec())
    }

    fn any_action() -> impl Strategy<Value = Action> {
        prop::sample::select(Action::ALL.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: permissions are monotonic in the role order.
        #[test]
        fn higher_roles_never_lose_permissions(a in any_role(), b in any_role(), action in any_action()) {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            if evaluate(low, action).is_allowed() {
                prop_assert!(evaluate(high, action).is_allowed());
            }
        }

        /// Property: `authorize` and `explain_authorization` agree with `evaluate`.
        #[test]
        fn all_entry_points_agree(role in any_role(), action in any_action()) {
            let decision = evaluate(role, action);
            prop_assert_eq!(authorize(role, action).is_ok(), decision.is_allowed());
            prop_assert_eq!(explain_authorization(role, action).decision, decision);
        }
    }
}
