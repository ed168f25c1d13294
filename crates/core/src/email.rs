//! Normalized email addresses.
//!
//! Invitations are keyed by `(workspace, email)`, so every address that enters
//! the system is trimmed and lower-cased exactly once, here.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Longest address accepted (RFC 5321 path limit).
pub const MAX_EMAIL_LEN: usize = 254;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}$").expect("email pattern is valid")
});

/// A trimmed, lower-case email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Normalize and validate a raw address.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let normalized = raw.trim().to_lowercase();

        if normalized.is_empty() {
            return Err(DomainError::validation("email cannot be empty"));
        }
        if normalized.len() > MAX_EMAIL_LEN {
            return Err(DomainError::validation("email is too long"));
        }
        if !EMAIL_REGEX.is_match(&normalized) {
            return Err(DomainError::validation("invalid email format"));
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EmailAddress> for String {
    fn from(value: EmailAddress) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        let email = EmailAddress::parse("  Bob@Example.COM ").unwrap();
        assert_eq!(email.as_str(), "bob@example.com");
    }

    #[test]
    fn accepts_common_shapes() {
        assert!(EmailAddress::parse("user.name+tag@sub.example.com").is_ok());
    }

    #[test]
    fn rejects_malformed_addresses() {
        for raw in ["", "   ", "notanemail", "missing@domain", "@nodomain.com", "spaces in@email.com"] {
            assert!(EmailAddress::parse(raw).is_err(), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn rejects_overlong_addresses() {
        let long = format!("{}@example.com", "a".repeat(250));
        let err = EmailAddress::parse(&long).unwrap_err();
        assert!(err.to_string().contains("too long"));
    }

    #[test]
    fn deserialization_normalizes() {
        let email: EmailAddress = serde_json::from_str("\"ALICE@example.com\"").unwrap();
        assert_eq!(email.as_str(), "alice@example.com");
    }
}
