//! Invitation token codec.
//!
//! Tokens are 32 random bytes rendered as 64 lowercase hex characters. Only
//! an HMAC-SHA256 digest of a token is ever persisted; the raw token exists
//! in memory between issuance and out-of-band delivery, and again when the
//! recipient presents it.

use std::fmt;

use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Number of random bytes in a token.
pub const TOKEN_BYTES: usize = 32;

/// Length of the hex rendering of a token.
pub const TOKEN_HEX_LEN: usize = TOKEN_BYTES * 2;

/// Shortest key accepted by [`TokenSecret::is_strong`].
pub const MIN_SECRET_BYTES: usize = 32;

/// HMAC key used to hash invitation tokens.
///
/// Redacted in `Debug`/`Display`; supplied by process configuration.
#[derive(Clone)]
pub struct TokenSecret(Vec<u8>);

impl TokenSecret {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self(key.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_strong(&self) -> bool {
        self.0.len() >= MIN_SECRET_BYTES
    }

    fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for TokenSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenSecret([REDACTED])")
    }
}

/// A raw invitation token, as delivered to the invitee.
///
/// Redacted in `Debug`/`Display` so it cannot leak through logs.
#[derive(Clone, PartialEq, Eq)]
pub struct InvitationToken(String);

impl InvitationToken {
    /// Wrap a token presented by a caller (e.g. taken from a link).
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw token, for embedding in an invitation link.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for InvitationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InvitationToken([REDACTED])")
    }
}

impl fmt::Display for InvitationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Hex-encoded HMAC-SHA256 digest of an invitation token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenHash(String);

impl TokenHash {
    /// Wrap a digest loaded from storage.
    pub fn from_stored(hex_digest: impl Into<String>) -> Self {
        Self(hex_digest.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison.
    pub fn matches(&self, other: &TokenHash) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

/// Generates invitation tokens and hashes them under a configured key.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    secret: TokenSecret,
}

impl TokenCodec {
    pub fn new(secret: TokenSecret) -> Self {
        Self { secret }
    }

    /// Generate a fresh token from the OS CSPRNG.
    pub fn generate(&self) -> InvitationToken {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        InvitationToken(hex::encode(bytes))
    }

    /// Keyed one-way digest of a token.
    pub fn hash(&self, token: &InvitationToken) -> TokenHash {
        // new_from_slice only fails for fixed-size-key MACs; HMAC takes any length.
        let mut mac =
            HmacSha256::new_from_slice(self.secret.expose()).expect("HMAC accepts keys of any size");
        mac.update(token.expose_secret().as_bytes());
        TokenHash(hex::encode(mac.finalize().into_bytes()))
    }
}
