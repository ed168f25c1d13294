//! Process configuration for the membership authority.
//!
//! Built once at start-up and injected; library code never reads the
//! environment itself.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

use cashbook_auth::token::MIN_SECRET_BYTES;
use cashbook_auth::{TokenCodec, TokenSecret};

pub const ENV_VAR: &str = "CASHBOOK_ENV";
pub const SECRET_VAR: &str = "CASHBOOK_INVITE_SECRET";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";

const DEV_SECRET: &str = "cashbook-insecure-development-invite-secret";

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum Environment {
    /// Assumed when `CASHBOOK_ENV` is unset, so a forgotten variable fails closed.
    #[default]
    Production,
    Development,
    Test,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Development => "development",
            Environment::Test => "test",
        }
    }

    pub fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("CASHBOOK_INVITE_SECRET must be set in production")]
    MissingSecret,

    #[error("CASHBOOK_INVITE_SECRET is {len} bytes; at least {min} are required in production")]
    WeakSecret { len: usize, min: usize },

    #[error("unknown CASHBOOK_ENV value '{0}'")]
    InvalidEnvironment(String),
}

#[derive(Debug, Clone)]
pub struct AuthorityConfig {
    pub environment: Environment,
    pub token_secret: TokenSecret,
    pub database_url: Option<String>,
}

impl AuthorityConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup(ENV_VAR) {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => Environment::default(),
        };

        let secret = lookup(SECRET_VAR).filter(|s| !s.is_empty());
        let token_secret = match (secret, environment.is_production()) {
            (Some(secret), true) => {
                let secret = TokenSecret::new(secret.into_bytes());
                if !secret.is_strong() {
                    return Err(ConfigError::WeakSecret {
                        len: secret.len(),
                        min: MIN_SECRET_BYTES,
                    });
                }
                secret
            }
            (Some(secret), false) => TokenSecret::new(secret.into_bytes()),
            (None, true) => return Err(ConfigError::MissingSecret),
            (None, false) => {
                warn!(
                    environment = %environment,
                    "CASHBOOK_INVITE_SECRET not set; using insecure dev default"
                );
                TokenSecret::new(DEV_SECRET.as_bytes().to_vec())
            }
        };

        Ok(Self {
            environment,
            token_secret,
            database_url: lookup(DATABASE_URL_VAR).filter(|s| !s.is_empty()),
        })
    }

    pub fn token_codec(&self) -> TokenCodec {
        TokenCodec::new(self.token_secret.clone())
    }
}
