//! Infrastructure adapters (persistence, process configuration).

pub mod config;
pub mod postgres;

pub use config::{AuthorityConfig, ConfigError, Environment};
pub use postgres::{MIGRATION, PostgresStore};
