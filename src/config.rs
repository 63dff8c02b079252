//! Adapter configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).
//!
//! | Variable                        | Default       |
//! |---------------------------------|---------------|
//! | `DATABASE_URL`                  | *(required)*  |
//! | `DATABASE_MAX_CONNECTIONS`      | `10`          |
//! | `DATABASE_MIN_CONNECTIONS`      | `1`           |
//! | `DATABASE_CONNECT_TIMEOUT_SECS` | `5`           |
//! | `CASBIN_TABLE`                  | `casbin_rule` |
//! | `CASBIN_AUTO_CREATE_TABLE`      | `true`        |
//! | `CASBIN_STRICT_LOAD`            | `false`       |

use crate::error::AdapterError;
use crate::persistence::TableName;

/// Default rule table name.
pub const DEFAULT_TABLE: &str = "casbin_rule";

/// Top-level adapter configuration.
///
/// Loaded once at startup via [`AdapterConfig::from_env`], or built in code
/// with [`AdapterConfig::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Database connection string (`sqlite://...` or `postgres://...`).
    pub database_url: String,

    /// Maximum number of database connections in the pool.
    pub database_max_connections: u32,

    /// Minimum idle connections in the pool.
    pub database_min_connections: u32,

    /// Timeout in seconds for acquiring a database connection.
    pub database_connect_timeout_secs: u64,

    /// Default rule table, optionally schema-qualified.
    pub table: String,

    /// Create missing rule tables when connecting.
    pub auto_create_table: bool,

    /// Fail a full load when any target cannot be read.
    pub strict_load: bool,
}

impl AdapterConfig {
    /// Creates a configuration for `database_url` with default settings.
    #[must_use]
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            database_max_connections: 10,
            database_min_connections: 1,
            database_connect_timeout_secs: 5,
            table: DEFAULT_TABLE.to_string(),
            auto_create_table: true,
            strict_load: false,
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults for every variable except `DATABASE_URL`.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if `DATABASE_URL` is unset,
    /// and [`AdapterError::InvalidTable`] if `CASBIN_TABLE` is not a valid
    /// table identifier.
    pub fn from_env() -> Result<Self, AdapterError> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| AdapterError::Configuration("DATABASE_URL is not set".to_string()))?;

        let defaults = Self::new(database_url);
        let config = Self {
            database_max_connections: parse_env(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            ),
            database_min_connections: parse_env(
                "DATABASE_MIN_CONNECTIONS",
                defaults.database_min_connections,
            ),
            database_connect_timeout_secs: parse_env(
                "DATABASE_CONNECT_TIMEOUT_SECS",
                defaults.database_connect_timeout_secs,
            ),
            table: std::env::var("CASBIN_TABLE").unwrap_or_else(|_| DEFAULT_TABLE.to_string()),
            auto_create_table: parse_env_bool(
                "CASBIN_AUTO_CREATE_TABLE",
                defaults.auto_create_table,
            ),
            strict_load: parse_env_bool("CASBIN_STRICT_LOAD", defaults.strict_load),
            ..defaults
        };
        config.table_name()?;
        Ok(config)
    }

    /// Returns the validated default table.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::InvalidTable`] if `table` is not a valid
    /// identifier.
    pub fn table_name(&self) -> Result<TableName, AdapterError> {
        TableName::parse(&self.table)
    }

    /// Returns the adapter behavior switches.
    #[must_use]
    pub fn options(&self) -> AdapterOptions {
        AdapterOptions {
            auto_create_table: self.auto_create_table,
            strict_load: self.strict_load,
        }
    }
}

/// Behavior switches for [`crate::service::PolicyAdapter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterOptions {
    /// Create missing rule tables in [`crate::service::PolicyAdapter::connect`].
    pub auto_create_table: bool,
    /// Propagate read failures from a full load instead of skipping the target.
    pub strict_load: bool,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            auto_create_table: true,
            strict_load: false,
        }
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).map(|v| v.to_ascii_lowercase()).as_deref() {
        Ok("true" | "1") => true,
        Ok("false" | "0") => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_uses_defaults() {
        let config = AdapterConfig::new("sqlite://rules.db");
        assert_eq!(config.table, DEFAULT_TABLE);
        assert!(config.auto_create_table);
        assert!(!config.strict_load);
        assert_eq!(config.options(), AdapterOptions::default());
        assert!(config.table_name().is_ok());
    }

    #[test]
    fn invalid_table_is_reported() {
        let mut config = AdapterConfig::new("sqlite://rules.db");
        config.table = "rules; DROP TABLE users".to_string();
        assert!(matches!(
            config.table_name(),
            Err(AdapterError::InvalidTable(_))
        ));
    }

    #[test]
    fn parse_env_falls_back_on_missing_keys() {
        assert_eq!(parse_env("CASBIN_RULE_STORE_TEST_UNSET_NUMBER", 7u32), 7);
        assert!(parse_env_bool("CASBIN_RULE_STORE_TEST_UNSET_BOOL", true));
    }
}
