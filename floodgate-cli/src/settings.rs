//! CLI configuration loading.
//!
//! Precedence, highest to lowest: command-line flags, environment
//! variables (`FLOODGATE_DRIVER`, `FLOODGATE_DSN`, `FLOODGATE_TABLE`,
//! `FLOODGATE_LOCK_TIMEOUT`), then an optional `.floodgate` config file in
//! the working directory.

use std::time::Duration;

use config::{Config as ConfigLoader, Environment, File};
use serde::Deserialize;

use floodgate::{Config, IsolationLevel, MigrateError, NamingConfig, NamingPattern};

/// Settings assembled from file, environment, and flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Driver name: `sqlite`, `postgres`, or `cockroachdb`.
    pub driver: String,
    /// Data source name / connection string.
    pub dsn: String,
    /// Bookkeeping table name.
    pub table: String,
    /// Lock timeout in seconds.
    pub lock_timeout: u64,
    /// Default isolation level (`read-committed`, `serializable`, ...).
    pub isolation_level: String,
    /// Version naming pattern (`sequential`, `sequential-padded`, `semver`).
    pub naming_pattern: String,
    /// Digit count for the padded pattern.
    pub naming_padding: usize,
    /// Whether naming violations reject registration.
    pub naming_enforce: bool,
    /// Directory scanned by `create`.
    pub migrations_dir: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            driver: String::new(),
            dsn: String::new(),
            table: floodgate::DEFAULT_TABLE_NAME.to_string(),
            lock_timeout: floodgate::DEFAULT_LOCK_TIMEOUT.as_secs(),
            isolation_level: String::new(),
            naming_pattern: String::new(),
            naming_padding: 3,
            naming_enforce: true,
            migrations_dir: "migrations".to_string(),
        }
    }
}

impl Settings {
    /// Load `.floodgate` (any supported format, optional) and overlay
    /// `FLOODGATE_*` environment variables.
    pub fn load() -> Result<Self, MigrateError> {
        ConfigLoader::builder()
            .add_source(File::with_name(".floodgate").required(false))
            .add_source(Environment::with_prefix("FLOODGATE").try_parsing(true))
            .build()
            .and_then(|loaded| loaded.try_deserialize())
            .map_err(MigrateError::database)
    }

    /// Translate into the engine configuration.
    pub fn engine_config(&self) -> Result<Config, MigrateError> {
        let pattern = NamingPattern::parse(&self.naming_pattern).ok_or_else(|| {
            MigrateError::Naming {
                message: format!("unknown naming pattern: {}", self.naming_pattern),
            }
        })?;

        let isolation_level = if self.isolation_level.is_empty() {
            None
        } else {
            Some(IsolationLevel::parse(&self.isolation_level).ok_or_else(|| {
                MigrateError::database(format!(
                    "unknown isolation level: {}",
                    self.isolation_level
                ))
            })?)
        };

        Ok(Config {
            table_name: self.table.clone(),
            lock_timeout: Duration::from_secs(self.lock_timeout),
            isolation_level,
            naming: NamingConfig {
                pattern,
                padding: self.naming_padding,
                enforce: self.naming_enforce,
            },
        })
    }

    /// The naming configuration alone, for `create` scaffolding. Defaults
    /// to the padded sequential pattern when none is configured.
    pub fn scaffold_naming(&self) -> NamingConfig {
        let pattern = NamingPattern::parse(&self.naming_pattern)
            .filter(|p| *p != NamingPattern::None)
            .unwrap_or(NamingPattern::SequentialPadded);
        NamingConfig {
            pattern,
            padding: self.naming_padding,
            enforce: self.naming_enforce,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_engine() {
        let settings = Settings::default();
        assert_eq!(settings.table, "queen_migrations");
        assert_eq!(settings.lock_timeout, 1800);
        assert!(settings.naming_enforce);
    }

    #[test]
    fn engine_config_translation() {
        let settings = Settings {
            table: "history".to_string(),
            lock_timeout: 60,
            isolation_level: "serializable".to_string(),
            naming_pattern: "sequential-padded".to_string(),
            ..Settings::default()
        };
        let config = settings.engine_config().expect("config");
        assert_eq!(config.table_name, "history");
        assert_eq!(config.lock_timeout, Duration::from_secs(60));
        assert_eq!(config.isolation_level, Some(IsolationLevel::Serializable));
        assert_eq!(config.naming.pattern, NamingPattern::SequentialPadded);
    }

    #[test]
    fn bad_pattern_and_isolation_are_rejected() {
        let bad_pattern = Settings {
            naming_pattern: "calendar".to_string(),
            ..Settings::default()
        };
        assert!(bad_pattern.engine_config().is_err());

        let bad_isolation = Settings {
            isolation_level: "chaotic".to_string(),
            ..Settings::default()
        };
        assert!(bad_isolation.engine_config().is_err());
    }

    #[test]
    fn scaffolding_defaults_to_padded_sequential() {
        let naming = Settings::default().scaffold_naming();
        assert_eq!(naming.pattern, NamingPattern::SequentialPadded);
    }
}
