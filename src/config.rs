//! Engine configuration.

use std::time::Duration;

use crate::executor::IsolationLevel;
use crate::naming::NamingConfig;

/// Default name of the bookkeeping table.
pub const DEFAULT_TABLE_NAME: &str = "queen_migrations";

/// Default distributed-lock timeout.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Configuration for a [`crate::Migrator`].
///
/// ```
/// use std::time::Duration;
/// use floodgate::Config;
///
/// let config = Config {
///     lock_timeout: Duration::from_secs(60),
///     ..Config::default()
/// };
/// assert_eq!(config.table_name, "queen_migrations");
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Name of the bookkeeping table.
    pub table_name: String,
    /// How long to wait for the distributed migration lock.
    pub lock_timeout: Duration,
    /// Default transaction isolation level for migrations that do not set
    /// their own; `None` uses the driver default.
    pub isolation_level: Option<IsolationLevel>,
    /// Version naming validation.
    pub naming: NamingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            isolation_level: None,
            naming: NamingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.table_name, "queen_migrations");
        assert_eq!(config.lock_timeout, Duration::from_secs(1800));
        assert!(config.isolation_level.is_none());
    }
}
