//! Registry of migrations, keyed by version.
//!
//! Registration happens once at startup; the registry rejects duplicate
//! versions and structurally invalid migrations at insertion, and keeps a
//! canonical view sorted by the natural-order comparator regardless of
//! insertion order.

use std::collections::HashMap;

use crate::error::MigrateError;
use crate::migration::Migration;
use crate::naming::NamingConfig;
use crate::ordering;

/// Ordered collection of registered migrations.
#[derive(Debug, Default)]
pub struct Registry {
    migrations: Vec<Migration>,
    index: HashMap<String, usize>,
    // Indices into `migrations`, kept sorted by natural version order.
    order: Vec<usize>,
    naming: NamingConfig,
}

impl Registry {
    /// An empty registry with no naming-pattern validation.
    #[must_use]
    pub fn new() -> Self {
        Registry::default()
    }

    /// An empty registry that validates versions against `naming`.
    #[must_use]
    pub fn with_naming(naming: NamingConfig) -> Self {
        Registry {
            naming,
            ..Registry::default()
        }
    }

    /// Register a migration.
    ///
    /// Rejects structurally invalid migrations and duplicate versions.
    /// Naming-pattern violations reject when the pattern is enforced and
    /// only warn otherwise.
    pub fn add(&mut self, migration: Migration) -> Result<(), MigrateError> {
        migration.validate()?;

        if self.index.contains_key(migration.version()) {
            return Err(MigrateError::VersionConflict {
                version: migration.version().to_string(),
            });
        }

        if let Err(err) = self.naming.validate(migration.version()) {
            if self.naming.enforce {
                return Err(err);
            }
            tracing::warn!(
                version = migration.version(),
                error = %err,
                "version does not match the configured naming pattern"
            );
        }

        let version = migration.version().to_string();
        let idx = self.migrations.len();
        let pos = self.order.partition_point(|&existing| {
            ordering::compare(self.migrations[existing].version(), &version)
                == std::cmp::Ordering::Less
        });
        self.migrations.push(migration);
        self.order.insert(pos, idx);
        self.index.insert(version, idx);
        Ok(())
    }

    /// Register a migration, panicking on error.
    ///
    /// Intended for startup-time registration where a bad migration is a
    /// programming error.
    ///
    /// # Panics
    ///
    /// Panics if [`Registry::add`] would return an error.
    pub fn must_add(&mut self, migration: Migration) {
        let version = migration.version().to_string();
        if let Err(err) = self.add(migration) {
            panic!("failed to register migration {version}: {err}");
        }
    }

    /// Look up a migration by version.
    #[must_use]
    pub fn get(&self, version: &str) -> Option<&Migration> {
        self.index.get(version).map(|&idx| &self.migrations[idx])
    }

    /// Migrations in natural version order.
    #[must_use]
    pub fn sorted(&self) -> Vec<&Migration> {
        self.order.iter().map(|&idx| &self.migrations[idx]).collect()
    }

    /// Versions in natural order.
    #[must_use]
    pub fn versions(&self) -> Vec<&str> {
        self.order
            .iter()
            .map(|&idx| self.migrations[idx].version())
            .collect()
    }

    /// Number of registered migrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Whether no migrations are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::naming::NamingPattern;

    fn migration(version: &str) -> Migration {
        Migration::new(version, "step").up_sql("SELECT 1")
    }

    #[test]
    fn add_and_lookup() {
        let mut registry = Registry::new();
        registry.add(migration("001")).expect("add");
        assert_eq!(registry.len(), 1);
        assert!(registry.get("001").is_some());
        assert!(registry.get("002").is_none());
    }

    #[test]
    fn duplicate_version_is_a_conflict() {
        let mut registry = Registry::new();
        registry.add(migration("001")).expect("add");
        let err = registry.add(migration("001")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::VersionConflict);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn invalid_migration_is_rejected() {
        let mut registry = Registry::new();
        let err = registry
            .add(Migration::new("001", "broken"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidMigration);
        assert!(registry.is_empty());
    }

    #[test]
    fn sorted_view_is_insertion_order_independent() {
        let mut a = Registry::new();
        for v in ["10", "2", "1", "100"] {
            a.add(migration(v)).expect("add");
        }
        let mut b = Registry::new();
        for v in ["100", "1", "2", "10"] {
            b.add(migration(v)).expect("add");
        }
        assert_eq!(a.versions(), vec!["1", "2", "10", "100"]);
        assert_eq!(a.versions(), b.versions());
    }

    #[test]
    fn enforced_naming_pattern_rejects() {
        let mut registry = Registry::with_naming(NamingConfig {
            pattern: NamingPattern::SequentialPadded,
            ..NamingConfig::default()
        });
        registry.add(migration("001")).expect("padded ok");
        let err = registry.add(migration("2")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Naming);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unenforced_naming_pattern_only_warns() {
        let mut registry = Registry::with_naming(NamingConfig {
            pattern: NamingPattern::SequentialPadded,
            enforce: false,
            ..NamingConfig::default()
        });
        registry.add(migration("2")).expect("warn but accept");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    #[should_panic(expected = "failed to register migration 001")]
    fn must_add_panics_on_duplicate() {
        let mut registry = Registry::new();
        registry.must_add(migration("001"));
        registry.must_add(migration("001"));
    }
}
