//! Migrator - the migration execution engine.
//!
//! The [`Migrator`] coordinates a [`Registry`] of migrations with a
//! [`Driver`], tracking what has been applied and orchestrating the apply,
//! rollback, validation, and planning operations.
//!
//! # Lock envelope
//!
//! Every mutating operation runs under the driver's distributed lock:
//! ensure the bookkeeping table exists, acquire the lock (bounded by the
//! configured timeout), refresh the applied set, perform the work, release
//! the lock on every exit path. An unlock failure after a successful
//! operation surfaces as the operation's error; after a failed operation
//! the original error takes precedence.
//!
//! # Ordering
//!
//! Pending migrations apply in natural version order. Rollback traverses
//! applied records newest-first by apply time, which reverses the exact
//! apply history even when migrations were registered out of order.
//!
//! # Example
//!
//! ```no_run
//! use floodgate::{CancelToken, Migration, Migrator};
//! use floodgate::drivers::MockDriver;
//!
//! let mut migrator = Migrator::new(MockDriver::new());
//! migrator.must_add(
//!     Migration::new("001", "create_users")
//!         .up_sql("CREATE TABLE users (id INT)")
//!         .down_sql("DROP TABLE users"),
//! );
//! let cancel = CancelToken::never();
//! migrator.up(&cancel)?;
//! # Ok::<(), floodgate::MigrateError>(())
//! ```

use std::collections::{HashMap, HashSet};

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::driver::{Applied, Driver};
use crate::error::{MigrateError, MigrationError, Operation};
use crate::migration::Migration;
use crate::registry::Registry;
use crate::status::{Direction, MigrationPlan, MigrationStatus, Status};

/// The migration execution engine.
pub struct Migrator {
    driver: Box<dyn Driver>,
    registry: Registry,
    config: Config,
    // Applied records, newest-first. Loaded lazily, refreshed after every
    // mutation, dropped on close.
    applied_cache: Option<Vec<Applied>>,
}

impl Migrator {
    /// Create an engine with default configuration.
    pub fn new(driver: impl Driver + 'static) -> Self {
        Self::with_config(driver, Config::default())
    }

    /// Create an engine with explicit configuration.
    pub fn with_config(driver: impl Driver + 'static, config: Config) -> Self {
        Self::with_boxed_driver(Box::new(driver), config)
    }

    /// Create an engine from an already boxed driver, as front-ends that
    /// choose the driver at runtime do.
    pub fn with_boxed_driver(driver: Box<dyn Driver>, config: Config) -> Self {
        Migrator {
            driver,
            registry: Registry::with_naming(config.naming.clone()),
            config,
            applied_cache: None,
        }
    }

    /// Register a migration.
    pub fn add(&mut self, migration: Migration) -> Result<(), MigrateError> {
        self.registry.add(migration)
    }

    /// Register a migration, panicking on error. For startup registration.
    ///
    /// # Panics
    ///
    /// Panics if registration fails.
    pub fn must_add(&mut self, migration: Migration) {
        self.registry.must_add(migration);
    }

    /// The registered migrations.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Apply every pending migration in natural version order.
    ///
    /// Returns the number of migrations applied. The first failure aborts
    /// the batch; earlier migrations stay committed and recorded.
    pub fn up(&mut self, cancel: &CancelToken) -> Result<usize, MigrateError> {
        self.up_inner(cancel, None)
    }

    /// As [`Migrator::up`], but stop after `steps` successful applications.
    /// `steps == 0` is a no-op.
    pub fn up_steps(&mut self, cancel: &CancelToken, steps: usize) -> Result<usize, MigrateError> {
        if steps == 0 {
            return Ok(0);
        }
        self.up_inner(cancel, Some(steps))
    }

    /// Roll back the `steps` most recently applied migrations, newest
    /// first. `steps == 0` is a no-op.
    pub fn down(&mut self, cancel: &CancelToken, steps: usize) -> Result<usize, MigrateError> {
        if steps == 0 {
            return Ok(0);
        }
        self.down_inner(cancel, Some(steps))
    }

    /// Roll back every applied migration.
    pub fn reset(&mut self, cancel: &CancelToken) -> Result<usize, MigrateError> {
        self.down_inner(cancel, None)
    }

    fn up_inner(
        &mut self,
        cancel: &CancelToken,
        steps: Option<usize>,
    ) -> Result<usize, MigrateError> {
        if self.registry.is_empty() {
            return Err(MigrateError::NoMigrations);
        }

        self.run_locked(cancel, |this, cancel| {
            this.refresh_applied(cancel)?;
            let applied: HashSet<String> = this
                .applied()
                .iter()
                .map(|a| a.version.clone())
                .collect();
            let pending: Vec<Migration> = this
                .registry
                .sorted()
                .into_iter()
                .filter(|m| !applied.contains(m.version()))
                .cloned()
                .collect();

            let limit = steps.unwrap_or(pending.len());
            let mut count = 0;
            for migration in pending.into_iter().take(limit) {
                this.apply_one(cancel, &migration)?;
                count += 1;
            }

            if count > 0 {
                this.refresh_applied(cancel)?;
            }
            tracing::info!(applied = count, "up complete");
            Ok(count)
        })
    }

    fn down_inner(
        &mut self,
        cancel: &CancelToken,
        steps: Option<usize>,
    ) -> Result<usize, MigrateError> {
        if self.registry.is_empty() {
            return Err(MigrateError::NoMigrations);
        }

        self.run_locked(cancel, |this, cancel| {
            this.refresh_applied(cancel)?;
            let targets: Vec<Applied> = this
                .applied()
                .iter()
                .take(steps.unwrap_or(usize::MAX))
                .cloned()
                .collect();

            let mut count = 0;
            for applied in &targets {
                this.rollback_one(cancel, applied)?;
                count += 1;
            }

            if count > 0 {
                this.refresh_applied(cancel)?;
            }
            tracing::info!(rolled_back = count, "down complete");
            Ok(count)
        })
    }

    fn apply_one(
        &mut self,
        cancel: &CancelToken,
        migration: &Migration,
    ) -> Result<(), MigrateError> {
        let driver = self.driver.name();
        let wrap = |cause| {
            MigrationError::wrap(migration.version(), migration.name(), Operation::Up, driver, cause)
        };

        cancel.check().map_err(wrap)?;
        tracing::info!(
            version = migration.version(),
            name = migration.name(),
            "applying migration"
        );

        let isolation = migration.isolation().or(self.config.isolation_level);
        self.driver
            .exec(cancel, isolation, &mut |exec| migration.run_up(exec))
            .map_err(wrap)?;
        self.driver.record(cancel, migration).map_err(wrap)?;
        Ok(())
    }

    fn rollback_one(
        &mut self,
        cancel: &CancelToken,
        applied: &Applied,
    ) -> Result<(), MigrateError> {
        let driver = self.driver.name();
        let wrap = |cause| {
            MigrationError::wrap(&applied.version, &applied.name, Operation::Down, driver, cause)
        };

        cancel.check().map_err(wrap)?;

        let migration = match self.registry.get(&applied.version) {
            Some(migration) => migration.clone(),
            None => {
                return Err(wrap(MigrateError::MigrationNotFound {
                    version: applied.version.clone(),
                }))
            }
        };
        if !migration.has_rollback() {
            return Err(wrap(MigrateError::NoRollback {
                version: applied.version.clone(),
            }));
        }

        tracing::info!(
            version = migration.version(),
            name = migration.name(),
            "rolling back migration"
        );

        let isolation = migration.isolation().or(self.config.isolation_level);
        self.driver
            .exec(cancel, isolation, &mut |exec| migration.run_down(exec))
            .map_err(wrap)?;
        self.driver.remove(cancel, &applied.version).map_err(wrap)?;
        Ok(())
    }

    /// The state of every registered migration, plus applied records that
    /// are no longer registered (reported as [`Status::Modified`]).
    ///
    /// Read-only and deliberately lock-free: a concurrent `up` may be
    /// observed mid-flight. Callers needing a consistent snapshot must
    /// provide their own serialization.
    pub fn status(&mut self, cancel: &CancelToken) -> Result<Vec<MigrationStatus>, MigrateError> {
        self.driver.init(cancel)?;
        let applied = self.driver.get_applied(cancel)?;
        let by_version: HashMap<&str, &Applied> =
            applied.iter().map(|a| (a.version.as_str(), a)).collect();

        let mut statuses = Vec::with_capacity(self.registry.len());
        for migration in self.registry.sorted() {
            let (status, applied_at) = match by_version.get(migration.version()) {
                None => (Status::Pending, None),
                Some(record) if record.checksum == migration.checksum() => {
                    (Status::Applied, Some(record.applied_at))
                }
                Some(record) => (Status::Modified, Some(record.applied_at)),
            };
            statuses.push(MigrationStatus {
                version: migration.version().to_string(),
                name: migration.name().to_string(),
                status,
                applied_at,
                checksum: migration.checksum().to_string(),
                has_rollback: migration.has_rollback(),
                destructive: migration.is_destructive(),
            });
        }

        // Orphans: applied records whose version is no longer registered.
        for record in &applied {
            if self.registry.get(&record.version).is_none() {
                statuses.push(MigrationStatus {
                    version: record.version.clone(),
                    name: record.name.clone(),
                    status: Status::Modified,
                    applied_at: Some(record.applied_at),
                    checksum: record.checksum.clone(),
                    has_rollback: false,
                    destructive: false,
                });
            }
        }
        Ok(statuses)
    }

    /// Verify the registry against the applied set, failing on the first
    /// orphan record or checksum mismatch.
    pub fn validate(&mut self, cancel: &CancelToken) -> Result<(), MigrateError> {
        if self.registry.is_empty() {
            return Err(MigrateError::NoMigrations);
        }
        self.driver.init(cancel)?;
        let applied = self.driver.get_applied(cancel)?;
        let driver = self.driver.name();

        for record in &applied {
            match self.registry.get(&record.version) {
                None => {
                    return Err(MigrationError::wrap(
                        &record.version,
                        &record.name,
                        Operation::Validate,
                        driver,
                        MigrateError::MigrationNotFound {
                            version: record.version.clone(),
                        },
                    ))
                }
                Some(migration) if migration.checksum() != record.checksum => {
                    return Err(MigrationError::wrap(
                        &record.version,
                        &record.name,
                        Operation::Validate,
                        driver,
                        MigrateError::ChecksumMismatch {
                            version: record.version.clone(),
                            stored: record.checksum.clone(),
                            current: migration.checksum().to_string(),
                        },
                    ))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Plan which migrations an `up` or `down` with the given limit would
    /// touch, without executing anything. No lock is taken.
    pub fn dry_run(
        &mut self,
        cancel: &CancelToken,
        direction: Direction,
        limit: Option<usize>,
    ) -> Result<Vec<MigrationPlan>, MigrateError> {
        self.driver.init(cancel)?;
        let applied = self.driver.get_applied(cancel)?;
        let by_version: HashMap<&str, &Applied> =
            applied.iter().map(|a| (a.version.as_str(), a)).collect();
        let limit = limit.unwrap_or(usize::MAX);

        let plans = match direction {
            Direction::Up => self
                .registry
                .sorted()
                .into_iter()
                .filter(|m| !by_version.contains_key(m.version()))
                .take(limit)
                .map(|m| plan_for(m, Direction::Up, Status::Pending))
                .collect(),
            Direction::Down => {
                let mut plans = Vec::new();
                for record in applied.iter().rev().take(limit) {
                    match self.registry.get(&record.version) {
                        Some(migration) => {
                            let status = if migration.checksum() == record.checksum {
                                Status::Applied
                            } else {
                                Status::Modified
                            };
                            plans.push(plan_for(migration, Direction::Down, status));
                        }
                        None => plans.push(orphan_plan(record)),
                    }
                }
                plans
            }
        };
        Ok(plans)
    }

    /// The plan for one specific version. Direction is `down` when the
    /// version is currently applied, `up` otherwise.
    pub fn explain(
        &mut self,
        cancel: &CancelToken,
        version: &str,
    ) -> Result<MigrationPlan, MigrateError> {
        self.driver.init(cancel)?;
        let applied = self.driver.get_applied(cancel)?;
        let record = applied.iter().find(|a| a.version == version);

        let migration = self
            .registry
            .get(version)
            .ok_or_else(|| MigrateError::MigrationNotFound {
                version: version.to_string(),
            })?;

        let (direction, status) = match record {
            None => (Direction::Up, Status::Pending),
            Some(record) if record.checksum == migration.checksum() => {
                (Direction::Down, Status::Applied)
            }
            Some(_) => (Direction::Down, Status::Modified),
        };
        Ok(plan_for(migration, direction, status))
    }

    /// Drop cached state and release driver resources.
    pub fn close(&mut self) -> Result<(), MigrateError> {
        self.applied_cache = None;
        self.driver.close()
    }

    fn run_locked<T>(
        &mut self,
        cancel: &CancelToken,
        op: impl FnOnce(&mut Self, &CancelToken) -> Result<T, MigrateError>,
    ) -> Result<T, MigrateError> {
        self.driver.init(cancel)?;
        self.driver.lock(cancel, self.config.lock_timeout)?;
        tracing::debug!(driver = self.driver.name(), "migration lock acquired");

        let result = op(&mut *self, cancel);
        let unlock = self.driver.unlock(cancel);

        match (result, unlock) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(unlock_err)) => Err(unlock_err),
            (Err(op_err), unlock_result) => {
                if let Err(unlock_err) = unlock_result {
                    tracing::warn!(error = %unlock_err, "failed to release migration lock");
                }
                Err(op_err)
            }
        }
    }

    fn refresh_applied(&mut self, cancel: &CancelToken) -> Result<(), MigrateError> {
        let mut applied = self.driver.get_applied(cancel)?;
        applied.reverse();
        self.applied_cache = Some(applied);
        Ok(())
    }

    fn applied(&self) -> &[Applied] {
        self.applied_cache.as_deref().unwrap_or(&[])
    }
}

fn plan_for(migration: &Migration, direction: Direction, status: Status) -> MigrationPlan {
    let sql = match direction {
        Direction::Up => migration.up_sql_text(),
        Direction::Down => migration.down_sql_text(),
    }
    .unwrap_or("")
    .to_string();

    let mut warnings = Vec::new();
    if !migration.has_rollback() {
        warnings.push("No rollback defined".to_string());
    }
    if direction == Direction::Down && migration.is_destructive() {
        warnings.push("Destructive operation".to_string());
    }
    if !migration.has_checksum_validation() {
        warnings.push("No checksum validation for code migration".to_string());
    }

    MigrationPlan {
        version: migration.version().to_string(),
        name: migration.name().to_string(),
        direction,
        status,
        migration_type: migration.migration_type(),
        sql,
        has_rollback: migration.has_rollback(),
        is_destructive: migration.is_destructive(),
        checksum: migration.checksum().to_string(),
        warnings,
    }
}

fn orphan_plan(record: &Applied) -> MigrationPlan {
    MigrationPlan {
        version: record.version.clone(),
        name: record.name.clone(),
        direction: Direction::Down,
        status: Status::Modified,
        migration_type: crate::status::MigrationType::Sql,
        sql: String::new(),
        has_rollback: false,
        is_destructive: false,
        checksum: record.checksum.clone(),
        warnings: vec!["Not present in the registry; rollback will fail".to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::mock::{MockDriver, MockEvent};
    use crate::error::ErrorKind;

    fn cancel() -> CancelToken {
        CancelToken::never()
    }

    fn users_migration() -> Migration {
        Migration::new("001", "create_users")
            .up_sql("CREATE TABLE users (id INT)")
            .down_sql("DROP TABLE users")
    }

    fn email_migration() -> Migration {
        Migration::new("002", "add_email")
            .up_sql("ALTER TABLE users ADD email TEXT")
            .down_sql("ALTER TABLE users DROP email")
    }

    #[test]
    fn up_with_empty_registry_is_an_error() {
        let mut migrator = Migrator::new(MockDriver::new());
        let err = migrator.up(&cancel()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoMigrations);
    }

    #[test]
    fn up_applies_in_natural_order_and_releases_the_lock() {
        let driver = MockDriver::new();
        let handle = driver.handle();
        let mut migrator = Migrator::new(driver);
        migrator.must_add(email_migration());
        migrator.must_add(users_migration());

        let applied = migrator.up(&cancel()).expect("up");
        assert_eq!(applied, 2);
        assert_eq!(
            handle.applied_versions(),
            vec!["001".to_string(), "002".to_string()]
        );
        assert!(!handle.is_locked());

        let events = handle.events();
        let lock_pos = events.iter().position(|e| *e == MockEvent::Lock).unwrap();
        let unlock_pos = events.iter().position(|e| *e == MockEvent::Unlock).unwrap();
        let first_record = events
            .iter()
            .position(|e| matches!(e, MockEvent::Record(_)))
            .unwrap();
        assert!(lock_pos < first_record && first_record < unlock_pos);
    }

    #[test]
    fn up_is_idempotent() {
        let mut migrator = Migrator::new(MockDriver::new());
        migrator.must_add(users_migration());
        assert_eq!(migrator.up(&cancel()).expect("first"), 1);
        assert_eq!(migrator.up(&cancel()).expect("second"), 0);
    }

    #[test]
    fn up_steps_limits_and_zero_is_a_noop() {
        let driver = MockDriver::new();
        let handle = driver.handle();
        let mut migrator = Migrator::new(driver);
        migrator.must_add(users_migration());
        migrator.must_add(email_migration());

        assert_eq!(migrator.up_steps(&cancel(), 0).expect("noop"), 0);
        assert_eq!(migrator.up_steps(&cancel(), 1).expect("one"), 1);
        assert_eq!(handle.applied_versions(), vec!["001".to_string()]);
        assert_eq!(migrator.up_steps(&cancel(), 5).expect("rest"), 1);
    }

    #[test]
    fn failed_migration_short_circuits_but_keeps_earlier_commits() {
        let driver = MockDriver::new();
        let handle = driver.handle();
        let mut migrator = Migrator::new(driver);
        migrator.must_add(users_migration());
        migrator.must_add(
            Migration::new("002", "explode").up_fn(|_| Err(MigrateError::database("boom"))),
        );
        migrator.must_add(
            Migration::new("003", "never_runs").up_sql("SELECT 1"),
        );

        let err = migrator.up(&cancel()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Database);
        let context = err.migration_context().expect("context");
        assert_eq!(context.version, "002");
        assert_eq!(context.operation, Operation::Up);
        assert_eq!(context.driver, "mock");

        // 001 stays recorded; 003 never ran; the lock was released.
        assert_eq!(handle.applied_versions(), vec!["001".to_string()]);
        assert!(!handle.is_locked());
    }

    #[test]
    fn down_rolls_back_newest_first() {
        let driver = MockDriver::new();
        let handle = driver.handle();
        let mut migrator = Migrator::new(driver);
        migrator.must_add(users_migration());
        migrator.must_add(email_migration());
        migrator.up(&cancel()).expect("up");

        assert_eq!(migrator.down(&cancel(), 1).expect("down"), 1);
        assert_eq!(handle.applied_versions(), vec!["001".to_string()]);
        assert_eq!(migrator.down(&cancel(), 1).expect("down"), 1);
        assert!(handle.applied_versions().is_empty());
    }

    #[test]
    fn down_without_registered_migration_is_not_found() {
        let driver = MockDriver::new();
        driver.seed_applied("999", "ghost", "abc");
        let mut migrator = Migrator::new(driver);
        migrator.must_add(users_migration());

        let err = migrator.down(&cancel(), 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MigrationNotFound);
    }

    #[test]
    fn down_without_rollback_script_fails() {
        let mut migrator = Migrator::new(MockDriver::new());
        migrator.must_add(Migration::new("001", "one_way").up_sql("SELECT 1"));
        migrator.up(&cancel()).expect("up");

        let err = migrator.down(&cancel(), 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoRollback);
    }

    #[test]
    fn reset_reverses_the_exact_apply_history() {
        let driver = MockDriver::new();
        let handle = driver.handle();
        let mut migrator = Migrator::new(driver);
        for version in ["10", "2", "1", "100"] {
            migrator.must_add(
                Migration::new(version, "step")
                    .up_sql("SELECT 1")
                    .down_sql("SELECT 1"),
            );
        }
        migrator.up(&cancel()).expect("up");

        let recorded: Vec<String> = handle
            .events()
            .iter()
            .filter_map(|e| match e {
                MockEvent::Record(v) => Some(v.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(recorded, vec!["1", "2", "10", "100"]);

        assert_eq!(migrator.reset(&cancel()).expect("reset"), 4);
        let removed: Vec<String> = handle
            .events()
            .iter()
            .filter_map(|e| match e {
                MockEvent::Remove(v) => Some(v.clone()),
                _ => None,
            })
            .collect();
        let mut expected = recorded;
        expected.reverse();
        assert_eq!(removed, expected);
        assert!(handle.applied_versions().is_empty());
    }

    #[test]
    fn status_reports_pending_applied_modified_and_orphans() {
        let driver = MockDriver::new();
        let handle = driver.handle();
        let mut migrator = Migrator::new(driver);
        migrator.must_add(users_migration());
        migrator.must_add(email_migration());
        migrator.up_steps(&cancel(), 1).expect("up one");

        // An applied record with no registered counterpart is an orphan.
        handle.seed_applied("999", "ghost", "feed");

        let statuses = migrator.status(&cancel()).expect("status");
        assert_eq!(statuses.len(), 3);
        assert_eq!(statuses[0].version, "001");
        assert_eq!(statuses[0].status, Status::Applied);
        assert!(statuses[0].applied_at.is_some());
        assert_eq!(statuses[1].version, "002");
        assert_eq!(statuses[1].status, Status::Pending);
        assert!(statuses[1].applied_at.is_none());
        assert_eq!(statuses[2].version, "999");
        assert_eq!(statuses[2].status, Status::Modified);
    }

    #[test]
    fn validate_detects_drift() {
        let mut clean = Migrator::new(MockDriver::new());
        clean.must_add(users_migration());
        clean.up(&cancel()).expect("up");
        clean.validate(&cancel()).expect("clean");

        // Simulate editing the migration after it was applied: the stored
        // record keeps the original checksum, the registry has new content.
        let seeded = MockDriver::new();
        seeded.seed_applied("001", "create_users", users_migration().checksum());
        let mut edited = Migrator::new(seeded);
        edited.must_add(
            Migration::new("001", "create_users")
                .up_sql("CREATE TABLE users (id BIGINT)")
                .down_sql("DROP TABLE users"),
        );
        let err = edited.validate(&cancel()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);
        let context = err.migration_context().expect("context");
        assert_eq!(context.operation, Operation::Validate);
    }

    #[test]
    fn validate_flags_orphan_records() {
        let driver = MockDriver::new();
        driver.seed_applied("999", "ghost", "feed");
        let mut migrator = Migrator::new(driver);
        migrator.must_add(users_migration());
        let err = migrator.validate(&cancel()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MigrationNotFound);
    }

    #[test]
    fn manual_checksum_drift_is_detected() {
        let seeded = MockDriver::new();
        seeded.seed_applied("002", "backfill", "v1");
        let mut migrator = Migrator::new(seeded);
        migrator.must_add(
            Migration::new("002", "backfill")
                .manual_checksum("v2")
                .up_fn(|_| Ok(())),
        );
        let err = migrator.validate(&cancel()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);
    }

    #[test]
    fn dry_run_up_lists_pending_with_sql() {
        let mut migrator = Migrator::new(MockDriver::new());
        migrator.must_add(users_migration());
        migrator.must_add(Migration::new("002", "one_way").up_sql("SELECT 1"));

        let plans = migrator
            .dry_run(&cancel(), Direction::Up, None)
            .expect("plan");
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].version, "001");
        assert_eq!(plans[0].sql, "CREATE TABLE users (id INT)");
        assert!(plans[0].warnings.is_empty());
        assert!(plans[1]
            .warnings
            .contains(&"No rollback defined".to_string()));

        let limited = migrator
            .dry_run(&cancel(), Direction::Up, Some(1))
            .expect("plan");
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn dry_run_down_warns_about_destructive_rollbacks() {
        let mut migrator = Migrator::new(MockDriver::new());
        migrator.must_add(users_migration());
        migrator.up(&cancel()).expect("up");

        let plans = migrator
            .dry_run(&cancel(), Direction::Down, None)
            .expect("plan");
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].direction, Direction::Down);
        assert_eq!(plans[0].sql, "DROP TABLE users");
        assert!(plans[0]
            .warnings
            .contains(&"Destructive operation".to_string()));
        assert!(plans[0].is_destructive);
    }

    #[test]
    fn dry_run_touches_no_state() {
        let driver = MockDriver::new();
        let handle = driver.handle();
        let mut migrator = Migrator::new(driver);
        migrator.must_add(users_migration());
        migrator
            .dry_run(&cancel(), Direction::Up, None)
            .expect("plan");
        assert!(handle.applied_versions().is_empty());
        assert!(handle
            .events()
            .iter()
            .all(|e| !matches!(e, MockEvent::Lock | MockEvent::Exec | MockEvent::Record(_))));
    }

    #[test]
    fn explain_reports_direction_by_state() {
        let mut migrator = Migrator::new(MockDriver::new());
        migrator.must_add(users_migration());

        let plan = migrator.explain(&cancel(), "001").expect("pending");
        assert_eq!(plan.direction, Direction::Up);
        assert_eq!(plan.status, Status::Pending);

        migrator.up(&cancel()).expect("up");
        let plan = migrator.explain(&cancel(), "001").expect("applied");
        assert_eq!(plan.direction, Direction::Down);
        assert_eq!(plan.status, Status::Applied);

        let err = migrator.explain(&cancel(), "404").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MigrationNotFound);
    }

    #[test]
    fn lock_failure_surfaces_as_lock_timeout_without_touching_state() {
        let (a, b) = MockDriver::pair();
        let handle = a.handle();
        let cancel_token = cancel();

        let mut first = Migrator::new(a);
        first.must_add(users_migration());
        // Hold the lock through a second driver handle.
        let mut blocker = b;
        blocker
            .lock(&cancel_token, std::time::Duration::from_secs(30))
            .expect("lock");

        let err = first.up(&cancel_token).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LockTimeout);
        assert!(handle.applied_versions().is_empty());

        blocker.unlock(&cancel_token).expect("unlock");
        assert_eq!(first.up(&cancel_token).expect("up"), 1);
    }

    #[test]
    fn cancellation_before_apply_aborts_cleanly() {
        let driver = MockDriver::new();
        let handle = driver.handle();
        let mut migrator = Migrator::new(driver);
        migrator.must_add(users_migration());

        let (token, trigger) = CancelToken::pair();
        trigger.cancel();
        let err = migrator.up(&token).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(handle.applied_versions().is_empty());
    }

    #[test]
    fn close_drops_cache_and_closes_driver() {
        let driver = MockDriver::new();
        let handle = driver.handle();
        let mut migrator = Migrator::new(driver);
        migrator.must_add(users_migration());
        migrator.up(&cancel()).expect("up");
        migrator.close().expect("close");
        assert!(handle.events().contains(&MockEvent::Close));
    }
}
