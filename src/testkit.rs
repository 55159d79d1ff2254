//! Test harness for driver implementers.
//!
//! [`TestHarness`] wraps a [`Migrator`] with helpers that panic on error
//! instead of returning it, cutting boilerplate in driver test suites, and
//! ships two ready-made scenarios: [`TestHarness::test_up_down`] and the
//! more thorough [`TestHarness::test_rollback`].
//!
//! ```
//! use floodgate::testkit::TestHarness;
//! use floodgate::drivers::MockDriver;
//! use floodgate::Migration;
//!
//! let mut harness = TestHarness::new(MockDriver::new());
//! harness.must_add(
//!     Migration::new("001", "create_users")
//!         .up_sql("CREATE TABLE users (id INT)")
//!         .down_sql("DROP TABLE users"),
//! );
//! harness.test_up_down();
//! ```

use crate::cancel::CancelToken;
use crate::driver::Driver;
use crate::migration::Migration;
use crate::migrator::Migrator;
use crate::status::{MigrationStatus, Status};

/// A [`Migrator`] wrapper whose helpers panic on error.
pub struct TestHarness {
    migrator: Migrator,
    cancel: CancelToken,
}

impl TestHarness {
    /// Wrap a driver in a fresh engine with default configuration.
    #[must_use]
    pub fn new(driver: impl Driver + 'static) -> Self {
        TestHarness {
            migrator: Migrator::new(driver),
            cancel: CancelToken::never(),
        }
    }

    /// Wrap an already configured engine.
    #[must_use]
    pub fn from_migrator(migrator: Migrator) -> Self {
        TestHarness {
            migrator,
            cancel: CancelToken::never(),
        }
    }

    /// Access the wrapped engine.
    pub fn migrator(&mut self) -> &mut Migrator {
        &mut self.migrator
    }

    /// Register a migration, panicking on error.
    pub fn must_add(&mut self, migration: Migration) {
        self.migrator.must_add(migration);
    }

    /// Apply all pending migrations, panicking on error.
    pub fn must_up(&mut self) -> usize {
        self.migrator.up(&self.cancel).expect("up failed")
    }

    /// Roll back `steps` migrations, panicking on error.
    pub fn must_down(&mut self, steps: usize) -> usize {
        self.migrator.down(&self.cancel, steps).expect("down failed")
    }

    /// Roll back everything, panicking on error.
    pub fn must_reset(&mut self) -> usize {
        self.migrator.reset(&self.cancel).expect("reset failed")
    }

    /// Validate, panicking on error.
    pub fn must_validate(&mut self) {
        self.migrator.validate(&self.cancel).expect("validate failed");
    }

    /// Status, panicking on error.
    pub fn must_status(&mut self) -> Vec<MigrationStatus> {
        self.migrator.status(&self.cancel).expect("status failed")
    }

    /// Versions currently applied, in registry order.
    pub fn applied_versions(&mut self) -> Vec<String> {
        self.must_status()
            .into_iter()
            .filter(|s| s.status != Status::Pending)
            .map(|s| s.version)
            .collect()
    }

    /// Apply every migration, then roll everything back, asserting that
    /// the applied set ends empty. The recommended smoke test for a new
    /// driver: it exercises up, down, and state tracking in one pass.
    pub fn test_up_down(&mut self) {
        let applied = self.must_up();
        assert!(applied > 0, "expected at least one migration to apply");
        self.must_validate();

        let rolled_back = self.must_reset();
        assert_eq!(
            applied, rolled_back,
            "rollback count should match apply count"
        );
        assert!(
            self.applied_versions().is_empty(),
            "applied set should be empty after reset"
        );
    }

    /// Apply everything, roll back one migration at a time until the
    /// applied set is empty, then apply everything again. Catches down
    /// migrations that only work when run together.
    pub fn test_rollback(&mut self) {
        let applied = self.must_up();
        assert!(applied > 0, "expected at least one migration to apply");

        for remaining in (0..applied).rev() {
            self.must_down(1);
            assert_eq!(
                self.applied_versions().len(),
                remaining,
                "one migration should roll back per step"
            );
        }

        let reapplied = self.must_up();
        assert_eq!(applied, reapplied, "all migrations should reapply");
        self.must_validate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::MockDriver;

    fn harness_with_two_migrations() -> TestHarness {
        let mut harness = TestHarness::new(MockDriver::new());
        harness.must_add(
            Migration::new("001", "create_users")
                .up_sql("CREATE TABLE users (id INT)")
                .down_sql("DROP TABLE users"),
        );
        harness.must_add(
            Migration::new("002", "add_email")
                .up_sql("ALTER TABLE users ADD email TEXT")
                .down_sql("ALTER TABLE users DROP email"),
        );
        harness
    }

    #[test]
    fn up_down_scenario_passes_on_the_mock_driver() {
        harness_with_two_migrations().test_up_down();
    }

    #[test]
    fn rollback_scenario_passes_on_the_mock_driver() {
        harness_with_two_migrations().test_rollback();
    }

    #[test]
    #[should_panic(expected = "down failed")]
    fn must_down_panics_without_rollback_script() {
        let mut harness = TestHarness::new(MockDriver::new());
        harness.must_add(Migration::new("001", "one_way").up_sql("SELECT 1"));
        harness.must_up();
        harness.must_down(1);
    }
}
