//! The driver abstraction binding the engine to one database family.
//!
//! A [`Driver`] covers bookkeeping-table bootstrap, distributed locking,
//! applied-record management, and transactional execution of migration
//! bodies. The engine only consumes this trait; concrete implementations
//! live under [`crate::drivers`].
//!
//! # Locking contract
//!
//! `lock` must provide mutual exclusion across processes sharing one
//! database, using whatever primitive the database offers: session advisory
//! locks, named locks, file-level exclusive locks, or a lock table with TTL
//! and owner tracking (see [`crate::drivers::table_lock`]). Session-bound
//! locks must be acquired and released on the same underlying connection.
//! `unlock` must be idempotent and safe to call when the lock was never
//! acquired or has expired.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cancel::CancelToken;
use crate::error::MigrateError;
use crate::executor::{IsolationLevel, MigrationExec};
use crate::migration::Migration;

/// One row of the bookkeeping table: a migration that has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// Unique version identifier (primary key).
    pub version: String,
    /// Human-readable name.
    pub name: String,
    /// When the migration was applied. The applied set orders by this
    /// field, which is how the engine reconstructs apply history.
    pub applied_at: DateTime<Utc>,
    /// Checksum of the migration content at apply time.
    pub checksum: String,
}

/// Callback executed inside a driver-managed transaction.
pub type ExecCallback<'a> = &'a mut dyn FnMut(&mut dyn MigrationExec) -> Result<(), MigrateError>;

/// Adapter binding the engine to one database family.
pub trait Driver: Send {
    /// Short driver name used in error context, e.g. `"postgres"`.
    fn name(&self) -> &'static str;

    /// Idempotently create the bookkeeping table (and lock table, for
    /// lock-table drivers).
    fn init(&mut self, cancel: &CancelToken) -> Result<(), MigrateError>;

    /// All applied records, ordered by `applied_at` ascending.
    fn get_applied(&mut self, cancel: &CancelToken) -> Result<Vec<Applied>, MigrateError>;

    /// Insert the applied record for `migration` with the current time.
    fn record(&mut self, cancel: &CancelToken, migration: &Migration)
        -> Result<(), MigrateError>;

    /// Delete the applied record for `version`.
    fn remove(&mut self, cancel: &CancelToken, version: &str) -> Result<(), MigrateError>;

    /// Acquire the global migration lock, waiting at most `timeout`.
    /// Returns [`MigrateError::LockTimeout`] when unavailable in time.
    fn lock(&mut self, cancel: &CancelToken, timeout: Duration) -> Result<(), MigrateError>;

    /// Release the migration lock. Idempotent.
    fn unlock(&mut self, cancel: &CancelToken) -> Result<(), MigrateError>;

    /// Open a transaction at `isolation` (driver default when `None`),
    /// invoke `body`, commit on `Ok`, roll back on `Err`. Rollback errors
    /// are suppressed in favor of the body's error.
    fn exec(
        &mut self,
        cancel: &CancelToken,
        isolation: Option<IsolationLevel>,
        body: ExecCallback<'_>,
    ) -> Result<(), MigrateError>;

    /// Release connection resources.
    fn close(&mut self) -> Result<(), MigrateError>;
}
