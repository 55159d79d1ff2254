//! Distributed locking through a shared lock table.
//!
//! Databases without advisory locks (CockroachDB, ClickHouse, ...) get
//! mutual exclusion from a table holding at most one active row per lock
//! key. Safety comes from the `(owner_id, expires_at)` protocol, not from
//! any lower-level locking:
//!
//! - rows carry an expiry; any process attempting to acquire first deletes
//!   expired rows (best effort), so a crashed holder cannot wedge the lock;
//! - release deletes only rows matching both the lock key and this
//!   instance's owner id, so a holder whose lease expired can never delete
//!   a successor's lock;
//! - contention is retried with exponential backoff until the deadline.
//!
//! Drivers implement [`LockTable`] with their own SQL and call
//! [`acquire`]/[`release`].

use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::error::MigrateError;

/// The single lock key used by the migration lock.
pub const LOCK_KEY: &str = "migration_lock";

/// First backoff delay after a contended attempt.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(50);

/// Backoff ceiling.
pub const MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Storage operations of the lock table, implemented per driver.
pub trait LockTable {
    /// Best-effort delete of rows for [`LOCK_KEY`] whose expiry has passed.
    fn delete_expired(&mut self, cancel: &CancelToken) -> Result<(), MigrateError>;

    /// Whether an unexpired row exists for [`LOCK_KEY`].
    fn active_lock_exists(&mut self, cancel: &CancelToken) -> Result<bool, MigrateError>;

    /// Try to insert the lock row with expiry `now + ttl` and the given
    /// owner. Returns `false` when a concurrent insert won the race.
    fn try_insert_lock(
        &mut self,
        cancel: &CancelToken,
        ttl: Duration,
        owner_id: &str,
    ) -> Result<bool, MigrateError>;

    /// Delete rows matching both [`LOCK_KEY`] and `owner_id`. Never checks
    /// before deleting; the owner predicate makes the release race-free.
    fn delete_owned(&mut self, cancel: &CancelToken, owner_id: &str) -> Result<(), MigrateError>;
}

/// Acquire the migration lock, waiting at most `timeout`.
///
/// Storage errors during the check or insert are treated as contention and
/// retried; the deadline bounds the total wait either way.
pub fn acquire(
    table: &mut dyn LockTable,
    cancel: &CancelToken,
    owner_id: &str,
    timeout: Duration,
) -> Result<(), MigrateError> {
    let start = Instant::now();
    let mut backoff = INITIAL_BACKOFF;

    loop {
        cancel.check()?;

        let _ = table.delete_expired(cancel);

        let held = table.active_lock_exists(cancel).unwrap_or(true);
        if !held {
            match table.try_insert_lock(cancel, timeout, owner_id) {
                Ok(true) => {
                    tracing::debug!(owner_id, "lock-table row acquired");
                    return Ok(());
                }
                // Lost the insert race or transient storage error; back off.
                Ok(false) | Err(_) => {}
            }
        }

        if start.elapsed() >= timeout {
            return Err(MigrateError::LockTimeout {
                detail: format!(
                    "lock table still contended after {} ms",
                    timeout.as_millis()
                ),
            });
        }

        cancel.sleep(backoff)?;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

/// Release the migration lock held by `owner_id`.
pub fn release(
    table: &mut dyn LockTable,
    cancel: &CancelToken,
    owner_id: &str,
) -> Result<(), MigrateError> {
    table.delete_owned(cancel, owner_id)?;
    tracing::debug!(owner_id, "lock-table row released");
    Ok(())
}
