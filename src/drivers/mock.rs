//! In-memory driver for testing the engine without a database.
//!
//! The mock records every driver call in an event log, can inject failures
//! into individual operations, and can share its state between two driver
//! instances ([`MockDriver::pair`]) to exercise cross-engine lock
//! contention. SQL bodies are not interpreted; the statements a migration
//! executes are captured verbatim.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::cancel::CancelToken;
use crate::driver::{Applied, Driver, ExecCallback};
use crate::error::MigrateError;
use crate::executor::{IsolationLevel, MigrationExec, Value};
use crate::migration::Migration;

/// One observed driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Init,
    Lock,
    Unlock,
    Exec,
    Record(String),
    Remove(String),
    Close,
}

#[derive(Default)]
struct MockState {
    applied: Vec<Applied>,
    locked: bool,
    seq: i64,
    events: Vec<MockEvent>,
    executed_sql: Vec<String>,
    fail_init: Option<String>,
    fail_lock: Option<String>,
    fail_record: Option<String>,
    fail_exec: Option<String>,
}

// Applied-at stamps count up from a fixed epoch so tests are independent
// of the wall clock.
const MOCK_EPOCH: i64 = 1_700_000_000;

fn mock_timestamp(seq: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(MOCK_EPOCH + seq, 0)
        .single()
        .expect("valid mock timestamp")
}

/// In-memory [`Driver`] implementation.
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockDriver {
    fn default() -> Self {
        MockDriver::new()
    }
}

impl MockDriver {
    /// A fresh driver with empty state.
    #[must_use]
    pub fn new() -> Self {
        MockDriver {
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Two drivers sharing one database state, for contention tests.
    #[must_use]
    pub fn pair() -> (MockDriver, MockDriver) {
        let a = MockDriver::new();
        let b = MockDriver {
            state: Arc::clone(&a.state),
        };
        (a, b)
    }

    /// A second handle onto this driver's state, for inspection after the
    /// driver has been moved into a `Migrator`.
    #[must_use]
    pub fn handle(&self) -> MockDriver {
        MockDriver {
            state: Arc::clone(&self.state),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }

    /// Make `init` fail with a database error.
    pub fn fail_init(&self, message: impl Into<String>) {
        self.state().fail_init = Some(message.into());
    }

    /// Make `lock` fail with a database error.
    pub fn fail_lock(&self, message: impl Into<String>) {
        self.state().fail_lock = Some(message.into());
    }

    /// Make `record` fail with a database error.
    pub fn fail_record(&self, message: impl Into<String>) {
        self.state().fail_record = Some(message.into());
    }

    /// Make `exec` fail with a database error before running the body.
    pub fn fail_exec(&self, message: impl Into<String>) {
        self.state().fail_exec = Some(message.into());
    }

    /// Seed an applied record directly, bypassing the engine.
    pub fn seed_applied(&self, version: &str, name: &str, checksum: &str) {
        let mut state = self.state();
        let seq = state.seq;
        state.seq += 1;
        state.applied.push(Applied {
            version: version.to_string(),
            name: name.to_string(),
            applied_at: mock_timestamp(seq),
            checksum: checksum.to_string(),
        });
    }

    /// All observed events, in call order.
    #[must_use]
    pub fn events(&self) -> Vec<MockEvent> {
        self.state().events.clone()
    }

    /// Versions recorded as applied, in apply order.
    #[must_use]
    pub fn applied_versions(&self) -> Vec<String> {
        self.state()
            .applied
            .iter()
            .map(|a| a.version.clone())
            .collect()
    }

    /// SQL statements executed by migration bodies, in order.
    #[must_use]
    pub fn executed_sql(&self) -> Vec<String> {
        self.state().executed_sql.clone()
    }

    /// Whether the mock lock is currently held.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.state().locked
    }
}

struct MockExec {
    statements: Vec<String>,
}

impl MigrationExec for MockExec {
    fn execute(&mut self, sql: &str) -> Result<u64, MigrateError> {
        self.statements.push(sql.to_string());
        Ok(0)
    }

    fn query(&mut self, sql: &str) -> Result<Vec<Vec<Value>>, MigrateError> {
        self.statements.push(sql.to_string());
        Ok(Vec::new())
    }
}

impl Driver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn init(&mut self, cancel: &CancelToken) -> Result<(), MigrateError> {
        cancel.check()?;
        let mut state = self.state();
        if let Some(message) = state.fail_init.clone() {
            return Err(MigrateError::database(message));
        }
        state.events.push(MockEvent::Init);
        Ok(())
    }

    fn get_applied(&mut self, cancel: &CancelToken) -> Result<Vec<Applied>, MigrateError> {
        cancel.check()?;
        Ok(self.state().applied.clone())
    }

    fn record(
        &mut self,
        cancel: &CancelToken,
        migration: &Migration,
    ) -> Result<(), MigrateError> {
        cancel.check()?;
        let mut state = self.state();
        if let Some(message) = state.fail_record.clone() {
            return Err(MigrateError::database(message));
        }
        let seq = state.seq;
        state.seq += 1;
        state.applied.push(Applied {
            version: migration.version().to_string(),
            name: migration.name().to_string(),
            applied_at: mock_timestamp(seq),
            checksum: migration.checksum().to_string(),
        });
        state
            .events
            .push(MockEvent::Record(migration.version().to_string()));
        Ok(())
    }

    fn remove(&mut self, cancel: &CancelToken, version: &str) -> Result<(), MigrateError> {
        cancel.check()?;
        let mut state = self.state();
        state.applied.retain(|a| a.version != version);
        state.events.push(MockEvent::Remove(version.to_string()));
        Ok(())
    }

    fn lock(&mut self, cancel: &CancelToken, _timeout: Duration) -> Result<(), MigrateError> {
        cancel.check()?;
        let mut state = self.state();
        if let Some(message) = state.fail_lock.clone() {
            return Err(MigrateError::database(message));
        }
        if state.locked {
            return Err(MigrateError::LockTimeout {
                detail: "mock lock already held".to_string(),
            });
        }
        state.locked = true;
        state.events.push(MockEvent::Lock);
        Ok(())
    }

    fn unlock(&mut self, cancel: &CancelToken) -> Result<(), MigrateError> {
        cancel.check()?;
        let mut state = self.state();
        state.locked = false;
        state.events.push(MockEvent::Unlock);
        Ok(())
    }

    fn exec(
        &mut self,
        cancel: &CancelToken,
        _isolation: Option<IsolationLevel>,
        body: ExecCallback<'_>,
    ) -> Result<(), MigrateError> {
        cancel.check()?;
        if let Some(message) = self.state().fail_exec.clone() {
            return Err(MigrateError::database(message));
        }
        let mut exec = MockExec {
            statements: Vec::new(),
        };
        let result = body(&mut exec);
        let mut state = self.state();
        state.executed_sql.extend(exec.statements);
        state.events.push(MockEvent::Exec);
        result
    }

    fn close(&mut self) -> Result<(), MigrateError> {
        self.state().events.push(MockEvent::Close);
        Ok(())
    }
}
