//! CockroachDB driver.
//!
//! CockroachDB speaks the PostgreSQL wire protocol but has no advisory
//! locks, so distributed mutual exclusion uses the lock-table protocol
//! (see [`crate::drivers::table_lock`]): a `<table>_lock` table holding at
//! most one active row, with expiry-based cleanup and owner-scoped
//! release.

use std::time::Duration;

use may_postgres::Client;

use crate::cancel::CancelToken;
use crate::driver::{Applied, Driver, ExecCallback};
use crate::drivers::base::{self, Placeholder, QuoteStyle};
use crate::drivers::postgres::PostgresExec;
use crate::drivers::table_lock::{self, LockTable, LOCK_KEY};
use crate::error::MigrateError;
use crate::executor::IsolationLevel;
use crate::migration::Migration;

/// [`Driver`] implementation for CockroachDB.
pub struct CockroachDriver {
    client: Client,
    table: String,
    lock_table: String,
    owner_id: String,
}

impl CockroachDriver {
    /// Wrap an open client, using the default bookkeeping table name.
    pub fn new(client: Client) -> Result<Self, MigrateError> {
        Self::with_table_name(client, crate::config::DEFAULT_TABLE_NAME)
    }

    /// Wrap an open client with a custom bookkeeping table name.
    pub fn with_table_name(client: Client, table: impl Into<String>) -> Result<Self, MigrateError> {
        let table = table.into();
        let lock_table = format!("{table}_lock");
        let owner_id = base::generate_owner_id()?;
        Ok(CockroachDriver {
            client,
            table,
            lock_table,
            owner_id,
        })
    }

    /// Connect to `dsn` and wrap the resulting client.
    pub fn connect(dsn: &str) -> Result<Self, MigrateError> {
        let client = may_postgres::connect(dsn).map_err(MigrateError::database)?;
        Self::new(client)
    }

    /// Connect to `dsn` with a custom bookkeeping table name.
    pub fn connect_with_table_name(
        dsn: &str,
        table: impl Into<String>,
    ) -> Result<Self, MigrateError> {
        let client = may_postgres::connect(dsn).map_err(MigrateError::database)?;
        Self::with_table_name(client, table)
    }

    fn quoted_table(&self) -> String {
        base::quote_identifier(&self.table, QuoteStyle::DoubleQuote)
    }

    fn quoted_lock_table(&self) -> String {
        base::quote_identifier(&self.lock_table, QuoteStyle::DoubleQuote)
    }
}

struct ClientLockTable<'a> {
    client: &'a Client,
    lock_table: String,
}

impl LockTable for ClientLockTable<'_> {
    fn delete_expired(&mut self, cancel: &CancelToken) -> Result<(), MigrateError> {
        cancel.check()?;
        let sql = format!(
            "DELETE FROM {} WHERE lock_key = $1 AND expires_at < now()",
            self.lock_table
        );
        self.client
            .execute(&sql, &[&LOCK_KEY])
            .map_err(MigrateError::database)?;
        Ok(())
    }

    fn active_lock_exists(&mut self, cancel: &CancelToken) -> Result<bool, MigrateError> {
        cancel.check()?;
        let sql = format!(
            "SELECT 1 FROM {} WHERE lock_key = $1 AND expires_at >= now() LIMIT 1",
            self.lock_table
        );
        let rows = self
            .client
            .query(&sql, &[&LOCK_KEY])
            .map_err(MigrateError::database)?;
        Ok(!rows.is_empty())
    }

    fn try_insert_lock(
        &mut self,
        cancel: &CancelToken,
        ttl: Duration,
        owner_id: &str,
    ) -> Result<bool, MigrateError> {
        cancel.check()?;
        let sql = format!(
            "INSERT INTO {} (lock_key, expires_at, owner_id) \
             VALUES ($1, now() + $2::interval, $3)",
            self.lock_table
        );
        let interval = format!("{} seconds", ttl.as_secs().max(1));
        // A primary-key violation here means another process won the race.
        match self.client.execute(&sql, &[&LOCK_KEY, &interval, &owner_id]) {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    fn delete_owned(&mut self, cancel: &CancelToken, owner_id: &str) -> Result<(), MigrateError> {
        cancel.check()?;
        let sql = format!(
            "DELETE FROM {} WHERE lock_key = $1 AND owner_id = $2",
            self.lock_table
        );
        self.client
            .execute(&sql, &[&LOCK_KEY, &owner_id])
            .map_err(MigrateError::database)?;
        Ok(())
    }
}

impl Driver for CockroachDriver {
    fn name(&self) -> &'static str {
        "cockroachdb"
    }

    fn init(&mut self, cancel: &CancelToken) -> Result<(), MigrateError> {
        cancel.check()?;
        let migrations = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                version VARCHAR(255) PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                checksum VARCHAR(64) NOT NULL
            )",
            self.quoted_table()
        );
        self.client
            .execute(&migrations, &[])
            .map_err(MigrateError::database)?;

        let lock = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                lock_key VARCHAR(255) PRIMARY KEY,
                acquired_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                expires_at TIMESTAMP NOT NULL,
                owner_id VARCHAR(64) NOT NULL
            )",
            self.quoted_lock_table()
        );
        self.client
            .execute(&lock, &[])
            .map_err(MigrateError::database)?;
        Ok(())
    }

    fn get_applied(&mut self, cancel: &CancelToken) -> Result<Vec<Applied>, MigrateError> {
        cancel.check()?;
        let sql = format!(
            "SELECT version, name, applied_at::text, checksum FROM {} ORDER BY applied_at ASC",
            self.quoted_table()
        );
        let rows = self
            .client
            .query(&sql, &[])
            .map_err(MigrateError::database)?;

        let mut applied = Vec::new();
        for row in rows {
            let version: String = row.get(0);
            let name: String = row.get(1);
            let applied_at: String = row.get(2);
            let checksum: String = row.get(3);
            applied.push(Applied {
                version,
                name,
                applied_at: base::parse_timestamp(&applied_at)?,
                checksum,
            });
        }
        Ok(applied)
    }

    fn record(
        &mut self,
        cancel: &CancelToken,
        migration: &Migration,
    ) -> Result<(), MigrateError> {
        cancel.check()?;
        let sql = base::insert_applied_sql(&self.table, QuoteStyle::DoubleQuote, Placeholder::Dollar);
        self.client
            .execute(
                &sql,
                &[
                    &migration.version(),
                    &migration.name(),
                    &migration.checksum(),
                ],
            )
            .map_err(MigrateError::database)?;
        Ok(())
    }

    fn remove(&mut self, cancel: &CancelToken, version: &str) -> Result<(), MigrateError> {
        cancel.check()?;
        let sql = base::remove_applied_sql(&self.table, QuoteStyle::DoubleQuote, Placeholder::Dollar);
        self.client
            .execute(&sql, &[&version])
            .map_err(MigrateError::database)?;
        Ok(())
    }

    fn lock(&mut self, cancel: &CancelToken, timeout: Duration) -> Result<(), MigrateError> {
        let mut table = ClientLockTable {
            client: &self.client,
            lock_table: self.quoted_lock_table(),
        };
        table_lock::acquire(&mut table, cancel, &self.owner_id, timeout)
    }

    fn unlock(&mut self, cancel: &CancelToken) -> Result<(), MigrateError> {
        let mut table = ClientLockTable {
            client: &self.client,
            lock_table: self.quoted_lock_table(),
        };
        table_lock::release(&mut table, cancel, &self.owner_id)
    }

    fn exec(
        &mut self,
        cancel: &CancelToken,
        isolation: Option<IsolationLevel>,
        body: ExecCallback<'_>,
    ) -> Result<(), MigrateError> {
        cancel.check()?;
        self.client
            .execute("BEGIN", &[])
            .map_err(MigrateError::database)?;

        if let Some(level) = isolation {
            let set = format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql());
            if let Err(err) = self.client.execute(&set, &[]) {
                let _ = self.client.execute("ROLLBACK", &[]);
                return Err(MigrateError::database(err));
            }
        }

        let mut exec = PostgresExec {
            client: &self.client,
        };
        match body(&mut exec) {
            Ok(()) => {
                self.client
                    .execute("COMMIT", &[])
                    .map_err(MigrateError::database)?;
                Ok(())
            }
            Err(err) => {
                let _ = self.client.execute("ROLLBACK", &[]);
                Err(err)
            }
        }
    }

    fn close(&mut self) -> Result<(), MigrateError> {
        Ok(())
    }
}
