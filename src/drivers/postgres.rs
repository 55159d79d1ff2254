//! PostgreSQL driver.
//!
//! Locking uses a session-scoped advisory lock whose key is derived from
//! the bookkeeping table name, so independent migration tables never
//! contend with each other. The client is a single connection, which makes
//! the advisory lock inherently session-pinned: `lock` and `unlock` always
//! execute on the same session.

use std::time::Duration;

use may_postgres::Client;

use crate::cancel::CancelToken;
use crate::driver::{Applied, Driver, ExecCallback};
use crate::drivers::base::{self, Placeholder, QuoteStyle};
use crate::error::MigrateError;
use crate::executor::{IsolationLevel, MigrationExec, Value};
use crate::migration::Migration;

/// [`Driver`] implementation for PostgreSQL.
pub struct PostgresDriver {
    client: Client,
    table: String,
    lock_id: i64,
}

impl PostgresDriver {
    /// Wrap an open client, using the default bookkeeping table name.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self::with_table_name(client, crate::config::DEFAULT_TABLE_NAME)
    }

    /// Wrap an open client with a custom bookkeeping table name.
    #[must_use]
    pub fn with_table_name(client: Client, table: impl Into<String>) -> Self {
        let table = table.into();
        let lock_id = hash_table_name(&table);
        PostgresDriver {
            client,
            table,
            lock_id,
        }
    }

    /// Connect to `dsn` and wrap the resulting client.
    pub fn connect(dsn: &str) -> Result<Self, MigrateError> {
        let client = may_postgres::connect(dsn).map_err(MigrateError::database)?;
        Ok(Self::new(client))
    }

    /// Connect to `dsn` with a custom bookkeeping table name.
    pub fn connect_with_table_name(
        dsn: &str,
        table: impl Into<String>,
    ) -> Result<Self, MigrateError> {
        let client = may_postgres::connect(dsn).map_err(MigrateError::database)?;
        Ok(Self::with_table_name(client, table))
    }

    fn quoted_table(&self) -> String {
        base::quote_identifier(&self.table, QuoteStyle::DoubleQuote)
    }
}

/// Derive a stable advisory-lock key from the table name, so different
/// migration tables use different locks.
fn hash_table_name(name: &str) -> i64 {
    let mut hash: i64 = 0;
    for (i, c) in name.chars().enumerate() {
        hash = hash
            .wrapping_mul(31)
            .wrapping_add(c as i64)
            .wrapping_add(i as i64);
    }
    hash
}

impl Driver for PostgresDriver {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn init(&mut self, cancel: &CancelToken) -> Result<(), MigrateError> {
        cancel.check()?;
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                version VARCHAR(255) PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                checksum VARCHAR(64) NOT NULL
            )",
            self.quoted_table()
        );
        self.client
            .execute(&sql, &[])
            .map_err(MigrateError::database)?;
        Ok(())
    }

    fn get_applied(&mut self, cancel: &CancelToken) -> Result<Vec<Applied>, MigrateError> {
        cancel.check()?;
        // applied_at is cast to text and parsed; see drivers::base.
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
        cancel.check()?;
        let set_timeout = format!("SET lock_timeout = '{}ms'", timeout.as_millis());
        self.client
            .execute(&set_timeout, &[])
            .map_err(MigrateError::database)?;

        let row = self
            .client
            .query_one("SELECT pg_try_advisory_lock($1)", &[&self.lock_id])
            .map_err(MigrateError::database)?;
        let acquired: bool = row.get(0);
        if !acquired {
            return Err(MigrateError::LockTimeout {
                detail: format!(
                    "advisory lock {} for table '{}' (postgres)",
                    self.lock_id, self.table
                ),
            });
        }
        Ok(())
    }

    fn unlock(&mut self, cancel: &CancelToken) -> Result<(), MigrateError> {
        cancel.check()?;
        self.client
            .query_one("SELECT pg_advisory_unlock($1)", &[&self.lock_id])
            .map_err(MigrateError::database)?;
        Ok(())
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
        // The connection closes when the client drops.
        Ok(())
    }
}

pub(crate) struct PostgresExec<'a> {
    pub(crate) client: &'a Client,
}

impl MigrationExec for PostgresExec<'_> {
    fn execute(&mut self, sql: &str) -> Result<u64, MigrateError> {
        self.client.execute(sql, &[]).map_err(MigrateError::database)
    }

    fn query(&mut self, sql: &str) -> Result<Vec<Vec<Value>>, MigrateError> {
        let rows = self.client.query(sql, &[]).map_err(MigrateError::database)?;
        let mut result = Vec::new();
        for row in rows {
            let mut cells = Vec::with_capacity(row.len());
            for i in 0..row.len() {
                cells.push(convert_cell(&row, i));
            }
            result.push(cells);
        }
        Ok(result)
    }
}

// Best-effort conversion: try the common wire types in turn. Cells of
// other types come back as Null; migration bodies needing them should
// cast to text in SQL.
fn convert_cell(row: &may_postgres::Row, i: usize) -> Value {
    if let Ok(v) = row.try_get::<_, Option<i64>>(i) {
        return v.map_or(Value::Null, Value::Integer);
    }
    if let Ok(v) = row.try_get::<_, Option<i32>>(i) {
        return v.map_or(Value::Null, |v| Value::Integer(i64::from(v)));
    }
    if let Ok(v) = row.try_get::<_, Option<f64>>(i) {
        return v.map_or(Value::Null, Value::Real);
    }
    if let Ok(v) = row.try_get::<_, Option<bool>>(i) {
        return v.map_or(Value::Null, Value::Bool);
    }
    if let Ok(v) = row.try_get::<_, Option<String>>(i) {
        return v.map_or(Value::Null, Value::Text);
    }
    Value::Null
}
