//! SQLite driver.
//!
//! SQLite is file-based and has database-level locking rather than
//! session-scoped advisory locks. This driver acquires the migration lock
//! by switching the connection to `PRAGMA locking_mode = EXCLUSIVE` and
//! forcing an immediate transaction, which holds the file lock until the
//! mode is reset in `unlock`. Individual migration transactions then run
//! normally under the exclusive mode.
//!
//! Timestamps are stored as ISO-8601 text. Records are written with
//! microsecond precision so the apply history keeps a total order even
//! when several migrations land within the same second.
//!
//! Isolation levels are accepted and ignored: SQLite transactions are
//! serializable by construction.

use std::time::Duration;

use chrono::Utc;
use rusqlite::types::ValueRef;
use rusqlite::Connection;

use crate::cancel::CancelToken;
use crate::driver::{Applied, Driver, ExecCallback};
use crate::drivers::base::{self, Placeholder, QuoteStyle};
use crate::error::MigrateError;
use crate::executor::{IsolationLevel, MigrationExec, Value};
use crate::migration::Migration;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// [`Driver`] implementation for SQLite 3.8+.
pub struct SqliteDriver {
    conn: Option<Connection>,
    table: String,
}

impl SqliteDriver {
    /// Wrap an open connection, using the default bookkeeping table name.
    #[must_use]
    pub fn new(conn: Connection) -> Self {
        Self::with_table_name(conn, crate::config::DEFAULT_TABLE_NAME)
    }

    /// Wrap an open connection with a custom bookkeeping table name.
    #[must_use]
    pub fn with_table_name(conn: Connection, table: impl Into<String>) -> Self {
        SqliteDriver {
            conn: Some(conn),
            table: table.into(),
        }
    }

    /// Open a database file (or `:memory:`) and wrap it.
    pub fn open(path: &str) -> Result<Self, MigrateError> {
        let conn = Connection::open(path).map_err(MigrateError::database)?;
        Ok(Self::new(conn))
    }

    /// Open a database file with a custom bookkeeping table name.
    pub fn open_with_table_name(
        path: &str,
        table: impl Into<String>,
    ) -> Result<Self, MigrateError> {
        let conn = Connection::open(path).map_err(MigrateError::database)?;
        Ok(Self::with_table_name(conn, table))
    }

    fn conn(&self) -> Result<&Connection, MigrateError> {
        self.conn
            .as_ref()
            .ok_or_else(|| MigrateError::database("sqlite connection is closed"))
    }

    fn quoted_table(&self) -> String {
        base::quote_identifier(&self.table, QuoteStyle::DoubleQuote)
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::DatabaseBusy
                || e.code == rusqlite::ErrorCode::DatabaseLocked
    )
}

impl Driver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn init(&mut self, cancel: &CancelToken) -> Result<(), MigrateError> {
        cancel.check()?;
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                version TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now')),
                checksum TEXT NOT NULL
            ) WITHOUT ROWID",
            self.quoted_table()
        );
        self.conn()?
            .execute_batch(&sql)
            .map_err(MigrateError::database)
    }

    fn get_applied(&mut self, cancel: &CancelToken) -> Result<Vec<Applied>, MigrateError> {
        cancel.check()?;
        let conn = self.conn()?;
        let sql = base::select_applied_sql(&self.table, QuoteStyle::DoubleQuote);
        let mut stmt = conn.prepare(&sql).map_err(MigrateError::database)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(MigrateError::database)?;

        let mut applied = Vec::new();
        for row in rows {
            let (version, name, applied_at, checksum) = row.map_err(MigrateError::database)?;
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
        let sql = format!(
            "INSERT INTO {} (version, name, applied_at, checksum) VALUES (?1, ?2, ?3, ?4)",
            self.quoted_table()
        );
        let applied_at = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        self.conn()?
            .execute(
                &sql,
                rusqlite::params![
                    migration.version(),
                    migration.name(),
                    applied_at,
                    migration.checksum()
                ],
            )
            .map_err(MigrateError::database)?;
        Ok(())
    }

    fn remove(&mut self, cancel: &CancelToken, version: &str) -> Result<(), MigrateError> {
        cancel.check()?;
        let sql = base::remove_applied_sql(&self.table, QuoteStyle::DoubleQuote, Placeholder::Question);
        self.conn()?
            .execute(&sql, rusqlite::params![version])
            .map_err(MigrateError::database)?;
        Ok(())
    }

    fn lock(&mut self, cancel: &CancelToken, timeout: Duration) -> Result<(), MigrateError> {
        cancel.check()?;
        let table = self.table.clone();
        let conn = self.conn()?;

        conn.busy_timeout(timeout).map_err(MigrateError::database)?;
        conn.pragma_update(None, "locking_mode", "EXCLUSIVE")
            .map_err(MigrateError::database)?;

        // BEGIN IMMEDIATE takes the file lock right away instead of on the
        // first write; under EXCLUSIVE mode the lock then outlives the
        // transaction, so it can be committed immediately.
        match conn.execute_batch("BEGIN IMMEDIATE; COMMIT") {
            Ok(()) => Ok(()),
            Err(err) if is_busy(&err) => Err(MigrateError::LockTimeout {
                detail: format!("exclusive file lock for table '{table}' (sqlite)"),
            }),
            Err(err) => Err(MigrateError::database(err)),
        }
    }

    fn unlock(&mut self, cancel: &CancelToken) -> Result<(), MigrateError> {
        cancel.check()?;
        let conn = self.conn()?;
        conn.pragma_update(None, "locking_mode", "NORMAL")
            .map_err(MigrateError::database)?;
        // The mode change only takes effect at the next database access,
        // so read something to release the file lock now.
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(MigrateError::database)?;
        Ok(())
    }

    fn exec(
        &mut self,
        cancel: &CancelToken,
        _isolation: Option<IsolationLevel>,
        body: ExecCallback<'_>,
    ) -> Result<(), MigrateError> {
        cancel.check()?;
        let conn = self.conn()?;
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(MigrateError::database)?;

        let mut exec = SqliteExec { conn };
        match body(&mut exec) {
            Ok(()) => conn.execute_batch("COMMIT").map_err(MigrateError::database),
            Err(err) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(err)
            }
        }
    }

    fn close(&mut self) -> Result<(), MigrateError> {
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(conn, err)| {
                self.conn = Some(conn);
                MigrateError::database(err)
            }),
            None => Ok(()),
        }
    }
}

struct SqliteExec<'a> {
    conn: &'a Connection,
}

impl MigrationExec for SqliteExec<'_> {
    fn execute(&mut self, sql: &str) -> Result<u64, MigrateError> {
        // execute_batch supports multi-statement migration bodies.
        self.conn
            .execute_batch(sql)
            .map_err(MigrateError::database)?;
        #[allow(clippy::unnecessary_cast)]
        Ok(self.conn.changes() as u64)
    }

    fn query(&mut self, sql: &str) -> Result<Vec<Vec<Value>>, MigrateError> {
        let mut stmt = self.conn.prepare(sql).map_err(MigrateError::database)?;
        let column_count = stmt.column_count();
        let mut rows = stmt.query([]).map_err(MigrateError::database)?;
        let mut result = Vec::new();
        while let Some(row) = rows.next().map_err(MigrateError::database)? {
            let mut cells = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let cell = match row.get_ref(i).map_err(MigrateError::database)? {
                    ValueRef::Null => Value::Null,
                    ValueRef::Integer(v) => Value::Integer(v),
                    ValueRef::Real(v) => Value::Real(v),
                    ValueRef::Text(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
                    ValueRef::Blob(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
                };
                cells.push(cell);
            }
            result.push(cells);
        }
        Ok(result)
    }
}
