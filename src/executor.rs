//! Execution facade handed to migration bodies.
//!
//! Migration callbacks run inside a driver-managed transaction and only see
//! the [`MigrationExec`] trait, which keeps them portable across database
//! families. Drivers adapt their client's row representation into the small
//! [`Value`] cell type.

use std::fmt;

use crate::error::MigrateError;

/// Transaction isolation level for migration execution.
///
/// A migration can override the engine default; when neither is set, the
/// driver's own default applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Read uncommitted (databases without it map to read committed).
    ReadUncommitted,
    /// Read committed.
    ReadCommitted,
    /// Repeatable read.
    RepeatableRead,
    /// Serializable.
    Serializable,
}

impl IsolationLevel {
    /// SQL rendering for `SET TRANSACTION ISOLATION LEVEL`.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }

    /// Parse a level from its configuration string.
    #[must_use]
    pub fn parse(s: &str) -> Option<IsolationLevel> {
        match s {
            "read-uncommitted" => Some(IsolationLevel::ReadUncommitted),
            "read-committed" => Some(IsolationLevel::ReadCommitted),
            "repeatable-read" => Some(IsolationLevel::RepeatableRead),
            "serializable" => Some(IsolationLevel::Serializable),
            _ => None,
        }
    }
}

/// A single cell of a query result row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl Value {
    /// The integer content, if this cell holds one.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// The text content, if this cell holds some.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Real(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// Execution surface available to a migration body inside its transaction.
pub trait MigrationExec {
    /// Execute one or more SQL statements, returning the affected row count
    /// of the last statement where the backend reports it.
    fn execute(&mut self, sql: &str) -> Result<u64, MigrateError>;

    /// Run a query and return all rows.
    fn query(&mut self, sql: &str) -> Result<Vec<Vec<Value>>, MigrateError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolation_level_sql() {
        assert_eq!(IsolationLevel::Serializable.as_sql(), "SERIALIZABLE");
        assert_eq!(IsolationLevel::ReadCommitted.as_sql(), "READ COMMITTED");
    }

    #[test]
    fn isolation_level_parse() {
        assert_eq!(
            IsolationLevel::parse("repeatable-read"),
            Some(IsolationLevel::RepeatableRead)
        );
        assert_eq!(IsolationLevel::parse("chaotic"), None);
    }

    #[test]
    fn value_accessors() {
        assert_eq!(Value::Integer(7).as_integer(), Some(7));
        assert_eq!(Value::Text("x".into()).as_text(), Some("x"));
        assert_eq!(Value::Null.as_integer(), None);
    }
}
