//! Driver implementations and the shared helpers they compose.
//!
//! Concrete drivers differ mainly in their locking primitive and in two
//! SQL dialect strategies: identifier quoting and parameter placeholders.
//! The [`base`] module carries those strategies plus the bookkeeping-table
//! statement builders; [`table_lock`] implements the distributed lock
//! protocol for databases without native advisory locks.

pub mod base;
pub mod mock;
pub mod table_lock;

#[cfg(feature = "postgres")]
pub mod cockroach;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use mock::MockDriver;

#[cfg(feature = "postgres")]
pub use cockroach::CockroachDriver;
#[cfg(feature = "postgres")]
pub use postgres::PostgresDriver;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDriver;
