//! # Floodgate
//!
//! Checksum-verified, lock-protected database schema migrations with
//! pluggable drivers.
//!
//! Migrations are registered in code, ordered by a natural-order version
//! comparator, applied each in its own transaction, and recorded in a
//! bookkeeping table. A distributed lock makes concurrent runs from
//! multiple processes safe; content checksums detect migrations that were
//! edited after being applied.
//!
//! ## Architecture
//!
//! - [`Migration`]: one schema change - SQL text, a code callback, or both
//! - [`Registry`]: version-keyed collection with a canonical natural order
//! - [`Driver`]: adapter binding the engine to one database family
//! - [`Migrator`]: the engine - up/down/status/validate/plan under a
//!   distributed lock
//! - [`drivers`]: SQLite, PostgreSQL, CockroachDB, and an in-memory mock
//!
//! ## Example
//!
//! ```no_run
//! use floodgate::{CancelToken, Migration, Migrator};
//! use floodgate::drivers::SqliteDriver;
//!
//! fn main() -> Result<(), floodgate::MigrateError> {
//!     let driver = SqliteDriver::open("app.db")?;
//!     let mut migrator = Migrator::new(driver);
//!
//!     migrator.must_add(
//!         Migration::new("001", "create_users")
//!             .up_sql("CREATE TABLE users (id INTEGER PRIMARY KEY)")
//!             .down_sql("DROP TABLE users"),
//!     );
//!     migrator.must_add(
//!         Migration::new("002", "add_email")
//!             .up_sql("ALTER TABLE users ADD email TEXT")
//!             .down_sql("ALTER TABLE users DROP COLUMN email"),
//!     );
//!
//!     let cancel = CancelToken::never();
//!     migrator.up(&cancel)?;
//!     migrator.validate(&cancel)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Checksums and drift
//!
//! SQL migrations are fingerprinted with SHA-256 after whitespace
//! normalization, so reformatting is not drift but any content change is.
//! Code-callback migrations cannot be hashed; give them a
//! [`Migration::manual_checksum`] tag and bump it when the callback's
//! behavior changes.

pub mod cancel;
pub mod checksum;
pub mod config;
pub mod driver;
pub mod drivers;
pub mod error;
pub mod executor;
pub mod migration;
pub mod migrator;
pub mod naming;
pub mod ordering;
pub mod registry;
pub mod status;
pub mod testkit;

pub use cancel::{CancelHandle, CancelToken};
pub use config::{Config, DEFAULT_LOCK_TIMEOUT, DEFAULT_TABLE_NAME};
pub use driver::{Applied, Driver, ExecCallback};
pub use error::{ErrorKind, MigrateError, MigrationError, Operation};
pub use executor::{IsolationLevel, MigrationExec, Value};
pub use migration::{Migration, MigrationFn, MigrationScript, NO_CHECKSUM_MARKER};
pub use migrator::Migrator;
pub use naming::{is_valid_migration_name, NamingConfig, NamingPattern};
pub use registry::Registry;
pub use status::{Direction, MigrationPlan, MigrationStatus, MigrationType, Status};
