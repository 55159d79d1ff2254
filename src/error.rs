//! Error types for migration operations.
//!
//! Two levels of error exist:
//! - [`MigrateError`] is the sentinel taxonomy every operation returns.
//! - [`MigrationError`] wraps a sentinel with the context of the migration
//!   that failed (version, name, operation, driver) and is carried inside
//!   [`MigrateError::Migration`].
//!
//! Callers that need to branch on the underlying failure use
//! [`MigrateError::kind`], which looks through the context wrapper.

use std::error::Error as StdError;
use std::fmt;

/// The operation that was being performed when a migration failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Applying a migration.
    Up,
    /// Rolling back a migration.
    Down,
    /// Verifying the registry against the applied set.
    Validate,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Up => write!(f, "up"),
            Operation::Down => write!(f, "down"),
            Operation::Validate => write!(f, "validate"),
        }
    }
}

/// Stable discriminant for [`MigrateError`], usable for exit-code mapping
/// and test assertions without destructuring the full error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NoMigrations,
    VersionConflict,
    MigrationNotFound,
    ChecksumMismatch,
    LockTimeout,
    NoDriver,
    InvalidMigration,
    AlreadyApplied,
    NameTooLong,
    InvalidMigrationName,
    NoRollback,
    Naming,
    Cancelled,
    Database,
}

impl ErrorKind {
    /// Machine-readable name, used in the CLI's JSON error form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NoMigrations => "no_migrations",
            ErrorKind::VersionConflict => "version_conflict",
            ErrorKind::MigrationNotFound => "migration_not_found",
            ErrorKind::ChecksumMismatch => "checksum_mismatch",
            ErrorKind::LockTimeout => "lock_timeout",
            ErrorKind::NoDriver => "no_driver",
            ErrorKind::InvalidMigration => "invalid_migration",
            ErrorKind::AlreadyApplied => "already_applied",
            ErrorKind::NameTooLong => "name_too_long",
            ErrorKind::InvalidMigrationName => "invalid_migration_name",
            ErrorKind::NoRollback => "no_rollback",
            ErrorKind::Naming => "naming",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Database => "database",
        }
    }
}

/// Errors returned by migration operations.
#[derive(Debug)]
pub enum MigrateError {
    /// The registry holds no migrations.
    NoMigrations,
    /// A migration with the same version is already registered.
    VersionConflict { version: String },
    /// An applied version has no corresponding registered migration.
    MigrationNotFound { version: String },
    /// The stored checksum disagrees with the registered migration's.
    ChecksumMismatch {
        version: String,
        stored: String,
        current: String,
    },
    /// The migration lock could not be acquired within the timeout.
    LockTimeout { detail: String },
    /// No driver was configured for the requested backend.
    NoDriver,
    /// The migration failed structural validation.
    InvalidMigration { reason: String },
    /// The migration is already present in the applied set.
    AlreadyApplied { version: String },
    /// The migration name exceeds 63 characters.
    NameTooLong { name: String },
    /// The migration name violates the identifier grammar.
    InvalidMigrationName { name: String },
    /// Rollback was requested but the migration defines no down script.
    NoRollback { version: String },
    /// The version violates the configured naming pattern.
    Naming { message: String },
    /// The operation was cancelled through its [`crate::CancelToken`].
    Cancelled,
    /// An error surfaced by the database client.
    Database(Box<dyn StdError + Send + Sync>),
    /// A sentinel wrapped with migration context.
    Migration(Box<MigrationError>),
}

impl MigrateError {
    /// Wrap a database client error.
    pub fn database<E>(err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        MigrateError::Database(err.into())
    }

    /// The sentinel kind of this error, looking through migration context.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            MigrateError::NoMigrations => ErrorKind::NoMigrations,
            MigrateError::VersionConflict { .. } => ErrorKind::VersionConflict,
            MigrateError::MigrationNotFound { .. } => ErrorKind::MigrationNotFound,
            MigrateError::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            MigrateError::LockTimeout { .. } => ErrorKind::LockTimeout,
            MigrateError::NoDriver => ErrorKind::NoDriver,
            MigrateError::InvalidMigration { .. } => ErrorKind::InvalidMigration,
            MigrateError::AlreadyApplied { .. } => ErrorKind::AlreadyApplied,
            MigrateError::NameTooLong { .. } => ErrorKind::NameTooLong,
            MigrateError::InvalidMigrationName { .. } => ErrorKind::InvalidMigrationName,
            MigrateError::NoRollback { .. } => ErrorKind::NoRollback,
            MigrateError::Naming { .. } => ErrorKind::Naming,
            MigrateError::Cancelled => ErrorKind::Cancelled,
            MigrateError::Database(_) => ErrorKind::Database,
            MigrateError::Migration(err) => err.cause.kind(),
        }
    }

    /// The migration context, if this error carries one.
    #[must_use]
    pub fn migration_context(&self) -> Option<&MigrationError> {
        match self {
            MigrateError::Migration(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for MigrateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrateError::NoMigrations => write!(f, "no migrations registered"),
            MigrateError::VersionConflict { version } => {
                write!(f, "version conflict: {version} is already registered")
            }
            MigrateError::MigrationNotFound { version } => {
                write!(f, "migration not found: {version}")
            }
            MigrateError::ChecksumMismatch {
                version,
                stored,
                current,
            } => write!(
                f,
                "checksum mismatch for {version}: stored {stored}, current {current}"
            ),
            MigrateError::LockTimeout { detail } => write!(f, "lock timeout: {detail}"),
            MigrateError::NoDriver => write!(f, "driver not initialized"),
            MigrateError::InvalidMigration { reason } => {
                write!(f, "invalid migration: {reason}")
            }
            MigrateError::AlreadyApplied { version } => {
                write!(f, "migration {version} already applied")
            }
            MigrateError::NameTooLong { name } => {
                write!(f, "migration name too long (max 63 chars): {name}")
            }
            MigrateError::InvalidMigrationName { name } => write!(
                f,
                "invalid migration name (lowercase letters, digits, underscores): {name}"
            ),
            MigrateError::NoRollback { version } => {
                write!(f, "no rollback defined for migration {version}")
            }
            MigrateError::Naming { message } => write!(f, "{message}"),
            MigrateError::Cancelled => write!(f, "operation cancelled"),
            MigrateError::Database(err) => write!(f, "database error: {err}"),
            MigrateError::Migration(err) => err.fmt(f),
        }
    }
}

impl StdError for MigrateError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            MigrateError::Database(err) => Some(err.as_ref()),
            MigrateError::Migration(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<MigrationError> for MigrateError {
    fn from(err: MigrationError) -> Self {
        MigrateError::Migration(Box::new(err))
    }
}

/// A sentinel error enriched with the context of the failing migration.
#[derive(Debug)]
pub struct MigrationError {
    /// Version of the failing migration, e.g. `"001"`.
    pub version: String,
    /// Name of the failing migration, e.g. `"create_users"`.
    pub name: String,
    /// Operation being performed when the failure occurred.
    pub operation: Operation,
    /// Name of the driver in use, e.g. `"postgres"`.
    pub driver: String,
    /// The underlying error.
    pub cause: MigrateError,
}

impl MigrationError {
    /// Build the context wrapper and box it into a [`MigrateError`].
    #[must_use]
    pub fn wrap(
        version: &str,
        name: &str,
        operation: Operation,
        driver: &str,
        cause: MigrateError,
    ) -> MigrateError {
        MigrateError::Migration(Box::new(MigrationError {
            version: version.to_string(),
            name: name.to_string(),
            operation,
            driver: driver.to_string(),
            cause,
        }))
    }
}

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.driver.is_empty() {
            write!(
                f,
                "migration {} ({}) failed during {}: {}",
                self.version, self.name, self.operation, self.cause
            )
        } else {
            write!(
                f,
                "migration {} ({}) failed during {} operation on {}: {}",
                self.version, self.name, self.operation, self.driver, self.cause
            )
        }
    }
}

impl StdError for MigrationError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.cause)
    }
}
