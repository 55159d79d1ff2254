//! The migration entity.
//!
//! A [`Migration`] describes one schema change: a unique version, a
//! human-readable name, an up script, and optionally a down script. Scripts
//! are SQL text, a code callback, or both; when both are present the
//! callback runs and the SQL text documents the change for planning output.
//!
//! # Checksums
//!
//! SQL content is fingerprinted automatically (see [`crate::checksum`]).
//! Code callbacks are opaque runtime values that cannot be hashed, so
//! migrations using them must carry a manual checksum tag (`"v1"`, `"v2"`,
//! ...) that the author bumps whenever the callback's behavior changes.
//! A code-only migration without a manual checksum registers successfully
//! but uses a sentinel marker and is invisible to drift detection.
//!
//! # Example
//!
//! ```
//! use floodgate::Migration;
//!
//! let migration = Migration::new("001", "create_users")
//!     .up_sql("CREATE TABLE users (id INT)")
//!     .down_sql("DROP TABLE users");
//! assert!(migration.has_rollback());
//! assert!(migration.is_destructive());
//! ```

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::checksum;
use crate::error::MigrateError;
use crate::executor::{IsolationLevel, MigrationExec};
use crate::naming::is_valid_migration_name;
use crate::status::MigrationType;

/// Checksum marker for code-only migrations without a manual checksum.
///
/// Callbacks cannot be fingerprinted, so such migrations are exempt from
/// drift detection. This is a documented weakness, not an error.
pub const NO_CHECKSUM_MARKER: &str = "no-checksum-code-fn";

/// Maximum length of a migration name.
const MAX_NAME_LEN: usize = 63;

/// Keywords that mark a down script as destructive.
const DESTRUCTIVE_KEYWORDS: [&str; 4] =
    ["DROP TABLE", "DROP DATABASE", "DROP SCHEMA", "TRUNCATE"];

/// A migration body implemented in code.
///
/// The callback receives the execution facade of the transaction the driver
/// opened for this migration.
pub type MigrationFn =
    Arc<dyn Fn(&mut dyn MigrationExec) -> Result<(), MigrateError> + Send + Sync>;

/// One direction of a migration: SQL text, a code callback, or both.
#[derive(Clone)]
pub enum MigrationScript {
    /// Plain SQL, executed verbatim.
    Sql(String),
    /// A code callback.
    Code(MigrationFn),
    /// A code callback accompanied by SQL text; the callback executes and
    /// the SQL participates in checksums and planning output.
    Mixed { sql: String, code: MigrationFn },
}

impl MigrationScript {
    /// The SQL text, if any.
    #[must_use]
    pub fn sql(&self) -> Option<&str> {
        match self {
            MigrationScript::Sql(sql) | MigrationScript::Mixed { sql, .. } => Some(sql),
            MigrationScript::Code(_) => None,
        }
    }

    /// Whether a code callback is present.
    #[must_use]
    pub fn has_code(&self) -> bool {
        matches!(
            self,
            MigrationScript::Code(_) | MigrationScript::Mixed { .. }
        )
    }

    /// Run the script inside the given transaction. The callback takes
    /// precedence when both forms are present.
    pub fn run(&self, exec: &mut dyn MigrationExec) -> Result<(), MigrateError> {
        match self {
            MigrationScript::Sql(sql) => exec.execute(sql).map(|_| ()),
            MigrationScript::Code(code) | MigrationScript::Mixed { code, .. } => code(exec),
        }
    }

    fn merge_sql(script: Option<MigrationScript>, sql: String) -> MigrationScript {
        match script {
            None | Some(MigrationScript::Sql(_)) => MigrationScript::Sql(sql),
            Some(MigrationScript::Code(code)) | Some(MigrationScript::Mixed { code, .. }) => {
                MigrationScript::Mixed { sql, code }
            }
        }
    }

    fn merge_code(script: Option<MigrationScript>, code: MigrationFn) -> MigrationScript {
        match script {
            None | Some(MigrationScript::Code(_)) => MigrationScript::Code(code),
            Some(MigrationScript::Sql(sql)) | Some(MigrationScript::Mixed { sql, .. }) => {
                MigrationScript::Mixed { sql, code }
            }
        }
    }
}

// A code callback has no useful Debug form; render its presence only.
impl fmt::Debug for MigrationScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationScript::Sql(sql) => f.debug_tuple("Sql").field(sql).finish(),
            MigrationScript::Code(_) => f.debug_tuple("Code").field(&"<fn>").finish(),
            MigrationScript::Mixed { sql, .. } => f
                .debug_struct("Mixed")
                .field("sql", sql)
                .field("code", &"<fn>")
                .finish(),
        }
    }
}

/// A single database migration.
///
/// Built with the fluent constructor methods and registered on a
/// [`crate::Registry`] or directly on a [`crate::Migrator`]:
///
/// ```
/// use floodgate::Migration;
///
/// let sql = Migration::new("001", "create_users")
///     .up_sql("CREATE TABLE users (id INT)")
///     .down_sql("DROP TABLE users");
///
/// let code = Migration::new("002", "backfill_emails")
///     .manual_checksum("v1")
///     .up_fn(|exec| {
///         exec.execute("UPDATE users SET email = '' WHERE email IS NULL")?;
///         Ok(())
///     });
/// ```
#[derive(Debug, Clone)]
pub struct Migration {
    version: String,
    name: String,
    up: Option<MigrationScript>,
    down: Option<MigrationScript>,
    manual_checksum: Option<String>,
    isolation_level: Option<IsolationLevel>,
    checksum: OnceCell<String>,
}

impl Migration {
    /// Start building a migration with its version and name.
    #[must_use]
    pub fn new(version: impl Into<String>, name: impl Into<String>) -> Self {
        Migration {
            version: version.into(),
            name: name.into(),
            up: None,
            down: None,
            manual_checksum: None,
            isolation_level: None,
            checksum: OnceCell::new(),
        }
    }

    /// Set the SQL that applies this migration.
    #[must_use]
    pub fn up_sql(mut self, sql: impl Into<String>) -> Self {
        self.up = Some(MigrationScript::merge_sql(self.up.take(), sql.into()));
        self
    }

    /// Set the SQL that rolls this migration back.
    #[must_use]
    pub fn down_sql(mut self, sql: impl Into<String>) -> Self {
        self.down = Some(MigrationScript::merge_sql(self.down.take(), sql.into()));
        self
    }

    /// Set the callback that applies this migration.
    #[must_use]
    pub fn up_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut dyn MigrationExec) -> Result<(), MigrateError> + Send + Sync + 'static,
    {
        self.up = Some(MigrationScript::merge_code(self.up.take(), Arc::new(f)));
        self
    }

    /// Set the callback that rolls this migration back.
    #[must_use]
    pub fn down_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut dyn MigrationExec) -> Result<(), MigrateError> + Send + Sync + 'static,
    {
        self.down = Some(MigrationScript::merge_code(self.down.take(), Arc::new(f)));
        self
    }

    /// Set the manual checksum tag. Required for callback migrations;
    /// bump it whenever the callback's behavior changes.
    #[must_use]
    pub fn manual_checksum(mut self, tag: impl Into<String>) -> Self {
        self.manual_checksum = Some(tag.into());
        self
    }

    /// Override the engine's default isolation level for this migration.
    #[must_use]
    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    /// The unique version identifier.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The human-readable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured isolation override, if any.
    #[must_use]
    pub fn isolation(&self) -> Option<IsolationLevel> {
        self.isolation_level
    }

    /// The up script's SQL text, if any.
    #[must_use]
    pub fn up_sql_text(&self) -> Option<&str> {
        self.up.as_ref().and_then(MigrationScript::sql)
    }

    /// The down script's SQL text, if any.
    #[must_use]
    pub fn down_sql_text(&self) -> Option<&str> {
        self.down.as_ref().and_then(MigrationScript::sql)
    }

    /// Ensure version, name, and at least one up form are defined.
    pub fn validate(&self) -> Result<(), MigrateError> {
        if self.version.is_empty() || self.version.contains(char::is_whitespace) {
            return Err(MigrateError::InvalidMigration {
                reason: format!("version must be a non-empty identifier: {:?}", self.version),
            });
        }
        if !is_valid_migration_name(&self.version) {
            return Err(MigrateError::InvalidMigration {
                reason: format!(
                    "version must contain only lowercase letters, digits, underscores: {:?}",
                    self.version
                ),
            });
        }
        if self.name.len() > MAX_NAME_LEN {
            return Err(MigrateError::NameTooLong {
                name: self.name.clone(),
            });
        }
        if self.name.is_empty() || !is_valid_migration_name(&self.name) {
            return Err(MigrateError::InvalidMigrationName {
                name: self.name.clone(),
            });
        }
        if self.up.is_none() {
            return Err(MigrateError::InvalidMigration {
                reason: format!("migration {} defines no up script", self.version),
            });
        }
        Ok(())
    }

    /// The content checksum used for drift detection.
    ///
    /// Manual checksum if set; otherwise a SHA-256 over the normalized
    /// up/down SQL; otherwise [`NO_CHECKSUM_MARKER`]. Computed once per
    /// instance.
    pub fn checksum(&self) -> &str {
        self.checksum.get_or_init(|| {
            if let Some(manual) = &self.manual_checksum {
                return manual.clone();
            }
            let up_sql = self.up_sql_text();
            let down_sql = self.down_sql_text();
            if up_sql.is_some() || down_sql.is_some() {
                return checksum::calculate(&[
                    up_sql.unwrap_or(""),
                    down_sql.unwrap_or(""),
                ]);
            }
            NO_CHECKSUM_MARKER.to_string()
        })
    }

    /// Whether a down script is defined.
    #[must_use]
    pub fn has_rollback(&self) -> bool {
        self.down.is_some()
    }

    /// Whether the down SQL contains destructive keywords (`DROP TABLE`,
    /// `DROP DATABASE`, `DROP SCHEMA`, `TRUNCATE`). Planning information
    /// only; never changes execution.
    #[must_use]
    pub fn is_destructive(&self) -> bool {
        let Some(down_sql) = self.down_sql_text() else {
            return false;
        };
        let upper = down_sql.to_uppercase();
        DESTRUCTIVE_KEYWORDS.iter().any(|kw| upper.contains(kw))
    }

    /// How this migration is implemented (sql, code, or mixed).
    #[must_use]
    pub fn migration_type(&self) -> MigrationType {
        let has_code = self.up.as_ref().is_some_and(MigrationScript::has_code)
            || self.down.as_ref().is_some_and(MigrationScript::has_code);
        let has_sql = self.up_sql_text().is_some() || self.down_sql_text().is_some();
        match (has_sql, has_code) {
            (true, true) => MigrationType::Mixed,
            (false, true) => MigrationType::Code,
            _ => MigrationType::Sql,
        }
    }

    /// Whether drift detection is effective for this migration.
    #[must_use]
    pub fn has_checksum_validation(&self) -> bool {
        self.checksum() != NO_CHECKSUM_MARKER
    }

    pub(crate) fn run_up(&self, exec: &mut dyn MigrationExec) -> Result<(), MigrateError> {
        match &self.up {
            Some(script) => script.run(exec),
            None => Err(MigrateError::InvalidMigration {
                reason: format!("migration {} defines no up script", self.version),
            }),
        }
    }

    pub(crate) fn run_down(&self, exec: &mut dyn MigrationExec) -> Result<(), MigrateError> {
        match &self.down {
            Some(script) => script.run(exec),
            None => Err(MigrateError::NoRollback {
                version: self.version.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::executor::Value;

    struct RecordingExec {
        statements: Vec<String>,
    }

    impl MigrationExec for RecordingExec {
        fn execute(&mut self, sql: &str) -> Result<u64, MigrateError> {
            self.statements.push(sql.to_string());
            Ok(0)
        }

        fn query(&mut self, _sql: &str) -> Result<Vec<Vec<Value>>, MigrateError> {
            Ok(Vec::new())
        }
    }

    fn sql_migration() -> Migration {
        Migration::new("001", "create_users")
            .up_sql("CREATE TABLE users (id INT)")
            .down_sql("DROP TABLE users")
    }

    #[test]
    fn validate_accepts_sql_migration() {
        sql_migration().validate().expect("valid");
    }

    #[test]
    fn validate_rejects_bad_versions() {
        let empty = Migration::new("", "x").up_sql("SELECT 1");
        assert_eq!(
            empty.validate().unwrap_err().kind(),
            ErrorKind::InvalidMigration
        );
        let spaced = Migration::new("0 1", "x").up_sql("SELECT 1");
        assert!(spaced.validate().is_err());
        let upper = Migration::new("V1", "x").up_sql("SELECT 1");
        assert!(upper.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_names() {
        let long = Migration::new("001", "a".repeat(64)).up_sql("SELECT 1");
        assert_eq!(long.validate().unwrap_err().kind(), ErrorKind::NameTooLong);
        let empty = Migration::new("001", "").up_sql("SELECT 1");
        assert_eq!(
            empty.validate().unwrap_err().kind(),
            ErrorKind::InvalidMigrationName
        );
        let dashed = Migration::new("001", "drop-users").up_sql("SELECT 1");
        assert_eq!(
            dashed.validate().unwrap_err().kind(),
            ErrorKind::InvalidMigrationName
        );
    }

    #[test]
    fn validate_requires_an_up_form() {
        let empty = Migration::new("001", "noop");
        assert_eq!(
            empty.validate().unwrap_err().kind(),
            ErrorKind::InvalidMigration
        );
        let down_only = Migration::new("001", "noop").down_sql("DROP TABLE t");
        assert!(down_only.validate().is_err());
        let code_up = Migration::new("001", "noop").up_fn(|_| Ok(()));
        code_up.validate().expect("callback counts as up");
    }

    #[test]
    fn checksum_prefers_manual_tag() {
        let m = sql_migration().manual_checksum("v1");
        assert_eq!(m.checksum(), "v1");
    }

    #[test]
    fn checksum_stable_under_reformatting() {
        let a = Migration::new("001", "create_users")
            .up_sql("CREATE TABLE users (id INT)")
            .down_sql("DROP TABLE users");
        let b = Migration::new("001", "create_users")
            .up_sql("  CREATE TABLE users (id INT)\n")
            .down_sql("\n\tDROP TABLE users  ");
        assert_eq!(a.checksum(), b.checksum());
    }

    #[test]
    fn checksum_changes_with_content() {
        let a = sql_migration();
        let b = Migration::new("001", "create_users")
            .up_sql("CREATE TABLE users (id BIGINT)")
            .down_sql("DROP TABLE users");
        assert_ne!(a.checksum(), b.checksum());
    }

    #[test]
    fn code_only_without_manual_checksum_uses_marker() {
        let m = Migration::new("002", "backfill").up_fn(|_| Ok(()));
        assert_eq!(m.checksum(), NO_CHECKSUM_MARKER);
        assert!(!m.has_checksum_validation());
    }

    #[test]
    fn checksum_is_memoized() {
        let m = sql_migration();
        let first = m.checksum().to_string();
        assert_eq!(m.checksum(), first);
    }

    #[test]
    fn rollback_capability_tracks_down_forms() {
        assert!(sql_migration().has_rollback());
        assert!(!Migration::new("001", "x").up_sql("SELECT 1").has_rollback());
        assert!(Migration::new("001", "x")
            .up_sql("SELECT 1")
            .down_fn(|_| Ok(()))
            .has_rollback());
    }

    #[test]
    fn destructive_detection_is_case_insensitive() {
        assert!(sql_migration().is_destructive());
        let truncate = Migration::new("001", "x")
            .up_sql("SELECT 1")
            .down_sql("truncate audit_log");
        assert!(truncate.is_destructive());
        let benign = Migration::new("001", "x")
            .up_sql("ALTER TABLE users ADD email TEXT")
            .down_sql("ALTER TABLE users DROP COLUMN email");
        assert!(!benign.is_destructive());
        // Up SQL is assumed constructive and never checked.
        let up_drop = Migration::new("001", "x").up_sql("DROP TABLE legacy");
        assert!(!up_drop.is_destructive());
    }

    #[test]
    fn migration_type_classification() {
        assert_eq!(sql_migration().migration_type(), MigrationType::Sql);
        let code = Migration::new("002", "x").up_fn(|_| Ok(()));
        assert_eq!(code.migration_type(), MigrationType::Code);
        let mixed = Migration::new("003", "x")
            .up_sql("UPDATE users SET active = true")
            .up_fn(|_| Ok(()));
        assert_eq!(mixed.migration_type(), MigrationType::Mixed);
    }

    #[test]
    fn mixed_script_runs_the_callback() {
        let m = Migration::new("003", "x")
            .up_sql("UPDATE users SET active = true")
            .up_fn(|exec| {
                exec.execute("-- from callback")?;
                Ok(())
            });
        let mut exec = RecordingExec {
            statements: Vec::new(),
        };
        m.run_up(&mut exec).expect("run");
        assert_eq!(exec.statements, vec!["-- from callback".to_string()]);
    }

    #[test]
    fn sql_script_executes_verbatim() {
        let m = sql_migration();
        let mut exec = RecordingExec {
            statements: Vec::new(),
        };
        m.run_up(&mut exec).expect("up");
        m.run_down(&mut exec).expect("down");
        assert_eq!(
            exec.statements,
            vec![
                "CREATE TABLE users (id INT)".to_string(),
                "DROP TABLE users".to_string()
            ]
        );
    }

    #[test]
    fn run_down_without_script_reports_no_rollback() {
        let m = Migration::new("001", "x").up_sql("SELECT 1");
        let mut exec = RecordingExec {
            statements: Vec::new(),
        };
        assert_eq!(
            m.run_down(&mut exec).unwrap_err().kind(),
            ErrorKind::NoRollback
        );
    }
}
