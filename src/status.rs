//! Migration status and planning types.
//!
//! [`MigrationStatus`] is the per-migration report returned by
//! `Migrator::status`. [`MigrationPlan`] is the dry-run/explain shape. Both
//! serialize with stable snake_case field names for the CLI's `--json`
//! output.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// The current state of a registered migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Not present in the applied set.
    Pending,
    /// Applied and the stored checksum matches.
    Applied,
    /// Applied but the content changed since (checksum mismatch), or an
    /// applied record with no registered migration.
    Modified,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Pending => write!(f, "pending"),
            Status::Applied => write!(f, "applied"),
            Status::Modified => write!(f, "modified"),
        }
    }
}

/// How a migration is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationType {
    /// SQL text only.
    Sql,
    /// Code callback only.
    Code,
    /// Both SQL text and a code callback.
    Mixed,
}

impl fmt::Display for MigrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationType::Sql => write!(f, "sql"),
            MigrationType::Code => write!(f, "code"),
            MigrationType::Mixed => write!(f, "mixed"),
        }
    }
}

/// Planning direction for dry runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => Err(format!("invalid direction {other:?} (expected up or down)")),
        }
    }
}

/// Detailed state of one migration, as reported by `Migrator::status`.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    /// Unique version identifier.
    pub version: String,
    /// Human-readable name.
    pub name: String,
    /// Pending, applied, or modified.
    pub status: Status,
    /// When the migration was applied; `None` while pending.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
    /// Current checksum of the registered content (stored checksum for
    /// applied records that are no longer registered).
    pub checksum: String,
    /// Whether a down migration is defined.
    pub has_rollback: bool,
    /// Whether the down migration contains destructive operations.
    pub destructive: bool,
}

/// Execution plan entry for dry-run mode and `explain`.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationPlan {
    /// Unique version identifier.
    pub version: String,
    /// Human-readable name.
    pub name: String,
    /// Direction this plan describes.
    pub direction: Direction,
    /// Current state of the migration.
    pub status: Status,
    /// Implementation type.
    #[serde(rename = "type")]
    pub migration_type: MigrationType,
    /// The SQL that would run, when the body is SQL.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sql: String,
    /// Whether a down migration is defined.
    pub has_rollback: bool,
    /// Whether the plan includes destructive operations.
    pub is_destructive: bool,
    /// Current checksum of the migration content.
    pub checksum: String,
    /// Human-readable warnings, e.g. "No rollback defined".
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Status::Pending).unwrap(), "\"pending\"");
        assert_eq!(serde_json::to_string(&Status::Modified).unwrap(), "\"modified\"");
    }

    #[test]
    fn direction_round_trip() {
        assert_eq!("up".parse::<Direction>().unwrap(), Direction::Up);
        assert_eq!("down".parse::<Direction>().unwrap(), Direction::Down);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn plan_json_field_names_are_stable() {
        let plan = MigrationPlan {
            version: "001".to_string(),
            name: "create_users".to_string(),
            direction: Direction::Up,
            status: Status::Pending,
            migration_type: MigrationType::Sql,
            sql: "CREATE TABLE users (id INT)".to_string(),
            has_rollback: true,
            is_destructive: false,
            checksum: "abc".to_string(),
            warnings: Vec::new(),
        };
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["type"], "sql");
        assert_eq!(json["direction"], "up");
        assert_eq!(json["has_rollback"], true);
        assert!(json.get("warnings").is_none(), "empty warnings omitted");
    }

    #[test]
    fn plan_json_omits_empty_sql() {
        let plan = MigrationPlan {
            version: "002".to_string(),
            name: "backfill".to_string(),
            direction: Direction::Up,
            status: Status::Pending,
            migration_type: MigrationType::Code,
            sql: String::new(),
            has_rollback: false,
            is_destructive: false,
            checksum: "v1".to_string(),
            warnings: vec!["No rollback defined".to_string()],
        };
        let json = serde_json::to_value(&plan).unwrap();
        assert!(json.get("sql").is_none());
        assert_eq!(json["warnings"][0], "No rollback defined");
    }
}
