//! Migration file scaffolding for the `create` subcommand.

use std::fs;
use std::path::{Path, PathBuf};

use floodgate::{is_valid_migration_name, MigrateError, NamingConfig};

/// The implementation style of a scaffolded migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Sql,
    Code,
}

impl TemplateKind {
    pub fn parse(s: &str) -> Option<TemplateKind> {
        match s {
            "sql" => Some(TemplateKind::Sql),
            "code" => Some(TemplateKind::Code),
            _ => None,
        }
    }
}

/// Versions already present in the migrations directory, read from
/// `<version>_<name>.rs` file names. A missing directory is an empty list.
pub fn existing_versions(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut versions = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(stem) = name.strip_suffix(".rs") else {
            continue;
        };
        if let Some((version, _)) = stem.split_once('_') {
            versions.push(version.to_string());
        }
    }
    versions
}

/// Create a migration source file and return its path.
pub fn create_migration_file(
    dir: &Path,
    naming: &NamingConfig,
    name: &str,
    kind: TemplateKind,
) -> Result<PathBuf, MigrateError> {
    if !is_valid_migration_name(name) {
        return Err(MigrateError::InvalidMigrationName {
            name: name.to_string(),
        });
    }

    let version = naming.find_next_version(&existing_versions(dir))?;
    let content = match kind {
        TemplateKind::Sql => sql_template(&version, name),
        TemplateKind::Code => code_template(&version, name),
    };

    fs::create_dir_all(dir).map_err(MigrateError::database)?;
    let path = dir.join(format!("{version}_{name}.rs"));
    fs::write(&path, content).map_err(MigrateError::database)?;
    Ok(path)
}

fn sql_template(version: &str, name: &str) -> String {
    format!(
        r#"//! Migration {version}: {name}

use floodgate::Migration;

pub fn migration() -> Migration {{
    Migration::new("{version}", "{name}")
        .up_sql(
            "-- forward schema change goes here",
        )
        .down_sql(
            "-- rollback goes here",
        )
}}
"#
    )
}

fn code_template(version: &str, name: &str) -> String {
    format!(
        r#"//! Migration {version}: {name}

use floodgate::Migration;

pub fn migration() -> Migration {{
    // Bump the manual checksum whenever the callback's behavior changes.
    Migration::new("{version}", "{name}")
        .manual_checksum("v1")
        .up_fn(|exec| {{
            let _ = exec;
            Ok(())
        }})
        .down_fn(|exec| {{
            let _ = exec;
            Ok(())
        }})
}}
"#
    )
}
