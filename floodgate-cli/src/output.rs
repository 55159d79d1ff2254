//! Rendering and exit-code mapping.

use floodgate::{ErrorKind, MigrateError, MigrationPlan, MigrationStatus};

/// Map an error to the process exit code.
///
/// Distinct codes for the failures scripts most often branch on; 1 for
/// everything else.
#[must_use]
pub fn exit_code(err: &MigrateError) -> u8 {
    match err.kind() {
        ErrorKind::LockTimeout => 2,
        ErrorKind::ChecksumMismatch => 3,
        ErrorKind::MigrationNotFound => 4,
        ErrorKind::NoDriver => 5,
        ErrorKind::Cancelled => 6,
        _ => 1,
    }
}

/// Render an error for humans (stderr) or as JSON.
pub fn print_error(err: &MigrateError, json: bool) {
    if json {
        let payload = serde_json::json!({
            "error": err.to_string(),
            "kind": err.kind().as_str(),
        });
        println!("{payload}");
    } else {
        eprintln!("error: {err}");
    }
}

/// Render the status report as a table.
pub fn print_status_table(statuses: &[MigrationStatus]) {
    if statuses.is_empty() {
        println!("no migrations registered");
        return;
    }

    println!(
        "{:<16} {:<32} {:<10} {:<20} {}",
        "VERSION", "NAME", "STATUS", "APPLIED AT", "ROLLBACK"
    );
    for status in statuses {
        let applied_at = status
            .applied_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        let rollback = if status.has_rollback {
            if status.destructive {
                "destructive"
            } else {
                "yes"
            }
        } else {
            "none"
        };
        println!(
            "{:<16} {:<32} {:<10} {:<20} {}",
            status.version,
            status.name,
            status.status.to_string(),
            applied_at,
            rollback
        );
    }
}

/// Render a dry-run plan for humans.
pub fn print_plans(plans: &[MigrationPlan]) {
    if plans.is_empty() {
        println!("nothing to do");
        return;
    }

    for (i, plan) in plans.iter().enumerate() {
        println!(
            "{}. {} {} ({}) [{}]",
            i + 1,
            plan.direction,
            plan.version,
            plan.name,
            plan.migration_type
        );
        if !plan.sql.is_empty() {
            for line in plan.sql.lines() {
                println!("     {line}");
            }
        }
        for warning in &plan.warnings {
            println!("     warning: {warning}");
        }
    }
}

/// Serialize any value as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), MigrateError> {
    let rendered = serde_json::to_string_pretty(value).map_err(MigrateError::database)?;
    println!("{rendered}");
    Ok(())
}
