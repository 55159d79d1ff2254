//! Version naming conventions and validation.
//!
//! Migration versions and names must match the identifier grammar
//! `[a-z0-9_]+`. On top of that, a [`NamingConfig`] can enforce one of the
//! version numbering patterns:
//!
//! - [`NamingPattern::Sequential`] - `1, 2, 3, ...`
//! - [`NamingPattern::SequentialPadded`] - `001, 002, 003, ...`
//! - [`NamingPattern::Semver`] - `1.0.0, 1.1.0, 2.0.0, ...`
//!
//! The sequential families also support generating the next free version
//! for scaffolding tools.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::MigrateError;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_]+$").expect("identifier regex"));
static SEMVER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\d+\.\d+$").expect("semver regex"));

/// Whether `name` matches the migration identifier grammar
/// (lowercase letters, digits, underscores).
#[must_use]
pub fn is_valid_migration_name(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name)
}

/// Version numbering convention for migration versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingPattern {
    /// No pattern validation.
    #[default]
    None,
    /// Sequential numbering without padding: `1, 2, 3, ...`
    Sequential,
    /// Zero-padded sequential numbering: `001, 002, 003, ...`
    SequentialPadded,
    /// Semantic versioning: `1.0.0, 1.1.0, 2.0.0, ...`
    Semver,
}

impl NamingPattern {
    /// Parse a pattern from its configuration string.
    #[must_use]
    pub fn parse(s: &str) -> Option<NamingPattern> {
        match s {
            "" | "none" => Some(NamingPattern::None),
            "sequential" => Some(NamingPattern::Sequential),
            "sequential-padded" => Some(NamingPattern::SequentialPadded),
            "semver" => Some(NamingPattern::Semver),
            _ => None,
        }
    }
}

/// Configuration for migration version naming validation.
#[derive(Debug, Clone)]
pub struct NamingConfig {
    /// The pattern to validate versions against.
    pub pattern: NamingPattern,
    /// Digit count for [`NamingPattern::SequentialPadded`].
    pub padding: usize,
    /// When true, pattern violations reject registration; when false they
    /// only produce a warning.
    pub enforce: bool,
}

impl Default for NamingConfig {
    fn default() -> Self {
        NamingConfig {
            pattern: NamingPattern::None,
            padding: 3,
            enforce: true,
        }
    }
}

impl NamingConfig {
    fn effective_padding(&self) -> usize {
        if self.padding == 0 {
            3
        } else {
            self.padding
        }
    }

    /// Check `version` against the configured pattern.
    pub fn validate(&self, version: &str) -> Result<(), MigrateError> {
        match self.pattern {
            NamingPattern::None => Ok(()),
            NamingPattern::Sequential => validate_sequential(version),
            NamingPattern::SequentialPadded => {
                validate_sequential_padded(version, self.effective_padding())
            }
            NamingPattern::Semver => validate_semver(version),
        }
    }

    /// Find the next free version for the configured pattern.
    ///
    /// Only the sequential families support auto-generation; semver
    /// versions carry meaning a tool cannot guess.
    pub fn find_next_version(&self, existing: &[String]) -> Result<String, MigrateError> {
        match self.pattern {
            NamingPattern::None => Err(MigrateError::Naming {
                message: "naming pattern not configured".to_string(),
            }),
            NamingPattern::Sequential => Ok(next_sequential(existing, None)),
            NamingPattern::SequentialPadded => {
                Ok(next_sequential(existing, Some(self.effective_padding())))
            }
            NamingPattern::Semver => Err(MigrateError::Naming {
                message: "auto-generation not supported for the semver pattern, \
                          specify the version manually"
                    .to_string(),
            }),
        }
    }
}

fn validate_sequential(version: &str) -> Result<(), MigrateError> {
    if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MigrateError::Naming {
            message: format!("version must be a positive integer (e.g. 1, 2, 3): got {version:?}"),
        });
    }
    if version.len() > 1 && version.starts_with('0') {
        return Err(MigrateError::Naming {
            message: format!(
                "version must not have leading zeros \
                 (use the sequential-padded pattern instead): got {version:?}"
            ),
        });
    }
    Ok(())
}

fn validate_sequential_padded(version: &str, padding: usize) -> Result<(), MigrateError> {
    if version.len() != padding || !version.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MigrateError::Naming {
            message: format!(
                "version must be {padding}-digit format (e.g. {:0width$}): got {version:?}",
                1,
                width = padding
            ),
        });
    }
    Ok(())
}

fn validate_semver(version: &str) -> Result<(), MigrateError> {
    if SEMVER_RE.is_match(version) {
        Ok(())
    } else {
        Err(MigrateError::Naming {
            message: format!(
                "version must be semantic version format (e.g. 1.0.0, 1.1.0): got {version:?}"
            ),
        })
    }
}

fn next_sequential(existing: &[String], padding: Option<usize>) -> String {
    let max = existing
        .iter()
        .filter_map(|v| v.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    let next = max + 1;
    match padding {
        Some(width) => format!("{next:0width$}"),
        None => next.to_string(),
    }
}
