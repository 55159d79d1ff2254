//! Shared building blocks for concrete drivers.
//!
//! Drivers compose these helpers rather than inheriting a base type: a
//! quoting strategy for identifiers, a placeholder strategy for bind
//! parameters, statement builders for the bookkeeping table, tolerant
//! timestamp parsing, and lock owner-id generation.

use chrono::{DateTime, NaiveDateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::MigrateError;

/// SQL identifier quoting style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    /// `"name"` - PostgreSQL, SQLite, ClickHouse, CockroachDB.
    DoubleQuote,
    /// `` `name` `` - MySQL.
    Backtick,
    /// `[name]` - MS SQL Server.
    Bracket,
}

/// Escape and wrap a SQL identifier.
///
/// Quote characters inside the identifier are doubled, so attacker-chosen
/// table names cannot break out of the quoting.
///
/// ```
/// use floodgate::drivers::base::{quote_identifier, QuoteStyle};
///
/// assert_eq!(quote_identifier("users", QuoteStyle::DoubleQuote), "\"users\"");
/// assert_eq!(quote_identifier("users", QuoteStyle::Backtick), "`users`");
/// assert_eq!(quote_identifier("users", QuoteStyle::Bracket), "[users]");
/// ```
#[must_use]
pub fn quote_identifier(name: &str, style: QuoteStyle) -> String {
    match style {
        QuoteStyle::DoubleQuote => format!("\"{}\"", name.replace('"', "\"\"")),
        QuoteStyle::Backtick => format!("`{}`", name.replace('`', "``")),
        QuoteStyle::Bracket => format!("[{}]", name.replace(']', "]]")),
    }
}

/// Bind-parameter placeholder style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `$1, $2, ...` - PostgreSQL, CockroachDB.
    Dollar,
    /// `?, ?, ...` - MySQL, SQLite, ClickHouse.
    Question,
}

impl Placeholder {
    /// Placeholder for the n-th argument (1-based).
    #[must_use]
    pub fn format(self, n: usize) -> String {
        match self {
            Placeholder::Dollar => format!("${n}"),
            Placeholder::Question => "?".to_string(),
        }
    }
}

/// `SELECT` returning all applied records in apply order.
#[must_use]
pub fn select_applied_sql(table: &str, style: QuoteStyle) -> String {
    format!(
        "SELECT version, name, applied_at, checksum FROM {} ORDER BY applied_at ASC",
        quote_identifier(table, style)
    )
}

/// `INSERT` recording an applied migration; binds version, name, checksum
/// and lets the column default supply `applied_at`.
#[must_use]
pub fn insert_applied_sql(table: &str, style: QuoteStyle, placeholder: Placeholder) -> String {
    format!(
        "INSERT INTO {} (version, name, checksum) VALUES ({}, {}, {})",
        quote_identifier(table, style),
        placeholder.format(1),
        placeholder.format(2),
        placeholder.format(3),
    )
}

/// `DELETE` removing the applied record of one version.
#[must_use]
pub fn remove_applied_sql(table: &str, style: QuoteStyle, placeholder: Placeholder) -> String {
    format!(
        "DELETE FROM {} WHERE version = {}",
        quote_identifier(table, style),
        placeholder.format(1),
    )
}

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parse a timestamp as databases render it textually, trying the common
/// space- and T-separated forms with and without fractional seconds.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, MigrateError> {
    for format in TIMESTAMP_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(MigrateError::database(format!(
        "failed to parse timestamp {raw:?}: unrecognized format"
    )))
}

/// Generate a lock owner id: 16 cryptographically random bytes, hex-encoded
/// to 32 characters. Unique per driver instance, so a process whose lock
/// lease expired can never release a successor's lock.
pub fn generate_owner_id() -> Result<String, MigrateError> {
    let mut bytes = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(MigrateError::database)?;
    Ok(bytes.iter().map(|b| format!("{b:02x}")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_escapes_embedded_quotes() {
        assert_eq!(
            quote_identifier("my\"table", QuoteStyle::DoubleQuote),
            "\"my\"\"table\""
        );
        assert_eq!(
            quote_identifier("my`table", QuoteStyle::Backtick),
            "`my``table`"
        );
        assert_eq!(
            quote_identifier("my]table", QuoteStyle::Bracket),
            "[my]]table]"
        );
    }

    #[test]
    fn placeholder_styles() {
        assert_eq!(Placeholder::Dollar.format(3), "$3");
        assert_eq!(Placeholder::Question.format(3), "?");
    }

    #[test]
    fn statement_builders_use_both_strategies() {
        assert_eq!(
            insert_applied_sql("queen_migrations", QuoteStyle::DoubleQuote, Placeholder::Dollar),
            "INSERT INTO \"queen_migrations\" (version, name, checksum) VALUES ($1, $2, $3)"
        );
        assert_eq!(
            remove_applied_sql("queen_migrations", QuoteStyle::Backtick, Placeholder::Question),
            "DELETE FROM `queen_migrations` WHERE version = ?"
        );
        assert!(select_applied_sql("m", QuoteStyle::DoubleQuote).ends_with("ORDER BY applied_at ASC"));
    }

    #[test]
    fn timestamp_parsing_accepts_common_forms() {
        for raw in [
            "2024-01-20 12:00:00",
            "2024-01-20 12:00:00.123456",
            "2024-01-20T12:00:00",
            "2024-01-20T12:00:00.123",
        ] {
            let parsed = parse_timestamp(raw).expect(raw);
            assert_eq!(parsed.timezone(), Utc);
        }
        assert!(parse_timestamp("last tuesday").is_err());
    }

    #[test]
    fn owner_ids_are_unique_32_char_hex() {
        let a = generate_owner_id().expect("owner id");
        let b = generate_owner_id().expect("owner id");
        assert_eq!(a.len(), 32);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
