//! Checksum calculation for migration content.

use sha2::{Digest, Sha256};

/// Compute a SHA-256 checksum over the given content parts.
///
/// Each part is whitespace-normalized before hashing so that reformatting
/// SQL does not produce a false "modified" status. The result is the
/// hex-encoded digest (64 characters).
#[must_use]
pub fn calculate(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(normalize_whitespace(part).as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Strip leading/trailing whitespace from each line, collapse runs of blank
/// lines into one, and trim blank lines at both ends.
fn normalize_whitespace(s: &str) -> String {
    let mut result: Vec<&str> = Vec::new();
    let mut prev_empty = false;

    for line in s.split('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !prev_empty {
                result.push("");
                prev_empty = true;
            }
            continue;
        }
        prev_empty = false;
        result.push(trimmed);
    }

    result.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_hashes_to_the_empty_digest() {
        assert_eq!(
            calculate(&[""]),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn returns_hex_sha256() {
        let sum = calculate(&["CREATE TABLE users (id INT)"]);
        assert_eq!(sum.len(), 64);
        assert!(sum.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn deterministic() {
        let parts = ["CREATE TABLE users (id INT)", "DROP TABLE users"];
        assert_eq!(calculate(&parts), calculate(&parts));
    }

    #[test]
    fn different_content_different_checksum() {
        assert_ne!(
            calculate(&["CREATE TABLE users (id INT)"]),
            calculate(&["CREATE TABLE posts (id INT)"])
        );
    }

    #[test]
    fn whitespace_reformatting_does_not_change_checksum() {
        let base = calculate(&["CREATE TABLE users (id INT);"]);
        assert_eq!(base, calculate(&["  CREATE TABLE users (id INT);  "]));
        assert_eq!(base, calculate(&["\n    CREATE TABLE users (id INT);\n  "]));
        assert_eq!(base, calculate(&["\t\tCREATE TABLE users (id INT);\n\n"]));
    }

    #[test]
    fn blank_line_runs_collapse() {
        let a = calculate(&["SELECT 1;\n\n\n\nSELECT 2;"]);
        let b = calculate(&["SELECT 1;\n\nSELECT 2;"]);
        assert_eq!(a, b);
    }

    #[test]
    fn comments_are_content() {
        let a = calculate(&["-- create users\nCREATE TABLE users (id INT)"]);
        let b = calculate(&["-- make users\nCREATE TABLE users (id INT)"]);
        assert_ne!(a, b);
    }

    #[test]
    fn part_count_matters() {
        assert_ne!(
            calculate(&["CREATE TABLE users (id INT)"]),
            calculate(&["CREATE TABLE users (id INT)", "DROP TABLE users"])
        );
    }
}
