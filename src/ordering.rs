//! Natural-order comparison for version strings.
//!
//! Versions are compared by interleaving maximal runs of digits and
//! non-digits. Digit runs compare by integer value, so `"2" < "10"` and
//! `"user_2" < "user_10"`. Non-digit runs compare by codepoint. The order
//! is total and deterministic across platforms, which makes the registry's
//! sorted view stable regardless of insertion order.

use std::cmp::Ordering;

/// Compare two version strings in natural order.
///
/// Rules, applied token by token:
/// - digit run vs digit run: by integer value (leading zeros ignored);
///   equal values order the more padded representation first, then by
///   codepoint;
/// - non-digit run vs non-digit run: by codepoint;
/// - digit run vs non-digit run: digits order first;
/// - when one string runs out of tokens, the shorter orders first.
#[must_use]
pub fn compare(a: &str, b: &str) -> Ordering {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let mut i = 0;
    let mut j = 0;

    while i < a.len() && j < b.len() {
        match (a[i].is_ascii_digit(), b[j].is_ascii_digit()) {
            (true, true) => {
                let a_end = digit_run_end(a, i);
                let b_end = digit_run_end(b, j);
                match compare_digit_runs(&a[i..a_end], &b[j..b_end]) {
                    Ordering::Equal => {
                        i = a_end;
                        j = b_end;
                    }
                    unequal => return unequal,
                }
            }
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {
                match a[i].cmp(&b[j]) {
                    Ordering::Equal => {
                        i += 1;
                        j += 1;
                    }
                    unequal => return unequal,
                }
            }
        }
    }

    (a.len() - i).cmp(&(b.len() - j))
}

fn digit_run_end(s: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < s.len() && s[end].is_ascii_digit() {
        end += 1;
    }
    end
}

fn compare_digit_runs(a: &[u8], b: &[u8]) -> Ordering {
    let a_stripped = strip_leading_zeros(a);
    let b_stripped = strip_leading_zeros(b);

    // Longer significant part means larger value; equal lengths compare
    // digit by digit.
    let by_value = a_stripped
        .len()
        .cmp(&b_stripped.len())
        .then_with(|| a_stripped.cmp(b_stripped));
    if by_value != Ordering::Equal {
        return by_value;
    }

    // Equal integer value: the padded form ("01") orders before the bare
    // form ("1") so distinct representations never compare equal.
    b.len().cmp(&a.len()).then_with(|| a.cmp(b))
}

fn strip_leading_zeros(s: &[u8]) -> &[u8] {
    let first = s.iter().position(|&b| b != b'0').unwrap_or(s.len());
    &s[first..]
}
