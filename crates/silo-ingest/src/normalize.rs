//! Header normalization: raw column headers to unique, stable field
//! identifiers.
//!
//! Normalization is pure and deterministic so the same header row produces
//! the same identifiers on every chunk, every attempt, and every
//! re-implementation. The rules, in order:
//!
//! 1. insert a separator at lower-to-upper case boundaries (`userId` →
//!    `user_id`),
//! 2. replace every run of non-alphanumeric characters with a single
//!    separator,
//! 3. lowercase,
//! 4. strip leading/trailing separators,
//! 5. if the result is empty or starts with a digit, prefix the literal
//!    `col` token.
//!
//! Collisions within one header row are broken by appending `_1`, `_2`, …
//! in first-seen order.

use std::collections::HashSet;

/// Normalizes one raw header into a field identifier.
///
/// Never returns an empty string.
#[must_use]
pub fn normalize_header(raw: &str) -> String {
    let trimmed = raw.trim();

    // Separate camelCase boundaries before case folding.
    let mut separated = String::with_capacity(trimmed.len() + 4);
    let mut prev: Option<char> = None;
    for ch in trimmed.chars() {
        if let Some(p) = prev {
            if (p.is_ascii_lowercase() || p.is_ascii_digit()) && ch.is_ascii_uppercase() {
                separated.push('_');
            }
        }
        separated.push(ch);
        prev = Some(ch);
    }

    // Collapse every non-alphanumeric run into one separator, lowercasing
    // as we go.
    let mut collapsed = String::with_capacity(separated.len());
    let mut in_run = false;
    for ch in separated.chars() {
        if ch.is_ascii_alphanumeric() {
            collapsed.push(ch.to_ascii_lowercase());
            in_run = false;
        } else if !in_run {
            collapsed.push('_');
            in_run = true;
        }
    }

    let stripped = collapsed.trim_matches('_');
    if stripped.is_empty() {
        "col".to_string()
    } else if stripped.starts_with(|c: char| c.is_ascii_digit()) {
        format!("col_{stripped}")
    } else {
        stripped.to_string()
    }
}

/// Normalizes a full header row, breaking collisions deterministically.
///
/// Duplicate identifiers get `_1`, `_2`, … suffixes in first-seen order,
/// so the output is unique and stable for a given input row.
#[must_use]
pub fn normalize_headers<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for header in raw {
        let base = normalize_header(header.as_ref());
        let mut candidate = base.clone();
        let mut suffix = 1;
        while seen.contains(&candidate) {
            candidate = format!("{base}_{suffix}");
            suffix += 1;
        }
        seen.insert(candidate.clone());
        out.push(candidate);
    }
    out
}
