//! Name normalization shared by the matcher, scorer and consolidator.

use regex::Regex;
use std::sync::LazyLock;

/// Anything that is not a letter, digit or whitespace.
static RE_NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}\s]").expect("Invalid regex"));

/// Normalized names the feeds use when no driver was identified.
const PLACEHOLDER_NAMES: &[&str] = &[
    "unknown",
    "unknown driver",
    "no driver",
    "driver",
    "n a",
    "na",
    "none",
    "not assigned",
    "unassigned",
    "test",
];

/// Normalize a free-text name for comparison.
///
/// Lower-cases, drops every character that is not a letter, digit or
/// whitespace, collapses whitespace runs to one space and trims. Missing input
/// normalizes to the empty string.
///
/// `normalize(normalize(x)) == normalize(x)` for every input.
pub fn normalize(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return String::new();
    };
    let lowered = raw.to_lowercase();
    let stripped = RE_NON_ALNUM.replace_all(&lowered, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Shorthand for normalizing a borrowed string.
pub fn normalize_str(raw: &str) -> String {
    normalize(Some(raw))
}

/// Whether a normalized name carries no driver information (blank or a known placeholder).
pub fn is_placeholder(normalized: &str) -> bool {
    normalized.is_empty() || PLACEHOLDER_NAMES.contains(&normalized)
}

/// Split a normalized name into its whitespace-delimited tokens.
pub fn tokens(normalized: &str) -> Vec<&str> {
    normalized.split(' ').filter(|t| !t.is_empty()).collect()
}
