//! Edit-distance similarity between two names.

use crate::normalize::normalize_str;
use strsim::levenshtein;

/// Similarity of two names in `[0, 1]`.
///
/// Both inputs are normalized first. Equal normalized strings (including two
/// empty ones) score `1.0`; otherwise the score is
/// `(max_len - levenshtein) / max_len`, with lengths counted in characters.
/// An empty string against a non-empty one scores `0.0`.
pub fn similarity(a: &str, b: &str) -> f64 {
    similarity_normalized(&normalize_str(a), &normalize_str(b))
}

/// Same as [`similarity`] for inputs that are already normalized.
pub fn similarity_normalized(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    let distance = levenshtein(a, b);
    (max_len - distance) as f64 / max_len as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_and_empty() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("John Smith", "john   smith"), 1.0);
        assert_eq!(similarity("", "john"), 0.0);
        assert_eq!(similarity("john", "  "), 0.0);
    }

    #[test]
    fn test_single_edit() {
        // "jon smith" -> "john smith": one insertion over ten characters
        let score = similarity("Jon Smith", "John Smith");
        assert!((score - 0.9).abs() < 1e-9, "got {}", score);
    }

    #[test]
    fn test_completely_different() {
        assert_eq!(similarity("abc", "xyz"), 0.0);
    }

    #[test]
    fn test_symmetric() {
        let pairs = [("Mike Jones", "Michael Jones"), ("a", "ab"), ("Smith John", "John Smith")];
        for (a, b) in pairs {
            assert_eq!(similarity(a, b), similarity(b, a));
        }
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        // One substitution over four characters, even though 'é' is two bytes
        let score = similarity("rené", "rene");
        assert!((score - 0.75).abs() < 1e-9, "got {}", score);
    }
}
