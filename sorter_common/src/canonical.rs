//! Canonical-key normalization.
//!
//! Recognized codes and lane ids are compared only after normalization to a
//! canonical key, so that camera noise (diacritics, case, stray punctuation)
//! and legacy lane-id prefixes ("LOAI_", "LO") never cause a mismatch.

use unicode_normalization::UnicodeNormalization;

/// Normalize a raw string (a recognized code, or a `LaneConfig::id`) to its
/// canonical key.
///
/// Steps, in order:
/// 1. NFKD-decompose and drop combining marks (strips diacritics).
/// 2. Uppercase.
/// 3. Drop every character outside `[A-Z0-9]`.
/// 4. Repeatedly strip a leading `"LOAI"` or `"LO"` run until neither
///    prefix matches (this is what makes the function idempotent).
pub fn canonical_key(raw: &str) -> String {
    let stripped_diacritics: String = raw
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect();

    let uppercased = stripped_diacritics.to_uppercase();

    let alnum_only: String = uppercased
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();

    strip_leading_prefixes(&alnum_only)
}

/// Unicode combining-mark ranges relevant to NFKD-decomposed Latin text.
/// Covers the "Combining Diacritical Marks" block and friends, which is all
/// that NFKD decomposition of accented Latin characters ever produces.
fn is_combining_mark(c: char) -> bool {
    matches!(c as u32,
        0x0300..=0x036F | // Combining Diacritical Marks
        0x1AB0..=0x1AFF | // Combining Diacritical Marks Extended
        0x1DC0..=0x1DFF | // Combining Diacritical Marks Supplement
        0x20D0..=0x20FF   // Combining Diacritical Marks for Symbols
    )
}

fn strip_leading_prefixes(s: &str) -> String {
    let mut rest = s;
    loop {
        if let Some(tail) = rest.strip_prefix("LOAI") {
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix("LO") {
            rest = tail;
        } else {
            break;
        }
    }
    rest.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_diacritics_and_uppercases() {
        assert_eq!(canonical_key("loại-A"), "A");
    }

    #[test]
    fn drops_non_alnum_punctuation() {
        assert_eq!(canonical_key("A-001_b"), "A001B");
    }

    #[test]
    fn strips_single_lo_prefix() {
        assert_eq!(canonical_key("LO1"), "1");
    }

    #[test]
    fn strips_loai_prefix_before_matching_shorter_lo() {
        assert_eq!(canonical_key("LOAI_A"), "A");
    }

    #[test]
    fn strips_nested_lo_then_loai_runs() {
        // "LO" + "LOAI" + "B" -> strip "LO" -> "LOAIB" -> strip "LOAI" -> "B"
        assert_eq!(canonical_key("LOLOAIB"), "B");
    }

    #[test]
    fn leaves_unrelated_strings_untouched() {
        assert_eq!(canonical_key("B"), "B");
        assert_eq!(canonical_key("WIDGET42"), "WIDGET42");
    }

    #[test]
    fn idempotent_on_arbitrary_inputs() {
        for raw in ["loại-A", "LO1", "LOAI_A", "LOLOAIB", "plain", "", "LO", "LOAI"] {
            let once = canonical_key(raw);
            let twice = canonical_key(&once);
            assert_eq!(once, twice, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn empty_input_yields_empty_key() {
        assert_eq!(canonical_key(""), "");
    }
}
