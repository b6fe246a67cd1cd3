//! Word error rate

use crate::text::normalize_words;

/// WER of `hypothesis` against `reference` after normalization
///
/// An empty reference scores 0.0 when the hypothesis is also empty and 1.0
/// otherwise. The value can exceed 1.0 when the hypothesis has many
/// insertions.
pub fn word_error_rate(reference: &str, hypothesis: &str) -> f64 {
    let reference = normalize_words(reference);
    let hypothesis = normalize_words(hypothesis);

    if reference.is_empty() {
        return if hypothesis.is_empty() { 0.0 } else { 1.0 };
    }

    strsim::generic_levenshtein(&reference, &hypothesis) as f64 / reference.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_scores_zero() {
        assert_eq!(word_error_rate("Hello world", "hello, WORLD!"), 0.0);
    }

    #[test]
    fn one_substitution_in_two_words() {
        assert!((word_error_rate("Hello world", "hello word") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn deletions_and_insertions() {
        assert!((word_error_rate("the quick brown fox", "the brown fox") - 0.25).abs() < 1e-9);
        assert!((word_error_rate("hello", "hello there friend") - 2.0).abs() < 1e-9);
    }

    #[test]
    fn swapped_words_cost_two_edits() {
        assert!((word_error_rate("one two three four", "two one three four") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn empty_reference_edge_cases() {
        assert_eq!(word_error_rate("", ""), 0.0);
        assert_eq!(word_error_rate("...", ""), 0.0);
        assert_eq!(word_error_rate("", "noise"), 1.0);
    }

    #[test]
    fn empty_hypothesis_is_total_error() {
        assert_eq!(word_error_rate("Hello world", ""), 1.0);
    }
}
