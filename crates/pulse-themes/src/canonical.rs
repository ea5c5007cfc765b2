//! Review text canonicalization.
//!
//! Produces the comparison form of a review: NFKC-normalized, lowercased,
//! apostrophes dropped, other punctuation and whitespace runs collapsed to
//! single spaces. Letters, digits and combining marks are kept. The
//! original text is kept on the `Review` for display.

use pulse_types::{RawReview, Review};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Canonicalize review text for comparison.
pub fn canonicalize(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());

    for c in text.nfkc().flat_map(char::to_lowercase) {
        if is_apostrophe(c) {
            continue;
        }
        if c.is_alphanumeric() || is_combining_mark(c) {
            folded.push(c);
        } else {
            folded.push(' ');
        }
    }

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonicalize a batch of raw reviews, preserving order.
pub fn canonicalize_reviews(raw: &[RawReview]) -> Vec<Review> {
    raw.iter()
        .map(|r| Review::from_raw(r, canonicalize(&r.content)))
        .collect()
}

fn is_apostrophe(c: char) -> bool {
    matches!(c, '\'' | '\u{2018}' | '\u{2019}' | '`')
}
