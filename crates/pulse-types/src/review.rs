//! Review records.
//!
//! A `RawReview` is what the scraper hands over: identity, free text,
//! rating and timestamp. A `Review` adds the canonical form used for
//! comparison while keeping the original text for display.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source identifier of a review (stable across runs).
pub type ReviewId = String;

/// A review as received from the import layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReview {
    /// Source review identifier
    pub review_id: ReviewId,

    /// Original review text
    pub content: String,

    /// Star rating (1-5) when known
    #[serde(default, rename = "score", skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,

    /// When the review was posted
    #[serde(default, rename = "date", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl RawReview {
    /// Create a review with no rating or timestamp.
    pub fn new(review_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            review_id: review_id.into(),
            content: content.into(),
            rating: None,
            timestamp: None,
        }
    }

    /// Set the star rating.
    pub fn with_rating(mut self, rating: u8) -> Self {
        self.rating = Some(rating);
        self
    }

    /// Set the posting timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// A review with its canonical comparison text.
///
/// Identity, original text, rating and timestamp are never modified after
/// canonicalization; later stages record their results alongside rather
/// than on the review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    /// Source review identifier
    pub review_id: ReviewId,
    /// Original text, kept for display and downstream generation
    pub text: String,
    /// Lowercased, normalized text used for duplicate detection
    pub canonical_text: String,
    /// Star rating (1-5) when known
    pub rating: Option<u8>,
    /// When the review was posted
    pub timestamp: Option<DateTime<Utc>>,
}

impl Review {
    /// Build a review from its raw form and a precomputed canonical text.
    pub fn from_raw(raw: &RawReview, canonical_text: String) -> Self {
        Self {
            review_id: raw.review_id.clone(),
            text: raw.content.clone(),
            canonical_text,
            rating: raw.rating,
            timestamp: raw.timestamp,
        }
    }

    /// Length of the canonical text in characters.
    pub fn canonical_len(&self) -> usize {
        self.canonical_text.chars().count()
    }

    /// Whether the canonical text is empty (nothing to compare).
    pub fn is_blank(&self) -> bool {
        self.canonical_text.is_empty()
    }
}
