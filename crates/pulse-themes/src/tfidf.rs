//! TF-IDF keyword scoring for theme labels.
//!
//! Document frequencies come from a background corpus (normally every
//! review in the run); term frequencies come from the documents of one
//! theme. Terms that are frequent inside a theme but rare across the
//! corpus score highest.

use std::collections::{BTreeMap, HashMap, HashSet};

/// TF-IDF scorer with a fixed background corpus.
pub struct TfIdf {
    /// Term -> number of corpus documents containing it
    doc_frequencies: HashMap<String, usize>,
    /// Number of corpus documents
    doc_count: usize,
}

impl TfIdf {
    /// Build document frequencies from a corpus.
    pub fn new(corpus: &[&str]) -> Self {
        let mut doc_frequencies: HashMap<String, usize> = HashMap::new();

        for doc in corpus {
            let unique_terms: HashSet<String> = tokenize(doc).into_iter().collect();
            for term in unique_terms {
                *doc_frequencies.entry(term).or_insert(0) += 1;
            }
        }

        Self {
            doc_frequencies,
            doc_count: corpus.len(),
        }
    }

    /// Smoothed inverse document frequency: ln((N + 1) / (df + 1)) + 1.
    ///
    /// Terms never seen in the corpus are treated as appearing in no
    /// document, which gives them the maximum weight.
    pub fn idf(&self, term: &str) -> f32 {
        let df = *self.doc_frequencies.get(term).unwrap_or(&0) as f32;
        let n = self.doc_count as f32;
        ((n + 1.0) / (df + 1.0)).ln() + 1.0
    }

    /// Score the terms of `documents` and return the top `n`.
    ///
    /// Ordered by score descending, then alphabetically so equal scores
    /// always come back in the same order.
    pub fn top_terms(&self, documents: &[&str], n: usize) -> Vec<(String, f32)> {
        let mut term_counts: BTreeMap<String, usize> = BTreeMap::new();
        for doc in documents {
            for term in tokenize(doc) {
                *term_counts.entry(term).or_insert(0) += 1;
            }
        }

        let total: usize = term_counts.values().sum();
        if total == 0 {
            return Vec::new();
        }

        let mut scores: Vec<(String, f32)> = term_counts
            .into_iter()
            .map(|(term, count)| {
                let score = (count as f32 / total as f32) * self.idf(&term);
                (term, score)
            })
            .collect();

        scores.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scores.truncate(n);
        scores
    }

    /// Get corpus document count.
    pub fn doc_count(&self) -> usize {
        self.doc_count
    }

    /// Get number of distinct corpus terms.
    pub fn term_count(&self) -> usize {
        self.doc_frequencies.len()
    }
}

/// Tokenize text into lowercase content words.
///
/// Drops stop words, single characters and pure numbers.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.chars().count() > 1)
        .filter(|s| !is_stop_word(s))
        .filter(|s| !s.chars().all(|c| c.is_numeric()))
        .map(String::from)
        .collect()
}

/// Check if a word carries no topical meaning in app reviews.
fn is_stop_word(word: &str) -> bool {
    const STOP_WORDS: &[&str] = &[
        "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "in", "is", "it",
        "its", "of", "on", "or", "that", "the", "to", "was", "were", "will", "with", "this",
        "they", "but", "have", "had", "what", "when", "where", "who", "which", "why", "how",
        "all", "some", "no", "not", "only", "so", "than", "too", "very", "can", "just", "now",
        "also", "been", "do", "does", "did", "would", "could", "should", "about", "after",
        "again", "am", "any", "before", "into", "out", "over", "up", "then", "there", "if",
        "because", "we", "you", "your", "our", "their", "them", "me", "my", "i", "im", "dont",
        "app", "apps", "application", "please", "really", "even", "one", "get", "got", "use",
        "using", "much", "many", "still", "every", "time", "ive",
    ];

    STOP_WORDS.contains(&word)
}
