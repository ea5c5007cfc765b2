//! Theme labeling using keyword extraction.
//!
//! The consolidator hands every surviving theme to a `ThemeLabeler`.
//! Labels carry no meaning for the engine; a failed call is replaced with
//! the deterministic "Theme N" label.

use pulse_types::LabelingSettings;

use crate::error::ThemesError;
use crate::tfidf::TfIdf;

/// What a labeler gets to see for one theme.
#[derive(Debug, Clone)]
pub struct LabelRequest {
    /// 1-based theme number (used for the fallback label)
    pub theme_number: u32,
    /// Theme centroid
    pub centroid: Vec<f32>,
    /// Original texts of member reviews, most central first
    pub samples: Vec<String>,
}

impl LabelRequest {
    /// Create a new label request.
    pub fn new(theme_number: u32, centroid: Vec<f32>, samples: Vec<String>) -> Self {
        Self {
            theme_number,
            centroid,
            samples,
        }
    }
}

/// Generated theme label with metadata.
#[derive(Debug, Clone)]
pub struct ThemeLabel {
    /// Human-readable label (2-5 words)
    pub label: String,
    /// Top keywords for this theme
    pub keywords: Vec<String>,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,
}

impl ThemeLabel {
    /// Create a new theme label.
    pub fn new(label: String, keywords: Vec<String>, confidence: f32) -> Self {
        Self {
            label,
            keywords,
            confidence,
        }
    }

    /// The deterministic label used when a labeler fails.
    pub fn fallback(theme_number: u32) -> Self {
        Self::new(fallback_label(theme_number), Vec::new(), 0.0)
    }
}

/// Fallback label for a theme number.
pub fn fallback_label(theme_number: u32) -> String {
    format!("Theme {}", theme_number)
}

/// Trait for generating theme labels.
pub trait ThemeLabeler: Send + Sync {
    /// Generate a label for one theme.
    fn label_theme(&self, request: &LabelRequest) -> Result<ThemeLabel, ThemesError>;
}

impl<T: ThemeLabeler + ?Sized> ThemeLabeler for Box<T> {
    fn label_theme(&self, request: &LabelRequest) -> Result<ThemeLabel, ThemesError> {
        (**self).label_theme(request)
    }
}

/// Keyword-based theme labeler using TF-IDF.
///
/// This is the default labeler that requires no external dependencies.
/// With a background corpus (normally all reviews in the run), keywords
/// that distinguish the theme from the rest score highest; without one the
/// sample texts serve as their own corpus.
pub struct KeywordLabeler {
    config: LabelingSettings,
    corpus: Option<TfIdf>,
}

impl KeywordLabeler {
    /// Create a new keyword labeler.
    pub fn new(config: LabelingSettings) -> Self {
        Self {
            config,
            corpus: None,
        }
    }

    /// Score keywords against a background corpus.
    pub fn with_corpus(mut self, corpus: &[&str]) -> Self {
        self.corpus = Some(TfIdf::new(corpus));
        self
    }

    /// Extract keywords using TF-IDF scoring.
    ///
    /// Returns keywords sorted by TF-IDF score (highest first).
    fn extract_keywords(&self, samples: &[&str]) -> Vec<(String, f32)> {
        if samples.is_empty() {
            return Vec::new();
        }

        // Extra terms leave room for filtering
        let n = self.config.top_keywords * 2;
        match &self.corpus {
            Some(tfidf) => tfidf.top_terms(samples, n),
            None => TfIdf::new(samples).top_terms(samples, n),
        }
    }

    /// Generate a label from top keywords.
    fn generate_label(&self, keywords: &[(String, f32)], theme_number: u32) -> String {
        if keywords.is_empty() {
            return fallback_label(theme_number);
        }

        let label_words: Vec<String> = keywords
            .iter()
            .take(3)
            .map(|(word, _)| capitalize(word))
            .collect();

        truncate_label(&label_words.join(" "), self.config.max_label_length)
    }

    /// Calculate confidence based on keyword distribution.
    ///
    /// Higher confidence when keywords have distinct high scores.
    fn calculate_confidence(&self, keywords: &[(String, f32)]) -> f32 {
        if keywords.is_empty() {
            return 0.0;
        }
        if keywords.len() == 1 {
            return keywords[0].1.min(1.0);
        }

        let top_score = keywords[0].1;
        let total_score: f32 = keywords.iter().map(|(_, s)| s).sum();

        if total_score == 0.0 {
            return 0.0;
        }

        // Scale to 0.5-1.0 (having any keywords gives at least 0.5)
        0.5 + (top_score / total_score) * 0.5
    }
}

impl ThemeLabeler for KeywordLabeler {
    fn label_theme(&self, request: &LabelRequest) -> Result<ThemeLabel, ThemesError> {
        if request.samples.is_empty() {
            return Err(ThemesError::InvalidInput(format!(
                "Cannot label theme {} without samples",
                request.theme_number
            )));
        }

        let samples: Vec<&str> = request.samples.iter().map(String::as_str).collect();
        let keywords = self.extract_keywords(&samples);
        let label = self.generate_label(&keywords, request.theme_number);
        let confidence = self.calculate_confidence(&keywords);

        let top_keywords: Vec<String> = keywords
            .into_iter()
            .take(self.config.top_keywords)
            .map(|(word, _)| word)
            .collect();

        Ok(ThemeLabel::new(label, top_keywords, confidence))
    }
}

impl Default for KeywordLabeler {
    fn default() -> Self {
        Self::new(LabelingSettings::default())
    }
}

/// Truncate a label to `max_chars` characters, breaking at a word boundary.
pub(crate) fn truncate_label(label: &str, max_chars: usize) -> String {
    if label.chars().count() <= max_chars {
        return label.to_string();
    }

    let cut = label
        .char_indices()
        .nth(max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(label.len());
    let truncated = &label[..cut];

    match truncated.rfind(' ') {
        Some(last_space) if last_space > 0 => truncated[..last_space].trim_end().to_string(),
        _ => truncated.to_string(),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
