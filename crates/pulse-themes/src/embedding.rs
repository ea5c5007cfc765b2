//! Embedding provider seam.
//!
//! The engine never computes embeddings itself. A provider maps review text
//! to a fixed-length vector; vectors are treated as read-only input.

use std::collections::HashMap;

use crate::error::ThemesError;
use crate::types::Embedding;

/// Source of embedding vectors for review text.
///
/// Implementations must be thread-safe (Send + Sync) for concurrent use.
pub trait EmbeddingProvider: Send + Sync {
    /// Declared vector dimension, if the provider knows it up front.
    ///
    /// When `None`, the run dimension is inferred from the returned vectors.
    fn dimension(&self) -> Option<usize>;

    /// Generate the embedding for a single text.
    fn embed(&self, text: &str) -> Result<Embedding, ThemesError>;

    /// Generate embeddings for multiple texts.
    ///
    /// Default implementation calls `embed()` for each text. Failures are
    /// reported per text so one bad review does not sink the batch.
    fn embed_batch(&self, texts: &[&str]) -> Vec<Result<Embedding, ThemesError>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Provider backed by vectors supplied alongside the input reviews.
///
/// Vectors are keyed by the review's original text; the first vector seen
/// for a text wins.
#[derive(Debug, Default, Clone)]
pub struct PrecomputedEmbeddings {
    vectors: HashMap<String, Embedding>,
    dimension: Option<usize>,
}

impl PrecomputedEmbeddings {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the expected dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    /// Register the vector for a text.
    pub fn insert(&mut self, text: impl Into<String>, vector: Embedding) {
        self.vectors.entry(text.into()).or_insert(vector);
    }

    /// Number of registered texts.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether no vectors are registered.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, Embedding)> for PrecomputedEmbeddings {
    fn from_iter<I: IntoIterator<Item = (S, Embedding)>>(iter: I) -> Self {
        let mut provider = Self::new();
        for (text, vector) in iter {
            provider.insert(text, vector);
        }
        provider
    }
}

impl EmbeddingProvider for PrecomputedEmbeddings {
    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Embedding, ThemesError> {
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| ThemesError::Embedding("no embedding supplied".to_string()))
    }
}
