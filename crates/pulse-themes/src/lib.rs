//! # pulse-themes
//!
//! Deduplication, clustering and theme consolidation for Review Pulse.
//!
//! Turns cleaned review records plus embedding vectors into a deduplicated
//! review set, density-based clusters and a theme assignment capped at K
//! named themes plus the reserved `miscellaneous` theme.
//!
//! ## Stages
//! - Canonicalization of review text for comparison
//! - Near-duplicate grouping with deterministic representatives
//! - HDBSCAN clustering over unit-normalized embeddings
//! - Theme consolidation (noise routing, small-cluster absorption,
//!   closest-centroid merging)
//! - Labeling through the `ThemeLabeler` seam with a "Theme N" fallback
//! - A read-only `AssignmentStore` and JSON Lines artifacts
//!
//! ## Example
//! ```
//! use pulse_themes::{CancelFlag, KeywordLabeler, PrecomputedEmbeddings, ThemePipeline};
//! use pulse_types::{RawReview, RunConfig, ThemeId};
//!
//! let reviews = vec![RawReview::new("r1", "Withdrawal stuck")];
//! let embeddings: PrecomputedEmbeddings =
//!     vec![("Withdrawal stuck", vec![1.0, 0.0])].into_iter().collect();
//!
//! let pipeline = ThemePipeline::new(
//!     RunConfig::default(),
//!     Box::new(embeddings),
//!     Box::new(KeywordLabeler::default()),
//! );
//! let store = pipeline.run(&reviews, &CancelFlag::new()).unwrap();
//! assert_eq!(store.theme_of("r1"), Some(ThemeId::Miscellaneous));
//! ```

pub mod artifact;
pub mod canonical;
pub mod clustering;
pub mod consolidation;
pub mod dedup;
pub mod embedding;
pub mod error;
pub mod labeling;
pub mod llm_labeler;
pub mod pipeline;
pub mod similarity;
pub mod store;
pub mod tfidf;
pub mod types;

pub use artifact::{AssignmentRecord, ThemeSummary, ThemeSummaryEntry};
pub use canonical::{canonicalize, canonicalize_reviews};
pub use clustering::{ClusterEngine, ClusterOutcome};
pub use consolidation::{Consolidation, MergeRecord, ThemeConsolidator, ThemePartition, ThemeSlot};
pub use dedup::{DedupOutcome, Deduplicator};
pub use embedding::{EmbeddingProvider, PrecomputedEmbeddings};
pub use error::ThemesError;
pub use labeling::{KeywordLabeler, LabelRequest, ThemeLabel, ThemeLabeler};
pub use llm_labeler::{LlmClient, LlmLabeler, NoOpLlmClient};
pub use pipeline::{unique_reviews, CancelFlag, ThemePipeline};
pub use similarity::{cosine_distance, cosine_similarity};
pub use store::{AssignmentStore, DigestTheme, RunStats};
pub use tfidf::TfIdf;
pub use types::{
    Cluster, DuplicateGroup, Embedding, MiscellaneousTheme, NamedTheme, RejectedEmbedding, Theme,
    MISCELLANEOUS_LABEL,
};
