//! End-to-end theme run.
//!
//! Canonicalizer -> Deduplicator -> embedding -> Cluster Engine ->
//! Theme Consolidator -> Assignment Store. Nothing is persisted until the
//! store is returned, so a cancelled run just drops its in-memory state.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pulse_types::{ClusterLabel, RawReview, Review, ReviewId, RunConfig};
use tracing::{debug, info, instrument, warn};

use crate::canonical::canonicalize_reviews;
use crate::clustering::ClusterEngine;
use crate::consolidation::{ThemeConsolidator, ThemeSlot};
use crate::dedup::{DedupOutcome, Deduplicator};
use crate::embedding::EmbeddingProvider;
use crate::error::ThemesError;
use crate::labeling::ThemeLabeler;
use crate::similarity::cosine_distance;
use crate::store::{AssignmentStore, RunStats};
use crate::types::{DuplicateGroup, Embedding, RejectedEmbedding};

/// Shared flag checked between pipeline stages.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self, completed_stage: &'static str) -> Result<(), ThemesError> {
        if self.is_cancelled() {
            info!(stage = completed_stage, "Run cancelled");
            return Err(ThemesError::Cancelled(completed_stage));
        }
        Ok(())
    }
}

/// Runs the whole theme engine with one configuration.
pub struct ThemePipeline {
    config: RunConfig,
    embedder: Box<dyn EmbeddingProvider>,
    labeler: Box<dyn ThemeLabeler>,
}

impl ThemePipeline {
    /// Create a pipeline with its collaborators.
    pub fn new(
        config: RunConfig,
        embedder: Box<dyn EmbeddingProvider>,
        labeler: Box<dyn ThemeLabeler>,
    ) -> Self {
        Self {
            config,
            embedder,
            labeler,
        }
    }

    /// Get the run configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run every stage over `raw`.
    ///
    /// Data problems never fail the run; only cancellation does.
    #[instrument(skip_all, fields(reviews = raw.len()))]
    pub fn run(&self, raw: &[RawReview], cancel: &CancelFlag) -> Result<AssignmentStore, ThemesError> {
        let reviews = canonicalize_reviews(&unique_reviews(raw));

        let dedup = Deduplicator::from_config(&self.config).deduplicate(&reviews);
        cancel.check("deduplication")?;

        let by_id: HashMap<&str, &Review> = reviews
            .iter()
            .map(|r| (r.review_id.as_str(), r))
            .collect();

        let (points, embed_rejected) = self.embed(&dedup, &by_id);
        cancel.check("embedding")?;

        let engine = ClusterEngine::new(self.config.clustering);
        let mut clusters = engine.cluster(&points, self.embedder.dimension());
        for rejected in embed_rejected {
            clusters
                .labels
                .insert(rejected.review_id.clone(), ClusterLabel::Noise);
            clusters.rejected.push(rejected);
        }
        cancel.check("clustering")?;

        let unclustered: Vec<ReviewId> = clusters
            .labels
            .iter()
            .filter(|(_, label)| label.is_noise())
            .map(|(id, _)| id.clone())
            .collect();

        let vectors: HashMap<&str, &[f32]> = points
            .iter()
            .map(|(id, v)| (id.as_str(), v.as_slice()))
            .collect();
        let consolidator = ThemeConsolidator::new(self.config.consolidation);
        let consolidation = consolidator.consolidate(
            &clusters.clusters,
            &unclustered,
            self.labeler.as_ref(),
            |slot| central_samples(slot, &vectors, &by_id),
        );

        let stats = RunStats {
            input_reviews: reviews.len(),
            duplicates: dedup.duplicate_count(),
            representatives: dedup.groups.len(),
            rejected_embeddings: clusters.rejected.len(),
            raw_clusters: clusters.clusters.len(),
            noise: unclustered.len(),
            merges: consolidation.merges.len(),
            demoted_clusters: consolidation.demoted.len(),
            themes: consolidation.named_count(),
            fallback_labels: consolidation.fallback_labels,
        };
        info!(?stats, "Theme run complete");

        Ok(AssignmentStore::assemble(
            reviews,
            &dedup,
            clusters,
            consolidation,
            stats,
        ))
    }

    /// Embed each representative once, using its original text.
    ///
    /// When the representative's text has no vector, the other group
    /// members are tried in input order and the first vector found stands in
    /// for the group. The group is rejected only when no member embeds.
    fn embed(
        &self,
        dedup: &DedupOutcome,
        by_id: &HashMap<&str, &Review>,
    ) -> (Vec<(ReviewId, Embedding)>, Vec<RejectedEmbedding>) {
        let groups: Vec<(&Review, &DuplicateGroup)> = dedup
            .groups
            .iter()
            .filter_map(|g| by_id.get(g.representative.as_str()).map(|r| (*r, g)))
            .collect();
        let texts: Vec<&str> = groups.iter().map(|(r, _)| r.text.as_str()).collect();
        let results = self.embedder.embed_batch(&texts);

        let mut points = Vec::with_capacity(groups.len());
        let mut rejected = Vec::new();
        let mut borrowed = 0;
        for ((review, group), result) in groups.iter().zip(results) {
            let e = match result {
                Ok(vector) => {
                    points.push((review.review_id.clone(), vector));
                    continue;
                }
                Err(e) => e,
            };

            let fallback = group
                .duplicates()
                .filter_map(|id| by_id.get(id.as_str()))
                .find_map(|member| {
                    self.embedder
                        .embed(&member.text)
                        .ok()
                        .map(|vector| (member.review_id.as_str(), vector))
                });
            match fallback {
                Some((member, vector)) => {
                    debug!(
                        review_id = %review.review_id,
                        member,
                        "Representative embedded through a group member"
                    );
                    borrowed += 1;
                    points.push((review.review_id.clone(), vector));
                }
                None => {
                    warn!(review_id = %review.review_id, error = %e, "Embedding rejected");
                    rejected.push(RejectedEmbedding {
                        review_id: review.review_id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            embedded = points.len(),
            borrowed,
            rejected = rejected.len(),
            "Embedding complete"
        );
        (points, rejected)
    }
}

/// Keep the first review for each id.
pub fn unique_reviews(raw: &[RawReview]) -> Vec<RawReview> {
    let mut seen: HashSet<&str> = HashSet::new();
    raw.iter()
        .filter(|r| {
            let first = seen.insert(r.review_id.as_str());
            if !first {
                warn!(review_id = %r.review_id, "Repeated review id skipped");
            }
            first
        })
        .cloned()
        .collect()
}

/// Member texts ordered by distance to the slot centroid, then by id.
fn central_samples(
    slot: &ThemeSlot,
    vectors: &HashMap<&str, &[f32]>,
    reviews: &HashMap<&str, &Review>,
) -> Vec<String> {
    let mut members: Vec<(f32, &ReviewId)> = slot
        .cluster
        .members
        .iter()
        .map(|id| {
            let distance = vectors
                .get(id.as_str())
                .filter(|v| v.len() == slot.cluster.centroid.len())
                .map(|v| cosine_distance(v, &slot.cluster.centroid))
                .unwrap_or(f32::MAX);
            (distance, id)
        })
        .collect();
    members.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));

    members
        .into_iter()
        .filter_map(|(_, id)| reviews.get(id.as_str()))
        .map(|r| r.text.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::PrecomputedEmbeddings;
    use crate::labeling::KeywordLabeler;
    use chrono::{TimeZone, Utc};
    use pulse_types::ThemeId;

    fn pipeline(embeddings: PrecomputedEmbeddings) -> ThemePipeline {
        ThemePipeline::new(
            RunConfig::default(),
            Box::new(embeddings),
            Box::new(KeywordLabeler::default()),
        )
    }

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::new();
        let shared = flag.clone();
        assert!(!flag.is_cancelled());
        shared.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_cancelled_run_stops_after_deduplication() {
        let flag = CancelFlag::new();
        flag.cancel();
        let result = pipeline(PrecomputedEmbeddings::new())
            .run(&[RawReview::new("r1", "slow app")], &flag);
        assert!(matches!(result, Err(ThemesError::Cancelled("deduplication"))));
    }

    /// Provider that requests cancellation while the batch is embedded.
    struct CancellingEmbedder(CancelFlag);

    impl EmbeddingProvider for CancellingEmbedder {
        fn dimension(&self) -> Option<usize> {
            Some(2)
        }

        fn embed(&self, _text: &str) -> Result<Embedding, ThemesError> {
            self.0.cancel();
            Ok(vec![1.0, 0.0])
        }
    }

    #[test]
    fn test_cancel_during_embedding_stops_before_clustering() {
        let flag = CancelFlag::new();
        let pipeline = ThemePipeline::new(
            RunConfig::default(),
            Box::new(CancellingEmbedder(flag.clone())),
            Box::new(KeywordLabeler::default()),
        );
        let raw = vec![
            RawReview::new("r1", "login fails"),
            RawReview::new("r2", "refund pending"),
        ];

        let result = pipeline.run(&raw, &flag);
        assert!(matches!(result, Err(ThemesError::Cancelled("embedding"))));
    }

    #[test]
    fn test_small_run_lands_in_miscellaneous() {
        let raw = vec![
            RawReview::new("r1", "login fails"),
            RawReview::new("r2", "refund pending"),
            RawReview::new("r3", "charts are slow"),
            RawReview::new("r4", "kyc rejected"),
        ];
        let embeddings: PrecomputedEmbeddings = vec![
            ("login fails", vec![1.0, 0.0, 0.0]),
            ("refund pending", vec![0.0, 1.0, 0.0]),
            ("charts are slow", vec![0.0, 0.0, 1.0]),
            ("kyc rejected", vec![0.7, 0.7, 0.0]),
        ]
        .into_iter()
        .collect();

        let store = pipeline(embeddings).run(&raw, &CancelFlag::new()).unwrap();

        assert_eq!(store.themes().len(), 1);
        for id in ["r1", "r2", "r3", "r4"] {
            assert_eq!(store.theme_of(id), Some(ThemeId::Miscellaneous));
        }
        assert_eq!(store.review_count(ThemeId::Miscellaneous), 4);
    }

    #[test]
    fn test_missing_embedding_routed_to_miscellaneous() {
        let raw = vec![
            RawReview::new("r1", "login fails"),
            RawReview::new("r2", "no vector for me"),
        ];
        let embeddings: PrecomputedEmbeddings =
            vec![("login fails", vec![1.0, 0.0])].into_iter().collect();

        let store = pipeline(embeddings).run(&raw, &CancelFlag::new()).unwrap();

        assert_eq!(store.rejected().len(), 1);
        assert_eq!(store.rejected()[0].review_id, "r2");
        assert_eq!(store.theme_of("r2"), Some(ThemeId::Miscellaneous));
        assert_eq!(store.stats().rejected_embeddings, 1);
    }

    #[test]
    fn test_representative_without_vector_uses_member_vector() {
        // r2 represents the group (it carries the timestamp) but only r1's
        // text has a vector
        let raw = vec![
            RawReview::new("r1", "otp not received"),
            RawReview::new("r2", "OTP not received")
                .with_timestamp(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()),
        ];
        let embeddings: PrecomputedEmbeddings =
            vec![("otp not received", vec![1.0, 0.0])].into_iter().collect();

        let store = pipeline(embeddings).run(&raw, &CancelFlag::new()).unwrap();

        assert!(store.rejected().is_empty());
        assert_eq!(store.stats().rejected_embeddings, 0);
        assert_eq!(store.stats().representatives, 1);
        assert_eq!(store.theme_of("r1"), store.theme_of("r2"));
    }

    #[test]
    fn test_repeated_ids_keep_first() {
        let raw = vec![
            RawReview::new("r1", "first text"),
            RawReview::new("r1", "second text"),
        ];
        let store = pipeline(PrecomputedEmbeddings::new())
            .run(&raw, &CancelFlag::new())
            .unwrap();
        assert_eq!(store.reviews().len(), 1);
        assert_eq!(store.reviews()[0].text, "first text");
    }

    #[test]
    fn test_central_samples_order() {
        let slot = ThemeSlot {
            number: 1,
            cluster: crate::types::Cluster {
                cluster_id: 0,
                members: vec!["far".to_string(), "near".to_string(), "none".to_string()],
                centroid: vec![1.0, 0.0],
            },
            source_clusters: vec![0],
        };
        let near = Review::from_raw(&RawReview::new("near", "Near text"), "near text".into());
        let far = Review::from_raw(&RawReview::new("far", "Far text"), "far text".into());
        let none = Review::from_raw(&RawReview::new("none", "No vector"), "no vector".into());
        let reviews: HashMap<&str, &Review> =
            [("near", &near), ("far", &far), ("none", &none)].into_iter().collect();
        let near_v = [0.9f32, 0.1];
        let far_v = [0.1f32, 0.9];
        let vectors: HashMap<&str, &[f32]> =
            [("near", &near_v[..]), ("far", &far_v[..])].into_iter().collect();

        let samples = central_samples(&slot, &vectors, &reviews);
        assert_eq!(samples, vec!["Near text", "Far text", "No vector"]);
    }
}
