//! Read-only results of one run.
//!
//! The store is assembled once the consolidator finishes and is never
//! mutated afterwards. Downstream generators read theme membership from it
//! and must count duplicates through their representative.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use pulse_types::{ClusterLabel, Review, ReviewId, ThemeId};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::clustering::ClusterOutcome;
use crate::consolidation::{Consolidation, MergeRecord};
use crate::dedup::DedupOutcome;
use crate::types::{RejectedEmbedding, Theme};

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Reviews handed to the pipeline (after dropping repeated ids)
    pub input_reviews: usize,
    /// Reviews collapsed onto a representative
    pub duplicates: usize,
    /// Representatives (one per duplicate group)
    pub representatives: usize,
    /// Representatives whose embedding was unusable
    pub rejected_embeddings: usize,
    /// Clusters found before consolidation
    pub raw_clusters: usize,
    /// Representatives labeled noise (rejected included)
    pub noise: usize,
    /// Merges performed to respect the theme bound
    pub merges: usize,
    /// Clusters sent to `miscellaneous` for being too small
    pub demoted_clusters: usize,
    /// Named themes produced
    pub themes: usize,
    /// Themes that received the fallback label
    pub fallback_labels: usize,
}

/// Theme view handed to sentiment, quote and action generators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigestTheme {
    /// Theme identifier
    pub theme_id: ThemeId,
    /// Display label
    pub label: String,
    /// Original review volume (duplicates included)
    pub review_count: usize,
    /// Original texts of the representative reviews only
    pub texts: Vec<String>,
}

/// Review and theme assignments for one run.
#[derive(Debug, Clone)]
pub struct AssignmentStore {
    run_id: Ulid,
    generated_at: DateTime<Utc>,
    reviews: Vec<Review>,
    review_index: HashMap<ReviewId, usize>,
    representative_of: HashMap<ReviewId, ReviewId>,
    group_sizes: HashMap<ReviewId, usize>,
    cluster_labels: BTreeMap<ReviewId, ClusterLabel>,
    theme_of_representative: HashMap<ReviewId, ThemeId>,
    themes: Vec<Theme>,
    cluster_themes: BTreeMap<u32, ThemeId>,
    merges: Vec<MergeRecord>,
    rejected: Vec<RejectedEmbedding>,
    stats: RunStats,
}

impl AssignmentStore {
    /// Freeze the results of a completed run.
    pub(crate) fn assemble(
        reviews: Vec<Review>,
        dedup: &DedupOutcome,
        clusters: ClusterOutcome,
        consolidation: Consolidation,
        stats: RunStats,
    ) -> Self {
        let review_index = reviews
            .iter()
            .enumerate()
            .map(|(idx, r)| (r.review_id.clone(), idx))
            .collect();

        let mut representative_of = HashMap::new();
        let mut group_sizes = HashMap::new();
        for group in &dedup.groups {
            group_sizes.insert(group.representative.clone(), group.size());
            for member in &group.members {
                representative_of.insert(member.clone(), group.representative.clone());
            }
        }

        let theme_of_representative = consolidation
            .themes
            .iter()
            .flat_map(|theme| theme.members().iter().map(move |m| (m.clone(), theme.id())))
            .collect();

        Self {
            run_id: Ulid::new(),
            generated_at: Utc::now(),
            reviews,
            review_index,
            representative_of,
            group_sizes,
            cluster_labels: clusters.labels,
            theme_of_representative,
            themes: consolidation.themes,
            cluster_themes: consolidation.cluster_themes,
            merges: consolidation.merges,
            rejected: clusters.rejected,
            stats,
        }
    }

    /// Run identifier.
    pub fn run_id(&self) -> Ulid {
        self.run_id
    }

    /// When the run completed.
    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    /// Run counters.
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// All reviews in input order.
    pub fn reviews(&self) -> &[Review] {
        &self.reviews
    }

    /// Look up a review by id.
    pub fn review(&self, review_id: &str) -> Option<&Review> {
        self.review_index.get(review_id).map(|&idx| &self.reviews[idx])
    }

    /// Named themes in number order followed by `miscellaneous`.
    pub fn themes(&self) -> &[Theme] {
        &self.themes
    }

    /// Look up a theme.
    pub fn theme(&self, theme_id: ThemeId) -> Option<&Theme> {
        self.themes.iter().find(|t| t.id() == theme_id)
    }

    /// Merges performed during consolidation.
    pub fn merges(&self) -> &[MergeRecord] {
        &self.merges
    }

    /// Representatives excluded from clustering.
    pub fn rejected(&self) -> &[RejectedEmbedding] {
        &self.rejected
    }

    /// Theme id for every raw cluster id.
    pub fn cluster_themes(&self) -> &BTreeMap<u32, ThemeId> {
        &self.cluster_themes
    }

    /// Representative of a review (itself if it is one).
    pub fn representative_of(&self, review_id: &str) -> Option<&ReviewId> {
        self.representative_of.get(review_id)
    }

    /// Representative of a duplicate; `None` for representatives.
    pub fn duplicate_of(&self, review_id: &str) -> Option<&ReviewId> {
        self.representative_of(review_id)
            .filter(|rep| rep.as_str() != review_id)
    }

    /// Cluster label of a review, resolved through its representative.
    pub fn cluster_of(&self, review_id: &str) -> Option<ClusterLabel> {
        let rep = self.representative_of(review_id)?;
        self.cluster_labels.get(rep).copied()
    }

    /// Theme of any review, duplicates resolved through their representative.
    pub fn theme_of(&self, review_id: &str) -> Option<ThemeId> {
        let rep = self.representative_of(review_id)?;
        self.theme_of_representative.get(rep).copied()
    }

    /// Label of a theme.
    pub fn label_of(&self, theme_id: ThemeId) -> Option<&str> {
        self.theme(theme_id).map(Theme::label)
    }

    /// Original review volume of a theme (duplicates included).
    pub fn review_count(&self, theme_id: ThemeId) -> usize {
        self.theme(theme_id)
            .map(|t| t.members().iter().map(|m| self.group_size(m)).sum())
            .unwrap_or(0)
    }

    /// Number of representatives in a theme.
    pub fn representative_count(&self, theme_id: ThemeId) -> usize {
        self.theme(theme_id).map(|t| t.members().len()).unwrap_or(0)
    }

    /// Theme centroid (`None` for `miscellaneous`).
    pub fn centroid(&self, theme_id: ThemeId) -> Option<&[f32]> {
        self.theme(theme_id).and_then(Theme::centroid)
    }

    /// Review volume per theme in theme order.
    pub fn theme_counts(&self) -> Vec<(ThemeId, usize)> {
        self.themes
            .iter()
            .map(|t| (t.id(), self.review_count(t.id())))
            .collect()
    }

    /// Theme views for downstream generators.
    pub fn digest_themes(&self) -> Vec<DigestTheme> {
        self.themes
            .iter()
            .map(|theme| DigestTheme {
                theme_id: theme.id(),
                label: theme.label().to_string(),
                review_count: self.review_count(theme.id()),
                texts: theme
                    .members()
                    .iter()
                    .filter_map(|m| self.review(m))
                    .map(|r| r.text.clone())
                    .collect(),
            })
            .collect()
    }

    fn group_size(&self, representative: &str) -> usize {
        self.group_sizes.get(representative).copied().unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DuplicateGroup, MiscellaneousTheme, NamedTheme};
    use pulse_types::RawReview;

    fn review(id: &str, text: &str) -> Review {
        Review::from_raw(&RawReview::new(id, text), text.to_lowercase())
    }

    /// r1 and r2 duplicate r3; r3 and r4 form theme 1; r5 is noise.
    fn store() -> AssignmentStore {
        let reviews = vec![
            review("r1", "Great app"),
            review("r2", "great app!"),
            review("r3", "Great apps"),
            review("r4", "Love it"),
            review("r5", "meh"),
        ];
        let dedup = DedupOutcome::from_groups(vec![
            DuplicateGroup {
                representative: "r3".to_string(),
                members: vec!["r1".to_string(), "r2".to_string(), "r3".to_string()],
            },
            DuplicateGroup {
                representative: "r4".to_string(),
                members: vec!["r4".to_string()],
            },
            DuplicateGroup {
                representative: "r5".to_string(),
                members: vec!["r5".to_string()],
            },
        ]);

        let mut clusters = ClusterOutcome::default();
        clusters
            .labels
            .insert("r3".to_string(), ClusterLabel::Cluster(0));
        clusters
            .labels
            .insert("r4".to_string(), ClusterLabel::Cluster(0));
        clusters.labels.insert("r5".to_string(), ClusterLabel::Noise);

        let consolidation = Consolidation {
            themes: vec![
                Theme::Named(NamedTheme {
                    number: 1,
                    label: "Praise".to_string(),
                    centroid: vec![1.0, 0.0],
                    members: vec!["r3".to_string(), "r4".to_string()],
                }),
                Theme::Miscellaneous(MiscellaneousTheme {
                    members: vec!["r5".to_string()],
                }),
            ],
            cluster_themes: BTreeMap::from([(0, ThemeId::Theme(1))]),
            merges: vec![],
            demoted: vec![],
            fallback_labels: 0,
        };

        AssignmentStore::assemble(reviews, &dedup, clusters, consolidation, RunStats::default())
    }

    #[test]
    fn test_duplicates_resolve_through_representative() {
        let store = store();
        assert_eq!(store.theme_of("r1"), Some(ThemeId::Theme(1)));
        assert_eq!(store.cluster_of("r2"), Some(ClusterLabel::Cluster(0)));
        assert_eq!(store.duplicate_of("r1"), Some(&"r3".to_string()));
        assert_eq!(store.duplicate_of("r3"), None);
        assert_eq!(store.theme_of("r5"), Some(ThemeId::Miscellaneous));
        assert_eq!(store.theme_of("missing"), None);
    }

    #[test]
    fn test_counts_expand_duplicate_groups() {
        let store = store();
        assert_eq!(store.review_count(ThemeId::Theme(1)), 4);
        assert_eq!(store.representative_count(ThemeId::Theme(1)), 2);
        assert_eq!(store.review_count(ThemeId::Miscellaneous), 1);
        assert_eq!(
            store.theme_counts(),
            vec![(ThemeId::Theme(1), 4), (ThemeId::Miscellaneous, 1)]
        );
        let total: usize = store.theme_counts().iter().map(|(_, c)| c).sum();
        assert_eq!(total, store.reviews().len());
    }

    #[test]
    fn test_digest_themes_use_representative_texts_only() {
        let digest = store().digest_themes();
        assert_eq!(digest[0].label, "Praise");
        assert_eq!(digest[0].review_count, 4);
        assert_eq!(digest[0].texts, vec!["Great apps", "Love it"]);
        assert_eq!(digest[1].theme_id, ThemeId::Miscellaneous);
        assert_eq!(digest[1].label, "Miscellaneous");
    }

    #[test]
    fn test_centroid_and_labels() {
        let store = store();
        assert_eq!(store.centroid(ThemeId::Theme(1)), Some(&[1.0f32, 0.0][..]));
        assert_eq!(store.centroid(ThemeId::Miscellaneous), None);
        assert_eq!(store.label_of(ThemeId::Theme(1)), Some("Praise"));
        assert_eq!(store.label_of(ThemeId::Theme(2)), None);
        assert_eq!(store.review_count(ThemeId::Theme(2)), 0);
    }
}
