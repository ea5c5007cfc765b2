//! Theme consolidation.
//!
//! Reduces an unbounded set of raw clusters to at most K named themes plus
//! the reserved `miscellaneous` theme:
//!
//! 1. Noise (and rejected embeddings) go to `miscellaneous`.
//! 2. Clusters smaller than `min_theme_size` go to `miscellaneous`.
//! 3. While more than K clusters remain, the two with the closest
//!    centroids (cosine) merge into one whose centroid is the size-weighted
//!    mean. Equal distances are resolved by the configured tie-break and
//!    finally by the lowest cluster ids.
//! 4. Survivors are numbered 1..=K by size (descending, then lowest cluster
//!    id) and handed to the labeler once each.
//!
//! Steps 1-3 are idempotent: feeding the surviving clusters back in with
//! the same parameters yields the same themes and performs no merges.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use pulse_types::{ConsolidationParams, MergeTieBreak, ReviewId, ThemeId};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::labeling::{fallback_label, LabelRequest, ThemeLabeler};
use crate::similarity::{cosine_distance, weighted_mean};
use crate::types::{Cluster, MiscellaneousTheme, NamedTheme, Theme};

/// Distances closer than this are treated as equal.
const DISTANCE_EPSILON: f32 = 1e-6;

/// One merge performed during cardinality reduction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRecord {
    /// Cluster id that survives (the lower of the two)
    pub kept: u32,
    /// Cluster id folded into `kept`
    pub absorbed: u32,
    /// Cosine distance between the two centroids
    pub distance: f32,
    /// Member count after the merge
    pub combined_size: usize,
}

/// A surviving cluster with its theme number.
#[derive(Debug, Clone, PartialEq)]
pub struct ThemeSlot {
    /// 1-based theme number
    pub number: u32,
    /// Merged cluster (id is the lowest source id)
    pub cluster: Cluster,
    /// Raw cluster ids folded into this slot, sorted
    pub source_clusters: Vec<u32>,
}

/// Outcome of steps 1-3, before labeling.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThemePartition {
    /// Named slots ordered by theme number
    pub slots: Vec<ThemeSlot>,
    /// Members of `miscellaneous`, sorted
    pub miscellaneous: Vec<ReviewId>,
    /// Merges in the order they were applied
    pub merges: Vec<MergeRecord>,
    /// Raw cluster ids sent to `miscellaneous`, sorted
    pub demoted: Vec<u32>,
}

impl ThemePartition {
    /// Theme id for every raw cluster id.
    pub fn cluster_mapping(&self) -> BTreeMap<u32, ThemeId> {
        let mut mapping: BTreeMap<u32, ThemeId> = self
            .demoted
            .iter()
            .map(|&id| (id, ThemeId::Miscellaneous))
            .collect();
        for slot in &self.slots {
            for &id in &slot.source_clusters {
                mapping.insert(id, ThemeId::Theme(slot.number));
            }
        }
        mapping
    }
}

/// Final consolidation result with labels.
#[derive(Debug, Clone)]
pub struct Consolidation {
    /// Named themes in number order, then `miscellaneous` (always present)
    pub themes: Vec<Theme>,
    /// Theme id for every raw cluster id
    pub cluster_themes: BTreeMap<u32, ThemeId>,
    /// Merges in the order they were applied
    pub merges: Vec<MergeRecord>,
    /// Raw cluster ids sent to `miscellaneous`
    pub demoted: Vec<u32>,
    /// Themes that received the fallback label
    pub fallback_labels: usize,
}

impl Consolidation {
    /// Number of named themes.
    pub fn named_count(&self) -> usize {
        self.themes
            .iter()
            .filter(|t| matches!(t, Theme::Named(_)))
            .count()
    }
}

/// Enforces the theme cardinality bound.
pub struct ThemeConsolidator {
    params: ConsolidationParams,
}

impl ThemeConsolidator {
    /// Create a consolidator with validated parameters.
    pub fn new(params: ConsolidationParams) -> Self {
        Self { params }
    }

    /// Get the parameters.
    pub fn params(&self) -> &ConsolidationParams {
        &self.params
    }

    /// Route, absorb and merge raw clusters into at most K slots.
    ///
    /// `unclustered` holds representatives labeled noise, including those
    /// whose embedding was rejected.
    #[instrument(skip_all, fields(clusters = clusters.len(), max_themes = self.params.max_themes))]
    pub fn partition(&self, clusters: &[Cluster], unclustered: &[ReviewId]) -> ThemePartition {
        let mut miscellaneous: Vec<ReviewId> = unclustered.to_vec();
        let mut demoted: Vec<u32> = Vec::new();
        let mut working: Vec<Working> = Vec::new();

        for cluster in clusters {
            if cluster.size() < self.params.min_theme_size || self.params.max_themes == 0 {
                debug!(
                    cluster_id = cluster.cluster_id,
                    size = cluster.size(),
                    "Cluster sent to miscellaneous"
                );
                miscellaneous.extend(cluster.members.iter().cloned());
                demoted.push(cluster.cluster_id);
            } else {
                working.push(Working::from(cluster));
            }
        }
        working.sort_by_key(|w| w.cluster_id);

        let mut merges = Vec::new();
        while working.len() > self.params.max_themes {
            let Some(best) = self.closest_pair(&working) else {
                break;
            };
            merges.push(merge(&mut working, best));
        }

        working.sort_by(|a, b| {
            b.members
                .len()
                .cmp(&a.members.len())
                .then_with(|| a.cluster_id.cmp(&b.cluster_id))
        });

        let slots: Vec<ThemeSlot> = working
            .into_iter()
            .enumerate()
            .map(|(idx, w)| ThemeSlot {
                number: idx as u32 + 1,
                cluster: Cluster {
                    cluster_id: w.cluster_id,
                    members: w.members,
                    centroid: w.centroid,
                },
                source_clusters: w.sources,
            })
            .collect();

        miscellaneous.sort();
        demoted.sort_unstable();

        info!(
            themes = slots.len(),
            merges = merges.len(),
            demoted = demoted.len(),
            miscellaneous = miscellaneous.len(),
            "Consolidation complete"
        );

        ThemePartition {
            slots,
            miscellaneous,
            merges,
            demoted,
        }
    }

    /// Label every slot, substituting "Theme N" when the labeler fails.
    ///
    /// `samples` returns member texts for a slot, most central first; at
    /// most `label_samples` of them are passed on.
    #[instrument(skip_all, fields(themes = partition.slots.len()))]
    pub fn label<L, F>(&self, partition: ThemePartition, labeler: &L, samples: F) -> Consolidation
    where
        L: ThemeLabeler + ?Sized,
        F: Fn(&ThemeSlot) -> Vec<String>,
    {
        let cluster_themes = partition.cluster_mapping();
        let mut fallback_labels = 0;
        let mut themes = Vec::with_capacity(partition.slots.len() + 1);

        for slot in partition.slots {
            let mut texts = samples(&slot);
            texts.truncate(self.params.label_samples);
            let request = LabelRequest::new(slot.number, slot.cluster.centroid.clone(), texts);

            let label = match labeler.label_theme(&request) {
                Ok(label) if !label.label.trim().is_empty() => label.label,
                Ok(_) => {
                    warn!(theme = slot.number, "Labeler returned an empty label");
                    fallback_labels += 1;
                    fallback_label(slot.number)
                }
                Err(e) => {
                    warn!(theme = slot.number, error = %e, "Labeling failed, using fallback");
                    fallback_labels += 1;
                    fallback_label(slot.number)
                }
            };

            themes.push(Theme::Named(NamedTheme {
                number: slot.number,
                label,
                centroid: slot.cluster.centroid,
                members: slot.cluster.members,
            }));
        }

        themes.push(Theme::Miscellaneous(MiscellaneousTheme {
            members: partition.miscellaneous,
        }));

        Consolidation {
            themes,
            cluster_themes,
            merges: partition.merges,
            demoted: partition.demoted,
            fallback_labels,
        }
    }

    /// Partition and label in one step.
    pub fn consolidate<L, F>(
        &self,
        clusters: &[Cluster],
        unclustered: &[ReviewId],
        labeler: &L,
        samples: F,
    ) -> Consolidation
    where
        L: ThemeLabeler + ?Sized,
        F: Fn(&ThemeSlot) -> Vec<String>,
    {
        let partition = self.partition(clusters, unclustered);
        self.label(partition, labeler, samples)
    }

    /// Closest pair of working clusters under the tie-break policy.
    fn closest_pair(&self, working: &[Working]) -> Option<Candidate> {
        let n = working.len();
        let candidates: Vec<Candidate> = (0..n)
            .into_par_iter()
            .flat_map_iter(|i| {
                (i + 1..n).map(move |j| Candidate {
                    left: i,
                    right: j,
                    distance: cosine_distance(&working[i].centroid, &working[j].centroid),
                    combined_size: working[i].members.len() + working[j].members.len(),
                    ids: (working[i].cluster_id, working[j].cluster_id),
                })
            })
            .collect();

        candidates
            .into_iter()
            .min_by(|a, b| self.compare_candidates(a, b))
    }

    fn compare_candidates(&self, a: &Candidate, b: &Candidate) -> Ordering {
        let by_distance = if (a.distance - b.distance).abs() <= DISTANCE_EPSILON {
            Ordering::Equal
        } else {
            a.distance.total_cmp(&b.distance)
        };

        let by_policy = match self.params.tie_break {
            MergeTieBreak::SmallerCombinedSize => a.combined_size.cmp(&b.combined_size),
            MergeTieBreak::LargerCombinedSize => b.combined_size.cmp(&a.combined_size),
            MergeTieBreak::LowestClusterIds => Ordering::Equal,
        };

        by_distance
            .then(by_policy)
            .then_with(|| a.ids.cmp(&b.ids))
    }
}

impl Default for ThemeConsolidator {
    fn default() -> Self {
        Self::new(ConsolidationParams::default())
    }
}

/// A cluster being consolidated.
#[derive(Debug, Clone)]
struct Working {
    cluster_id: u32,
    members: Vec<ReviewId>,
    centroid: Vec<f32>,
    sources: Vec<u32>,
}

impl From<&Cluster> for Working {
    fn from(cluster: &Cluster) -> Self {
        Self {
            cluster_id: cluster.cluster_id,
            members: cluster.members.clone(),
            centroid: cluster.centroid.clone(),
            sources: vec![cluster.cluster_id],
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    left: usize,
    right: usize,
    distance: f32,
    combined_size: usize,
    ids: (u32, u32),
}

/// Fold the candidate pair together; the lower cluster id survives.
fn merge(working: &mut Vec<Working>, candidate: Candidate) -> MergeRecord {
    // working is sorted by id, so left < right in both position and id
    let absorbed = working.remove(candidate.right);
    let kept = &mut working[candidate.left];

    kept.centroid = weighted_mean(
        &kept.centroid,
        kept.members.len(),
        &absorbed.centroid,
        absorbed.members.len(),
    );
    kept.members.extend(absorbed.members);
    kept.members.sort();
    kept.sources.extend(absorbed.sources);
    kept.sources.sort_unstable();

    let record = MergeRecord {
        kept: kept.cluster_id,
        absorbed: absorbed.cluster_id,
        distance: candidate.distance,
        combined_size: kept.members.len(),
    };

    debug!(
        kept = record.kept,
        absorbed = record.absorbed,
        distance = record.distance,
        combined_size = record.combined_size,
        "Merged clusters"
    );

    record
}
