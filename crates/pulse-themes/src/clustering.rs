//! Density-based clustering of representative embeddings.
//!
//! Uses HDBSCAN with the Euclidean metric over unit-normalized vectors,
//! which orders neighbours exactly as cosine distance does. Neighbour
//! search is brute force, so there is no randomness to seed.
//!
//! Points are sorted by review id before clustering and cluster ids are
//! renumbered by each cluster's smallest member, so the partition and the
//! ids do not depend on input order.

use std::collections::{BTreeMap, HashMap};

use hdbscan::{DistanceMetric, Hdbscan, HdbscanHyperParams, NnAlgorithm};
use pulse_types::{ClusterLabel, ClusteringParams, ReviewId};
use tracing::{debug, info, instrument, warn};

use crate::similarity::{is_usable, mean_vector, normalize};
use crate::types::{Cluster, Embedding, RejectedEmbedding};

/// Result of clustering one run's representatives.
#[derive(Debug, Clone, Default)]
pub struct ClusterOutcome {
    /// Label for every representative handed to the engine
    pub labels: BTreeMap<ReviewId, ClusterLabel>,
    /// Non-noise clusters ordered by id
    pub clusters: Vec<Cluster>,
    /// Representatives whose embedding could not be used (labeled noise)
    pub rejected: Vec<RejectedEmbedding>,
    /// Dimensionality used for this run
    pub dimension: Option<usize>,
}

impl ClusterOutcome {
    /// Label of a representative.
    pub fn label_of(&self, review_id: &str) -> Option<ClusterLabel> {
        self.labels.get(review_id).copied()
    }

    /// Number of representatives labeled noise (rejected ones included).
    pub fn noise_count(&self) -> usize {
        self.labels.values().filter(|l| l.is_noise()).count()
    }
}

/// Runs density-based clustering with fixed parameters.
pub struct ClusterEngine {
    params: ClusteringParams,
}

impl ClusterEngine {
    /// Create an engine with validated parameters.
    pub fn new(params: ClusteringParams) -> Self {
        Self { params }
    }

    /// Cluster representative embeddings.
    ///
    /// `declared_dimension` fixes D for the run; without it D is the most
    /// common vector length. Vectors of another length, zero vectors and
    /// vectors with non-finite components are rejected and labeled noise.
    /// Never fails: any clustering problem degrades to an all-noise result.
    #[instrument(skip_all, fields(points = points.len()))]
    pub fn cluster(
        &self,
        points: &[(ReviewId, Embedding)],
        declared_dimension: Option<usize>,
    ) -> ClusterOutcome {
        let mut outcome = ClusterOutcome {
            dimension: declared_dimension.or_else(|| infer_dimension(points)),
            ..Default::default()
        };

        let mut accepted: Vec<(&ReviewId, Embedding)> = Vec::with_capacity(points.len());
        for (review_id, vector) in points {
            match check_vector(vector, outcome.dimension) {
                Ok(()) => {
                    let mut unit = vector.clone();
                    normalize(&mut unit);
                    accepted.push((review_id, unit));
                }
                Err(reason) => {
                    warn!(review_id = %review_id, %reason, "Embedding rejected");
                    outcome.labels.insert(review_id.clone(), ClusterLabel::Noise);
                    outcome.rejected.push(RejectedEmbedding {
                        review_id: review_id.clone(),
                        reason,
                    });
                }
            }
        }

        accepted.sort_by(|a, b| a.0.cmp(b.0));

        let raw_labels = self.run_hdbscan(&accepted);
        let assignments = renumber(&raw_labels);

        let mut members: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (idx, (review_id, _)) in accepted.iter().enumerate() {
            let label = match assignments[idx] {
                Some(cluster_id) => {
                    members.entry(cluster_id).or_default().push(idx);
                    ClusterLabel::Cluster(cluster_id)
                }
                None => ClusterLabel::Noise,
            };
            outcome.labels.insert((*review_id).clone(), label);
        }

        outcome.clusters = members
            .into_iter()
            .map(|(cluster_id, indices)| {
                let vectors: Vec<&[f32]> =
                    indices.iter().map(|&i| accepted[i].1.as_slice()).collect();
                Cluster {
                    cluster_id,
                    members: indices.iter().map(|&i| accepted[i].0.clone()).collect(),
                    centroid: mean_vector(&vectors),
                }
            })
            .collect();

        info!(
            clusters = outcome.clusters.len(),
            noise = outcome.noise_count(),
            rejected = outcome.rejected.len(),
            "Clustering complete"
        );

        outcome
    }

    /// Raw HDBSCAN labels (-1 = noise) for sorted, normalized points.
    fn run_hdbscan(&self, accepted: &[(&ReviewId, Embedding)]) -> Vec<i32> {
        let n = accepted.len();
        let all_noise = vec![-1; n];

        // A core point needs min_samples neighbours besides itself
        if n <= self.params.min_samples || n < self.params.min_cluster_size {
            info!(
                points = n,
                min_samples = self.params.min_samples,
                min_cluster_size = self.params.min_cluster_size,
                "Too few points to cluster, labeling all as noise"
            );
            return all_noise;
        }

        let data: Vec<Vec<f32>> = accepted.iter().map(|(_, v)| v.clone()).collect();
        let hyper_params = HdbscanHyperParams::builder()
            .min_cluster_size(self.params.min_cluster_size)
            .min_samples(self.params.min_samples)
            .dist_metric(DistanceMetric::Euclidean)
            .nn_algorithm(NnAlgorithm::BruteForce)
            .build();

        match Hdbscan::new(&data, hyper_params).cluster() {
            Ok(labels) => {
                debug!(points = n, "HDBSCAN finished");
                labels
            }
            Err(e) => {
                warn!(error = ?e, "HDBSCAN failed, labeling all as noise");
                all_noise
            }
        }
    }
}

impl Default for ClusterEngine {
    fn default() -> Self {
        Self::new(ClusteringParams::default())
    }
}

/// Map raw labels to ids ordered by first appearance; noise becomes `None`.
fn renumber(raw_labels: &[i32]) -> Vec<Option<u32>> {
    let mut ids: HashMap<i32, u32> = HashMap::new();
    raw_labels
        .iter()
        .map(|&raw| {
            if raw < 0 {
                return None;
            }
            let next = ids.len() as u32;
            Some(*ids.entry(raw).or_insert(next))
        })
        .collect()
}

/// Most common non-empty vector length; ties go to the smaller length.
fn infer_dimension(points: &[(ReviewId, Embedding)]) -> Option<usize> {
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for (_, vector) in points {
        if !vector.is_empty() {
            *counts.entry(vector.len()).or_insert(0) += 1;
        }
    }

    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .map(|(dimension, _)| dimension)
}

fn check_vector(vector: &[f32], dimension: Option<usize>) -> Result<(), String> {
    match dimension {
        Some(d) if vector.len() != d => Err(format!(
            "dimension {} does not match run dimension {}",
            vector.len(),
            d
        )),
        None => Err("no usable embeddings in run".to_string()),
        _ if !is_usable(vector) => Err("zero or non-finite vector".to_string()),
        _ => Ok(()),
    }
}
