//! End-to-end test infrastructure for review-pulse.
//!
//! Provides synthetic review sets with precomputed embeddings and test
//! labelers for E2E tests covering the full canonicalize-to-store pipeline.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use pulse_themes::{
    AssignmentStore, CancelFlag, Embedding, LabelRequest, PrecomputedEmbeddings, ThemeLabel,
    ThemeLabeler, ThemePipeline, ThemesError,
};
use pulse_types::{RawReview, RunConfig, ThemeId};

/// Vocabulary for synthetic review text.
const WORDS: [&str; 32] = [
    "refund", "login", "otp", "slow", "crash", "chart", "kyc", "support", "fees", "update",
    "screen", "order", "wallet", "bank", "card", "upi", "limit", "alert", "price", "stock",
    "broker", "margin", "delay", "ticket", "email", "verify", "portfolio", "theme", "font",
    "widget", "layout", "tax",
];

/// Reviews plus the vectors supplied for them.
#[derive(Debug, Clone, Default)]
pub struct Fixture {
    /// Reviews in input order
    pub reviews: Vec<RawReview>,
    /// Embeddings keyed by review text
    pub embeddings: PrecomputedEmbeddings,
}

impl Fixture {
    /// Append one review with its vector (`None` leaves it unembedded).
    pub fn push(&mut self, id: &str, text: &str, vector: Option<Embedding>) {
        if let Some(vector) = vector {
            self.embeddings.insert(text, vector);
        }
        self.reviews.push(RawReview::new(id, text));
    }

    /// Append a tight blob of `count` reviews around `center`.
    ///
    /// Ids are `{prefix}-{i:02}`; jitter goes on the last axis so blobs
    /// stay equidistant from each other.
    pub fn push_blob(&mut self, prefix: &str, count: usize, center: &[f32], rng: &mut StdRng) {
        for i in 0..count {
            let mut vector = center.to_vec();
            if let Some(last) = vector.last_mut() {
                *last += 0.01 * i as f32;
            }
            let id = format!("{}-{:02}", prefix, i);
            let text = random_text(rng);
            self.push(&id, &text, Some(vector));
        }
    }

    /// Same reviews in a seeded random order.
    pub fn shuffled(&self, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut reviews = self.reviews.clone();
        reviews.shuffle(&mut rng);
        Self {
            reviews,
            embeddings: self.embeddings.clone(),
        }
    }
}

/// Unit vector along `axis` in `dim` dimensions.
pub fn axis(dim: usize, axis: usize) -> Embedding {
    let mut v = vec![0.0; dim];
    v[axis] = 1.0;
    v
}

/// Seven well separated blobs of six reviews, ids `b0-..` through `b6-..`.
///
/// Blob 1 sits closest to blob 0 (cosine distance 0.2) and blob 3 next
/// closest to blob 2 (0.3); every other pair is orthogonal.
pub fn seven_blobs(seed: u64) -> Fixture {
    let dim = 8;
    let mut centers: Vec<Embedding> = (0..7).map(|k| axis(dim, k)).collect();
    centers[1] = vec![0.8, 0.6, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
    centers[3] = vec![0.0, 0.0, 0.7, 0.714_142_8, 0.0, 0.0, 0.0, 0.0];

    let mut rng = StdRng::seed_from_u64(seed);
    let mut fixture = Fixture::default();
    for (k, center) in centers.iter().enumerate() {
        fixture.push_blob(&format!("b{}", k), 6, center, &mut rng);
    }
    fixture
}

/// Six distinct words drawn from the vocabulary.
pub fn random_text(rng: &mut StdRng) -> String {
    let mut words: Vec<&str> = WORDS.to_vec();
    words.shuffle(rng);
    let len = rng.random_range(5..=7);
    words[..len].join(" ")
}

/// Run config tuned for the synthetic fixtures.
pub fn test_config(max_themes: usize) -> RunConfig {
    let mut config = RunConfig::default();
    config.consolidation.max_themes = max_themes;
    config
}

/// Run the pipeline over a fixture.
pub fn run(
    config: RunConfig,
    fixture: &Fixture,
    labeler: Box<dyn ThemeLabeler>,
) -> Result<AssignmentStore, ThemesError> {
    ThemePipeline::new(config, Box::new(fixture.embeddings.clone()), labeler)
        .run(&fixture.reviews, &CancelFlag::new())
}

/// Theme of every review id.
pub fn assignments(store: &AssignmentStore) -> BTreeMap<String, ThemeId> {
    store
        .reviews()
        .iter()
        .filter_map(|r| {
            store
                .theme_of(&r.review_id)
                .map(|theme| (r.review_id.clone(), theme))
        })
        .collect()
}

/// Labeler that names themes after their most central sample and counts calls.
///
/// Clones share the call counter, so a test can keep one clone after boxing
/// another into a pipeline.
#[derive(Debug, Default, Clone)]
pub struct SampleLabeler {
    calls: Arc<AtomicUsize>,
}

impl SampleLabeler {
    /// Number of `label_theme` calls so far, across all clones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ThemeLabeler for SampleLabeler {
    fn label_theme(&self, request: &LabelRequest) -> Result<ThemeLabel, ThemesError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let first = request.samples.first().cloned().unwrap_or_default();
        Ok(ThemeLabel::new(first, vec![], 1.0))
    }
}

/// Labeler whose provider always fails.
#[derive(Debug, Default)]
pub struct FailingLabeler;

impl ThemeLabeler for FailingLabeler {
    fn label_theme(&self, _request: &LabelRequest) -> Result<ThemeLabel, ThemesError> {
        Err(ThemesError::Labeling("provider unavailable".to_string()))
    }
}
