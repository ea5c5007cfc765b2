//! Near-duplicate detection over canonical review text.
//!
//! Two reviews are duplicates when their canonical texts are identical or
//! their normalized Levenshtein similarity reaches the configured
//! threshold. Groups are the connected components of that relation.
//!
//! Candidates come from character q-gram prefix filtering. An edit
//! destroys at most q grams, so two texts within the allowed edit distance
//! must share one of the rarest few grams of each text. Only texts sharing
//! such a gram are compared, and a gram count filter runs before the edit
//! distance. Texts are looked up in parallel; unions are applied afterwards in
//! sorted order so the result does not depend on scheduling.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use pulse_types::{Review, ReviewId, RunConfig};
use rayon::prelude::*;
use tracing::{debug, info, instrument};

use crate::types::DuplicateGroup;

/// Result of deduplicating one run's reviews.
#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    /// Groups ordered by the input position of their first member
    pub groups: Vec<DuplicateGroup>,
    representative_of: HashMap<ReviewId, ReviewId>,
}

impl DedupOutcome {
    pub(crate) fn from_groups(groups: Vec<DuplicateGroup>) -> Self {
        let representative_of = groups
            .iter()
            .flat_map(|g| {
                g.members
                    .iter()
                    .map(move |m| (m.clone(), g.representative.clone()))
            })
            .collect();
        Self {
            groups,
            representative_of,
        }
    }

    /// Representative review ids, in group order.
    pub fn representatives(&self) -> impl Iterator<Item = &ReviewId> {
        self.groups.iter().map(|g| &g.representative)
    }

    /// Representative for any input review (itself if it is one).
    pub fn representative_of(&self, review_id: &str) -> Option<&ReviewId> {
        self.representative_of.get(review_id)
    }

    /// Number of reviews collapsed into another review.
    pub fn duplicate_count(&self) -> usize {
        self.groups.iter().map(|g| g.size() - 1).sum()
    }
}

/// Groups near-identical reviews and picks one representative per group.
pub struct Deduplicator {
    similarity_threshold: f64,
}

impl Deduplicator {
    /// Create a deduplicator with the given similarity threshold (0.0-1.0].
    pub fn new(similarity_threshold: f64) -> Self {
        Self {
            similarity_threshold,
        }
    }

    /// Create a deduplicator from a validated run configuration.
    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.similarity_threshold)
    }

    /// Partition reviews into duplicate groups.
    ///
    /// Reviews with empty canonical text always form their own group.
    #[instrument(skip_all, fields(reviews = reviews.len()))]
    pub fn deduplicate(&self, reviews: &[Review]) -> DedupOutcome {
        let mut sets = DisjointSet::new(reviews.len());

        // Exact matches: every review joins the first review with the same text.
        let mut first_with_text: BTreeMap<&str, usize> = BTreeMap::new();
        for (idx, review) in reviews.iter().enumerate() {
            if review.is_blank() {
                continue;
            }
            match first_with_text.get(review.canonical_text.as_str()) {
                Some(&first) => sets.union(first, idx),
                None => {
                    first_with_text.insert(review.canonical_text.as_str(), idx);
                }
            }
        }

        // Near matches between distinct texts, compared through a gram index.
        let distinct: Vec<(&str, usize)> = first_with_text.into_iter().collect();
        let texts: Vec<&str> = distinct.iter().map(|(text, _)| *text).collect();
        let index = &CandidateIndex::build(&texts, self.similarity_threshold);
        debug!(
            distinct_texts = distinct.len(),
            gram_size = index.gram_size,
            indexed_grams = index.postings.len(),
            unfiltered = index.unfiltered.len(),
            "Comparing near-duplicate candidates"
        );

        let mut pairs: Vec<(usize, usize)> = (0..texts.len())
            .into_par_iter()
            .flat_map_iter(|a| {
                index
                    .candidates(a)
                    .into_iter()
                    .filter(move |&b| self.is_near_duplicate(index, a, b))
                    .map(move |b| (a.min(b), a.max(b)))
            })
            .collect();
        pairs.sort_unstable();
        pairs.dedup();

        for (a, b) in pairs {
            sets.union(distinct[a].1, distinct[b].1);
        }

        let groups = collect_groups(reviews, &mut sets);
        let outcome = DedupOutcome::from_groups(groups);

        info!(
            groups = outcome.groups.len(),
            duplicates = outcome.duplicate_count(),
            "Deduplication complete"
        );

        outcome
    }

    fn is_near_duplicate(&self, index: &CandidateIndex, a: usize, b: usize) -> bool {
        let (len_a, len_b) = (index.lens[a], index.lens[b]);
        let (short, long) = (len_a.min(len_b), len_a.max(len_b));

        // Edit similarity can never exceed short/long.
        if long == 0 || (short as f64 / long as f64) < self.similarity_threshold {
            return false;
        }

        // Texts within d edits share at least max(grams) - q*d grams.
        let allowed = max_edits_for_pair(long, self.similarity_threshold);
        let required = index.grams[a].len().max(index.grams[b].len()) as isize
            - (index.gram_size * allowed) as isize;
        if required > 0 && (shared_grams(&index.grams[a], &index.grams[b]) as isize) < required {
            return false;
        }

        strsim::normalized_levenshtein(index.texts[a], index.texts[b])
            >= self.similarity_threshold
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::from_config(&RunConfig::default())
    }
}

/// A character q-gram (q <= 3, unused slots are `\0`) tagged with its
/// occurrence number, so gram multisets compare as sets.
type Gram = ([char; 3], u32);

/// Slack for floating point when turning a threshold into an edit budget.
const EDIT_EPSILON: f64 = 1e-9;

/// Largest q for which prefix filtering stays selective at this threshold.
///
/// Filtering needs `L - q + 1 > q * d` with `d ~ (1 - t) / t * L`, i.e.
/// `t > q / (q + 1)`.
fn gram_size(threshold: f64) -> usize {
    if threshold >= 0.8 {
        3
    } else if threshold >= 0.7 {
        2
    } else {
        1
    }
}

/// Most edits a text of `len` chars can be away from any partner it
/// reaches the threshold with (the partner may be up to `len / t` long).
fn max_edits(len: usize, threshold: f64) -> usize {
    ((1.0 - threshold) / threshold * len as f64 + EDIT_EPSILON).floor() as usize
}

/// Most edits allowed between two texts whose longer one has `long` chars.
fn max_edits_for_pair(long: usize, threshold: f64) -> usize {
    ((1.0 - threshold) * long as f64 + EDIT_EPSILON).floor() as usize
}

fn tagged_grams(text: &str, q: usize) -> Vec<Gram> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < q {
        return Vec::new();
    }

    let mut seen: HashMap<[char; 3], u32> = HashMap::new();
    chars
        .windows(q)
        .map(|window| {
            let mut key = ['\0'; 3];
            key[..q].copy_from_slice(window);
            let count = seen.entry(key).or_insert(0);
            *count += 1;
            (key, *count)
        })
        .collect()
}

/// Size of the intersection of two sorted gram lists.
fn shared_grams(a: &[Gram], b: &[Gram]) -> usize {
    let (mut i, mut j, mut shared) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                shared += 1;
                i += 1;
                j += 1;
            }
        }
    }
    shared
}

/// Inverted index over the rarest grams of each distinct text.
struct CandidateIndex<'a> {
    texts: &'a [&'a str],
    gram_size: usize,
    threshold: f64,
    /// Length of each text in chars
    lens: Vec<usize>,
    /// All grams of each text, sorted
    grams: Vec<Vec<Gram>>,
    /// Rarest grams of each filtered text (empty otherwise)
    prefixes: Vec<Vec<Gram>>,
    /// Prefix gram -> texts (ascending) whose prefix holds it
    postings: HashMap<Gram, Vec<usize>>,
    /// Texts too short for their edit budget to guarantee a shared gram
    unfiltered: Vec<usize>,
    /// (length, text) sorted, for length-window scans
    by_len: Vec<(usize, usize)>,
}

impl<'a> CandidateIndex<'a> {
    fn build(texts: &'a [&'a str], threshold: f64) -> Self {
        let gram_size = gram_size(threshold);
        let lens: Vec<usize> = texts.iter().map(|t| t.chars().count()).collect();
        let grams: Vec<Vec<Gram>> = texts
            .par_iter()
            .map(|text| {
                let mut grams = tagged_grams(text, gram_size);
                grams.sort_unstable();
                grams
            })
            .collect();

        let mut frequency: HashMap<Gram, usize> = HashMap::new();
        for text_grams in &grams {
            for gram in text_grams {
                *frequency.entry(*gram).or_insert(0) += 1;
            }
        }

        let mut postings: HashMap<Gram, Vec<usize>> = HashMap::new();
        let mut prefixes: Vec<Vec<Gram>> = vec![Vec::new(); texts.len()];
        let mut unfiltered = Vec::new();
        for (idx, text_grams) in grams.iter().enumerate() {
            let edits = max_edits(lens[idx], threshold);
            // Without an edit budget only identical texts match, and those
            // were grouped already.
            if edits == 0 {
                continue;
            }

            let prefix_len = gram_size * edits + 1;
            if text_grams.len() < prefix_len {
                unfiltered.push(idx);
                continue;
            }

            let mut ordered: Vec<(usize, Gram)> = text_grams
                .iter()
                .map(|g| (frequency.get(g).copied().unwrap_or(0), *g))
                .collect();
            ordered.sort_unstable();
            for (_, gram) in ordered.into_iter().take(prefix_len) {
                postings.entry(gram).or_default().push(idx);
                prefixes[idx].push(gram);
            }
        }

        let mut by_len: Vec<(usize, usize)> =
            lens.iter().enumerate().map(|(idx, &len)| (len, idx)).collect();
        by_len.sort_unstable();

        Self {
            texts,
            gram_size,
            threshold,
            lens,
            grams,
            prefixes,
            postings,
            unfiltered,
            by_len,
        }
    }

    /// Texts that may be near-duplicates of `idx`.
    ///
    /// Partners found through the gram index are returned only when their
    /// index is greater than `idx`; unfiltered texts are paired by length
    /// window in both directions. The caller deduplicates pairs.
    fn candidates(&self, idx: usize) -> Vec<usize> {
        let mut found: Vec<usize> = Vec::new();

        for gram in &self.prefixes[idx] {
            if let Some(posting) = self.postings.get(gram) {
                let start = posting.partition_point(|&other| other <= idx);
                found.extend_from_slice(&posting[start..]);
            }
        }

        if self.unfiltered.binary_search(&idx).is_ok() {
            found.extend(self.length_window(idx));
        } else {
            found.extend(
                self.unfiltered
                    .iter()
                    .copied()
                    .filter(|&other| self.length_compatible(idx, other)),
            );
        }

        found.retain(|&other| other != idx);
        found.sort_unstable();
        found.dedup();
        found
    }

    fn length_window(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        let len = self.lens[idx] as f64;
        let low = (len * self.threshold - EDIT_EPSILON).ceil() as usize;
        let high = (len / self.threshold + EDIT_EPSILON).floor() as usize;
        let start = self.by_len.partition_point(|&(l, _)| l < low);
        let end = self.by_len.partition_point(|&(l, _)| l <= high);
        self.by_len[start..end].iter().map(|&(_, other)| other)
    }

    fn length_compatible(&self, a: usize, b: usize) -> bool {
        let (la, lb) = (self.lens[a], self.lens[b]);
        let (short, long) = (la.min(lb), la.max(lb));
        long > 0 && short as f64 >= long as f64 * self.threshold - EDIT_EPSILON
    }
}

/// Assemble groups in input order and choose their representatives.
fn collect_groups(reviews: &[Review], sets: &mut DisjointSet) -> Vec<DuplicateGroup> {
    let mut by_root: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    let mut root_order: Vec<usize> = Vec::new();

    for idx in 0..reviews.len() {
        let root = sets.find(idx);
        let members = by_root.entry(root).or_default();
        if members.is_empty() {
            root_order.push(root);
        }
        members.push(idx);
    }

    root_order
        .into_iter()
        .filter_map(|root| by_root.remove(&root))
        .map(|members| {
            let representative = members
                .iter()
                .map(|&idx| &reviews[idx])
                .min_by(|a, b| representative_order(a, b))
                .map(|r| r.review_id.clone())
                .unwrap_or_default();
            DuplicateGroup {
                representative,
                members: members
                    .iter()
                    .map(|&idx| reviews[idx].review_id.clone())
                    .collect(),
            }
        })
        .collect()
}

/// Total order for representative selection: the smallest review wins.
///
/// 1. Longest canonical text
/// 2. Earliest timestamp (reviews without one rank last)
/// 3. Lowest source id
pub fn representative_order(a: &Review, b: &Review) -> Ordering {
    b.canonical_len()
        .cmp(&a.canonical_len())
        .then_with(|| earliest_first(a.timestamp, b.timestamp))
        .then_with(|| a.review_id.cmp(&b.review_id))
}

fn earliest_first(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Union-find over review positions; the smaller root always wins.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            let (keep, merge) = (ra.min(rb), ra.max(rb));
            self.parent[merge] = keep;
        }
    }
}
