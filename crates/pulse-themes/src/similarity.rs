//! Vector similarity functions.
//!
//! Centroids are plain (unnormalized) means so that merging two clusters
//! with a size-weighted mean gives exactly the mean of all their members.
//! Cosine measures are scale-invariant, so this does not affect distances.

/// Calculate cosine similarity between two vectors.
///
/// Returns value in [-1.0, 1.0] where 1.0 = identical direction.
/// Zero vectors have similarity 0.0 with everything.
///
/// # Panics
/// Panics if vectors have different dimensions.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "Vectors must have same dimension");

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Cosine distance (1 - cosine similarity), in [0.0, 2.0].
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    (1.0 - cosine_similarity(a, b)).max(0.0)
}

/// Mean of a set of equally sized vectors.
///
/// Returns an empty vector for an empty input.
pub fn mean_vector(vectors: &[&[f32]]) -> Vec<f32> {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };

    let n = vectors.len() as f32;
    let mut mean = vec![0.0f32; first.len()];

    for vector in vectors {
        assert_eq!(
            vector.len(),
            mean.len(),
            "All vectors must have same dimension"
        );
        for (acc, &val) in mean.iter_mut().zip(vector.iter()) {
            *acc += val;
        }
    }

    for val in mean.iter_mut() {
        *val /= n;
    }

    mean
}

/// Size-weighted mean of two centroids.
pub fn weighted_mean(a: &[f32], weight_a: usize, b: &[f32], weight_b: usize) -> Vec<f32> {
    assert_eq!(a.len(), b.len(), "Vectors must have same dimension");

    let total = (weight_a + weight_b) as f32;
    if total == 0.0 {
        return vec![0.0; a.len()];
    }

    let wa = weight_a as f32 / total;
    let wb = weight_b as f32 / total;
    a.iter().zip(b.iter()).map(|(x, y)| x * wa + y * wb).collect()
}

/// Normalize a vector to unit length in place.
pub fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in v.iter_mut() {
            *val /= norm;
        }
    }
}

/// Check that a vector is usable for cosine geometry.
///
/// Rejects non-finite components and the zero vector.
pub fn is_usable(v: &[f32]) -> bool {
    v.iter().all(|x| x.is_finite()) && v.iter().any(|x| *x != 0.0)
}
