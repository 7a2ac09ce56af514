//! k-means clustering for codebook training.
//!
//! Lloyd iterations under squared L2 distance. Centroids are seeded from a
//! random permutation of the input, and clusters that end an iteration empty
//! are refilled by splitting a populated one.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::trace;

use crate::error::{MatrixError, Result};
use crate::simd;

/// Perturbation applied to both halves of a split cluster.
const SPLIT_EPS: f32 = 1e-7;

/// k-means over fixed-dimension points stored row-major in one slice.
pub(crate) struct KMeans {
    /// Centroids (k x dimension), row-major.
    centroids: Vec<f32>,
    dimension: usize,
    k: usize,
    iterations: usize,
}

impl KMeans {
    /// Create new k-means with k clusters.
    pub(crate) fn new(dimension: usize, k: usize, iterations: usize) -> Result<Self> {
        if dimension == 0 || k == 0 {
            return Err(MatrixError::invalid(
                "k-means dimension and k must be greater than 0",
            ));
        }

        Ok(Self {
            centroids: Vec::new(),
            dimension,
            k,
            iterations,
        })
    }

    /// Train on `num_vectors` points, drawing randomness from `rng`.
    pub(crate) fn fit(
        &mut self,
        vectors: &[f32],
        num_vectors: usize,
        rng: &mut StdRng,
    ) -> Result<()> {
        if num_vectors < self.k {
            return Err(MatrixError::invalid(format!(
                "k-means needs at least {} points, got {num_vectors}",
                self.k
            )));
        }
        if vectors.len() < num_vectors * self.dimension {
            return Err(MatrixError::invalid("insufficient vectors for k-means"));
        }

        let mut perm: Vec<usize> = (0..num_vectors).collect();
        perm.shuffle(rng);
        self.centroids = Vec::with_capacity(self.k * self.dimension);
        let d = self.dimension;
        for &idx in perm.iter().take(self.k) {
            self.centroids
                .extend_from_slice(&vectors[idx * d..(idx + 1) * d]);
        }

        for iteration in 0..self.iterations {
            let assignments = self.assign_clusters(vectors, num_vectors);
            self.update_centroids(vectors, &assignments, rng);
            trace!(iteration, k = self.k, "k-means iteration");
        }

        Ok(())
    }

    /// Index of the nearest centroid; ties go to the lowest index.
    pub(crate) fn nearest(&self, vec: &[f32]) -> usize {
        nearest_centroid(&self.centroids, self.dimension, vec)
    }

    /// Assign vectors to nearest clusters.
    pub(crate) fn assign_clusters(&self, vectors: &[f32], num_vectors: usize) -> Vec<usize> {
        (0..num_vectors)
            .map(|i| self.nearest(self.get_vector(vectors, i)))
            .collect()
    }

    /// Recompute means, then split populated clusters into empty ones.
    fn update_centroids(&mut self, vectors: &[f32], assignments: &[usize], rng: &mut StdRng) {
        let d = self.dimension;
        let mut counts = vec![0usize; self.k];
        self.centroids.iter_mut().for_each(|c| *c = 0.0);

        for (i, &cluster) in assignments.iter().enumerate() {
            counts[cluster] += 1;
            let vec = self.get_vector(vectors, i);
            simd::axpy(1.0, vec, &mut self.centroids[cluster * d..(cluster + 1) * d]);
        }

        for (cluster, &count) in counts.iter().enumerate() {
            if count > 0 {
                simd::scale(
                    1.0 / count as f32,
                    &mut self.centroids[cluster * d..(cluster + 1) * d],
                );
            }
        }

        let surplus = (assignments.len() - self.k) as f64;
        for empty in 0..self.k {
            if counts[empty] != 0 {
                continue;
            }
            let donor = pick_donor(&counts, surplus, rng);
            self.centroids
                .copy_within(donor * d..(donor + 1) * d, empty * d);
            for j in 0..d {
                let sign = if j % 2 == 0 { -1.0 } else { 1.0 };
                self.centroids[empty * d + j] += sign * SPLIT_EPS;
                self.centroids[donor * d + j] -= sign * SPLIT_EPS;
            }
            counts[empty] = counts[donor] / 2;
            counts[donor] -= counts[empty];
        }
    }

    /// Get vector from row-major storage.
    fn get_vector<'a>(&self, vectors: &'a [f32], idx: usize) -> &'a [f32] {
        let start = idx * self.dimension;
        &vectors[start..start + self.dimension]
    }

    /// Get centroids.
    pub(crate) fn centroids(&self) -> &[f32] {
        &self.centroids
    }
}

/// Nearest centroid under squared L2 over a row-major centroid table.
pub(crate) fn nearest_centroid(centroids: &[f32], dimension: usize, vec: &[f32]) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (idx, centroid) in centroids.chunks_exact(dimension).enumerate() {
        let dist = simd::l2_distance_squared(vec, centroid);
        if dist < best_dist {
            best_dist = dist;
            best = idx;
        }
    }
    best
}

/// Choose a cluster to split, favoring large ones.
///
/// Walks the clusters cyclically and stops at one whose population beats a
/// uniform draw over the surplus points. The walk is bounded; when it runs
/// out the largest cluster is used.
fn pick_donor(counts: &[usize], surplus: f64, rng: &mut StdRng) -> usize {
    let k = counts.len();
    let mut m = 0;
    for _ in 0..k * 64 {
        let threshold = rng.random::<f64>() * surplus;
        if (counts[m] as f64 - 1.0) > threshold {
            return m;
        }
        m = (m + 1) % k;
    }
    counts
        .iter()
        .enumerate()
        .max_by_key(|&(_, &c)| c)
        .map_or(0, |(i, _)| i)
}
