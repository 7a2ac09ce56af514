//! Product Quantization (PQ) implementation.

use std::io::{Read, Write};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, warn};

use super::kmeans::{nearest_centroid, KMeans};
use super::{num_subvectors, VectorQuantizer};
use crate::config::{QuantizeConfig, MAX_CODEBOOK_SIZE};
use crate::error::{MatrixError, Result};
use crate::persistence::format;
use crate::simd;

/// Product Quantizer.
///
/// Decomposes vectors into subvectors and quantizes each subvector independently.
/// Centroids live in one flat table: slot `m`'s codebook starts at
/// `m * codebook_size * dsub` and holds `codebook_size` entries of that
/// slot's width.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductQuantizer {
    dim: usize,
    nsubq: usize,
    dsub: usize,
    lastdsub: usize,
    codebook_size: usize,
    centroids: Vec<f32>,
    // Training parameters; not persisted.
    requested_codebook_size: usize,
    iterations: usize,
    max_points_per_cluster: usize,
    seed: u64,
}

impl ProductQuantizer {
    /// Create an untrained quantizer with default training parameters.
    pub fn new(dim: usize, dsub: usize) -> Result<Self> {
        Self::with_config(dim, &QuantizeConfig::default().with_dsub(dsub))
    }

    /// Create an untrained quantizer for `dim`-wide vectors using `config.dsub`.
    pub fn with_config(dim: usize, config: &QuantizeConfig) -> Result<Self> {
        config.validate()?;
        if dim == 0 {
            return Err(MatrixError::invalid("dimension must be greater than 0"));
        }
        let dsub = config.dsub;
        let nsubq = num_subvectors(dim, dsub);
        let lastdsub = match dim % dsub {
            0 => dsub,
            r => r,
        };

        Ok(Self {
            dim,
            nsubq,
            dsub,
            lastdsub,
            codebook_size: config.codebook_size,
            centroids: Vec::new(),
            requested_codebook_size: config.codebook_size,
            iterations: config.iterations,
            max_points_per_cluster: config.max_points_per_cluster,
            seed: config.seed,
        })
    }

    pub fn is_trained(&self) -> bool {
        !self.centroids.is_empty()
    }

    /// Raw centroid table (for testing/debugging).
    pub fn centroids(&self) -> &[f32] {
        &self.centroids
    }

    /// Width of slot `m`.
    #[inline]
    fn slot_dim(&self, m: usize) -> usize {
        if m == self.nsubq - 1 {
            self.lastdsub
        } else {
            self.dsub
        }
    }

    /// Slot `m`'s full codebook.
    #[inline]
    fn codebook(&self, m: usize) -> &[f32] {
        let start = m * self.codebook_size * self.dsub;
        &self.centroids[start..start + self.codebook_size * self.slot_dim(m)]
    }

    fn ensure_trained(&self) -> Result<()> {
        if self.is_trained() {
            Ok(())
        } else {
            Err(MatrixError::invalid("product quantizer is not trained"))
        }
    }
}

impl VectorQuantizer for ProductQuantizer {
    fn dim(&self) -> usize {
        self.dim
    }

    fn subvector_size(&self) -> usize {
        self.dsub
    }

    fn num_subquantizers(&self) -> usize {
        self.nsubq
    }

    /// After training this is the effective size, which shrinks to the row
    /// count when fewer rows than centroids exist.
    fn codebook_size(&self) -> usize {
        self.codebook_size
    }

    /// Train one codebook per slot with k-means.
    ///
    /// At most `codebook_size * max_points_per_cluster` rows are used per
    /// slot; when there are more, a fresh random subset is drawn per slot.
    fn train(&mut self, data: &[f32], n: usize) -> Result<()> {
        if n == 0 {
            return Err(MatrixError::invalid("cannot train on zero vectors"));
        }
        if data.len() < n * self.dim {
            return Err(MatrixError::invalid(format!(
                "training data holds {} values, need {}",
                data.len(),
                n * self.dim
            )));
        }

        let requested = self.requested_codebook_size.min(MAX_CODEBOOK_SIZE);
        let ksub = requested.min(n);
        if ksub < requested {
            warn!(
                rows = n,
                requested, "fewer rows than codebook entries; shrinking codebook"
            );
        }
        self.codebook_size = ksub;

        let np = n.min(ksub.saturating_mul(self.max_points_per_cluster));
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut perm: Vec<usize> = (0..n).collect();
        let mut centroids = vec![0.0f32; self.dim * ksub];

        for m in 0..self.nsubq {
            let d = self.slot_dim(m);
            let offset = m * self.dsub;
            if np != n {
                perm.shuffle(&mut rng);
            }

            let mut slice = Vec::with_capacity(np * d);
            for &row in &perm[..np] {
                let start = row * self.dim + offset;
                slice.extend_from_slice(&data[start..start + d]);
            }

            let mut kmeans = KMeans::new(d, ksub, self.iterations)?;
            kmeans.fit(&slice, np, &mut rng)?;

            let start = m * ksub * self.dsub;
            centroids[start..start + ksub * d].copy_from_slice(kmeans.centroids());
            debug!(slot = m, width = d, points = np, ksub, "trained sub-quantizer");
        }

        self.centroids = centroids;
        Ok(())
    }

    fn encode(&self, data: &[f32], codes: &mut [u8], n: usize) -> Result<()> {
        self.ensure_trained()?;
        if data.len() < n * self.dim {
            return Err(MatrixError::invalid("encode input shorter than n vectors"));
        }
        if codes.len() < n * self.nsubq {
            return Err(MatrixError::invalid(format!(
                "code buffer holds {} codes, need {}",
                codes.len(),
                n * self.nsubq
            )));
        }

        for (i, row_codes) in codes.chunks_exact_mut(self.nsubq).take(n).enumerate() {
            let row = &data[i * self.dim..(i + 1) * self.dim];
            for (m, code) in row_codes.iter_mut().enumerate() {
                let d = self.slot_dim(m);
                let sub = &row[m * self.dsub..m * self.dsub + d];
                // codebook_size <= 256, so the index fits.
                *code = nearest_centroid(self.codebook(m), d, sub) as u8;
            }
        }
        Ok(())
    }

    fn centroid(&self, slot: usize, code: u8) -> &[f32] {
        let d = self.slot_dim(slot);
        let start = slot * self.codebook_size * self.dsub + code as usize * d;
        &self.centroids[start..start + d]
    }

    fn approximate_dot(&self, query: &[f32], codes: &[u8], row: usize, alpha: f32) -> f32 {
        let row_codes = &codes[row * self.nsubq..(row + 1) * self.nsubq];
        let mut res = 0.0;
        for (m, &code) in row_codes.iter().enumerate() {
            let c = self.centroid(m, code);
            let start = m * self.dsub;
            res += simd::dot(&query[start..start + c.len()], c);
        }
        res * alpha
    }

    fn approximate_accumulate(&self, acc: &mut [f32], codes: &[u8], row: usize, alpha: f32) {
        let row_codes = &codes[row * self.nsubq..(row + 1) * self.nsubq];
        for (m, &code) in row_codes.iter().enumerate() {
            let c = self.centroid(m, code);
            let start = m * self.dsub;
            simd::axpy(alpha, c, &mut acc[start..start + c.len()]);
        }
    }

    /// Layout: int32 dim, nsubq, dsub, lastdsub, codebook_size, then
    /// `dim * codebook_size` f32 centroids.
    fn save(&self, out: &mut dyn Write) -> Result<()> {
        self.ensure_trained()?;
        format::write_usize_i32(out, self.dim, "dim")?;
        format::write_usize_i32(out, self.nsubq, "nsubq")?;
        format::write_usize_i32(out, self.dsub, "dsub")?;
        format::write_usize_i32(out, self.lastdsub, "lastdsub")?;
        format::write_usize_i32(out, self.codebook_size, "codebook_size")?;
        format::write_f32_slice(out, &self.centroids)
    }

    fn load(input: &mut dyn Read) -> Result<Self> {
        let dim = format::read_usize_i32(input, "pq dim")?;
        let nsubq = format::read_usize_i32(input, "pq nsubq")?;
        let dsub = format::read_usize_i32(input, "pq dsub")?;
        let lastdsub = format::read_usize_i32(input, "pq lastdsub")?;
        let codebook_size = format::read_usize_i32(input, "pq codebook_size")?;

        if dim == 0 || dsub == 0 {
            return Err(MatrixError::malformed(format!(
                "pq header has dim={dim}, dsub={dsub}"
            )));
        }
        let expected_last = match dim % dsub {
            0 => dsub,
            r => r,
        };
        if nsubq != num_subvectors(dim, dsub) || lastdsub != expected_last {
            return Err(MatrixError::malformed(format!(
                "pq header inconsistent: dim={dim} dsub={dsub} nsubq={nsubq} lastdsub={lastdsub}"
            )));
        }
        if codebook_size == 0 || codebook_size > MAX_CODEBOOK_SIZE {
            return Err(MatrixError::malformed(format!(
                "pq codebook_size {codebook_size} out of range"
            )));
        }

        let len = dim
            .checked_mul(codebook_size)
            .ok_or_else(|| MatrixError::malformed("pq centroid table size overflows"))?;
        let centroids = format::read_f32_vec(input, len, "pq centroids")?;

        let defaults = QuantizeConfig::default();
        Ok(Self {
            dim,
            nsubq,
            dsub,
            lastdsub,
            codebook_size,
            centroids,
            requested_codebook_size: codebook_size,
            iterations: defaults.iterations,
            max_points_per_cluster: defaults.max_points_per_cluster,
            seed: defaults.seed,
        })
    }
}
