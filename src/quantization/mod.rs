//! Vector quantization: compress rows into per-sub-vector codebook indices.
//!
//! A [`VectorQuantizer`] splits a `dim`-dimensional vector into
//! `ceil(dim / dsub)` contiguous sub-vectors, learns one codebook per
//! sub-vector slot, and then represents any vector by one byte per slot.
//! The last slot is narrower when `dsub` does not divide `dim`.
//!
//! ```text
//! row:    [ x0 x1 | x2 x3 | x4 x5 | x6 ]     dim = 7, dsub = 2
//! slots:     0       1       2      3      (slot 3 has width 1)
//! codes:  [ c0      c1      c2      c3 ]    one u8 per slot
//! ```
//!
//! Dot products and accumulation run directly on codes: each slot
//! contributes the matching slice of the query against that slot's centroid,
//! so the full vector is never rebuilt.

mod kmeans;
mod pq;

use std::io::{Read, Write};

use crate::error::Result;

pub use pq::ProductQuantizer;

/// Number of codes needed for a `dim`-wide vector split into `dsub`-wide slots.
#[inline]
#[must_use]
pub fn num_subvectors(dim: usize, dsub: usize) -> usize {
    dim.div_ceil(dsub)
}

/// A trainable codebook quantizer operating on row-major `f32` data.
///
/// Codes for `n` vectors are stored as `n` contiguous groups of
/// [`num_subquantizers`](Self::num_subquantizers) bytes; the group for row
/// `i` starts at `i * num_subquantizers()`.
///
/// The read-side methods take already-validated input. Callers check query
/// lengths and row bounds; out-of-range arguments panic on slice indexing.
pub trait VectorQuantizer {
    /// Dimensionality of the vectors this quantizer encodes.
    fn dim(&self) -> usize;

    /// Width of every sub-vector slot except possibly the last.
    fn subvector_size(&self) -> usize;

    /// Codes per vector.
    fn num_subquantizers(&self) -> usize;

    /// Entries per codebook; every valid code is below this.
    fn codebook_size(&self) -> usize;

    /// Learn codebooks from `n` row-major vectors in `data`.
    fn train(&mut self, data: &[f32], n: usize) -> Result<()>;

    /// Encode `n` row-major vectors into `codes`.
    fn encode(&self, data: &[f32], codes: &mut [u8], n: usize) -> Result<()>;

    /// Centroid of sub-vector slot `slot` selected by `code`.
    fn centroid(&self, slot: usize, code: u8) -> &[f32];

    /// `alpha * <query, decode(row)>` computed slot by slot.
    fn approximate_dot(&self, query: &[f32], codes: &[u8], row: usize, alpha: f32) -> f32;

    /// `acc += alpha * decode(row)` computed slot by slot.
    fn approximate_accumulate(&self, acc: &mut [f32], codes: &[u8], row: usize, alpha: f32);

    /// Write a self-contained binary form.
    fn save(&self, out: &mut dyn Write) -> Result<()>;

    /// Read the form written by [`save`](Self::save).
    fn load(input: &mut dyn Read) -> Result<Self>
    where
        Self: Sized;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_num_subvectors() {
        assert_eq!(num_subvectors(8, 2), 4);
        assert_eq!(num_subvectors(7, 2), 4);
        assert_eq!(num_subvectors(1, 1), 1);
        assert_eq!(num_subvectors(3, 8), 1);
    }
}
