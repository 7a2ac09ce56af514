//! Owned 1-D `f32` vector.

use std::ops::{Deref, DerefMut};

use super::{check_len, Matrix};
use crate::error::Result;
use crate::simd;

/// A dense vector of reals.
///
/// Derefs to `[f32]`, so it can be passed wherever matrix operations take a
/// query or accumulator slice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vector {
    data: Vec<f32>,
}

impl Vector {
    /// Zero vector of length `len`.
    pub fn new(len: usize) -> Self {
        Self {
            data: vec![0.0; len],
        }
    }

    pub fn zero(&mut self) {
        self.data.iter_mut().for_each(|x| *x = 0.0);
    }

    pub fn mul(&mut self, a: f32) {
        simd::scale(a, &mut self.data);
    }

    /// Euclidean norm.
    pub fn norm(&self) -> f32 {
        simd::norm(&self.data)
    }

    /// `self += a * other`. Lengths must match.
    pub fn add_vector(&mut self, other: &[f32], a: f32) -> Result<()> {
        check_len(other.len(), self.data.len(), "vector")?;
        simd::axpy(a, other, &mut self.data);
        Ok(())
    }

    /// `self += a * matrix.row(i)`.
    pub fn add_row(&mut self, matrix: &dyn Matrix, i: usize, a: f32) -> Result<()> {
        matrix.add_row_to_vector_scaled(&mut self.data, i, a)
    }

    /// Index of the largest element; `None` when empty. Ties go to the lowest index.
    pub fn argmax(&self) -> Option<usize> {
        let mut best = None;
        let mut best_val = f32::NEG_INFINITY;
        for (i, &x) in self.data.iter().enumerate() {
            if best.is_none() || x > best_val {
                best = Some(i);
                best_val = x;
            }
        }
        best
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

impl From<Vec<f32>> for Vector {
    fn from(data: Vec<f32>) -> Self {
        Self { data }
    }
}

impl Deref for Vector {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.data
    }
}

impl DerefMut for Vector {
    fn deref_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }
}
