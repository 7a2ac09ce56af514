//! Row-addressable matrices.
//!
//! [`DenseMatrix`] stores every value; [`QuantMatrix`] stores only codes and
//! answers the same row queries approximately. Both sit behind [`Matrix`], so
//! a consumer that only needs row dot products and row accumulation can take
//! either.

mod dense;
mod quant;
mod vector;

use std::io::Write;

use crate::error::{MatrixError, Result};

pub use dense::DenseMatrix;
pub use quant::QuantMatrix;
pub use vector::Vector;

/// Row operations shared by dense and quantized matrices.
///
/// Loading is an inherent constructor on each implementor, since it
/// produces a concrete type.
pub trait Matrix {
    /// Number of rows.
    fn rows(&self) -> usize;

    /// Number of columns.
    fn cols(&self) -> usize;

    /// Dot product of `vec` with row `i`.
    fn dot_row(&self, vec: &[f32], i: usize) -> Result<f32>;

    /// `row(i) += a * vec`.
    fn add_vector_to_row(&mut self, vec: &[f32], i: usize, a: f32) -> Result<()>;

    /// `x += row(i)`.
    fn add_row_to_vector(&self, x: &mut [f32], i: usize) -> Result<()>;

    /// `x += a * row(i)`.
    fn add_row_to_vector_scaled(&self, x: &mut [f32], i: usize, a: f32) -> Result<()>;

    /// Write the binary form.
    fn save(&self, out: &mut dyn Write) -> Result<()>;

    /// Write a human-readable text form.
    fn dump(&self, out: &mut dyn Write) -> Result<()>;
}

/// Shared argument checks for row operations.
pub(crate) fn check_row(i: usize, rows: usize) -> Result<()> {
    if i >= rows {
        return Err(MatrixError::invalid(format!(
            "row index {i} out of range for {rows} rows"
        )));
    }
    Ok(())
}

pub(crate) fn check_len(len: usize, cols: usize, what: &str) -> Result<()> {
    if len != cols {
        return Err(MatrixError::invalid(format!(
            "{what} has length {len}, matrix has {cols} columns"
        )));
    }
    Ok(())
}
