//! Dense row-major matrix.

use std::io::{Read, Write};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{check_len, check_row, Matrix, Vector};
use crate::error::{MatrixError, Result};
use crate::persistence::format;
use crate::simd;

/// `m x n` matrix of reals stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix {
    m: usize,
    n: usize,
    data: Vec<f32>,
}

impl DenseMatrix {
    /// Zero matrix.
    pub fn new(m: usize, n: usize) -> Self {
        Self {
            m,
            n,
            data: vec![0.0; m * n],
        }
    }

    /// Wrap row-major `data`; its length must be `m * n`.
    pub fn from_vec(m: usize, n: usize, data: Vec<f32>) -> Result<Self> {
        let expected = m
            .checked_mul(n)
            .ok_or_else(|| MatrixError::invalid(format!("{m} x {n} overflows")))?;
        if data.len() != expected {
            return Err(MatrixError::invalid(format!(
                "{m} x {n} matrix needs {expected} values, got {}",
                data.len()
            )));
        }
        Ok(Self { m, n, data })
    }

    /// Build from equal-length rows.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        let n = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * n);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n {
                return Err(MatrixError::invalid(format!(
                    "row {i} has length {}, expected {n}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Self::from_vec(rows.len(), n, data)
    }

    pub fn zero(&mut self) {
        self.data.iter_mut().for_each(|x| *x = 0.0);
    }

    /// Fill with values drawn uniformly from `[-bound, bound]`.
    pub fn uniform(&mut self, bound: f32, seed: u64) -> Result<()> {
        if !bound.is_finite() || bound < 0.0 {
            return Err(MatrixError::invalid(format!(
                "uniform bound must be finite and non-negative, got {bound}"
            )));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        for x in &mut self.data {
            *x = rng.random_range(-bound..=bound);
        }
        Ok(())
    }

    /// Row `i` as a slice.
    ///
    /// # Panics
    ///
    /// Panics if `i >= rows()`. Use [`Matrix::dot_row`] or
    /// [`DenseMatrix::l2_norm_row`] for checked access.
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.n..(i + 1) * self.n]
    }

    /// Mutable row `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= rows()`.
    pub fn row_mut(&mut self, i: usize) -> &mut [f32] {
        &mut self.data[i * self.n..(i + 1) * self.n]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Euclidean norm of row `i`.
    pub fn l2_norm_row(&self, i: usize) -> Result<f32> {
        check_row(i, self.m)?;
        Ok(simd::norm(self.row(i)))
    }

    /// Euclidean norm of every row.
    pub fn l2_norm_rows(&self) -> Vector {
        let norms: Vec<f32> = (0..self.m).map(|i| simd::norm(self.row(i))).collect();
        Vector::from(norms)
    }

    /// Divide row `i` by `denoms[i]`. Rows with a zero denominator are left as is.
    pub fn divide_rows(&mut self, denoms: &[f32]) -> Result<()> {
        if denoms.len() != self.m {
            return Err(MatrixError::invalid(format!(
                "{} denominators for {} rows",
                denoms.len(),
                self.m
            )));
        }
        for (i, &d) in denoms.iter().enumerate() {
            if d != 0.0 {
                simd::scale(1.0 / d, self.row_mut(i));
            }
        }
        Ok(())
    }

    /// Read the form written by [`Matrix::save`]: int64 m, int64 n, then
    /// `m * n` f32 values.
    pub fn load(input: &mut dyn Read) -> Result<Self> {
        let m = format::read_usize_i64(input, "dense rows")?;
        let n = format::read_usize_i64(input, "dense cols")?;
        let len = m
            .checked_mul(n)
            .ok_or_else(|| MatrixError::malformed(format!("{m} x {n} overflows")))?;
        let data = format::read_f32_vec(input, len, "dense data")?;
        Ok(Self { m, n, data })
    }
}

impl Matrix for DenseMatrix {
    fn rows(&self) -> usize {
        self.m
    }

    fn cols(&self) -> usize {
        self.n
    }

    fn dot_row(&self, vec: &[f32], i: usize) -> Result<f32> {
        check_row(i, self.m)?;
        check_len(vec.len(), self.n, "query")?;
        let d = simd::dot(self.row(i), vec);
        if d.is_nan() {
            return Err(MatrixError::NonFinite { row: i });
        }
        Ok(d)
    }

    fn add_vector_to_row(&mut self, vec: &[f32], i: usize, a: f32) -> Result<()> {
        check_row(i, self.m)?;
        check_len(vec.len(), self.n, "vector")?;
        simd::axpy(a, vec, self.row_mut(i));
        Ok(())
    }

    fn add_row_to_vector(&self, x: &mut [f32], i: usize) -> Result<()> {
        self.add_row_to_vector_scaled(x, i, 1.0)
    }

    fn add_row_to_vector_scaled(&self, x: &mut [f32], i: usize, a: f32) -> Result<()> {
        check_row(i, self.m)?;
        check_len(x.len(), self.n, "accumulator")?;
        simd::axpy(a, self.row(i), x);
        Ok(())
    }

    fn save(&self, out: &mut dyn Write) -> Result<()> {
        format::write_usize_i64(out, self.m, "rows")?;
        format::write_usize_i64(out, self.n, "cols")?;
        format::write_f32_slice(out, &self.data)
    }

    fn dump(&self, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "{} {}", self.m, self.n)?;
        for i in 0..self.m {
            let line: Vec<String> = self.row(i).iter().map(f32::to_string).collect();
            writeln!(out, "{}", line.join(" "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> DenseMatrix {
        DenseMatrix::from_rows(&[vec![3.0, 4.0], vec![0.0, 0.0], vec![1.0, -1.0]]).unwrap()
    }

    #[test]
    fn test_from_vec_checks_length() {
        assert!(DenseMatrix::from_vec(2, 3, vec![0.0; 5]).is_err());
        assert!(DenseMatrix::from_rows(&[vec![1.0], vec![1.0, 2.0]]).is_err());
    }

    #[test]
    fn test_norms_and_divide() {
        let mut mat = sample();
        let norms = mat.l2_norm_rows();
        assert!((norms[0] - 5.0).abs() < 1e-6);
        assert_eq!(norms[1], 0.0);

        mat.divide_rows(&norms).unwrap();
        assert!((mat.row(0)[0] - 0.6).abs() < 1e-6);
        assert_eq!(mat.row(1), &[0.0, 0.0]);
        assert!((mat.l2_norm_row(2).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_row_ops() {
        let mut mat = sample();
        assert_eq!(mat.dot_row(&[1.0, 1.0], 0).unwrap(), 7.0);

        mat.add_vector_to_row(&[1.0, 1.0], 1, 2.0).unwrap();
        assert_eq!(mat.row(1), &[2.0, 2.0]);

        let mut acc = Vector::new(2);
        mat.add_row_to_vector_scaled(&mut acc, 0, 0.5).unwrap();
        mat.add_row_to_vector(&mut acc, 2).unwrap();
        assert_eq!(&*acc, &[2.5, 1.0]);
    }

    #[test]
    fn test_bounds() {
        let mut mat = sample();
        assert!(matches!(
            mat.dot_row(&[1.0, 1.0], 3),
            Err(MatrixError::InvalidArgument(_))
        ));
        assert!(matches!(
            mat.dot_row(&[1.0], 0),
            Err(MatrixError::InvalidArgument(_))
        ));
        assert!(mat.add_vector_to_row(&[1.0, 1.0, 1.0], 0, 1.0).is_err());
        assert!(mat.add_row_to_vector(&mut [0.0f32; 3], 0).is_err());
    }

    #[test]
    #[should_panic]
    fn test_row_out_of_range_panics() {
        let mat = sample();
        let _ = mat.row(3);
    }

    #[test]
    fn test_nan_dot_is_error() {
        let mat = sample();
        let err = mat.dot_row(&[f32::NAN, 0.0], 0).unwrap_err();
        assert!(matches!(err, MatrixError::NonFinite { row: 0 }));
    }

    #[test]
    fn test_uniform_is_seeded_and_bounded() {
        let mut a = DenseMatrix::new(4, 5);
        let mut b = DenseMatrix::new(4, 5);
        a.uniform(0.5, 9).unwrap();
        b.uniform(0.5, 9).unwrap();
        assert_eq!(a, b);
        assert!(a.data().iter().all(|x| x.abs() <= 0.5));
        assert!(a.uniform(-1.0, 0).is_err());
    }

    #[test]
    fn test_save_load() {
        let mat = sample();
        let mut buf = Vec::new();
        mat.save(&mut buf).unwrap();
        assert_eq!(buf.len(), 16 + 6 * 4);
        let loaded = DenseMatrix::load(&mut Cursor::new(buf)).unwrap();
        assert_eq!(loaded, mat);
    }

    #[test]
    fn test_dump_text() {
        let mat = DenseMatrix::from_rows(&[vec![1.0, 2.5]]).unwrap();
        let mut out = Vec::new();
        mat.dump(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1 2\n1 2.5\n");
    }
}
