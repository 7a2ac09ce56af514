//! Product-quantized matrix.
//!
//! Each row is stored as `ceil(n / dsub)` one-byte codes into per-slot
//! codebooks. With norm quantization enabled, rows are first scaled to unit
//! length and their norms are quantized on their own by a 1-dimensional
//! quantizer, so the main codebooks only spend their entries on direction.
//!
//! The matrix is read-only once built: row queries decode on the fly, and
//! there is no way to write a real value back into a code.
//!
//! # Binary layout
//!
//! ```text
//! bool   qnorm
//! int64  rows
//! int64  cols
//! int64  code_size
//! u8[code_size]          codes
//! <main quantizer>
//! if qnorm:
//!   u8[rows]             norm codes
//!   <norm quantizer>
//! ```
//!
//! There is no magic number or version field.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::{debug, info};

use super::{check_len, check_row, DenseMatrix, Matrix};
use crate::config::QuantizeConfig;
use crate::error::{MatrixError, Result};
use crate::persistence::format;
use crate::quantization::{num_subvectors, ProductQuantizer, VectorQuantizer};

/// Separately quantized row norms, one code per row.
#[derive(Debug, Clone)]
struct NormQuantization<Q> {
    codes: Vec<u8>,
    quantizer: Q,
}

/// A matrix whose rows are held only as quantization codes.
#[derive(Debug, Clone)]
pub struct QuantMatrix<Q = ProductQuantizer> {
    m: usize,
    n: usize,
    code_size: usize,
    codes: Vec<u8>,
    pq: Q,
    norm: Option<NormQuantization<Q>>,
}

impl QuantMatrix<ProductQuantizer> {
    /// Quantize `mat` with product quantizers built from `config`.
    ///
    /// The norm quantizer, when enabled, uses the same training parameters
    /// with `dsub = 1`.
    pub fn quantize(mat: DenseMatrix, config: &QuantizeConfig) -> Result<Self> {
        config.validate()?;
        let pq = ProductQuantizer::with_config(mat.cols(), config)?;
        let npq = if config.qnorm {
            Some(ProductQuantizer::with_config(
                1,
                &config.clone().with_dsub(1),
            )?)
        } else {
            None
        };
        Self::quantize_with(mat, pq, npq)
    }
}

impl<Q: VectorQuantizer> QuantMatrix<Q> {
    /// Quantize `mat` with caller-supplied, untrained quantizers.
    ///
    /// `pq` must cover `mat.cols()` dimensions. Passing `Some(npq)` enables
    /// norm quantization; `npq` must be 1-dimensional. `mat` is consumed.
    pub fn quantize_with(mut mat: DenseMatrix, mut pq: Q, npq: Option<Q>) -> Result<Self> {
        let (m, n) = (mat.rows(), mat.cols());
        if m == 0 || n == 0 {
            return Err(MatrixError::invalid(format!(
                "cannot quantize a {m} x {n} matrix"
            )));
        }
        if pq.dim() != n {
            return Err(MatrixError::invalid(format!(
                "quantizer covers {} dimensions, matrix has {n} columns",
                pq.dim()
            )));
        }
        if pq.subvector_size() == 0 {
            return Err(MatrixError::invalid("subvector size must be positive"));
        }

        info!(
            rows = m,
            cols = n,
            dsub = pq.subvector_size(),
            qnorm = npq.is_some(),
            "quantizing matrix"
        );

        let norm = match npq {
            Some(mut quantizer) => {
                if quantizer.dim() != 1 || quantizer.num_subquantizers() != 1 {
                    return Err(MatrixError::invalid(
                        "norm quantizer must be 1-dimensional with a single code",
                    ));
                }
                let norms = mat.l2_norm_rows();
                mat.divide_rows(&norms)?;
                quantizer.train(&norms, m)?;
                let mut codes = vec![0u8; m];
                quantizer.encode(&norms, &mut codes, m)?;
                Some(NormQuantization { codes, quantizer })
            }
            None => None,
        };

        pq.train(mat.data(), m)?;
        let code_size = m * pq.num_subquantizers();
        let mut codes = vec![0u8; code_size];
        pq.encode(mat.data(), &mut codes, m)?;
        drop(mat);

        Ok(Self {
            m,
            n,
            code_size,
            codes,
            pq,
            norm,
        })
    }

    /// Total number of stored codes: `rows * ceil(cols / dsub)`.
    pub fn code_size(&self) -> usize {
        self.code_size
    }

    pub fn subvector_size(&self) -> usize {
        self.pq.subvector_size()
    }

    pub fn uses_norm_quantization(&self) -> bool {
        self.norm.is_some()
    }

    /// All row codes, row `i` at `i * ceil(cols / dsub)`.
    pub fn codes(&self) -> &[u8] {
        &self.codes
    }

    /// One code per row when norm quantization is enabled.
    pub fn norm_codes(&self) -> Option<&[u8]> {
        self.norm.as_ref().map(|nq| nq.codes.as_slice())
    }

    pub fn quantizer(&self) -> &Q {
        &self.pq
    }

    pub fn norm_quantizer(&self) -> Option<&Q> {
        self.norm.as_ref().map(|nq| &nq.quantizer)
    }

    /// Reconstructed norm of row `i`, or 1 without norm quantization.
    pub fn row_norm(&self, i: usize) -> Result<f32> {
        check_row(i, self.m)?;
        Ok(self.norm_of(i))
    }

    #[inline]
    fn norm_of(&self, i: usize) -> f32 {
        match &self.norm {
            Some(nq) => nq.quantizer.centroid(0, nq.codes[i])[0],
            None => 1.0,
        }
    }

    /// Read the form written by [`Matrix::save`].
    ///
    /// Quantizers are rebuilt through [`VectorQuantizer::load`]. The header
    /// is cross-checked against the loaded quantizers and every code is
    /// checked against its codebook.
    pub fn load(input: &mut dyn Read) -> Result<Self> {
        let qnorm = format::read_bool(input, "qnorm flag")?;
        let m = format::read_usize_i64(input, "rows")?;
        let n = format::read_usize_i64(input, "cols")?;
        let code_size = format::read_usize_i64(input, "code size")?;
        let codes = format::read_bytes(input, code_size, "codes")?;
        let pq = Q::load(input)?;

        if pq.dim() != n {
            return Err(MatrixError::malformed(format!(
                "quantizer covers {} dimensions, header says {n} columns",
                pq.dim()
            )));
        }
        let expected = m
            .checked_mul(num_subvectors(n, pq.subvector_size()))
            .ok_or_else(|| MatrixError::malformed("code size overflows"))?;
        if code_size != expected {
            return Err(MatrixError::malformed(format!(
                "code size {code_size} does not match {m} rows x {} codes",
                num_subvectors(n, pq.subvector_size())
            )));
        }
        check_codes(&codes, pq.codebook_size(), "codes")?;

        let norm = if qnorm {
            let codes = format::read_bytes(input, m, "norm codes")?;
            let quantizer = Q::load(input)?;
            if quantizer.dim() != 1 {
                return Err(MatrixError::malformed(format!(
                    "norm quantizer has {} dimensions",
                    quantizer.dim()
                )));
            }
            check_codes(&codes, quantizer.codebook_size(), "norm codes")?;
            Some(NormQuantization { codes, quantizer })
        } else {
            None
        };

        debug!(rows = m, cols = n, code_size, qnorm, "loaded quantized matrix");
        Ok(Self {
            m,
            n,
            code_size,
            codes,
            pq,
            norm,
        })
    }

    /// Save to a file, replacing any existing one.
    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        self.save(&mut out)?;
        out.flush()?;
        Ok(())
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let mut input = BufReader::new(File::open(path)?);
        Self::load(&mut input)
    }
}

fn check_codes(codes: &[u8], codebook_size: usize, what: &str) -> Result<()> {
    match codes.iter().find(|&&c| c as usize >= codebook_size) {
        Some(&c) => Err(MatrixError::malformed(format!(
            "{what}: code {c} outside codebook of {codebook_size}"
        ))),
        None => Ok(()),
    }
}

impl<Q: VectorQuantizer> Matrix for QuantMatrix<Q> {
    fn rows(&self) -> usize {
        self.m
    }

    fn cols(&self) -> usize {
        self.n
    }

    /// Approximate `<vec, row(i)>`, scaled by the row's quantized norm.
    fn dot_row(&self, vec: &[f32], i: usize) -> Result<f32> {
        check_row(i, self.m)?;
        check_len(vec.len(), self.n, "query")?;
        Ok(self
            .pq
            .approximate_dot(vec, &self.codes, i, self.norm_of(i)))
    }

    /// Always fails: a code cannot absorb an arbitrary vector.
    fn add_vector_to_row(&mut self, _vec: &[f32], _i: usize, _a: f32) -> Result<()> {
        Err(MatrixError::OperationNotPermitted(
            "cannot add a vector to a row of a quantized matrix".to_string(),
        ))
    }

    fn add_row_to_vector(&self, x: &mut [f32], i: usize) -> Result<()> {
        self.add_row_to_vector_scaled(x, i, 1.0)
    }

    /// `x += a * norm(i) * decode(row(i))`.
    fn add_row_to_vector_scaled(&self, x: &mut [f32], i: usize, a: f32) -> Result<()> {
        check_row(i, self.m)?;
        check_len(x.len(), self.n, "accumulator")?;
        self.pq
            .approximate_accumulate(x, &self.codes, i, a * self.norm_of(i));
        Ok(())
    }

    fn save(&self, out: &mut dyn Write) -> Result<()> {
        format::write_bool(out, self.norm.is_some())?;
        format::write_usize_i64(out, self.m, "rows")?;
        format::write_usize_i64(out, self.n, "cols")?;
        format::write_usize_i64(out, self.code_size, "code size")?;
        format::write_bytes(out, &self.codes)?;
        self.pq.save(out)?;
        if let Some(nq) = &self.norm {
            format::write_bytes(out, &nq.codes)?;
            nq.quantizer.save(out)?;
        }
        debug!(
            rows = self.m,
            cols = self.n,
            code_size = self.code_size,
            "saved quantized matrix"
        );
        Ok(())
    }

    /// Always fails: there is no dense form to write.
    fn dump(&self, _out: &mut dyn Write) -> Result<()> {
        Err(MatrixError::OperationNotPermitted(
            "cannot dump a quantized matrix".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Vector;
    use std::io::Cursor;

    /// 4 x 8 matrix with distinct rows of different magnitudes.
    fn small_matrix() -> DenseMatrix {
        let data: Vec<f32> = (0..32)
            .map(|i| ((i * 7 % 11) as f32 - 5.0) * (1.0 + (i / 8) as f32))
            .collect();
        DenseMatrix::from_vec(4, 8, data).unwrap()
    }

    fn config(qnorm: bool) -> QuantizeConfig {
        QuantizeConfig::default().with_dsub(2).with_qnorm(qnorm)
    }

    #[test]
    fn test_code_size_example() {
        let qm = QuantMatrix::quantize(small_matrix(), &config(false)).unwrap();
        assert_eq!(qm.rows(), 4);
        assert_eq!(qm.cols(), 8);
        assert_eq!(qm.code_size(), 16);
        assert_eq!(qm.codes().len(), 16);
        assert!(!qm.uses_norm_quantization());
        assert!(qm.norm_codes().is_none());
        assert!(qm.norm_quantizer().is_none());
    }

    #[test]
    fn test_norm_quantization_present() {
        let qm = QuantMatrix::quantize(small_matrix(), &config(true)).unwrap();
        assert!(qm.uses_norm_quantization());
        assert_eq!(qm.norm_codes().map(<[u8]>::len), Some(4));
        assert_eq!(qm.norm_quantizer().map(VectorQuantizer::dim), Some(1));
    }

    #[test]
    fn test_tiny_matrix_is_reconstructed_exactly() {
        // Four rows never exceed the codebook, so each row is its own centroid.
        let dense = small_matrix();
        for qnorm in [false, true] {
            let qm = QuantMatrix::quantize(dense.clone(), &config(qnorm)).unwrap();
            for i in 0..4 {
                let row = dense.row(i);
                let exact: f32 = row.iter().map(|x| x * x).sum();
                let approx = qm.dot_row(row, i).unwrap();
                assert!(
                    (approx - exact).abs() <= 1e-3 * exact.max(1.0),
                    "qnorm={qnorm} row {i}: {approx} vs {exact}"
                );

                let mut acc = Vector::new(8);
                qm.add_row_to_vector(&mut acc, i).unwrap();
                for (a, b) in acc.iter().zip(row) {
                    assert!((a - b).abs() < 1e-3, "qnorm={qnorm} row {i}");
                }
            }
        }
    }

    #[test]
    fn test_scaled_accumulate() {
        let qm = QuantMatrix::quantize(small_matrix(), &config(true)).unwrap();
        let mut once = Vector::new(8);
        let mut scaled = Vector::new(8);
        qm.add_row_to_vector(&mut once, 2).unwrap();
        qm.add_row_to_vector_scaled(&mut scaled, 2, -3.0).unwrap();
        for (a, b) in once.iter().zip(scaled.iter()) {
            assert!((a * -3.0 - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_row_norm() {
        let dense = small_matrix();
        let norms = dense.l2_norm_rows();
        let qm = QuantMatrix::quantize(dense.clone(), &config(true)).unwrap();
        for i in 0..4 {
            assert!((qm.row_norm(i).unwrap() - norms[i]).abs() < 1e-4);
        }
        let plain = QuantMatrix::quantize(dense, &config(false)).unwrap();
        assert_eq!(plain.row_norm(0).unwrap(), 1.0);
        assert!(plain.row_norm(4).is_err());
    }

    #[test]
    fn test_bounds_checking() {
        let qm = QuantMatrix::quantize(small_matrix(), &config(true)).unwrap();
        let q = vec![1.0f32; 8];
        assert!(matches!(qm.dot_row(&q, 4), Err(MatrixError::InvalidArgument(_))));
        assert!(matches!(
            qm.dot_row(&q, (-1i64) as usize),
            Err(MatrixError::InvalidArgument(_))
        ));
        assert!(matches!(
            qm.dot_row(&[1.0f32; 9], 0),
            Err(MatrixError::InvalidArgument(_))
        ));

        let mut acc = vec![0.0f32; 9];
        assert!(qm.add_row_to_vector(&mut acc, 0).is_err());
        let mut acc = vec![0.0f32; 8];
        assert!(qm.add_row_to_vector_scaled(&mut acc, 4, 1.0).is_err());
        assert!(acc.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_disallowed_operations() {
        let mut qm = QuantMatrix::quantize(small_matrix(), &config(true)).unwrap();
        let before = qm.codes().to_vec();

        let err = qm.add_vector_to_row(&[0.0f32; 8], 0, 1.0).unwrap_err();
        assert!(matches!(err, MatrixError::OperationNotPermitted(_)));

        let mut out = Vec::new();
        let err = qm.dump(&mut out).unwrap_err();
        assert!(matches!(err, MatrixError::OperationNotPermitted(_)));
        assert!(out.is_empty());
        assert_eq!(qm.codes(), before.as_slice());
    }

    #[test]
    fn test_rejects_bad_construction() {
        let empty = DenseMatrix::new(0, 8);
        assert!(QuantMatrix::quantize(empty, &config(false)).is_err());

        let bad = QuantizeConfig::default().with_dsub(0);
        assert!(matches!(
            QuantMatrix::quantize(small_matrix(), &bad),
            Err(MatrixError::InvalidArgument(_))
        ));

        let wrong_dim = ProductQuantizer::new(6, 2).unwrap();
        assert!(QuantMatrix::quantize_with(small_matrix(), wrong_dim, None).is_err());

        let pq = ProductQuantizer::new(8, 2).unwrap();
        let wide_norm = ProductQuantizer::new(2, 1).unwrap();
        assert!(QuantMatrix::quantize_with(small_matrix(), pq, Some(wide_norm)).is_err());
    }

    #[test]
    fn test_save_layout_header() {
        let qm = QuantMatrix::quantize(small_matrix(), &config(false)).unwrap();
        let mut buf = Vec::new();
        qm.save(&mut buf).unwrap();
        assert_eq!(buf[0], 0);
        assert_eq!(&buf[1..9], &4i64.to_le_bytes());
        assert_eq!(&buf[9..17], &8i64.to_le_bytes());
        assert_eq!(&buf[17..25], &16i64.to_le_bytes());
        assert_eq!(&buf[25..41], qm.codes());
    }

    #[test]
    fn test_round_trip_both_modes() {
        for qnorm in [false, true] {
            let qm = QuantMatrix::quantize(small_matrix(), &config(qnorm)).unwrap();
            let mut buf = Vec::new();
            qm.save(&mut buf).unwrap();

            let mut cursor = Cursor::new(buf);
            let loaded: QuantMatrix = QuantMatrix::load(&mut cursor).unwrap();
            assert_eq!(cursor.position() as usize, cursor.get_ref().len());

            assert_eq!(loaded.rows(), qm.rows());
            assert_eq!(loaded.cols(), qm.cols());
            assert_eq!(loaded.code_size(), qm.code_size());
            assert_eq!(loaded.codes(), qm.codes());
            assert_eq!(loaded.norm_codes(), qm.norm_codes());

            let query: Vec<f32> = (0..8).map(|j| j as f32 * 0.5 - 1.0).collect();
            for i in 0..4 {
                assert_eq!(
                    loaded.dot_row(&query, i).unwrap().to_bits(),
                    qm.dot_row(&query, i).unwrap().to_bits()
                );
            }
        }
    }

    #[test]
    fn test_load_rejects_truncation() {
        let qm = QuantMatrix::quantize(small_matrix(), &config(true)).unwrap();
        let mut buf = Vec::new();
        qm.save(&mut buf).unwrap();
        for cut in [0, 5, 30, buf.len() - 1] {
            let err = QuantMatrix::<ProductQuantizer>::load(&mut Cursor::new(&buf[..cut]))
                .unwrap_err();
            assert!(
                matches!(err, MatrixError::MalformedStream(_)),
                "cut at {cut}: {err}"
            );
        }
    }

    #[test]
    fn test_load_rejects_inconsistent_code_size() {
        let qm = QuantMatrix::quantize(small_matrix(), &config(false)).unwrap();
        let mut buf = Vec::new();
        qm.save(&mut buf).unwrap();
        // Claim 5 rows while keeping 16 codes.
        buf[1..9].copy_from_slice(&5i64.to_le_bytes());
        let err = QuantMatrix::<ProductQuantizer>::load(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, MatrixError::MalformedStream(_)));
    }

    #[test]
    fn test_load_rejects_cols_mismatch() {
        let qm = QuantMatrix::quantize(small_matrix(), &config(false)).unwrap();
        let mut buf = Vec::new();
        qm.save(&mut buf).unwrap();
        // Claim 6 columns; the main quantizer still covers 8.
        buf[9..17].copy_from_slice(&6i64.to_le_bytes());
        let err = QuantMatrix::<ProductQuantizer>::load(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, MatrixError::MalformedStream(_)));
    }

    #[test]
    fn test_load_rejects_wide_norm_quantizer() {
        let qm = QuantMatrix::quantize(small_matrix(), &config(true)).unwrap();
        let mut buf = Vec::new();
        qm.save(&mut buf).unwrap();

        let mut norm_blob = Vec::new();
        qm.norm_quantizer().unwrap().save(&mut norm_blob).unwrap();
        buf.truncate(buf.len() - norm_blob.len());

        let mut wide = ProductQuantizer::new(2, 1).unwrap();
        wide.train(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0], 4).unwrap();
        wide.save(&mut buf).unwrap();

        let err = QuantMatrix::<ProductQuantizer>::load(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, MatrixError::MalformedStream(_)));
    }

    #[test]
    fn test_load_rejects_out_of_range_code() {
        let qm = QuantMatrix::quantize(small_matrix(), &config(false)).unwrap();
        let mut buf = Vec::new();
        qm.save(&mut buf).unwrap();
        buf[25] = 200;
        let err = QuantMatrix::<ProductQuantizer>::load(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, MatrixError::MalformedStream(_)));
    }

    #[test]
    fn test_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<QuantMatrix>();
    }
}
