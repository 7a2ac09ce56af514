//! quantmat: compressed embedding matrices built on product quantization.
//!
//! A [`QuantMatrix`] stores each row of a large matrix as a handful of
//! one-byte codes into learned per-sub-vector codebooks. It answers the two
//! questions an embedding consumer asks, the dot product of a query with a
//! row and accumulating a scaled row into a buffer, straight from the
//! codes, without ever rebuilding the dense matrix.
//!
//! ```rust
//! use quantmat::{DenseMatrix, Matrix, QuantMatrix, QuantizeConfig, Vector};
//!
//! let data: Vec<f32> = (0..32).map(|i| (i % 7) as f32 - 3.0).collect();
//! let dense = DenseMatrix::from_vec(4, 8, data).unwrap();
//!
//! let config = QuantizeConfig::default().with_dsub(2).with_qnorm(true);
//! let qm = QuantMatrix::quantize(dense, &config).unwrap();
//! assert_eq!(qm.code_size(), 16);
//!
//! let query = vec![1.0f32; 8];
//! let _score = qm.dot_row(&query, 0).unwrap();
//!
//! let mut acc = Vector::new(8);
//! qm.add_row_to_vector_scaled(&mut acc, 1, 0.5).unwrap();
//! ```
//!
//! # Norm quantization
//!
//! With `qnorm` enabled, every row is divided by its Euclidean norm before
//! the main codebooks are trained, and the norms are quantized by their own
//! 1-dimensional quantizer. The main codebooks then only have to represent
//! direction. Queries multiply the reconstructed norm back in.
//!
//! # Immutability
//!
//! Once built or loaded a quantized matrix never changes. Writing into a row
//! and dumping a dense form both fail with
//! [`MatrixError::OperationNotPermitted`]. Reads take `&self`, so a
//! `QuantMatrix` can be shared across threads without locking.

pub mod config;
pub mod error;
pub mod matrix;
pub mod quantization;
pub mod simd;

mod persistence;

pub use config::QuantizeConfig;
pub use error::{MatrixError, Result};
pub use matrix::{DenseMatrix, Matrix, QuantMatrix, Vector};
pub use quantization::{ProductQuantizer, VectorQuantizer};
