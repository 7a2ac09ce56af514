//! Positional binary persistence.
//!
//! Matrices and quantizers serialize themselves as a flat sequence of
//! fixed-width fields with no magic bytes and no version tag. A reader must
//! consume exactly the fields its paired writer produced, in the same order.
//! See [`crate::matrix::QuantMatrix::save`] for the top-level layout.

pub(crate) mod format;
