//! Error types for quantmat.

use thiserror::Error;

/// Errors that can occur while building, querying or persisting matrices.
#[derive(Debug, Error)]
pub enum MatrixError {
    /// Bad row index, vector length or construction parameter.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Structural refusal on compressed data. Never retryable.
    #[error("operation not permitted: {0}")]
    OperationNotPermitted(String),

    /// Truncated or inconsistent serialized data.
    #[error("malformed stream: {0}")]
    MalformedStream(String),

    /// A dot product against a dense row produced NaN.
    #[error("encountered NaN in dot product of row {row}")]
    NonFinite { row: usize },

    /// I/O error from the caller-supplied stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MatrixError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedStream(msg.into())
    }

    /// Maps a short read into `MalformedStream`; other I/O errors pass through.
    pub(crate) fn from_read(e: std::io::Error, what: &str) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::MalformedStream(format!("truncated while reading {what}"))
        } else {
            Self::Io(e)
        }
    }
}

pub type Result<T> = std::result::Result<T, MatrixError>;
