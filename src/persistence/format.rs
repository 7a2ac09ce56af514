//! Fixed-width field codec.
//!
//! All integers and floats are little-endian. `bool` is one byte (0 or 1).
//! Lengths are written as `i64` and rejected on read when negative.

use std::io::{Read, Write};

use crate::error::{MatrixError, Result};

pub(crate) fn write_bool(out: &mut dyn Write, v: bool) -> Result<()> {
    out.write_all(&[u8::from(v)])?;
    Ok(())
}

pub(crate) fn read_bool(input: &mut dyn Read, what: &str) -> Result<bool> {
    let mut buf = [0u8; 1];
    input
        .read_exact(&mut buf)
        .map_err(|e| MatrixError::from_read(e, what))?;
    match buf[0] {
        0 => Ok(false),
        1 => Ok(true),
        b => Err(MatrixError::malformed(format!("{what}: invalid bool byte {b}"))),
    }
}

pub(crate) fn write_i32(out: &mut dyn Write, v: i32) -> Result<()> {
    out.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub(crate) fn read_i32(input: &mut dyn Read, what: &str) -> Result<i32> {
    let mut buf = [0u8; 4];
    input
        .read_exact(&mut buf)
        .map_err(|e| MatrixError::from_read(e, what))?;
    Ok(i32::from_le_bytes(buf))
}

pub(crate) fn write_i64(out: &mut dyn Write, v: i64) -> Result<()> {
    out.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub(crate) fn read_i64(input: &mut dyn Read, what: &str) -> Result<i64> {
    let mut buf = [0u8; 8];
    input
        .read_exact(&mut buf)
        .map_err(|e| MatrixError::from_read(e, what))?;
    Ok(i64::from_le_bytes(buf))
}

/// Write an in-memory size as `i32`.
pub(crate) fn write_usize_i32(out: &mut dyn Write, v: usize, what: &str) -> Result<()> {
    let v = i32::try_from(v)
        .map_err(|_| MatrixError::invalid(format!("{what} {v} does not fit in int32")))?;
    write_i32(out, v)
}

/// Read an `i32` that must be a non-negative size.
pub(crate) fn read_usize_i32(input: &mut dyn Read, what: &str) -> Result<usize> {
    let v = read_i32(input, what)?;
    usize::try_from(v).map_err(|_| MatrixError::malformed(format!("{what} is negative: {v}")))
}

/// Write an in-memory size as `i64`.
pub(crate) fn write_usize_i64(out: &mut dyn Write, v: usize, what: &str) -> Result<()> {
    let v = i64::try_from(v)
        .map_err(|_| MatrixError::invalid(format!("{what} {v} does not fit in int64")))?;
    write_i64(out, v)
}

/// Read an `i64` that must be a non-negative size.
pub(crate) fn read_usize_i64(input: &mut dyn Read, what: &str) -> Result<usize> {
    let v = read_i64(input, what)?;
    usize::try_from(v).map_err(|_| MatrixError::malformed(format!("{what} is negative: {v}")))
}

pub(crate) fn write_bytes(out: &mut dyn Write, bytes: &[u8]) -> Result<()> {
    out.write_all(bytes)?;
    Ok(())
}

/// Read exactly `len` bytes.
///
/// Reads through `take` so a corrupt length cannot force a huge allocation
/// before the stream runs dry.
pub(crate) fn read_bytes(input: &mut dyn Read, len: usize, what: &str) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    input.take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(MatrixError::malformed(format!(
            "truncated while reading {what}: expected {len} bytes, got {}",
            buf.len()
        )));
    }
    Ok(buf)
}

pub(crate) fn write_f32_slice(out: &mut dyn Write, values: &[f32]) -> Result<()> {
    let mut buf = Vec::with_capacity(values.len() * 4);
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    out.write_all(&buf)?;
    Ok(())
}

pub(crate) fn read_f32_vec(input: &mut dyn Read, len: usize, what: &str) -> Result<Vec<f32>> {
    let nbytes = len
        .checked_mul(4)
        .ok_or_else(|| MatrixError::malformed(format!("{what}: length {len} overflows")))?;
    let bytes = read_bytes(input, nbytes, what)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
