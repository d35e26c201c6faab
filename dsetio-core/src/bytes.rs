//! Little-endian decoding of fixed-width numeric values
//!
//! Every function requires a slice of exactly the value's width; anything
//! else is reported as [`Error::BufferTooShort`] rather than truncated.

use crate::error::{Error, Result};

fn exact<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    bytes.try_into().map_err(|_| Error::BufferTooShort {
        needed: N,
        actual: bytes.len(),
    })
}

/// Decode a little-endian `f64`
pub fn f64_from_le(bytes: &[u8]) -> Result<f64> {
    exact::<8>(bytes).map(f64::from_le_bytes)
}

/// Decode a little-endian `f32`
pub fn f32_from_le(bytes: &[u8]) -> Result<f32> {
    exact::<4>(bytes).map(f32::from_le_bytes)
}

/// Decode a little-endian `i32`
pub fn i32_from_le(bytes: &[u8]) -> Result<i32> {
    exact::<4>(bytes).map(i32::from_le_bytes)
}

/// Decode a little-endian `i16`
pub fn i16_from_le(bytes: &[u8]) -> Result<i16> {
    exact::<2>(bytes).map(i16::from_le_bytes)
}

/// Decode a little-endian `u64`
pub fn u64_from_le(bytes: &[u8]) -> Result<u64> {
    exact::<8>(bytes).map(u64::from_le_bytes)
}

/// Decode a little-endian `u16`
pub fn u16_from_le(bytes: &[u8]) -> Result<u16> {
    exact::<2>(bytes).map(u16::from_le_bytes)
}
