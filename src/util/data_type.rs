//! On-disk encodings for fibre coordinate data.

use std::fmt;

use crate::util::{Error, Result};

/// Floating-point encoding of coordinate rows in a primary stream.
///
/// Only the four encodings accepted by the fibre track format are
/// representable; anything else in a `datatype:` header line is rejected
/// at parse time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 32-bit little-endian floats
    Float32LE,
    /// 32-bit big-endian floats
    Float32BE,
    /// 64-bit little-endian floats
    Float64LE,
    /// 64-bit big-endian floats
    Float64BE,
}

impl DataType {
    /// Parse a `datatype:` header specifier.
    pub fn parse(spec: &str) -> Result<Self> {
        match spec.trim() {
            "Float32LE" => Ok(Self::Float32LE),
            "Float32BE" => Ok(Self::Float32BE),
            "Float64LE" => Ok(Self::Float64LE),
            "Float64BE" => Ok(Self::Float64BE),
            other => Err(Error::format(format!(
                "unsupported datatype '{other}' (expected Float32LE, Float32BE, Float64LE or Float64BE)"
            ))),
        }
    }

    /// The specifier string written to the `datatype:` header line.
    pub fn specifier(&self) -> &'static str {
        match self {
            Self::Float32LE => "Float32LE",
            Self::Float32BE => "Float32BE",
            Self::Float64LE => "Float64LE",
            Self::Float64BE => "Float64BE",
        }
    }

    /// Size in bytes of one scalar component.
    #[inline]
    pub const fn scalar_bytes(&self) -> usize {
        match self {
            Self::Float32LE | Self::Float32BE => 4,
            Self::Float64LE | Self::Float64BE => 8,
        }
    }

    /// Size in bytes of one packed coordinate triple.
    #[inline]
    pub const fn coord_bytes(&self) -> usize {
        3 * self.scalar_bytes()
    }

    /// True for the little-endian encodings.
    #[inline]
    pub const fn is_le(&self) -> bool {
        matches!(self, Self::Float32LE | Self::Float64LE)
    }

    /// True for the single-precision encodings.
    #[inline]
    pub const fn is_f32(&self) -> bool {
        matches!(self, Self::Float32LE | Self::Float32BE)
    }
}

impl Default for DataType {
    fn default() -> Self {
        Self::Float64LE
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.specifier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        for spec in ["Float32LE", "Float32BE", "Float64LE", "Float64BE"] {
            let dt = DataType::parse(spec).unwrap();
            assert_eq!(dt.specifier(), spec);
        }
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(DataType::parse("Int32LE").is_err());
        assert!(DataType::parse("").is_err());
    }

    #[test]
    fn test_sizes() {
        assert_eq!(DataType::Float32LE.coord_bytes(), 12);
        assert_eq!(DataType::Float64BE.coord_bytes(), 24);
        assert!(DataType::Float64LE.is_le());
        assert!(!DataType::Float64BE.is_le());
    }
}
