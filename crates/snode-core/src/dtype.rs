//! Element data types and the [`Scalar`] value carrier.

use std::fmt;

use crate::error::SNodeError;

/// Data type of one scalar field member.
///
/// Primitive types occupy whole bytes. Quantized types are bit-level and
/// may only be placed under bit containers (`bit_struct` / `bit_array`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 8-bit signed integer.
    I8,
    /// 16-bit signed integer.
    I16,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 8-bit unsigned integer.
    U8,
    /// 16-bit unsigned integer.
    U16,
    /// 32-bit unsigned integer.
    U32,
    /// 64-bit unsigned integer.
    U64,
    /// Half precision float.
    F16,
    /// Single precision float.
    F32,
    /// Double precision float.
    F64,
    /// Integer stored in `bits` bits.
    QuantInt {
        /// Width in bits (1..=32).
        bits: u8,
        /// Two's complement when `true`.
        signed: bool,
    },
    /// Float stored as digits plus an exponent.
    QuantFloat {
        /// Width of the digit field, sign included (1..=32).
        digit_bits: u8,
        /// Width of the exponent field (1..=8).
        exponent_bits: u8,
    },
}

impl DataType {
    /// Size in bytes for primitive types, `None` for quantized types.
    pub fn byte_size(self) -> Option<u32> {
        match self {
            Self::I8 | Self::U8 => Some(1),
            Self::I16 | Self::U16 | Self::F16 => Some(2),
            Self::I32 | Self::U32 | Self::F32 => Some(4),
            Self::I64 | Self::U64 | Self::F64 => Some(8),
            Self::QuantInt { .. } | Self::QuantFloat { .. } => None,
        }
    }

    /// Total storage width in bits.
    pub fn bits(self) -> u32 {
        match self {
            Self::QuantInt { bits, .. } => u32::from(bits),
            Self::QuantFloat {
                digit_bits,
                exponent_bits,
            } => u32::from(digit_bits) + u32::from(exponent_bits),
            other => other.byte_size().unwrap_or(0) * 8,
        }
    }

    /// Whether this is a bit-level (quantized) type.
    pub fn is_quant(self) -> bool {
        matches!(self, Self::QuantInt { .. } | Self::QuantFloat { .. })
    }

    /// Whether this is a primitive floating-point type.
    pub fn is_real(self) -> bool {
        matches!(self, Self::F16 | Self::F32 | Self::F64)
    }

    /// Whether values of this type are signed.
    pub fn is_signed(self) -> bool {
        match self {
            Self::I8 | Self::I16 | Self::I32 | Self::I64 => true,
            Self::F16 | Self::F32 | Self::F64 | Self::QuantFloat { .. } => true,
            Self::QuantInt { signed, .. } => signed,
            Self::U8 | Self::U16 | Self::U32 | Self::U64 => false,
        }
    }

    /// Check the widths of quantized types.
    pub fn validate(self) -> Result<(), SNodeError> {
        match self {
            Self::QuantInt { bits, .. } if !(1..=32).contains(&bits) => {
                Err(SNodeError::InvalidArgument {
                    reason: format!("quantized int width {bits} must be in 1..=32"),
                })
            }
            Self::QuantFloat {
                digit_bits,
                exponent_bits,
            } if !(1..=32).contains(&digit_bits) || !(1..=8).contains(&exponent_bits) => {
                Err(SNodeError::InvalidArgument {
                    reason: format!(
                        "quantized float needs 1..=32 digit bits and 1..=8 exponent bits, got {digit_bits}/{exponent_bits}"
                    ),
                })
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I8 => f.write_str("i8"),
            Self::I16 => f.write_str("i16"),
            Self::I32 => f.write_str("i32"),
            Self::I64 => f.write_str("i64"),
            Self::U8 => f.write_str("u8"),
            Self::U16 => f.write_str("u16"),
            Self::U32 => f.write_str("u32"),
            Self::U64 => f.write_str("u64"),
            Self::F16 => f.write_str("f16"),
            Self::F32 => f.write_str("f32"),
            Self::F64 => f.write_str("f64"),
            Self::QuantInt { bits, signed: true } => write!(f, "qi{bits}"),
            Self::QuantInt {
                bits,
                signed: false,
            } => write!(f, "qu{bits}"),
            Self::QuantFloat {
                digit_bits,
                exponent_bits,
            } => write!(f, "qf(d{digit_bits},e{exponent_bits})"),
        }
    }
}

/// A scalar value read from or written to a placed member.
///
/// Values are converted to the member's [`DataType`] on write with `as`
/// semantics (truncation/wrapping), matching how accessors behave for
/// mismatched host values.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Scalar {
    /// Signed integer value.
    Int(i64),
    /// Unsigned integer value.
    UInt(u64),
    /// Floating-point value.
    Float(f64),
}

impl Scalar {
    /// The value as `f64`.
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::UInt(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    /// The value as `i64`.
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Int(v) => v,
            Self::UInt(v) => v as i64,
            Self::Float(v) => v as i64,
        }
    }

    /// The value as `u64`.
    pub fn as_u64(self) -> u64 {
        match self {
            Self::Int(v) => v as u64,
            Self::UInt(v) => v,
            Self::Float(v) => v as u64,
        }
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for Scalar {
    fn from(v: u32) -> Self {
        Self::UInt(u64::from(v))
    }
}

impl From<u64> for Scalar {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<f32> for Scalar {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_sizes() {
        assert_eq!(DataType::I8.byte_size(), Some(1));
        assert_eq!(DataType::F16.byte_size(), Some(2));
        assert_eq!(DataType::F32.byte_size(), Some(4));
        assert_eq!(DataType::U64.byte_size(), Some(8));
        assert_eq!(DataType::F64.bits(), 64);
    }

    #[test]
    fn quant_types_have_no_byte_size() {
        let q = DataType::QuantInt {
            bits: 5,
            signed: false,
        };
        assert_eq!(q.byte_size(), None);
        assert_eq!(q.bits(), 5);
        assert!(q.is_quant());
        assert!(!q.is_signed());

        let qf = DataType::QuantFloat {
            digit_bits: 10,
            exponent_bits: 5,
        };
        assert_eq!(qf.bits(), 15);
        assert_eq!(qf.to_string(), "qf(d10,e5)");
    }

    #[test]
    fn validate_rejects_oversized_quant() {
        let bad = DataType::QuantInt {
            bits: 40,
            signed: true,
        };
        assert!(matches!(
            bad.validate(),
            Err(SNodeError::InvalidArgument { .. })
        ));
        assert!(DataType::F32.validate().is_ok());
    }

    #[test]
    fn scalar_conversions() {
        assert_eq!(Scalar::from(3i32).as_f64(), 3.0);
        assert_eq!(Scalar::from(2.9f64).as_i64(), 2);
        assert_eq!(Scalar::from(-1i64).as_u64(), u64::MAX);
    }
}
