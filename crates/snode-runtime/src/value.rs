//! Encoding of scalar values in cell memory.

use snode_core::{AccessError, DataType, Scalar};

/// Whether the accessors can read and write `dtype`.
pub(crate) fn check_accessible(dtype: DataType) -> Result<(), AccessError> {
    match dtype {
        DataType::F16 | DataType::QuantFloat { .. } => Err(AccessError::UnsupportedType { dtype }),
        _ => Ok(()),
    }
}

/// The value of a never-written cell.
pub(crate) fn zero(dtype: DataType) -> Scalar {
    if dtype.is_real() {
        Scalar::Float(0.0)
    } else if dtype.is_signed() {
        Scalar::Int(0)
    } else {
        Scalar::UInt(0)
    }
}

/// Decode a primitive value from little-endian bytes.
pub(crate) fn decode(dtype: DataType, b: &[u8]) -> Scalar {
    match dtype {
        DataType::I8 => Scalar::Int(i64::from(i8::from_le_bytes([b[0]]))),
        DataType::I16 => Scalar::Int(i64::from(i16::from_le_bytes([b[0], b[1]]))),
        DataType::I32 => Scalar::Int(i64::from(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))),
        DataType::I64 => Scalar::Int(i64::from_le_bytes(word(b))),
        DataType::U8 => Scalar::UInt(u64::from(b[0])),
        DataType::U16 => Scalar::UInt(u64::from(u16::from_le_bytes([b[0], b[1]]))),
        DataType::U32 => Scalar::UInt(u64::from(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))),
        DataType::U64 => Scalar::UInt(u64::from_le_bytes(word(b))),
        DataType::F32 => Scalar::Float(f64::from(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))),
        DataType::F64 => Scalar::Float(f64::from_le_bytes(word(b))),
        DataType::F16 | DataType::QuantInt { .. } | DataType::QuantFloat { .. } => zero(dtype),
    }
}

/// Encode a primitive value into little-endian bytes, converting with `as`.
pub(crate) fn encode(dtype: DataType, v: Scalar, out: &mut [u8]) {
    match dtype {
        DataType::I8 => out.copy_from_slice(&(v.as_i64() as i8).to_le_bytes()),
        DataType::I16 => out.copy_from_slice(&(v.as_i64() as i16).to_le_bytes()),
        DataType::I32 => out.copy_from_slice(&(v.as_i64() as i32).to_le_bytes()),
        DataType::I64 => out.copy_from_slice(&v.as_i64().to_le_bytes()),
        DataType::U8 => out.copy_from_slice(&(v.as_u64() as u8).to_le_bytes()),
        DataType::U16 => out.copy_from_slice(&(v.as_u64() as u16).to_le_bytes()),
        DataType::U32 => out.copy_from_slice(&(v.as_u64() as u32).to_le_bytes()),
        DataType::U64 => out.copy_from_slice(&v.as_u64().to_le_bytes()),
        DataType::F32 => out.copy_from_slice(&(v.as_f64() as f32).to_le_bytes()),
        DataType::F64 => out.copy_from_slice(&v.as_f64().to_le_bytes()),
        DataType::F16 | DataType::QuantInt { .. } | DataType::QuantFloat { .. } => {}
    }
}

fn word(b: &[u8]) -> [u8; 8] {
    let mut w = [0u8; 8];
    w.copy_from_slice(&b[..8]);
    w
}

/// Load a bit container word of `bytes` bytes.
pub(crate) fn load_word(b: &[u8]) -> u64 {
    let mut w = [0u8; 8];
    w[..b.len()].copy_from_slice(b);
    u64::from_le_bytes(w)
}

/// Store the low `out.len()` bytes of `word`.
pub(crate) fn store_word(word: u64, out: &mut [u8]) {
    let n = out.len();
    out.copy_from_slice(&word.to_le_bytes()[..n]);
}

fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Extract a quantized integer of `bits` bits at bit `offset`.
pub(crate) fn extract_bits(word: u64, offset: u32, bits: u32, signed: bool) -> Scalar {
    let raw = (word >> offset) & mask(bits);
    if signed {
        let shift = 64 - bits;
        Scalar::Int(((raw << shift) as i64) >> shift)
    } else {
        Scalar::UInt(raw)
    }
}

/// Replace the `bits` bits at `offset` with the low bits of `v`.
pub(crate) fn insert_bits(word: u64, offset: u32, bits: u32, v: Scalar) -> u64 {
    let m = mask(bits) << offset;
    (word & !m) | (((v.as_i64() as u64) << offset) & m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_round_trip_converts() {
        let mut buf = [0u8; 4];
        encode(DataType::I32, Scalar::Float(-3.7), &mut buf);
        assert_eq!(decode(DataType::I32, &buf), Scalar::Int(-3));

        let mut buf = [0u8; 1];
        encode(DataType::U8, Scalar::Int(300), &mut buf);
        assert_eq!(decode(DataType::U8, &buf), Scalar::UInt(44));
    }

    #[test]
    fn signed_bits_sign_extend() {
        let w = insert_bits(0, 3, 5, Scalar::Int(-2));
        assert_eq!(extract_bits(w, 3, 5, true), Scalar::Int(-2));
        assert_eq!(extract_bits(w, 3, 5, false), Scalar::UInt(30));
        assert_eq!(w & 0b111, 0);
    }

    #[test]
    fn insert_preserves_neighbours() {
        let w = insert_bits(u64::MAX, 8, 8, Scalar::UInt(0));
        assert_eq!(w, !0xff00);
    }

    #[test]
    fn short_words() {
        let mut out = [0u8; 2];
        store_word(0xabcd, &mut out);
        assert_eq!(load_word(&out), 0xabcd);
    }

    #[test]
    fn f16_and_quant_float_unsupported() {
        assert!(check_accessible(DataType::F16).is_err());
        assert!(check_accessible(DataType::QuantFloat {
            digit_bits: 8,
            exponent_bits: 4
        })
        .is_err());
        assert!(check_accessible(DataType::QuantInt {
            bits: 3,
            signed: true
        })
        .is_ok());
    }
}
