//! Register value codec
//!
//! Converts raw 16-bit word sequences to typed values and back. Multi-word
//! integers are high word first. Scaling and rounding are applied by the
//! device, not here.

use crate::core::types::{DataType, Value};
use crate::error::{RegSrvError, Result};

/// Per-family wire encoding for the shared set of data types
pub trait RegisterCodec {
    fn decode(words: &[u16], data_type: DataType) -> Result<Value>;

    fn encode(value: f64, data_type: DataType) -> Result<Vec<u16>>;
}

/// Conventional encoding: two's complement on bit 15, big-endian words
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardCodec;

impl RegisterCodec for StandardCodec {
    fn decode(words: &[u16], data_type: DataType) -> Result<Value> {
        decode(words, data_type)
    }

    fn encode(value: f64, data_type: DataType) -> Result<Vec<u16>> {
        encode(value, data_type)
    }
}

fn require_words(words: &[u16], data_type: DataType) -> Result<()> {
    if words.len() < data_type.min_words() {
        return Err(RegSrvError::index(format!(
            "{} needs {} word(s), got {}",
            data_type,
            data_type.min_words(),
            words.len()
        )));
    }
    Ok(())
}

/// Combine two words, first word high
pub fn combine_u32(high: u16, low: u16) -> u32 {
    (u32::from(high) << 16) | u32::from(low)
}

/// Two 8-bit characters per word, high byte first, no trimming
pub fn decode_text(words: &[u16]) -> String {
    words
        .iter()
        .flat_map(|w| w.to_be_bytes())
        .map(char::from)
        .collect()
}

/// Decode with the conventional wire encoding
pub fn decode(words: &[u16], data_type: DataType) -> Result<Value> {
    require_words(words, data_type)?;

    let value = match data_type {
        DataType::U16 => Value::Int(i64::from(words[0])),
        DataType::I16 => Value::Int(i64::from(words[0] as i16)),
        DataType::U32 => Value::Int(i64::from(combine_u32(words[0], words[1]))),
        DataType::I32 => Value::Int(i64::from(combine_u32(words[0], words[1]) as i32)),
        DataType::Utf8 => Value::Text(decode_text(words)),
        DataType::I8High => Value::Int(i64::from((words[0] >> 8) as u8 as i8)),
        DataType::I8Low => Value::Int(i64::from((words[0] & 0x00FF) as u8 as i8)),
    };

    Ok(value)
}

fn check_range(value: f64, min: f64, max: f64, data_type: DataType) -> Result<f64> {
    if !value.is_finite() || value < min || value > max {
        return Err(RegSrvError::range(format!(
            "{} out of range for {} [{}, {}]",
            value, data_type, min, max
        )));
    }
    // Fractions are truncated toward zero
    Ok(value.trunc())
}

/// Encode with the conventional wire encoding
pub fn encode(value: f64, data_type: DataType) -> Result<Vec<u16>> {
    match data_type {
        DataType::U16 => {
            let v = check_range(value, 0.0, f64::from(u16::MAX), data_type)?;
            Ok(vec![v as u16])
        },
        DataType::I16 => {
            let v = check_range(value, f64::from(i16::MIN), f64::from(i16::MAX), data_type)?;
            Ok(vec![v as i16 as u16])
        },
        DataType::U32 => {
            let v = check_range(value, 0.0, f64::from(u32::MAX), data_type)? as u32;
            Ok(vec![(v >> 16) as u16, (v & 0xFFFF) as u16])
        },
        DataType::I32 => {
            let v = check_range(value, f64::from(i32::MIN), f64::from(i32::MAX), data_type)?;
            let raw = v as i32 as u32;
            Ok(vec![(raw >> 16) as u16, (raw & 0xFFFF) as u16])
        },
        DataType::Utf8 | DataType::I8High | DataType::I8Low => Err(RegSrvError::not_implemented(
            format!("encoding of {} is not implemented", data_type),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u16_roundtrip() {
        assert_eq!(decode(&[0x0102], DataType::U16).unwrap(), Value::Int(258));
        assert_eq!(encode(258.0, DataType::U16).unwrap(), vec![0x0102]);
    }

    #[test]
    fn test_u32_high_word_first() {
        let words = [0x0102, 0x0304];
        assert_eq!(
            decode(&words, DataType::U32).unwrap(),
            Value::Int(16_909_060)
        );
        assert_eq!(encode(16_909_060.0, DataType::U32).unwrap(), words.to_vec());
    }

    #[test]
    fn test_i16_sign_bit_15() {
        assert_eq!(decode(&[0xFFFF], DataType::I16).unwrap(), Value::Int(-1));
        assert_eq!(decode(&[0x7FFF], DataType::I16).unwrap(), Value::Int(32767));
        assert_eq!(decode(&[0x8000], DataType::I16).unwrap(), Value::Int(-32768));
        // bit 12 alone does not make the value negative
        assert_eq!(decode(&[0x1000], DataType::I16).unwrap(), Value::Int(4096));
    }

    #[test]
    fn test_i32() {
        assert_eq!(
            decode(&[0xFFFF, 0xFFFE], DataType::I32).unwrap(),
            Value::Int(-2)
        );
        assert_eq!(encode(-2.0, DataType::I32).unwrap(), vec![0xFFFF, 0xFFFE]);
    }

    #[test]
    fn test_utf8() {
        assert_eq!(
            decode(&[0x4142, 0x4344], DataType::Utf8).unwrap(),
            Value::Text("ABCD".to_string())
        );
        // trailing NUL padding is preserved
        assert_eq!(
            decode(&[0x4142, 0x0000], DataType::Utf8).unwrap(),
            Value::Text("AB\0\0".to_string())
        );
    }

    #[test]
    fn test_i8_halves() {
        // two temperature sensors sharing one register: 0x19 (25) and 0xFB (-5)
        assert_eq!(decode(&[0x19FB], DataType::I8High).unwrap(), Value::Int(25));
        assert_eq!(decode(&[0x19FB], DataType::I8Low).unwrap(), Value::Int(-5));
        assert_eq!(decode(&[0x80FF], DataType::I8High).unwrap(), Value::Int(-128));
    }

    #[test]
    fn test_encode_u16_range() {
        assert!(matches!(
            encode(-1.0, DataType::U16),
            Err(RegSrvError::RangeError(_))
        ));
        assert!(matches!(
            encode(65536.0, DataType::U16),
            Err(RegSrvError::RangeError(_))
        ));
        assert!(matches!(
            encode(f64::NAN, DataType::U16),
            Err(RegSrvError::RangeError(_))
        ));
        assert_eq!(encode(65535.0, DataType::U16).unwrap(), vec![65535]);
        assert_eq!(encode(12.9, DataType::U16).unwrap(), vec![12]);
    }

    #[test]
    fn test_encode_unsupported() {
        let err = encode(1.0, DataType::Utf8).unwrap_err();
        assert!(matches!(err, RegSrvError::NotImplemented(ref msg) if msg.contains("UTF8")));
    }

    #[test]
    fn test_short_input() {
        assert!(matches!(
            decode(&[0x0001], DataType::U32),
            Err(RegSrvError::IndexError(_))
        ));
        assert!(decode(&[], DataType::U16).is_err());
    }
}
