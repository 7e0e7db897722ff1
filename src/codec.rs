//! Word layout codec for typed tags.
//!
//! Converts between [`TagValue`] and the 16-bit words exchanged with the PLC.
//! All multi-word numerics are laid out high word first; strings pack two
//! ASCII characters per word with the first character in the high byte.

use crate::error::{DriverError, DriverResult};
use crate::protocol::bcd;
use crate::value::{TagKind, TagValue};
use std::sync::Arc;

/// Default declared length for string tags, in characters.
pub const DEFAULT_STRING_LEN: u16 = 16;

/// Largest magnitude expressible in one word of packed BCD.
const BCD16_MAX: u32 = 9_999;
/// Largest magnitude expressible in two words of packed BCD.
const BCD32_MAX: u32 = 99_999_999;

/// Stateless value layout codec.
pub struct TagCodec;

impl TagCodec {
    /// Number of words a kind occupies on the wire.
    ///
    /// `declared_len` is the bracket length of string tags (characters) and
    /// is ignored for every other kind.
    pub fn words_for_kind(kind: TagKind, declared_len: Option<u16>) -> u16 {
        match kind {
            TagKind::Bool | TagKind::Byte => 1,
            TagKind::Int16 | TagKind::UInt16 | TagKind::Bcd16 | TagKind::UBcd16 => 1,
            TagKind::Int32 | TagKind::UInt32 | TagKind::Float32 | TagKind::Bcd32
            | TagKind::UBcd32 => 2,
            TagKind::Float64 => 4,
            TagKind::String => declared_len.unwrap_or(DEFAULT_STRING_LEN).div_ceil(2),
        }
    }

    /// Encode a value into its word layout.
    pub fn encode(
        kind: TagKind,
        value: &TagValue,
        declared_len: Option<u16>,
    ) -> DriverResult<Vec<u16>> {
        if !value.matches_kind(kind) {
            return Err(DriverError::TypeMismatch {
                expected: kind.value_kind(),
                actual: value.kind(),
            });
        }
        let words = match (kind, value) {
            (TagKind::Bool, TagValue::Bool(v)) => vec![u16::from(*v)],
            (TagKind::Byte, TagValue::Byte(v)) => vec![*v as u16],
            (TagKind::Int16, TagValue::Int16(v)) => vec![*v as u16],
            (TagKind::UInt16, TagValue::UInt16(v)) => vec![*v],
            (TagKind::Int32, TagValue::Int32(v)) => split_u32(*v as u32),
            (TagKind::UInt32, TagValue::UInt32(v)) => split_u32(*v),
            (TagKind::Float32, TagValue::Float32(v)) => {
                let b = v.to_be_bytes();
                vec![
                    u16::from_be_bytes([b[0], b[1]]),
                    u16::from_be_bytes([b[2], b[3]]),
                ]
            }
            (TagKind::Float64, TagValue::Float64(v)) => {
                let b = v.to_be_bytes();
                (0..4)
                    .map(|i| u16::from_be_bytes([b[i * 2], b[i * 2 + 1]]))
                    .collect()
            }
            (TagKind::String, TagValue::String(s)) => {
                encode_string(s, declared_len.unwrap_or(DEFAULT_STRING_LEN))?
            }
            (TagKind::Bcd16, TagValue::Int16(v)) => {
                check_bcd_magnitude(v.unsigned_abs() as u32, BCD16_MAX)?;
                vec![u16::from_be_bytes(bcd::i16_to_bcd(*v))]
            }
            (TagKind::UBcd16, TagValue::UInt16(v)) => {
                check_bcd_magnitude(*v as u32, BCD16_MAX)?;
                vec![u16::from_be_bytes(bcd::u16_to_bcd(*v))]
            }
            (TagKind::Bcd32, TagValue::Int32(v)) => {
                check_bcd_magnitude(v.unsigned_abs(), BCD32_MAX)?;
                let b = bcd::i32_to_bcd(*v);
                vec![
                    u16::from_be_bytes([b[0], b[1]]),
                    u16::from_be_bytes([b[2], b[3]]),
                ]
            }
            (TagKind::UBcd32, TagValue::UInt32(v)) => {
                check_bcd_magnitude(*v, BCD32_MAX)?;
                let b = bcd::u32_to_bcd(*v);
                vec![
                    u16::from_be_bytes([b[0], b[1]]),
                    u16::from_be_bytes([b[2], b[3]]),
                ]
            }
            // matches_kind above makes the remaining combinations unreachable
            _ => unreachable!("kind and value were checked for compatibility"),
        };
        Ok(words)
    }

    /// Decode a word layout into a value.
    pub fn decode(
        kind: TagKind,
        words: &[u16],
        declared_len: Option<u16>,
    ) -> DriverResult<TagValue> {
        let expected = Self::words_for_kind(kind, declared_len) as usize;
        if words.len() != expected {
            return Err(DriverError::RangeInvalid(format!(
                "{kind:?} expects {expected} words, got {}",
                words.len()
            )));
        }
        let value = match kind {
            TagKind::Bool => TagValue::Bool(words[0] != 0),
            TagKind::Byte => TagValue::Byte((words[0] & 0x00FF) as u8),
            TagKind::Int16 => TagValue::Int16(words[0] as i16),
            TagKind::UInt16 => TagValue::UInt16(words[0]),
            TagKind::Int32 => TagValue::Int32(join_u32(words[0], words[1]) as i32),
            TagKind::UInt32 => TagValue::UInt32(join_u32(words[0], words[1])),
            TagKind::Float32 => {
                let [b0, b1] = words[0].to_be_bytes();
                let [b2, b3] = words[1].to_be_bytes();
                TagValue::Float32(f32::from_be_bytes([b0, b1, b2, b3]))
            }
            TagKind::Float64 => {
                let mut b = [0u8; 8];
                for (i, w) in words.iter().enumerate() {
                    b[i * 2..i * 2 + 2].copy_from_slice(&w.to_be_bytes());
                }
                TagValue::Float64(f64::from_be_bytes(b))
            }
            TagKind::String => decode_string(words, declared_len.unwrap_or(DEFAULT_STRING_LEN)),
            TagKind::Bcd16 => TagValue::Int16(bcd::bcd_to_i16(&words[0].to_be_bytes())?),
            TagKind::UBcd16 => TagValue::UInt16(bcd::bcd_to_u16(&words[0].to_be_bytes())?),
            TagKind::Bcd32 => {
                let b = bcd_bytes_32(words);
                TagValue::Int32(bcd::bcd_to_i32(&b)?)
            }
            TagKind::UBcd32 => {
                let b = bcd_bytes_32(words);
                TagValue::UInt32(bcd::bcd_to_u32(&b)?)
            }
        };
        Ok(value)
    }
}

fn split_u32(v: u32) -> Vec<u16> {
    vec![(v >> 16) as u16, v as u16]
}

fn join_u32(hi: u16, lo: u16) -> u32 {
    ((hi as u32) << 16) | lo as u32
}

/// First word is the high BCD word, matching the write layout.
fn bcd_bytes_32(words: &[u16]) -> [u8; 4] {
    let [b0, b1] = words[0].to_be_bytes();
    let [b2, b3] = words[1].to_be_bytes();
    [b0, b1, b2, b3]
}

fn check_bcd_magnitude(magnitude: u32, max: u32) -> DriverResult<()> {
    if magnitude > max {
        return Err(DriverError::RangeInvalid(format!(
            "magnitude {magnitude} exceeds BCD capacity {max}"
        )));
    }
    Ok(())
}

fn encode_string(s: &str, declared_len: u16) -> DriverResult<Vec<u16>> {
    if !s.is_ascii() {
        return Err(DriverError::RangeInvalid(
            "string tags carry ASCII only".into(),
        ));
    }
    let bytes = s.as_bytes();
    if bytes.len() > declared_len as usize {
        return Err(DriverError::RangeInvalid(format!(
            "string of {} characters exceeds declared length {declared_len}",
            bytes.len()
        )));
    }
    let word_count = (declared_len as usize).div_ceil(2);
    let mut padded = vec![0u8; word_count * 2];
    padded[..bytes.len()].copy_from_slice(bytes);
    Ok(padded
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect())
}

fn decode_string(words: &[u16], declared_len: u16) -> TagValue {
    let mut bytes = Vec::with_capacity(words.len() * 2);
    for w in words {
        bytes.extend_from_slice(&w.to_be_bytes());
    }
    bytes.truncate(declared_len as usize);
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    let s = String::from_utf8_lossy(&bytes[..end]).to_string();
    TagValue::String(Arc::from(s.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(kind: TagKind, value: TagValue, declared: Option<u16>) {
        let words = TagCodec::encode(kind, &value, declared).unwrap();
        let back = TagCodec::decode(kind, &words, declared).unwrap();
        assert_eq!(back, value, "roundtrip for {kind:?}");
    }

    #[test]
    fn word_counts() {
        assert_eq!(TagCodec::words_for_kind(TagKind::Bool, None), 1);
        assert_eq!(TagCodec::words_for_kind(TagKind::Byte, None), 1);
        assert_eq!(TagCodec::words_for_kind(TagKind::Int32, None), 2);
        assert_eq!(TagCodec::words_for_kind(TagKind::Float64, None), 4);
        assert_eq!(TagCodec::words_for_kind(TagKind::Bcd32, None), 2);
        assert_eq!(TagCodec::words_for_kind(TagKind::String, None), 8);
        assert_eq!(TagCodec::words_for_kind(TagKind::String, Some(4)), 2);
        assert_eq!(TagCodec::words_for_kind(TagKind::String, Some(5)), 3);
    }

    #[test]
    fn bool_word_layout() {
        assert_eq!(
            TagCodec::encode(TagKind::Bool, &TagValue::Bool(true), None).unwrap(),
            vec![0x0001]
        );
        assert_eq!(
            TagCodec::encode(TagKind::Bool, &TagValue::Bool(false), None).unwrap(),
            vec![0x0000]
        );
        assert_eq!(
            TagCodec::decode(TagKind::Bool, &[0x8000], None).unwrap(),
            TagValue::Bool(true)
        );
    }

    #[test]
    fn byte_masks_low_bits() {
        assert_eq!(
            TagCodec::encode(TagKind::Byte, &TagValue::Byte(0xAB), None).unwrap(),
            vec![0x00AB]
        );
        assert_eq!(
            TagCodec::decode(TagKind::Byte, &[0xFFAB], None).unwrap(),
            TagValue::Byte(0xAB)
        );
    }

    #[test]
    fn int32_high_word_first() {
        assert_eq!(
            TagCodec::encode(TagKind::Int32, &TagValue::Int32(0x1122_3344), None).unwrap(),
            vec![0x1122, 0x3344]
        );
        roundtrip(TagKind::Int32, TagValue::Int32(-123_456_789), None);
        roundtrip(TagKind::UInt32, TagValue::UInt32(0xDEAD_BEEF), None);
    }

    #[test]
    fn float_layouts() {
        let words = TagCodec::encode(TagKind::Float32, &TagValue::Float32(1.0), None).unwrap();
        assert_eq!(words, vec![0x3F80, 0x0000]);
        roundtrip(TagKind::Float32, TagValue::Float32(-3.25), None);

        let words = TagCodec::encode(TagKind::Float64, &TagValue::Float64(1.0), None).unwrap();
        assert_eq!(words, vec![0x3FF0, 0x0000, 0x0000, 0x0000]);
        roundtrip(TagKind::Float64, TagValue::Float64(6.02214076e23), None);
    }

    #[test]
    fn string_packs_two_chars_per_word() {
        let words = TagCodec::encode(
            TagKind::String,
            &TagValue::String(Arc::from("AB")),
            Some(4),
        )
        .unwrap();
        assert_eq!(words, vec![0x4142, 0x0000]);

        let back = TagCodec::decode(TagKind::String, &words, Some(4)).unwrap();
        assert_eq!(back, TagValue::String(Arc::from("AB")));
    }

    #[test]
    fn string_trims_at_first_nul_and_respects_max() {
        let words = vec![0x4142, 0x0043, 0x4445];
        let back = TagCodec::decode(TagKind::String, &words, Some(6)).unwrap();
        assert_eq!(back, TagValue::String(Arc::from("AB")));
    }

    #[test]
    fn string_too_long_rejected() {
        assert!(TagCodec::encode(
            TagKind::String,
            &TagValue::String(Arc::from("ABCDE")),
            Some(4)
        )
        .is_err());
    }

    #[test]
    fn bcd16_layouts() {
        assert_eq!(
            TagCodec::encode(TagKind::UBcd16, &TagValue::UInt16(1234), None).unwrap(),
            vec![0x1234]
        );
        assert_eq!(
            TagCodec::decode(TagKind::UBcd16, &[0x1234], None).unwrap(),
            TagValue::UInt16(1234)
        );
        // Negative magnitudes survive the wire without their sign.
        let words = TagCodec::encode(TagKind::Bcd16, &TagValue::Int16(-321), None).unwrap();
        assert_eq!(words, vec![0x0321]);
        assert_eq!(
            TagCodec::decode(TagKind::Bcd16, &words, None).unwrap(),
            TagValue::Int16(321)
        );
    }

    #[test]
    fn bcd32_high_word_first_both_directions() {
        let words = TagCodec::encode(TagKind::UBcd32, &TagValue::UInt32(12_345_678), None).unwrap();
        assert_eq!(words, vec![0x1234, 0x5678]);
        assert_eq!(
            TagCodec::decode(TagKind::UBcd32, &[0x1234, 0x5678], None).unwrap(),
            TagValue::UInt32(12_345_678)
        );
        roundtrip(TagKind::Bcd32, TagValue::Int32(99_999_999), None);
    }

    #[test]
    fn bcd_out_of_domain_rejected() {
        assert!(TagCodec::encode(TagKind::UBcd16, &TagValue::UInt16(10_000), None).is_err());
        assert!(TagCodec::encode(TagKind::Bcd32, &TagValue::Int32(100_000_000), None).is_err());
    }

    #[test]
    fn kind_mismatch_rejected() {
        assert!(matches!(
            TagCodec::encode(TagKind::Int16, &TagValue::UInt16(1), None),
            Err(DriverError::TypeMismatch { .. })
        ));
        assert!(matches!(
            TagCodec::encode(TagKind::Bcd16, &TagValue::UInt16(1), None),
            Err(DriverError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn wrong_word_count_rejected() {
        assert!(TagCodec::decode(TagKind::Int32, &[1], None).is_err());
        assert!(TagCodec::decode(TagKind::Int16, &[1, 2], None).is_err());
    }

    #[test]
    fn scalar_roundtrips() {
        roundtrip(TagKind::Bool, TagValue::Bool(true), None);
        roundtrip(TagKind::Byte, TagValue::Byte(0x7F), None);
        roundtrip(TagKind::Int16, TagValue::Int16(i16::MIN), None);
        roundtrip(TagKind::UInt16, TagValue::UInt16(u16::MAX), None);
        roundtrip(TagKind::UBcd16, TagValue::UInt16(9_999), None);
        roundtrip(
            TagKind::String,
            TagValue::String(Arc::from("PUMP_01")),
            Some(16),
        );
    }
}
