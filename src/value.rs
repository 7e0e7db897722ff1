//! Typed tag value model.
//!
//! Tags carry one of a closed set of value kinds. The kind drives the wire
//! layout (word count, endian and BCD handling); the value is the decoded
//! host representation. BCD kinds decode into the matching plain integer
//! variants, the packing only exists on the wire.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Closed set of tag value kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TagKind {
    Bool,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
    Float64,
    String,
    /// Signed 16-bit value stored as packed BCD in one word.
    Bcd16,
    /// Unsigned 16-bit value stored as packed BCD in one word.
    UBcd16,
    /// Signed 32-bit value stored as packed BCD in two words.
    Bcd32,
    /// Unsigned 32-bit value stored as packed BCD in two words.
    UBcd32,
}

impl TagKind {
    /// The value variant this kind decodes into.
    pub fn value_kind(self) -> TagKind {
        match self {
            TagKind::Bcd16 => TagKind::Int16,
            TagKind::UBcd16 => TagKind::UInt16,
            TagKind::Bcd32 => TagKind::Int32,
            TagKind::UBcd32 => TagKind::UInt32,
            other => other,
        }
    }
}

/// A strongly typed runtime value for one tag.
///
/// Strings share their allocation through `Arc<str>` so that fanning a value
/// out to many subscribers stays cheap.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Bool(bool),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Float32(f32),
    Float64(f64),
    String(Arc<str>),
}

impl TagValue {
    /// The kind of this value as stored, BCD kinds excluded.
    pub fn kind(&self) -> TagKind {
        match self {
            TagValue::Bool(_) => TagKind::Bool,
            TagValue::Byte(_) => TagKind::Byte,
            TagValue::Int16(_) => TagKind::Int16,
            TagValue::UInt16(_) => TagKind::UInt16,
            TagValue::Int32(_) => TagKind::Int32,
            TagValue::UInt32(_) => TagKind::UInt32,
            TagValue::Float32(_) => TagKind::Float32,
            TagValue::Float64(_) => TagKind::Float64,
            TagValue::String(_) => TagKind::String,
        }
    }

    /// Strict check that this value can serve a tag registered with `kind`.
    pub fn matches_kind(&self, kind: TagKind) -> bool {
        self.kind() == kind.value_kind()
    }
}

impl std::fmt::Display for TagValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TagValue::Bool(v) => write!(f, "{v}"),
            TagValue::Byte(v) => write!(f, "{v}"),
            TagValue::Int16(v) => write!(f, "{v}"),
            TagValue::UInt16(v) => write!(f, "{v}"),
            TagValue::Int32(v) => write!(f, "{v}"),
            TagValue::UInt32(v) => write!(f, "{v}"),
            TagValue::Float32(v) => write!(f, "{v}"),
            TagValue::Float64(v) => write!(f, "{v}"),
            TagValue::String(v) => write!(f, "{v}"),
        }
    }
}

/// Conversion out of the closed union, strict by design: no numeric
/// widening or cross-kind casting.
pub trait FromTagValue: Sized {
    fn from_tag_value(value: &TagValue) -> Option<Self>;
}

/// Conversion into the closed union, with the kind a plain Rust value maps
/// onto when a tag is registered generically.
pub trait IntoTagValue {
    /// Kind used when registering a tag from this Rust type. BCD kinds are
    /// only reachable through explicit kind registration.
    const KIND: TagKind;

    fn into_tag_value(self) -> TagValue;
}

macro_rules! impl_tag_scalar {
    ($ty:ty, $variant:ident, $kind:expr) => {
        impl FromTagValue for $ty {
            fn from_tag_value(value: &TagValue) -> Option<Self> {
                match value {
                    TagValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }

        impl IntoTagValue for $ty {
            const KIND: TagKind = $kind;

            fn into_tag_value(self) -> TagValue {
                TagValue::$variant(self)
            }
        }
    };
}

impl_tag_scalar!(bool, Bool, TagKind::Bool);
impl_tag_scalar!(u8, Byte, TagKind::Byte);
impl_tag_scalar!(i16, Int16, TagKind::Int16);
impl_tag_scalar!(u16, UInt16, TagKind::UInt16);
impl_tag_scalar!(i32, Int32, TagKind::Int32);
impl_tag_scalar!(u32, UInt32, TagKind::UInt32);
impl_tag_scalar!(f32, Float32, TagKind::Float32);
impl_tag_scalar!(f64, Float64, TagKind::Float64);

impl FromTagValue for String {
    fn from_tag_value(value: &TagValue) -> Option<Self> {
        match value {
            TagValue::String(v) => Some(v.to_string()),
            _ => None,
        }
    }
}

impl IntoTagValue for String {
    const KIND: TagKind = TagKind::String;

    fn into_tag_value(self) -> TagValue {
        TagValue::String(Arc::from(self.as_str()))
    }
}

impl IntoTagValue for &str {
    const KIND: TagKind = TagKind::String;

    fn into_tag_value(self) -> TagValue {
        TagValue::String(Arc::from(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_of_value() {
        assert_eq!(TagValue::Bool(true).kind(), TagKind::Bool);
        assert_eq!(TagValue::Float64(1.0).kind(), TagKind::Float64);
        assert_eq!(TagValue::String(Arc::from("x")).kind(), TagKind::String);
    }

    #[test]
    fn bcd_kinds_decode_into_integers() {
        assert_eq!(TagKind::Bcd16.value_kind(), TagKind::Int16);
        assert_eq!(TagKind::UBcd16.value_kind(), TagKind::UInt16);
        assert_eq!(TagKind::Bcd32.value_kind(), TagKind::Int32);
        assert_eq!(TagKind::UBcd32.value_kind(), TagKind::UInt32);
        assert!(TagValue::Int16(5).matches_kind(TagKind::Bcd16));
        assert!(TagValue::UInt32(5).matches_kind(TagKind::UBcd32));
        assert!(!TagValue::Int16(5).matches_kind(TagKind::UBcd16));
    }

    #[test]
    fn strict_casts() {
        let v = TagValue::Int16(-7);
        assert_eq!(i16::from_tag_value(&v), Some(-7));
        assert_eq!(u16::from_tag_value(&v), None);
        assert_eq!(i32::from_tag_value(&v), None);

        let s = TagValue::String(Arc::from("motor"));
        assert_eq!(String::from_tag_value(&s), Some("motor".to_string()));
        assert_eq!(bool::from_tag_value(&s), None);
    }

    #[test]
    fn into_tag_value_kinds() {
        assert_eq!(<bool as IntoTagValue>::KIND, TagKind::Bool);
        assert_eq!(<u8 as IntoTagValue>::KIND, TagKind::Byte);
        assert_eq!(<f32 as IntoTagValue>::KIND, TagKind::Float32);
        assert_eq!(<&str as IntoTagValue>::KIND, TagKind::String);
        assert_eq!(42u16.into_tag_value(), TagValue::UInt16(42));
        assert_eq!("ab".into_tag_value(), TagValue::String(Arc::from("ab")));
    }
}
