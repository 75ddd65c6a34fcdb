//! Binary value codecs and inbound frame decoding.
//!
//! Each [`TypeTag`] maps to one [`ValueCodec`] in a static lookup table.
//! No runtime inspection of the value shape decides the wire layout: the
//! tag alone does.
//!
//! # Inbound Frame Layout
//!
//! ```text
//! ┌──────────────┬───────────────┬─────────────┬───────────────┬─────────────┬─────
//! │ hash bytes   │ index (u32LE) │ typed value │ index (u32LE) │ typed value │ ...
//! └──────────────┴───────────────┴─────────────┴───────────────┴─────────────┴─────
//! ```
//!
//! Numeric values are fixed-width little-endian. Strings are one length
//! byte followed by raw bytes, one byte per character.

// ============================================================================
// Imports
// ============================================================================

use tracing::trace;

use crate::error::{Error, Result};
use crate::identifiers::VariableIndex;

use super::value::{HmiValue, TypeTable, TypeTag};

// ============================================================================
// Constants
// ============================================================================

/// Maximum string payload in bytes.
pub const STRING_MAX_LEN: usize = 128;

/// Width of an encoded variable index.
const INDEX_WIDTH: usize = 4;

// ============================================================================
// ValueCodec
// ============================================================================

/// Decodes one value from the start of a slice.
///
/// Returns the value and the number of bytes consumed, or `None` if the
/// slice is too short.
type DecodeFn = fn(&[u8]) -> Option<(HmiValue, usize)>;

/// Appends one encoded value. Returns `None` if the value has no encoding.
type EncodeFn = fn(&HmiValue, &mut Vec<u8>) -> Option<()>;

/// Encoder/decoder pair for one type tag.
#[derive(Debug, Clone, Copy)]
pub struct ValueCodec {
    /// Fixed encoded width, `None` for length-prefixed strings.
    pub width: Option<usize>,
    decode: DecodeFn,
    encode: EncodeFn,
}

impl ValueCodec {
    /// Decodes a value from the start of `bytes`.
    #[inline]
    #[must_use]
    pub fn decode(&self, bytes: &[u8]) -> Option<(HmiValue, usize)> {
        (self.decode)(bytes)
    }

    /// Appends the encoding of `value` to `out`.
    #[inline]
    #[must_use]
    pub fn encode(&self, value: &HmiValue, out: &mut Vec<u8>) -> Option<()> {
        (self.encode)(value, out)
    }
}

/// Generates a fixed-width integer codec.
macro_rules! int_codec {
    ($ty:ty, $wide:ident, $to:ident) => {
        ValueCodec {
            width: Some(size_of::<$ty>()),
            decode: |bytes| {
                let raw = bytes.get(..size_of::<$ty>())?.try_into().ok()?;
                Some((HmiValue::$wide(<$ty>::from_le_bytes(raw).into()), size_of::<$ty>()))
            },
            encode: |value, out| {
                out.extend_from_slice(&(value.$to()? as $ty).to_le_bytes());
                Some(())
            },
        }
    };
}

/// Codec table, in [`TypeTag::ALL`] order.
static CODECS: [ValueCodec; 12] = [
    int_codec!(i8, Int, to_i64),
    int_codec!(i16, Int, to_i64),
    int_codec!(i32, Int, to_i64),
    int_codec!(i64, Int, to_i64),
    int_codec!(u8, Int, to_i64),
    int_codec!(u16, Int, to_i64),
    int_codec!(u32, Int, to_i64),
    int_codec!(u64, UInt, to_u64),
    // BOOL and NODE travel as signed bytes.
    int_codec!(i8, Int, to_i64),
    int_codec!(i8, Int, to_i64),
    ValueCodec {
        width: Some(4),
        decode: |bytes| {
            let raw = bytes.get(..4)?.try_into().ok()?;
            Some((HmiValue::Real(f64::from(f32::from_le_bytes(raw))), 4))
        },
        encode: |value, out| {
            out.extend_from_slice(&(value.to_f64()? as f32).to_le_bytes());
            Some(())
        },
    },
    ValueCodec {
        width: None,
        decode: decode_string,
        encode: encode_string,
    },
];

impl TypeTag {
    /// Returns the codec for this tag.
    #[inline]
    #[must_use]
    pub fn codec(self) -> &'static ValueCodec {
        &CODECS[self as usize]
    }
}

fn decode_string(bytes: &[u8]) -> Option<(HmiValue, usize)> {
    let len = usize::from(*bytes.first()?);
    let payload = bytes.get(1..=len)?;
    let text = payload.iter().map(|&b| char::from(b)).collect();
    Some((HmiValue::Str(text), len + 1))
}

fn encode_string(value: &HmiValue, out: &mut Vec<u8>) -> Option<()> {
    let text = match value {
        HmiValue::Str(s) => s.clone(),
        other => other.to_string(),
    };
    // Code units beyond one byte wrap, matching the single-byte contract.
    let payload: Vec<u8> = text
        .chars()
        .take(STRING_MAX_LEN)
        .map(|c| (u32::from(c) & 0xFF) as u8)
        .collect();
    out.push(payload.len() as u8);
    out.extend_from_slice(&payload);
    Some(())
}

// ============================================================================
// Value Encoding
// ============================================================================

/// Encodes `value` under `tag`, appending to `out`.
///
/// # Errors
///
/// Returns [`Error::TypeMismatch`] if the value has no numeric reading for
/// a numeric tag.
pub fn encode_value(
    index: VariableIndex,
    tag: TypeTag,
    value: &HmiValue,
    out: &mut Vec<u8>,
) -> Result<()> {
    let start = out.len();
    tag.codec().encode(value, out).ok_or_else(|| {
        out.truncate(start);
        Error::type_mismatch(index, tag)
    })
}

// ============================================================================
// Frame Decoding
// ============================================================================

/// Verifies the hash prefix and decodes every `(index, value)` record.
///
/// # Errors
///
/// - [`Error::ProtocolMismatch`] if any hash byte differs or is missing
/// - [`Error::UnknownIndex`] if an index has no known type
/// - [`Error::TruncatedFrame`] if an index or value runs past the end of the buffer
pub fn decode_frame(
    buffer: &[u8],
    expected_hash: &[u8],
    types: &TypeTable,
) -> Result<Vec<(VariableIndex, HmiValue)>> {
    for (offset, &expected) in expected_hash.iter().enumerate() {
        let found = buffer.get(offset).copied();
        if found != Some(expected) {
            return Err(Error::protocol_mismatch(offset, expected, found));
        }
    }

    let mut offset = expected_hash.len();
    let mut updates = Vec::new();

    while offset < buffer.len() {
        let raw = buffer
            .get(offset..offset + INDEX_WIDTH)
            .and_then(|b| b.try_into().ok())
            .map(u32::from_le_bytes)
            .ok_or_else(|| Error::truncated_frame(None, offset))?;
        let index = VariableIndex::new(raw);
        offset += INDEX_WIDTH;

        let tag = types.get(index).ok_or_else(|| Error::unknown_index(index))?;
        let (value, consumed) = tag
            .codec()
            .decode(&buffer[offset..])
            .ok_or_else(|| Error::truncated_frame(Some(index), offset))?;

        trace!(index = %index, %tag, ?value, "Decoded value");

        updates.push((index, value));
        offset += consumed;
    }

    Ok(updates)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    fn table() -> TypeTable {
        [
            (VariableIndex::new(0), TypeTag::Int),
            (VariableIndex::new(1), TypeTag::Real),
            (VariableIndex::new(2), TypeTag::String),
            (VariableIndex::new(3), TypeTag::Bool),
            (VariableIndex::new(4), TypeTag::Ulint),
        ]
        .into_iter()
        .collect()
    }

    fn roundtrip(tag: TypeTag, value: &HmiValue) -> HmiValue {
        let mut out = Vec::new();
        encode_value(VariableIndex::new(0), tag, value, &mut out).expect("encode");
        if let Some(width) = tag.codec().width {
            assert_eq!(out.len(), width);
        }
        let (decoded, consumed) = tag.codec().decode(&out).expect("decode");
        assert_eq!(consumed, out.len());
        decoded
    }

    #[test]
    fn test_codec_table_order() {
        for tag in TypeTag::ALL {
            let width = tag.codec().width;
            match tag {
                TypeTag::String => assert_eq!(width, None),
                TypeTag::Lint | TypeTag::Ulint => assert_eq!(width, Some(8)),
                TypeTag::Dint | TypeTag::Udint | TypeTag::Real => assert_eq!(width, Some(4)),
                TypeTag::Int | TypeTag::Uint => assert_eq!(width, Some(2)),
                _ => assert_eq!(width, Some(1)),
            }
        }
    }

    #[test]
    fn test_decode_frame_hash_mismatch() {
        let err = decode_frame(&[1, 2, 4, 0, 0, 0, 0], &[1, 2, 3], &table()).unwrap_err();
        assert!(matches!(
            err,
            Error::ProtocolMismatch {
                offset: 2,
                expected: 3,
                found: Some(4)
            }
        ));
        assert!(err.requires_reload());
    }

    #[test]
    fn test_decode_frame_short_hash() {
        let err = decode_frame(&[1, 2], &[1, 2, 3], &table()).unwrap_err();
        assert!(matches!(err, Error::ProtocolMismatch { found: None, .. }));
    }

    #[test]
    fn test_decode_frame_records() {
        let mut buffer = vec![9, 9];
        buffer.extend_from_slice(&0u32.to_le_bytes());
        buffer.extend_from_slice(&(-300i16).to_le_bytes());
        buffer.extend_from_slice(&2u32.to_le_bytes());
        buffer.extend_from_slice(&[2, b'o', b'k']);
        buffer.extend_from_slice(&3u32.to_le_bytes());
        buffer.push(1);

        let updates = decode_frame(&buffer, &[9, 9], &table()).expect("decode");
        assert_eq!(
            updates,
            vec![
                (VariableIndex::new(0), HmiValue::Int(-300)),
                (VariableIndex::new(2), HmiValue::from("ok")),
                (VariableIndex::new(3), HmiValue::Int(1)),
            ]
        );
    }

    #[test]
    fn test_decode_frame_hash_only() {
        let updates = decode_frame(&[7], &[7], &table()).expect("decode");
        assert!(updates.is_empty());
    }

    #[test]
    fn test_decode_frame_unknown_index() {
        let mut buffer = vec![7];
        buffer.extend_from_slice(&99u32.to_le_bytes());
        buffer.push(0);
        let err = decode_frame(&buffer, &[7], &table()).unwrap_err();
        assert!(matches!(err, Error::UnknownIndex { index } if index.as_u32() == 99));
    }

    #[test]
    fn test_decode_frame_truncated_value() {
        let mut buffer = vec![7];
        buffer.extend_from_slice(&1u32.to_le_bytes());
        buffer.extend_from_slice(&[0, 0]);
        let err = decode_frame(&buffer, &[7], &table()).unwrap_err();
        assert!(matches!(err, Error::TruncatedFrame { offset: 5, .. }));
    }

    #[test]
    fn test_string_truncates_to_128() {
        let long = "x".repeat(200);
        let decoded = roundtrip(TypeTag::String, &HmiValue::Str(long));
        assert_eq!(decoded, HmiValue::Str("x".repeat(STRING_MAX_LEN)));
    }

    #[test]
    fn test_string_of_128_bytes_decodes() {
        let exact = HmiValue::Str("y".repeat(STRING_MAX_LEN));
        assert_eq!(roundtrip(TypeTag::String, &exact), exact);
    }

    #[test]
    fn test_encode_type_mismatch() {
        let mut out = vec![0xAA];
        let err = encode_value(
            VariableIndex::new(5),
            TypeTag::Dint,
            &HmiValue::from("not a number"),
            &mut out,
        )
        .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { tag: TypeTag::Dint, .. }));
        assert_eq!(out, vec![0xAA]);
    }

    #[test]
    fn test_bool_encodes_single_byte() {
        let mut out = Vec::new();
        encode_value(VariableIndex::new(3), TypeTag::Bool, &HmiValue::Int(1), &mut out)
            .expect("encode");
        assert_eq!(out, vec![1]);
    }

    proptest! {
        #[test]
        fn prop_sint_roundtrip(v in any::<i8>()) {
            prop_assert_eq!(roundtrip(TypeTag::Sint, &HmiValue::Int(v.into())), HmiValue::Int(v.into()));
        }

        #[test]
        fn prop_integer_roundtrip(v in any::<i16>()) {
            prop_assert_eq!(roundtrip(TypeTag::Int, &HmiValue::Int(v.into())), HmiValue::Int(v.into()));
        }

        #[test]
        fn prop_dint_roundtrip(v in any::<i32>()) {
            prop_assert_eq!(roundtrip(TypeTag::Dint, &HmiValue::Int(v.into())), HmiValue::Int(v.into()));
        }

        #[test]
        fn prop_usint_roundtrip(v in any::<u8>()) {
            prop_assert_eq!(roundtrip(TypeTag::Usint, &HmiValue::Int(v.into())), HmiValue::Int(v.into()));
        }

        #[test]
        fn prop_uint_roundtrip(v in any::<u16>()) {
            prop_assert_eq!(roundtrip(TypeTag::Uint, &HmiValue::Int(v.into())), HmiValue::Int(v.into()));
        }

        #[test]
        fn prop_bool_and_node_roundtrip(v in any::<i8>()) {
            let value = HmiValue::Int(v.into());
            prop_assert_eq!(roundtrip(TypeTag::Bool, &value), value.clone());
            prop_assert_eq!(roundtrip(TypeTag::Node, &value), value);
        }

        #[test]
        fn prop_udint_roundtrip(v in any::<u32>()) {
            prop_assert_eq!(roundtrip(TypeTag::Udint, &HmiValue::Int(v.into())), HmiValue::Int(v.into()));
        }

        #[test]
        fn prop_lint_roundtrip(v in any::<i64>()) {
            prop_assert_eq!(roundtrip(TypeTag::Lint, &HmiValue::Int(v)), HmiValue::Int(v));
        }

        #[test]
        fn prop_ulint_roundtrip(v in any::<u64>()) {
            prop_assert_eq!(roundtrip(TypeTag::Ulint, &HmiValue::UInt(v)), HmiValue::UInt(v));
        }

        #[test]
        fn prop_real_roundtrip(v in any::<f32>().prop_filter("finite", |f| f.is_finite())) {
            let value = HmiValue::Real(f64::from(v));
            prop_assert_eq!(roundtrip(TypeTag::Real, &value), value);
        }

        #[test]
        fn prop_string_roundtrip(s in "[ -~]{0,128}") {
            let value = HmiValue::Str(s);
            prop_assert_eq!(roundtrip(TypeTag::String, &value), value);
        }

        #[test]
        fn prop_long_string_truncates(s in "[ -~]{129,300}") {
            let expected: String = s.chars().take(STRING_MAX_LEN).collect();
            prop_assert_eq!(roundtrip(TypeTag::String, &HmiValue::Str(s)), HmiValue::Str(expected));
        }
    }
}
