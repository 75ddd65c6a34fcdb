//! Scalar types and dynamically typed HMI values.
//!
//! Every controller variable carries an IEC-style [`TypeTag`] fixing its
//! binary width. Values flowing through the cache are [`HmiValue`]s, whose
//! shape (integer, real, string) is independent from the wire tag.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identifiers::VariableIndex;

// ============================================================================
// TypeTag
// ============================================================================

/// Scalar type of a variable, fixing its encoded width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TypeTag {
    /// Signed 8-bit integer.
    Sint,
    /// Signed 16-bit integer.
    Int,
    /// Signed 32-bit integer.
    Dint,
    /// Signed 64-bit integer.
    Lint,
    /// Unsigned 8-bit integer.
    Usint,
    /// Unsigned 16-bit integer.
    Uint,
    /// Unsigned 32-bit integer.
    Udint,
    /// Unsigned 64-bit integer.
    Ulint,
    /// Boolean, one byte on the wire.
    Bool,
    /// Tree node marker, one byte on the wire.
    Node,
    /// 32-bit IEEE float.
    Real,
    /// Length-prefixed byte string, at most 128 bytes.
    String,
}

impl TypeTag {
    /// All tags, in codec table order.
    pub const ALL: [Self; 12] = [
        Self::Sint,
        Self::Int,
        Self::Dint,
        Self::Lint,
        Self::Usint,
        Self::Uint,
        Self::Udint,
        Self::Ulint,
        Self::Bool,
        Self::Node,
        Self::Real,
        Self::String,
    ];

    /// Returns the IEC name of the tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sint => "SINT",
            Self::Int => "INT",
            Self::Dint => "DINT",
            Self::Lint => "LINT",
            Self::Usint => "USINT",
            Self::Uint => "UINT",
            Self::Udint => "UDINT",
            Self::Ulint => "ULINT",
            Self::Bool => "BOOL",
            Self::Node => "NODE",
            Self::Real => "REAL",
            Self::String => "STRING",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// HmiValue
// ============================================================================

/// Last-known value of a variable.
///
/// `UInt` only appears for `ULINT` values; every other integer tag
/// decodes to `Int`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HmiValue {
    /// Signed integer.
    Int(i64),
    /// Unsigned integer beyond the signed range.
    UInt(u64),
    /// Floating point.
    Real(f64),
    /// Text, one byte per character on the wire.
    Str(String),
}

impl HmiValue {
    /// Returns `true` for integer and real values.
    #[inline]
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        !matches!(self, Self::Str(_))
    }

    /// Returns the string content, if this is a string.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Converts to `i64`, truncating reals and wrapping large unsigned values.
    ///
    /// Strings are parsed as numbers.
    #[must_use]
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::UInt(v) => Some(*v as i64),
            Self::Real(v) => v.is_finite().then_some(*v as i64),
            Self::Str(s) => Self::parse_number(s).and_then(|v| v.to_i64()),
        }
    }

    /// Converts to `u64`, wrapping negative integers.
    #[must_use]
    pub fn to_u64(&self) -> Option<u64> {
        match self {
            Self::Int(v) => Some(*v as u64),
            Self::UInt(v) => Some(*v),
            Self::Real(v) => v.is_finite().then_some(*v as u64),
            Self::Str(s) => Self::parse_number(s).and_then(|v| v.to_u64()),
        }
    }

    /// Converts to `f64`.
    #[must_use]
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::UInt(v) => Some(*v as f64),
            Self::Real(v) => Some(*v),
            Self::Str(s) => Self::parse_number(s).and_then(|v| v.to_f64()),
        }
    }

    /// Parses a numeric literal, preferring integers.
    ///
    /// Returns `None` for empty, non-numeric or non-finite text.
    #[must_use]
    pub fn parse_number(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if let Ok(v) = text.parse::<i64>() {
            return Some(Self::Int(v));
        }
        if let Ok(v) = text.parse::<u64>() {
            return Some(Self::UInt(v));
        }
        text.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Self::Real)
    }

    /// Parses persisted text: a number if it looks like one, else a string.
    #[must_use]
    pub fn from_persisted(text: &str) -> Self {
        Self::parse_number(text).unwrap_or_else(|| Self::Str(text.to_string()))
    }
}

impl fmt::Display for HmiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::UInt(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for HmiValue {
    #[inline]
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for HmiValue {
    #[inline]
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<&str> for HmiValue {
    #[inline]
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for HmiValue {
    #[inline]
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

// ============================================================================
// TypeTable
// ============================================================================

/// Static type metadata, keyed by variable index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeTable(BTreeMap<VariableIndex, TypeTag>);

impl TypeTable {
    /// Creates an empty table.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the tag of an index, if known.
    #[inline]
    #[must_use]
    pub fn get(&self, index: VariableIndex) -> Option<TypeTag> {
        self.0.get(&index).copied()
    }

    /// Registers the tag of an index.
    #[inline]
    pub fn insert(&mut self, index: VariableIndex, tag: TypeTag) {
        self.0.insert(index, tag);
    }

    /// Returns the number of typed indexes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no index is typed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(VariableIndex, TypeTag)> for TypeTable {
    fn from_iter<I: IntoIterator<Item = (VariableIndex, TypeTag)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tag_serde_names() {
        let tag: TypeTag = serde_json::from_str("\"UDINT\"").expect("parse");
        assert_eq!(tag, TypeTag::Udint);
        assert_eq!(serde_json::to_string(&TypeTag::String).expect("ser"), "\"STRING\"");
        assert_eq!(TypeTag::Real.to_string(), "REAL");
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(HmiValue::parse_number("42"), Some(HmiValue::Int(42)));
        assert_eq!(HmiValue::parse_number(" -3.5 "), Some(HmiValue::Real(-3.5)));
        assert_eq!(
            HmiValue::parse_number("18446744073709551615"),
            Some(HmiValue::UInt(u64::MAX))
        );
        assert_eq!(HmiValue::parse_number("abc"), None);
        assert_eq!(HmiValue::parse_number(""), None);
    }

    #[test]
    fn test_parse_number_rejects_non_finite() {
        assert_eq!(HmiValue::parse_number("NaN"), None);
        assert_eq!(HmiValue::parse_number("inf"), None);
        assert_eq!(HmiValue::parse_number("-infinity"), None);
        assert_eq!(HmiValue::parse_number("1e999"), None);
        assert_eq!(HmiValue::from_persisted("NaN"), HmiValue::from("NaN"));
    }

    #[test]
    fn test_from_persisted() {
        assert_eq!(HmiValue::from_persisted("2"), HmiValue::Int(2));
        assert_eq!(HmiValue::from_persisted("en_US"), HmiValue::from("en_US"));
    }

    #[test]
    fn test_numeric_conversions() {
        assert_eq!(HmiValue::Real(3.9).to_i64(), Some(3));
        assert_eq!(HmiValue::Int(-1).to_u64(), Some(u64::MAX));
        assert_eq!(HmiValue::from("12").to_i64(), Some(12));
        assert_eq!(HmiValue::from("x").to_f64(), None);
        assert_eq!(HmiValue::Real(f64::NAN).to_i64(), None);
    }

    #[test]
    fn test_type_table_lookup() {
        let table: TypeTable = serde_json::from_str(r#"{"0": "BOOL", "7": "STRING"}"#)
            .expect("parse");
        assert_eq!(table.get(VariableIndex::new(7)), Some(TypeTag::String));
        assert_eq!(table.get(VariableIndex::new(3)), None);
        assert_eq!(table.len(), 2);
    }
}
