//! Type-safe identifiers for HMI entities.
//!
//! Newtype wrappers keep variable indexes and subscriber handles from being
//! mixed with plain integers at compile time.
//!
//! | Type | Wraps | Source |
//! |------|-------|--------|
//! | [`VariableIndex`] | `u32` | Static HMI tree metadata |
//! | [`SubscriberId`] | `u64` | Process-wide counter |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// VariableIndex
// ============================================================================

/// Dense key identifying one controller-resident or HMI-local variable.
///
/// Indexes up to the configured `last_remote_index` live on the controller;
/// indexes above it exist only in the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableIndex(u32);

impl VariableIndex {
    /// Creates an index from its raw wire value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw wire value.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Shifts the index by a signed page offset.
    ///
    /// Returns `None` if the result leaves the `u32` range.
    #[inline]
    #[must_use]
    pub fn offset_by(self, offset: i64) -> Option<Self> {
        let shifted = i64::from(self.0).checked_add(offset)?;
        u32::try_from(shifted).ok().map(Self)
    }

    /// Returns the little-endian wire encoding.
    #[inline]
    #[must_use]
    pub const fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl From<u32> for VariableIndex {
    #[inline]
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for VariableIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// SubscriberId
// ============================================================================

/// Counter backing [`SubscriberId::next`]. Zero is never handed out.
static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one subscriber in the subscription registry.
///
/// Registries key subscriber sets by this id, so two handles to the same
/// widget must report the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Allocates a fresh, process-unique id.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_by() {
        let index = VariableIndex::new(10);
        assert_eq!(index.offset_by(5), Some(VariableIndex::new(15)));
        assert_eq!(index.offset_by(-10), Some(VariableIndex::new(0)));
        assert_eq!(index.offset_by(-11), None);
        assert_eq!(VariableIndex::new(u32::MAX).offset_by(1), None);
    }

    #[test]
    fn test_index_le_bytes() {
        assert_eq!(VariableIndex::new(0x0102_0304).to_le_bytes(), [4, 3, 2, 1]);
    }

    #[test]
    fn test_subscriber_ids_are_unique() {
        let a = SubscriberId::next();
        let b = SubscriberId::next();
        assert_ne!(a, b);
        assert!(a.as_u64() > 0);
    }

    #[test]
    fn test_index_deserializes_from_integer() {
        let index: VariableIndex = serde_json::from_str("42").expect("parse");
        assert_eq!(index, VariableIndex::new(42));
    }
}
