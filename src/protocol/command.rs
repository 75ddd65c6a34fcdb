//! Outbound command records.
//!
//! Every outbound message is the hash prefix followed by one or more
//! tightly packed command records:
//!
//! | Command | Layout |
//! |---------|--------|
//! | `SetValue` | `[0x00, index:u32LE, typed value]` |
//! | `Reset` | `[0x01]` |
//! | `Subscribe` | `[0x02, index:u32LE, period:u16LE]` |
//!
//! A `Subscribe` with period 0 unsubscribes.

// ============================================================================
// Imports
// ============================================================================

use crate::error::Result;
use crate::identifiers::VariableIndex;

use super::codec::encode_value;
use super::value::{HmiValue, TypeTag};

// ============================================================================
// Opcodes
// ============================================================================

/// Opcode of a set-value record.
pub const OP_SET_VALUE: u8 = 0x00;

/// Opcode of a reset record.
pub const OP_RESET: u8 = 0x01;

/// Opcode of a subscribe record.
pub const OP_SUBSCRIBE: u8 = 0x02;

// ============================================================================
// Command
// ============================================================================

/// One outbound command record.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Drop every subscription held for this client.
    Reset,

    /// Write a value to a controller variable.
    SetValue {
        /// Target index.
        index: VariableIndex,
        /// Wire type of the target.
        tag: TypeTag,
        /// Value to write.
        value: HmiValue,
    },

    /// Request updates for an index at most every `period_ms`.
    Subscribe {
        /// Target index.
        index: VariableIndex,
        /// Polling period in milliseconds, 0 to unsubscribe.
        period_ms: u16,
    },
}

impl Command {
    /// Creates a subscribe command.
    #[inline]
    #[must_use]
    pub fn subscribe(index: VariableIndex, period_ms: u16) -> Self {
        Self::Subscribe { index, period_ms }
    }

    /// Creates a set-value command.
    #[inline]
    #[must_use]
    pub fn set_value(index: VariableIndex, tag: TypeTag, value: HmiValue) -> Self {
        Self::SetValue { index, tag, value }
    }

    /// Appends this record to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`](crate::Error::TypeMismatch) if a
    /// set-value payload cannot be encoded under its tag.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Self::Reset => out.push(OP_RESET),
            Self::SetValue { index, tag, value } => {
                let start = out.len();
                out.push(OP_SET_VALUE);
                out.extend_from_slice(&index.to_le_bytes());
                if let Err(e) = encode_value(*index, *tag, value, out) {
                    out.truncate(start);
                    return Err(e);
                }
            }
            Self::Subscribe { index, period_ms } => {
                out.push(OP_SUBSCRIBE);
                out.extend_from_slice(&index.to_le_bytes());
                out.extend_from_slice(&period_ms.to_le_bytes());
            }
        }
        Ok(())
    }
}

// ============================================================================
// FrameBuilder
// ============================================================================

/// Accumulates command records behind the hash prefix.
///
/// # Example
///
/// ```ignore
/// let mut frame = FrameBuilder::new(&hash);
/// frame.push(&Command::subscribe(index, 100))?;
/// if let Some(bytes) = frame.finish() {
///     connection.send(bytes).await?;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    buffer: Vec<u8>,
    prefix_len: usize,
}

impl FrameBuilder {
    /// Starts a frame with the given hash prefix.
    #[must_use]
    pub fn new(hash: &[u8]) -> Self {
        let mut buffer = Vec::with_capacity(hash.len() + 16);
        buffer.extend_from_slice(hash);
        Self {
            buffer,
            prefix_len: hash.len(),
        }
    }

    /// Appends one command record.
    ///
    /// A record that fails to encode leaves the frame unchanged.
    ///
    /// # Errors
    ///
    /// Propagates [`Command::encode`] errors.
    pub fn push(&mut self, command: &Command) -> Result<&mut Self> {
        command.encode(&mut self.buffer)?;
        Ok(self)
    }

    /// Returns `true` if no record was pushed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.len() == self.prefix_len
    }

    /// Returns the frame bytes, or `None` if it carries no record.
    #[must_use]
    pub fn finish(self) -> Option<Vec<u8>> {
        (!self.is_empty()).then_some(self.buffer)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_encoding() {
        let mut out = Vec::new();
        Command::Reset.encode(&mut out).expect("encode");
        assert_eq!(out, vec![OP_RESET]);
    }

    #[test]
    fn test_subscribe_encoding() {
        let mut out = Vec::new();
        Command::subscribe(VariableIndex::new(0x0102), 100)
            .encode(&mut out)
            .expect("encode");
        assert_eq!(out, vec![OP_SUBSCRIBE, 0x02, 0x01, 0, 0, 100, 0]);
    }

    #[test]
    fn test_set_value_encoding() {
        let mut out = Vec::new();
        Command::set_value(VariableIndex::new(3), TypeTag::Int, HmiValue::Int(-2))
            .encode(&mut out)
            .expect("encode");
        assert_eq!(out, vec![OP_SET_VALUE, 3, 0, 0, 0, 0xFE, 0xFF]);
    }

    #[test]
    fn test_set_string_encoding() {
        let mut out = Vec::new();
        Command::set_value(VariableIndex::new(1), TypeTag::String, HmiValue::from("Hi"))
            .encode(&mut out)
            .expect("encode");
        assert_eq!(out, vec![OP_SET_VALUE, 1, 0, 0, 0, 2, b'H', b'i']);
    }

    #[test]
    fn test_failed_record_leaves_buffer_untouched() {
        let mut out = vec![0xAB];
        let result = Command::set_value(VariableIndex::new(1), TypeTag::Real, HmiValue::from("?"))
            .encode(&mut out);
        assert!(result.is_err());
        assert_eq!(out, vec![0xAB]);
    }

    #[test]
    fn test_frame_builder_prefix() {
        let mut frame = FrameBuilder::new(&[1, 2, 3]);
        assert!(frame.is_empty());
        frame
            .push(&Command::Reset)
            .expect("push")
            .push(&Command::subscribe(VariableIndex::new(0), 0))
            .expect("push");
        let bytes = frame.finish().expect("non-empty");
        assert_eq!(&bytes[..3], &[1, 2, 3]);
        assert_eq!(bytes[3], OP_RESET);
        assert_eq!(bytes[4], OP_SUBSCRIBE);
    }

    #[test]
    fn test_empty_frame_is_not_sent() {
        assert!(FrameBuilder::new(&[1, 2, 3]).finish().is_none());
    }
}
