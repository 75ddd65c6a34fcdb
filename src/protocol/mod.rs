//! Binary wire protocol between HMI client and controller.
//!
//! Every message, in either direction, begins with a fixed hash byte
//! sequence: a build fingerprint agreed out of band. A peer whose hash
//! differs is running against a different variable layout.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Payload after hash |
//! |---------|-----------|--------------------|
//! | Update | Controller → Client | `(index:u32LE, typed value)*` |
//! | Command | Client → Controller | `(opcode, ...)*` records |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `value` | Type tags and dynamically typed values |
//! | `codec` | Per-tag codec table and frame decoding |
//! | `command` | Outbound command records and frame building |

// ============================================================================
// Submodules
// ============================================================================

/// Per-tag codecs and inbound frame decoding.
pub mod codec;

/// Outbound command records.
pub mod command;

/// Type tags and values.
pub mod value;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{STRING_MAX_LEN, ValueCodec, decode_frame, encode_value};
pub use command::{Command, FrameBuilder};
pub use value::{HmiValue, TypeTable, TypeTag};
