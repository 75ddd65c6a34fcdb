//! Error types for the HMI synchronization layer.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use hmi_link::{Error, Result};
//!
//! fn on_message(session: &mut Session, bytes: &[u8]) -> Result<()> {
//!     if let Err(e) = session.on_frame(bytes) {
//!         if e.requires_reload() {
//!             return Err(e);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants | Policy |
//! |----------|----------|--------|
//! | Protocol | [`Error::ProtocolMismatch`], [`Error::UnknownIndex`], [`Error::TruncatedFrame`] | Discard state, full reload |
//! | Encoding | [`Error::TypeMismatch`] | Value dropped |
//! | Local | [`Error::MalformedCommand`], [`Error::NavigationRejected`], [`Error::NoEditor`] | Recovered, caller informed |
//! | Connection | [`Error::TransportClosed`], [`Error::Connection`], [`Error::WebSocket`] | Reconnect with backoff |
//! | Configuration | [`Error::Config`] | Startup failure |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::Url`] | Propagated |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::VariableIndex;
use crate::protocol::TypeTag;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Inbound message does not start with the agreed hash.
    ///
    /// Signals client/server version skew. The session must be discarded
    /// and reloaded from the origin, never resynchronized.
    #[error("Protocol mismatch at byte {offset}: expected {expected:#04x}, found {found:?}")]
    ProtocolMismatch {
        /// Byte offset of the first differing hash byte.
        offset: usize,
        /// Expected hash byte.
        expected: u8,
        /// Byte actually received (`None` if the message was shorter).
        found: Option<u8>,
    },

    /// Index absent from type metadata.
    ///
    /// The stream is corrupt or the metadata is stale.
    #[error("Unknown index {index} in inbound frame")]
    UnknownIndex {
        /// The unrecognized index.
        index: VariableIndex,
    },

    /// A value runs past the end of the inbound message.
    #[error("Truncated frame at byte {offset} (index {index:?})")]
    TruncatedFrame {
        /// Index whose value was cut short, `None` if the index itself was.
        index: Option<VariableIndex>,
        /// Offset where the value started.
        offset: usize,
    },

    // ========================================================================
    // Encoding Errors
    // ========================================================================
    /// Value cannot be encoded under the index's type tag.
    #[error("Value for index {index} cannot be encoded as {tag}")]
    TypeMismatch {
        /// Target index.
        index: VariableIndex,
        /// Type tag of the index.
        tag: TypeTag,
    },

    // ========================================================================
    // Local Errors
    // ========================================================================
    /// Assignment expression could not be parsed.
    #[error("Malformed command: {expression:?}")]
    MalformedCommand {
        /// The offending expression.
        expression: String,
    },

    /// Navigation request refused.
    ///
    /// Returned when a switch is already in flight or the page is unknown.
    #[error("Navigation to {page:?} rejected: {reason}")]
    NavigationRejected {
        /// Requested page name.
        page: String,
        /// Why the request was refused.
        reason: &'static str,
    },

    /// No keypad bound to an edit type.
    #[error("No editor bound for value type {value_type:?}")]
    NoEditor {
        /// The edit type requested.
        value_type: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport closed.
    ///
    /// `clean` distinguishes a normal peer-initiated closure from an
    /// abnormal or self-initiated one.
    #[error("Transport closed (code {code:?}, clean: {clean})")]
    TransportClosed {
        /// WebSocket close code, if one was received.
        code: Option<u16>,
        /// Whether this was a normal closure initiated by the peer.
        clean: bool,
    },

    /// Transport could not be established.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when static tables or client options are inconsistent.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a protocol mismatch error.
    #[inline]
    pub fn protocol_mismatch(offset: usize, expected: u8, found: Option<u8>) -> Self {
        Self::ProtocolMismatch {
            offset,
            expected,
            found,
        }
    }

    /// Creates an unknown index error.
    #[inline]
    pub fn unknown_index(index: VariableIndex) -> Self {
        Self::UnknownIndex { index }
    }

    /// Creates a truncated frame error.
    #[inline]
    pub fn truncated_frame(index: Option<VariableIndex>, offset: usize) -> Self {
        Self::TruncatedFrame { index, offset }
    }

    /// Creates a type mismatch error.
    #[inline]
    pub fn type_mismatch(index: VariableIndex, tag: TypeTag) -> Self {
        Self::TypeMismatch { index, tag }
    }

    /// Creates a malformed command error.
    #[inline]
    pub fn malformed_command(expression: impl Into<String>) -> Self {
        Self::MalformedCommand {
            expression: expression.into(),
        }
    }

    /// Creates a navigation rejected error for a switch already in flight.
    #[inline]
    pub fn switch_in_flight(page: impl Into<String>) -> Self {
        Self::NavigationRejected {
            page: page.into(),
            reason: "page switch already in progress",
        }
    }

    /// Creates a navigation rejected error for an unknown page.
    #[inline]
    pub fn unknown_page(page: impl Into<String>) -> Self {
        Self::NavigationRejected {
            page: page.into(),
            reason: "unknown page",
        }
    }

    /// Creates a no editor error.
    #[inline]
    pub fn no_editor(value_type: impl Into<String>) -> Self {
        Self::NoEditor {
            value_type: value_type.into(),
        }
    }

    /// Creates a transport closed error.
    #[inline]
    pub fn transport_closed(code: Option<u16>, clean: bool) -> Self {
        Self::TransportClosed { code, clean }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if the binary layout contract is broken.
    ///
    /// Local state must be discarded and the client reloaded.
    #[inline]
    #[must_use]
    pub fn requires_reload(&self) -> bool {
        matches!(
            self,
            Self::ProtocolMismatch { .. } | Self::UnknownIndex { .. } | Self::TruncatedFrame { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::TransportClosed { .. } | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is recoverable without a reload.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::TransportClosed { clean, .. } => !clean,
            Self::MalformedCommand { .. }
            | Self::NavigationRejected { .. }
            | Self::NoEditor { .. }
            | Self::TypeMismatch { .. }
            | Self::Connection { .. }
            | Self::WebSocket(_) => true,
            _ => false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");

        let err = Error::unknown_page("Alarms");
        assert_eq!(
            err.to_string(),
            "Navigation to \"Alarms\" rejected: unknown page"
        );
    }

    #[test]
    fn test_requires_reload() {
        assert!(Error::protocol_mismatch(2, 3, Some(4)).requires_reload());
        assert!(Error::unknown_index(VariableIndex::new(9)).requires_reload());
        assert!(Error::truncated_frame(Some(VariableIndex::new(1)), 8).requires_reload());
        assert!(!Error::switch_in_flight("Main").requires_reload());
        assert!(!Error::transport_closed(Some(1000), true).requires_reload());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::malformed_command("+").is_recoverable());
        assert!(Error::switch_in_flight("Main").is_recoverable());
        assert!(Error::transport_closed(None, false).is_recoverable());
        assert!(!Error::transport_closed(Some(1000), true).is_recoverable());
        assert!(!Error::protocol_mismatch(0, 1, None).is_recoverable());
        assert!(!Error::config("bad").is_recoverable());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("x").is_connection_error());
        assert!(Error::transport_closed(None, false).is_connection_error());
        assert!(!Error::config("x").is_connection_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
