//! WebSocket transport layer.
//!
//! This module handles communication between the HMI client (Rust) and the
//! controller's web runtime via WebSocket.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Client (Rust)  │                              │  Controller     │
//! │                 │     WebSocket, binary        │  web runtime    │
//! │  Connection     │◄────────────────────────────►│                 │
//! │  + lifecycle    │    <origin>/ws?mode=...      │  /ws endpoint   │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `ws_url` - Derive the endpoint from the page origin
//! 2. `Connection::connect` - Open the socket
//! 3. `ConnectionState::on_open` - Reset backoff, replay subscriptions
//! 4. `Connection::recv` - Frames until `Incoming::Closed`
//! 5. `ConnectionState::on_close` - Terminal notice or reconnect after backoff
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | WebSocket connection and event loop |
//! | `lifecycle` | Link state and reconnection backoff |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and event loop.
pub mod connection;

/// Link state and reconnection policy.
pub mod lifecycle;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, Incoming, origin_requests_watchdog, ws_url};
pub use lifecycle::{CloseDecision, ConnectionState, LinkState};
