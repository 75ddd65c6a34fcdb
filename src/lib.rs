//! HMI Link - Real-time variable synchronization for web HMI clients.
//!
//! This library keeps a client-side view of a controller's variables in
//! sync over a single binary WebSocket, and drives page navigation,
//! widget updates and operator writes on top of it.
//!
//! # Architecture
//!
//! The client follows a subscribe/update model:
//!
//! - **Client (Rust)**: Subscribes to variable indexes at a refresh period,
//!   renders pushed values, sends writes
//! - **Controller**: Pushes changed values for subscribed indexes, applies
//!   writes
//!
//! Key design principles:
//!
//! - One [`Session`] owns all synchronization state and survives reconnects
//! - Every frame starts with the build hash; a mismatch forces a reload
//! - Subscription changes are batched and sent as period deltas
//! - Rendering is coalesced: at most one update per widget per tick
//!
//! # Quick Start
//!
//! ```no_run
//! use hmi_link::{Client, HmiConfig, Result, Url};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut client = Client::builder()
//!         .origin(Url::parse("http://plc.local:8009/index.html")?)
//!         .config(HmiConfig::from_file("hmi.json")?)
//!         .build()?;
//!
//!     let end = client.run().await?;
//!     println!("Session ended: {end:?}");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Event loop, builder and options |
//! | [`config`] | Static HMI tables |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Binary wire format |
//! | [`session`] | Subscriptions, dispatch, navigation, writes |
//! | [`transport`] | WebSocket transport layer |

// ============================================================================
// Modules
// ============================================================================

/// Client runtime.
///
/// Use [`Client::builder()`] to create a configured client instance.
pub mod client;

/// Static HMI configuration tables.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for variables and subscribers.
pub mod identifiers;

/// Binary wire protocol.
///
/// Type tags, value codecs, inbound frame decoding and outbound command
/// frames.
pub mod protocol;

/// Session state.
///
/// Subscription registry, value cache, page navigation and command channel.
pub mod session;

/// WebSocket transport layer.
///
/// Internal module handling the connection and its reconnect policy.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{Client, ClientBuilder, ClientHandle, ClientOptions, SessionEnd};

// Configuration types
pub use config::{HmiConfig, LocalIndexes, PageConfig};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{SubscriberId, VariableIndex};

// Protocol types
pub use protocol::{HmiValue, TypeTag};

// Session types
pub use session::{
    BoundWidget, EditCallback, EditSurface, Effect, Effects, FileStore, IndexBinding,
    MemoryStore, NullSurface, PageTarget, PageWidget, PersistentStore, RenderSurface, Session,
    SubIndex, Subscriber,
};

// Transport types
pub use transport::LinkState;

pub use url::Url;
