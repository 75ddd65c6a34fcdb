//! HMI client runtime.
//!
//! This module provides the entry point binding a session to a live
//! transport.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Client`] | Event loop owning the session |
//! | [`ClientBuilder`] | Fluent configuration builder |
//! | [`ClientOptions`] | Runtime options |
//! | [`ClientHandle`] | Cloneable command sender |
//!
//! # Example
//!
//! ```ignore
//! use hmi_link::{Client, HmiConfig, PageTarget, Url};
//!
//! let mut client = Client::builder()
//!     .origin(Url::parse("http://plc.local:8009/index.html")?)
//!     .config(HmiConfig::from_file("hmi.json")?)
//!     .build()?;
//!
//! let handle = client.handle();
//! tokio::spawn(async move { client.run().await });
//!
//! handle.switch_page(PageTarget::parse("Motor@/PUMP"))?;
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for client configuration.
pub mod builder;

/// Event loop and command handle.
pub mod core;

/// Runtime options.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use core::{CLOSED_BY_PEER_NOTICE, Client, ClientCommand, ClientHandle, SessionEnd};
pub use options::ClientOptions;
