//! Client runtime options.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use hmi_link::ClientOptions;
//!
//! let options = ClientOptions::new()
//!     .with_watchdog()
//!     .with_frame_interval(Duration::from_millis(33))
//!     .with_periodic_reconnect(Duration::from_secs(3600));
//!
//! assert!(options.validate().is_ok());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::transport::connection::DEFAULT_CONNECT_TIMEOUT;
use crate::transport::lifecycle::DEFAULT_RECONNECT_INCREMENT;

// ============================================================================
// Constants
// ============================================================================

/// Default render tick interval, about one display frame.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

// ============================================================================
// ClientOptions
// ============================================================================

/// Runtime behavior of a [`Client`](super::Client).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Open the transport as the single watchdog session.
    pub watchdog: bool,

    /// Interval between render ticks while a tick is requested.
    pub frame_interval: Duration,

    /// Growth of the reconnect delay after each failed attempt.
    pub reconnect_increment: Duration,

    /// Close and reopen the transport at this interval.
    pub periodic_reconnect: Option<Duration>,

    /// Timeout of the opening handshake.
    pub connect_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ClientOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            watchdog: false,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            reconnect_increment: DEFAULT_RECONNECT_INCREMENT,
            periodic_reconnect: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ClientOptions {
    /// Enables watchdog mode.
    #[inline]
    #[must_use]
    pub fn with_watchdog(mut self) -> Self {
        self.watchdog = true;
        self
    }

    /// Sets the render tick interval.
    #[inline]
    #[must_use]
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Sets the reconnect delay increment.
    #[inline]
    #[must_use]
    pub fn with_reconnect_increment(mut self, increment: Duration) -> Self {
        self.reconnect_increment = increment;
        self
    }

    /// Enables the periodic forced reconnect.
    #[inline]
    #[must_use]
    pub fn with_periodic_reconnect(mut self, interval: Duration) -> Self {
        self.periodic_reconnect = Some(interval);
        self
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientOptions {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns an error message if an interval is zero.
    pub fn validate(&self) -> Result<(), String> {
        if self.frame_interval.is_zero() {
            return Err("Frame interval must be greater than zero".to_string());
        }
        if self.connect_timeout.is_zero() {
            return Err("Connect timeout must be greater than zero".to_string());
        }
        if let Some(interval) = self.periodic_reconnect
            && interval.is_zero()
        {
            return Err("Periodic reconnect interval must be greater than zero".to_string());
        }
        Ok(())
    }

    /// Returns `true` if watchdog mode is enabled.
    #[inline]
    #[must_use]
    pub const fn is_watchdog(&self) -> bool {
        self.watchdog
    }
}

// ============================================================================
// Tests
// ============================================================================
