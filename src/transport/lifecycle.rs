//! Connection lifecycle and reconnection policy.
//!
//! ```text
//!              connect                 open
//! Disconnected ───────► Connecting ──────────► Connected
//!      ▲                    │                      │
//!      └──── failure ───────┘◄────── close ────────┘
//! ```
//!
//! # Close Policy
//!
//! | Close | Forced flag | Decision |
//! |-------|-------------|----------|
//! | Normal closure (1000) | clear | Terminal: peer is gone, notify the user |
//! | Normal closure (1000) | set | Reconnect after backoff |
//! | Anything else | any | Reconnect after backoff |
//!
//! The backoff starts at 1 ms, is reset on every successful open, and grows
//! by a fixed increment after each reconnect scheduled. It has no ceiling.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tracing::{debug, info};

// ============================================================================
// Constants
// ============================================================================

/// WebSocket close code for a normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Reconnect delay right after a successful open.
pub const INITIAL_RECONNECT_DELAY: Duration = Duration::from_millis(1);

/// Default growth of the reconnect delay.
pub const DEFAULT_RECONNECT_INCREMENT: Duration = Duration::from_millis(500);

// ============================================================================
// Types
// ============================================================================

/// Transport link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    /// No transport.
    #[default]
    Disconnected,
    /// Transport being established.
    Connecting,
    /// Transport open.
    Connected,
}

/// What to do after the transport closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    /// Do not reconnect; the peer ended the session.
    Terminal,
    /// Reconnect after the given delay.
    Reconnect(Duration),
}

// ============================================================================
// ConnectionState
// ============================================================================

/// Link state plus reconnection backoff.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    link: LinkState,
    reconnect_delay: Duration,
    increment: Duration,
    force_reconnect: bool,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_INCREMENT)
    }
}

impl ConnectionState {
    /// Creates a disconnected state growing the backoff by `increment`.
    #[must_use]
    pub fn new(increment: Duration) -> Self {
        Self {
            link: LinkState::Disconnected,
            reconnect_delay: INITIAL_RECONNECT_DELAY,
            increment,
            force_reconnect: false,
        }
    }

    /// Returns the link state.
    #[inline]
    #[must_use]
    pub fn link(&self) -> LinkState {
        self.link
    }

    /// Returns `true` if the transport is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.link == LinkState::Connected
    }

    /// Returns the delay the next reconnect would use.
    #[inline]
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    /// Returns `true` if the next close was requested locally.
    #[inline]
    #[must_use]
    pub fn is_reconnect_forced(&self) -> bool {
        self.force_reconnect
    }

    /// Marks a connection attempt.
    pub fn on_connecting(&mut self) {
        self.link = LinkState::Connecting;
    }

    /// Marks the transport open and resets the backoff.
    pub fn on_open(&mut self) {
        self.link = LinkState::Connected;
        self.reconnect_delay = INITIAL_RECONNECT_DELAY;
        info!("Connection established");
    }

    /// Flags the next close as self-requested.
    pub fn force_reconnect(&mut self) {
        self.force_reconnect = true;
    }

    /// Decides how to react to a close or a failed attempt.
    ///
    /// `code` is the close code received, `None` for abnormal terminations.
    pub fn on_close(&mut self, code: Option<u16>) -> CloseDecision {
        self.link = LinkState::Disconnected;
        let forced = std::mem::replace(&mut self.force_reconnect, false);

        if code == Some(CLOSE_NORMAL) && !forced {
            info!("Connection closed by server");
            return CloseDecision::Terminal;
        }

        let delay = self.reconnect_delay;
        self.reconnect_delay = self.reconnect_delay.saturating_add(self.increment);
        debug!(
            code = ?code,
            forced,
            delay_ms = delay.as_millis() as u64,
            "Reconnect scheduled"
        );
        CloseDecision::Reconnect(delay)
    }
}

// ============================================================================
// Tests
// ============================================================================
