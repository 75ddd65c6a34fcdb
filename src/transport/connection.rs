//! WebSocket connection to the controller.
//!
//! The connection spawns a tokio task owning the socket. The task:
//!
//! - Forwards inbound binary messages as [`Incoming::Frame`]
//! - Writes outbound frames queued through [`Connection::send`]
//! - Reports the end of the socket once, as [`Incoming::Closed`]
//!
//! Text messages are not part of the protocol and are dropped.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, connect_async};
use tracing::{debug, error, trace, warn};
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Path of the HMI WebSocket endpoint.
pub const WS_PATH: &str = "/ws";

/// Default timeout for the opening handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// URL Derivation
// ============================================================================

/// Derives the WebSocket URL from the page origin.
///
/// `http` becomes `ws`, `https` becomes `wss`, the path is replaced by
/// `/ws` and the session mode is passed as `?mode=watchdog|multiclient`.
///
/// # Errors
///
/// Returns [`Error::Config`] for origins that are neither HTTP nor WebSocket.
pub fn ws_url(origin: &Url, watchdog: bool) -> Result<Url> {
    let scheme = match origin.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(Error::config(format!("Unsupported origin scheme: {other}"))),
    };

    let mut url = origin.clone();
    url.set_scheme(scheme)
        .map_err(|()| Error::config(format!("Cannot use scheme {scheme} for {origin}")))?;
    url.set_path(WS_PATH);
    url.set_query(Some(if watchdog {
        "mode=watchdog"
    } else {
        "mode=multiclient"
    }));
    url.set_fragment(None);
    Ok(url)
}

/// Returns `true` if the origin requests a watchdog session (`#watchdog`).
#[must_use]
pub fn origin_requests_watchdog(origin: &Url) -> bool {
    origin.fragment() == Some("watchdog")
}

// ============================================================================
// Incoming
// ============================================================================

/// Event read from the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// One binary message.
    Frame(Vec<u8>),
    /// The socket ended. Always the last event.
    Closed {
        /// Close code sent by the peer, `None` for abnormal terminations.
        code: Option<u16>,
    },
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Write one binary message.
    Send(Vec<u8>),
    /// Start the closing handshake.
    Close,
}

// ============================================================================
// Connection
// ============================================================================

/// Open WebSocket connection.
///
/// Dropping the connection closes the socket.
pub struct Connection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Events from the event loop.
    incoming_rx: mpsc::UnboundedReceiver<Incoming>,
    /// Set once `Closed` was delivered.
    closed: bool,
}

impl Connection {
    /// Opens a connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the handshake times out and
    /// [`Error::WebSocket`] if it fails.
    pub async fn connect(url: &Url, connect_timeout: Duration) -> Result<Self> {
        debug!(url = %url, "Connecting");

        let (ws_stream, _response) = timeout(connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                Error::connection(format!(
                    "Handshake with {url} timed out after {}ms",
                    connect_timeout.as_millis()
                ))
            })??;

        Ok(Self::new(ws_stream))
    }

    /// Creates a connection from an established WebSocket stream.
    ///
    /// Spawns the event loop task internally.
    pub(crate) fn new<S>(ws_stream: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::run_event_loop(ws_stream, command_rx, incoming_tx));

        Self {
            command_tx,
            incoming_rx,
            closed: false,
        }
    }

    /// Waits for the next event.
    ///
    /// After [`Incoming::Closed`] was returned once, this never resolves,
    /// so it can sit in a `select!` next to other branches.
    pub async fn recv(&mut self) -> Incoming {
        if self.closed {
            return std::future::pending().await;
        }

        let event = self
            .incoming_rx
            .recv()
            .await
            .unwrap_or(Incoming::Closed { code: None });
        if matches!(event, Incoming::Closed { .. }) {
            self.closed = true;
        }
        event
    }

    /// Queues a binary frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportClosed`] if the socket already ended.
    pub fn send(&self, frame: Vec<u8>) -> Result<()> {
        trace!(len = frame.len(), "Frame queued");
        self.command_tx
            .send(ConnectionCommand::Send(frame))
            .map_err(|_| Error::transport_closed(None, false))
    }

    /// Starts closing the socket. [`Incoming::Closed`] follows.
    pub fn close(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Close);
    }

    /// Returns `true` once the close was delivered.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop<S>(
        ws_stream: WebSocketStream<S>,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        incoming_tx: mpsc::UnboundedSender<Incoming>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        let code = loop {
            tokio::select! {
                // Incoming messages from the controller
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Binary(data))) => {
                            trace!(len = data.len(), "Frame received");
                            if incoming_tx.send(Incoming::Frame(data.to_vec())).is_err() {
                                debug!("Connection handle dropped");
                                let _ = ws_write.close().await;
                                break None;
                            }
                        }

                        Some(Ok(Message::Text(text))) => {
                            warn!(len = text.len(), "Ignoring text message");
                        }

                        Some(Ok(Message::Close(frame))) => {
                            let code = frame.map(|f| u16::from(f.code));
                            debug!(code = ?code, "WebSocket closed by remote");
                            break code;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break None;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break None;
                        }

                        // Ignore Ping, Pong, Frame
                        _ => {}
                    }
                }

                // Commands from the client
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send(frame)) => {
                            if let Err(e) = ws_write.send(Message::Binary(frame.into())).await {
                                warn!(error = %e, "Failed to send frame");
                                break None;
                            }
                        }

                        Some(ConnectionCommand::Close) | None => {
                            debug!("Closing connection");
                            let _ = ws_write.close().await;
                            break None;
                        }
                    }
                }
            }
        };

        let _ = incoming_tx.send(Incoming::Closed { code });
        debug!("Event loop terminated");
    }
}

// ============================================================================
// Tests
// ============================================================================
