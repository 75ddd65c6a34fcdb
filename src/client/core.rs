//! Client event loop.
//!
//! A [`Client`] owns the [`Session`] and drives it from one tokio task:
//!
//! ```text
//!                    ┌──────────────── tokio::select! ────────────────┐
//!  Connection ──────►│ inbound frames, close                          │
//!  frame interval ──►│ render tick (only while requested)             │
//!  ClientHandle ────►│ user commands                                  │──► Session ──► Connection
//!  deadlines ───────►│ reconnect, screensaver, periodic reconnect     │
//!                    └────────────────────────────────────────────────┘
//! ```
//!
//! The outbound frame assembled by the session is sent after every event,
//! so each event produces at most one message. A connection attempt is
//! one more branch of the same select, so ticks and commands keep being
//! served while a handshake is pending.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep_until};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::VariableIndex;
use crate::protocol::HmiValue;
use crate::session::{EditCallback, EditSurface, PageTarget, RenderSurface, Session};
use crate::transport::{CloseDecision, Connection, Incoming};

use super::builder::ClientBuilder;
use super::options::ClientOptions;

// ============================================================================
// Constants
// ============================================================================

/// Notice shown when the controller ends the session.
pub const CLOSED_BY_PEER_NOTICE: &str = "Connection closed by server";

/// Connection attempt in flight.
type PendingConnect = Pin<Box<dyn Future<Output = Result<Connection>> + Send>>;

// ============================================================================
// Types
// ============================================================================

/// How [`Client::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// [`ClientHandle::shutdown`] was called.
    Shutdown,
    /// The controller closed the connection normally.
    ClosedByPeer,
}

/// Commands sent from a [`ClientHandle`] to the event loop.
pub enum ClientCommand {
    /// Switch page, `None` re-enters the current one.
    SwitchPage(Option<PageTarget>),
    /// Switch page under a fade.
    FadingSwitch(PageTarget),
    /// Go back in the jump history.
    Back,
    /// Write a value.
    SetValue {
        /// Target index.
        index: VariableIndex,
        /// New value.
        value: HmiValue,
    },
    /// Apply an assignment expression such as `"+1"`.
    ApplyExpression {
        /// Target index.
        index: VariableIndex,
        /// Expression text.
        expression: String,
    },
    /// Open an editor.
    EditValue {
        /// Tree path being edited.
        path: String,
        /// Edit type used to pick the keypad.
        value_type: String,
        /// Value shown initially.
        initial: Option<HmiValue>,
        /// Receives the confirmed value.
        callback: EditCallback,
    },
    /// Confirm the open editor.
    ConfirmEdit(HmiValue),
    /// Cancel the open editor.
    CancelEdit,
    /// Pointer or key input, re-arms the screensaver.
    Input,
    /// Close and reopen the transport.
    Reconnect,
    /// Stop the event loop.
    Shutdown,
}

impl ClientCommand {
    /// Returns `true` for commands originating from user interaction.
    #[must_use]
    pub fn is_user_input(&self) -> bool {
        !matches!(self, Self::Reconnect | Self::Shutdown)
    }
}

impl fmt::Debug for ClientCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SwitchPage(target) => f.debug_tuple("SwitchPage").field(target).finish(),
            Self::FadingSwitch(target) => f.debug_tuple("FadingSwitch").field(target).finish(),
            Self::Back => f.write_str("Back"),
            Self::SetValue { index, value } => f
                .debug_struct("SetValue")
                .field("index", index)
                .field("value", value)
                .finish(),
            Self::ApplyExpression { index, expression } => f
                .debug_struct("ApplyExpression")
                .field("index", index)
                .field("expression", expression)
                .finish(),
            Self::EditValue { path, value_type, .. } => f
                .debug_struct("EditValue")
                .field("path", path)
                .field("value_type", value_type)
                .finish_non_exhaustive(),
            Self::ConfirmEdit(value) => f.debug_tuple("ConfirmEdit").field(value).finish(),
            Self::CancelEdit => f.write_str("CancelEdit"),
            Self::Input => f.write_str("Input"),
            Self::Reconnect => f.write_str("Reconnect"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

// ============================================================================
// ClientHandle
// ============================================================================

/// Cloneable handle sending commands to a running [`Client`].
#[derive(Debug, Clone)]
pub struct ClientHandle {
    command_tx: mpsc::UnboundedSender<ClientCommand>,
}

impl ClientHandle {
    /// Sends a raw command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the client was dropped.
    pub fn send(&self, command: ClientCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| Error::connection("Client event loop has stopped"))
    }

    /// Switches to a page.
    ///
    /// # Errors
    ///
    /// As [`send`](Self::send).
    pub fn switch_page(&self, target: PageTarget) -> Result<()> {
        self.send(ClientCommand::SwitchPage(Some(target)))
    }

    /// Switches to a page under a fade.
    ///
    /// # Errors
    ///
    /// As [`send`](Self::send).
    pub fn fading_switch(&self, target: PageTarget) -> Result<()> {
        self.send(ClientCommand::FadingSwitch(target))
    }

    /// Goes back to the previous page.
    ///
    /// # Errors
    ///
    /// As [`send`](Self::send).
    pub fn jump_back(&self) -> Result<()> {
        self.send(ClientCommand::Back)
    }

    /// Writes a value.
    ///
    /// # Errors
    ///
    /// As [`send`](Self::send).
    pub fn set_value(&self, index: VariableIndex, value: impl Into<HmiValue>) -> Result<()> {
        self.send(ClientCommand::SetValue {
            index,
            value: value.into(),
        })
    }

    /// Applies an assignment expression.
    ///
    /// # Errors
    ///
    /// As [`send`](Self::send).
    pub fn apply_expression(&self, index: VariableIndex, expression: impl Into<String>) -> Result<()> {
        self.send(ClientCommand::ApplyExpression {
            index,
            expression: expression.into(),
        })
    }

    /// Opens an editor.
    ///
    /// # Errors
    ///
    /// As [`send`](Self::send).
    pub fn edit_value(
        &self,
        path: impl Into<String>,
        value_type: impl Into<String>,
        initial: Option<HmiValue>,
        callback: EditCallback,
    ) -> Result<()> {
        self.send(ClientCommand::EditValue {
            path: path.into(),
            value_type: value_type.into(),
            initial,
            callback,
        })
    }

    /// Confirms the open editor.
    ///
    /// # Errors
    ///
    /// As [`send`](Self::send).
    pub fn confirm_edit(&self, value: impl Into<HmiValue>) -> Result<()> {
        self.send(ClientCommand::ConfirmEdit(value.into()))
    }

    /// Cancels the open editor.
    ///
    /// # Errors
    ///
    /// As [`send`](Self::send).
    pub fn cancel_edit(&self) -> Result<()> {
        self.send(ClientCommand::CancelEdit)
    }

    /// Reports user input.
    ///
    /// # Errors
    ///
    /// As [`send`](Self::send).
    pub fn input(&self) -> Result<()> {
        self.send(ClientCommand::Input)
    }

    /// Forces a reconnect.
    ///
    /// # Errors
    ///
    /// As [`send`](Self::send).
    pub fn reconnect(&self) -> Result<()> {
        self.send(ClientCommand::Reconnect)
    }

    /// Stops the client.
    ///
    /// # Errors
    ///
    /// As [`send`](Self::send).
    pub fn shutdown(&self) -> Result<()> {
        self.send(ClientCommand::Shutdown)
    }
}

// ============================================================================
// Client
// ============================================================================

/// HMI client: a session bound to a transport and render surfaces.
pub struct Client {
    url: Url,
    session: Session,
    surface: Box<dyn RenderSurface>,
    editor: Box<dyn EditSurface>,
    options: ClientOptions,
    command_tx: mpsc::UnboundedSender<ClientCommand>,
    command_rx: mpsc::UnboundedReceiver<ClientCommand>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.url.as_str())
            .field("link", &self.session.link_state())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Deadlines armed by the event loop.
#[derive(Debug, Default)]
struct Deadlines {
    reconnect: Option<Instant>,
    screensaver: Option<Instant>,
    periodic_reconnect: Option<Instant>,
}

/// Outcome of handling one command.
enum Flow {
    Continue,
    Stop,
}

// ============================================================================
// Client - Public API
// ============================================================================

impl Client {
    /// Creates a client builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Returns the transport URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the session.
    #[inline]
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Returns the options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Returns a handle for sending commands.
    #[must_use]
    pub fn handle(&self) -> ClientHandle {
        ClientHandle {
            command_tx: self.command_tx.clone(),
        }
    }

    /// Runs the event loop until shutdown or a terminal close.
    ///
    /// Connection failures and abnormal closes are retried with backoff.
    ///
    /// # Errors
    ///
    /// Returns the protocol error if an inbound frame breaks the layout
    /// contract ([`Error::requires_reload`]). The session is unusable
    /// afterwards.
    pub async fn run(&mut self) -> Result<SessionEnd> {
        let mut ticker = interval(self.options.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut connection: Option<Connection> = None;
        let mut connecting: Option<PendingConnect> = None;
        let mut deadlines = Deadlines {
            reconnect: Some(Instant::now()),
            screensaver: self.session.screensaver_delay().map(|d| Instant::now() + d),
            periodic_reconnect: None,
        };

        info!(url = %self.url, "Client started");

        loop {
            let tick_requested = self.session.is_tick_requested();

            tokio::select! {
                incoming = recv_from(&mut connection) => {
                    match incoming {
                        Incoming::Frame(bytes) => {
                            if let Err(e) = self.handle_frame(&bytes) {
                                if let Some(conn) = connection.take() {
                                    conn.close();
                                }
                                return Err(e);
                            }
                        }
                        Incoming::Closed { code } => {
                            connection = None;
                            deadlines.periodic_reconnect = None;
                            match self.session.on_close(code) {
                                CloseDecision::Terminal => {
                                    self.surface.notify(CLOSED_BY_PEER_NOTICE);
                                    return Ok(SessionEnd::ClosedByPeer);
                                }
                                CloseDecision::Reconnect(delay) => {
                                    deadlines.reconnect = Some(Instant::now() + delay);
                                }
                            }
                        }
                    }
                }

                _ = ticker.tick(), if tick_requested => {
                    self.session.tick(self.surface.as_mut());
                }

                command = self.command_rx.recv() => {
                    let Some(command) = command else {
                        return Ok(SessionEnd::Shutdown);
                    };
                    if command.is_user_input()
                        && let Some(delay) = self.session.screensaver_delay()
                    {
                        deadlines.screensaver = Some(Instant::now() + delay);
                    }
                    if let Flow::Stop = self.handle_command(command, connection.as_ref()) {
                        if let Some(conn) = connection.take() {
                            conn.close();
                        }
                        info!("Client shut down");
                        return Ok(SessionEnd::Shutdown);
                    }
                }

                _ = sleep_opt(deadlines.reconnect) => {
                    deadlines.reconnect = None;
                    self.session.on_connecting();
                    let url = self.url.clone();
                    let connect_timeout = self.options.connect_timeout;
                    connecting = Some(Box::pin(async move {
                        Connection::connect(&url, connect_timeout).await
                    }));
                }

                result = connect_from(&mut connecting), if connecting.is_some() => {
                    connecting = None;
                    match result {
                        Ok(conn) => {
                            self.session.on_open();
                            deadlines.periodic_reconnect =
                                self.options.periodic_reconnect.map(|d| Instant::now() + d);
                            connection = Some(conn);
                        }
                        Err(e) => {
                            warn!(error = %e, "Connection attempt failed");
                            if let CloseDecision::Reconnect(delay) = self.session.on_close(None) {
                                deadlines.reconnect = Some(Instant::now() + delay);
                            }
                        }
                    }
                }

                _ = sleep_opt(deadlines.screensaver) => {
                    deadlines.screensaver = None;
                    if let Err(e) = self.session.on_screensaver() {
                        warn!(error = %e, "Screensaver page not shown");
                    }
                }

                _ = sleep_opt(deadlines.periodic_reconnect) => {
                    deadlines.periodic_reconnect = None;
                    if let Some(conn) = &connection {
                        debug!("Periodic reconnect");
                        self.session.force_reconnect();
                        conn.close();
                    }
                }
            }

            self.flush(connection.as_ref());
        }
    }
}

// ============================================================================
// Client - Internal API
// ============================================================================

impl Client {
    /// Creates a client from validated parts.
    pub(crate) fn new(
        url: Url,
        session: Session,
        surface: Box<dyn RenderSurface>,
        editor: Box<dyn EditSurface>,
        options: ClientOptions,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        Self {
            url,
            session,
            surface,
            editor,
            options,
            command_tx,
            command_rx,
        }
    }

    /// Decodes one inbound frame.
    ///
    /// Errors requiring a reload are returned, others are logged.
    fn handle_frame(&mut self, bytes: &[u8]) -> Result<()> {
        match self.session.on_frame(bytes) {
            Ok(count) => {
                trace!(count, "Frame staged");
                Ok(())
            }
            Err(e) if e.requires_reload() => {
                error!(error = %e, "Protocol contract broken, reload required");
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "Frame dropped");
                Ok(())
            }
        }
    }

    /// Applies one user command to the session.
    fn handle_command(&mut self, command: ClientCommand, connection: Option<&Connection>) -> Flow {
        trace!(command = ?command, "Command received");

        let result = match command {
            ClientCommand::SwitchPage(target) => self.session.switch_page(target),
            ClientCommand::FadingSwitch(target) => {
                self.session.fading_switch(target);
                Ok(())
            }
            ClientCommand::Back => self.session.jump_back().map(|_| ()),
            ClientCommand::SetValue { index, value } => self.session.set_value(index, value),
            ClientCommand::ApplyExpression { index, expression } => self
                .session
                .apply_expression(index, &expression)
                .map(|_| ()),
            ClientCommand::EditValue {
                path,
                value_type,
                initial,
                callback,
            } => self.session.edit_value(
                &path,
                &value_type,
                initial,
                callback,
                self.editor.as_mut(),
            ),
            ClientCommand::ConfirmEdit(value) => {
                if !self.session.confirm_edit(value) {
                    debug!("No edit to confirm");
                }
                Ok(())
            }
            ClientCommand::CancelEdit => {
                self.session.cancel_edit();
                Ok(())
            }
            ClientCommand::Input => Ok(()),
            ClientCommand::Reconnect => {
                if let Some(conn) = connection {
                    self.session.force_reconnect();
                    conn.close();
                }
                Ok(())
            }
            ClientCommand::Shutdown => return Flow::Stop,
        };

        if let Err(e) = result {
            warn!(error = %e, "Command failed");
        }
        Flow::Continue
    }

    /// Sends the pending outbound frame.
    fn flush(&mut self, connection: Option<&Connection>) {
        let Some(frame) = self.session.take_frame() else {
            return;
        };
        match connection {
            Some(conn) => {
                if let Err(e) = conn.send(frame) {
                    debug!(error = %e, "Frame not sent");
                }
            }
            None => trace!(len = frame.len(), "Frame dropped, not connected"),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Next event of the connection, pending forever without one.
async fn recv_from(connection: &mut Option<Connection>) -> Incoming {
    match connection {
        Some(conn) => conn.recv().await,
        None => std::future::pending().await,
    }
}

/// Result of the pending connection attempt, pending forever without one.
async fn connect_from(connecting: &mut Option<PendingConnect>) -> Result<Connection> {
    match connecting {
        Some(attempt) => attempt.await,
        None => std::future::pending().await,
    }
}

/// Sleeps until the deadline, pending forever without one.
async fn sleep_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use parking_lot::Mutex;
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::accept_hdr_async;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    use crate::config::HmiConfig;
    use crate::identifiers::SubscriberId;
    use crate::protocol::command::{OP_SET_VALUE, OP_SUBSCRIBE};
    use crate::session::{
        BoundWidget, Effects, IndexBinding, MemoryStore, PageWidget, Subscriber, VisibilityChange,
    };

    const CONFIG: &str = r#"{
        "hash": [1, 2],
        "last_remote_index": 10,
        "types": { "1": "INT", "2": "INT" },
        "pages": [{ "name": "Home", "bbox": [0, 0, 800, 600] }],
        "default_page": "Home"
    }"#;

    /// Writes twice the value of index 1 to index 2.
    struct Doubler(SubscriberId);

    impl Subscriber for Doubler {
        fn id(&self) -> SubscriberId {
            self.0
        }

        fn frequency(&self) -> f64 {
            2.0
        }

        fn new_hmi_value(
            &self,
            _index: VariableIndex,
            value: &HmiValue,
            _old: Option<&HmiValue>,
            effects: &mut Effects,
        ) {
            if let Some(v) = value.to_i64() {
                effects.apply_value(VariableIndex::new(2), HmiValue::Int(v * 2));
            }
        }
    }

    #[derive(Clone, Default)]
    struct Notices(Arc<Mutex<Vec<String>>>);

    impl RenderSurface for Notices {
        fn apply_visibility(&mut self, _change: &VisibilityChange) {}

        fn set_fade_out(&mut self, _faded: bool) {}

        fn notify(&mut self, message: &str) {
            self.0.lock().push(message.to_string());
        }
    }

    fn client(origin: &str, notices: Notices) -> Client {
        let widget: Arc<dyn PageWidget> = Arc::new(BoundWidget::new(
            Arc::new(Doubler(SubscriberId::next())),
            vec![IndexBinding::absolute(VariableIndex::new(1))],
        ));
        Client::builder()
            .origin(Url::parse(origin).expect("origin"))
            .config(HmiConfig::from_json(CONFIG).expect("config"))
            .options(ClientOptions::new().with_frame_interval(Duration::from_millis(5)))
            .page_widgets("Home", vec![(widget, false)])
            .surface(notices)
            .store(MemoryStore::new())
            .build()
            .expect("client")
    }

    #[tokio::test]
    async fn test_open_replay_round_trip_and_clean_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        let controller = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut uri = String::new();
            let mut ws = accept_hdr_async(stream, |req: &Request, resp: Response| {
                uri = req.uri().to_string();
                Ok::<Response, ErrorResponse>(resp)
            })
            .await
            .expect("handshake");
            assert_eq!(uri, "/ws?mode=multiclient");

            let replay = ws.next().await.expect("message").expect("ok");
            assert_eq!(
                replay,
                Message::Binary(vec![1, 2, OP_SUBSCRIBE, 1, 0, 0, 0, 0xF4, 0x01].into())
            );

            ws.send(Message::Binary(vec![1, 2, 1, 0, 0, 0, 21, 0].into()))
                .await
                .expect("send");
            let write = ws.next().await.expect("message").expect("ok");
            assert_eq!(
                write,
                Message::Binary(vec![1, 2, OP_SET_VALUE, 2, 0, 0, 0, 42, 0].into())
            );

            ws.close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "bye".into(),
            }))
            .await
            .expect("close");
        });

        let notices = Notices::default();
        let mut client = client(&format!("http://{addr}/index.html"), notices.clone());
        assert_eq!(client.url().path(), "/ws");

        let end = timeout(Duration::from_secs(10), client.run())
            .await
            .expect("run finished")
            .expect("run");
        assert_eq!(end, SessionEnd::ClosedByPeer);
        assert_eq!(*notices.0.lock(), vec![CLOSED_BY_PEER_NOTICE.to_string()]);
        assert_eq!(
            client.session().cache().get(VariableIndex::new(1)),
            Some(&HmiValue::Int(21))
        );

        controller.await.expect("controller");
    }

    #[tokio::test]
    async fn test_shutdown_while_reconnecting() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let mut client = client(&format!("http://{addr}/"), Notices::default());
        let handle = client.handle();

        let run = tokio::spawn(async move { client.run().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown().expect("shutdown");

        let end = timeout(Duration::from_secs(10), run)
            .await
            .expect("run finished")
            .expect("join")
            .expect("run");
        assert_eq!(end, SessionEnd::Shutdown);
        assert!(handle.input().is_err());
    }

    #[tokio::test]
    async fn test_protocol_mismatch_ends_run() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        let controller = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");
            let _replay = ws.next().await;
            ws.send(Message::Binary(vec![9, 9, 1, 0, 0, 0, 1, 0].into()))
                .await
                .expect("send");
            let _ = ws.next().await;
        });

        let mut client = client(&format!("ws://{addr}/"), Notices::default());
        let err = timeout(Duration::from_secs(10), client.run())
            .await
            .expect("run finished")
            .unwrap_err();
        assert!(err.requires_reload());

        controller.await.expect("controller");
    }

    /// Records every value it receives.
    struct Recorder {
        id: SubscriberId,
        seen: Arc<Mutex<Vec<HmiValue>>>,
    }

    impl Subscriber for Recorder {
        fn id(&self) -> SubscriberId {
            self.id
        }

        fn new_hmi_value(
            &self,
            _index: VariableIndex,
            value: &HmiValue,
            _old: Option<&HmiValue>,
            _effects: &mut Effects,
        ) {
            self.seen.lock().push(value.clone());
        }
    }

    #[tokio::test]
    async fn test_commands_served_while_handshake_pending() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        // Accepts the socket but never answers the handshake.
        let silent_peer = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(stream);
        });

        let seen = Arc::new(Mutex::new(Vec::new()));
        let widget: Arc<dyn PageWidget> = Arc::new(BoundWidget::new(
            Arc::new(Recorder {
                id: SubscriberId::next(),
                seen: Arc::clone(&seen),
            }),
            vec![IndexBinding::absolute(VariableIndex::new(20))],
        ));
        let mut client = Client::builder()
            .origin(Url::parse(&format!("http://{addr}/")).expect("origin"))
            .config(HmiConfig::from_json(CONFIG).expect("config"))
            .options(
                ClientOptions::new()
                    .with_frame_interval(Duration::from_millis(5))
                    .with_connect_timeout(Duration::from_secs(3)),
            )
            .page_widgets("Home", vec![(widget, false)])
            .build()
            .expect("client");
        let handle = client.handle();

        let run = tokio::spawn(async move { client.run().await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle
            .set_value(VariableIndex::new(20), HmiValue::Int(5))
            .expect("set value");
        tokio::time::sleep(Duration::from_millis(900)).await;

        assert_eq!(*seen.lock(), vec![HmiValue::Int(5)]);

        handle.shutdown().expect("shutdown");
        let end = timeout(Duration::from_secs(1), run)
            .await
            .expect("shutdown during handshake")
            .expect("join")
            .expect("run");
        assert_eq!(end, SessionEnd::Shutdown);

        silent_peer.abort();
    }

    #[test]
    fn test_user_input_classification() {
        assert!(ClientCommand::Input.is_user_input());
        assert!(ClientCommand::Back.is_user_input());
        assert!(!ClientCommand::Reconnect.is_user_input());
        assert!(!ClientCommand::Shutdown.is_user_input());
    }
}
