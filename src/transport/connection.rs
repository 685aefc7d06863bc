//! WebSocket connection and event loop.
//!
//! This module handles the WebSocket connection to the host browser engine,
//! including request/response correlation and per-tab event routing.
//!
//! # Event Loop
//!
//! The connection spawns a tokio task that handles:
//!
//! - Incoming messages from the host (responses, events)
//! - Outgoing commands from the Rust API
//! - Request/response correlation by UUID
//! - Per-tab event handler callbacks

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{from_str, to_string};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{CommandId, SessionId, TabId};
use crate::protocol::{Event, EventReply, Request, Response};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for command execution.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum pending requests before rejecting new ones.
const MAX_PENDING_REQUESTS: usize = 100;

/// Timeout for the READY handshake.
const READY_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Types
// ============================================================================

/// Underlying WebSocket stream (client mode, optionally TLS).
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outgoing half of the split stream.
type WsSink = futures_util::stream::SplitSink<WsStream, Message>;

/// Map of command IDs to response channels.
type CorrelationMap = FxHashMap<CommandId, oneshot::Sender<Result<Response>>>;

/// Per-tab event handler callback type.
///
/// Called for each event routed to the tab. Return `Some(EventReply)` to
/// send a reply (for network interception).
pub type EventHandler = Box<dyn Fn(Event) -> Option<EventReply> + Send + Sync>;

/// Map of tab IDs to their event handlers.
type HandlerMap = FxHashMap<TabId, Arc<EventHandler>>;

// ============================================================================
// ReadyData
// ============================================================================

/// Data received in the READY handshake message.
///
/// The host sends this immediately after the WebSocket upgrade to announce
/// the control session.
#[derive(Debug, Clone)]
pub struct ReadyData {
    /// Control session ID.
    pub session_id: SessionId,
    /// Host engine identification string.
    pub engine: String,
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Send a request and wait for the response.
    Send {
        request: Request,
        response_tx: oneshot::Sender<Result<Response>>,
    },
    /// Send a request without waiting for any response.
    Notify(Request),
    /// Remove a timed-out correlation entry.
    RemoveCorrelation(CommandId),
    /// Shutdown the connection.
    Shutdown,
}

// ============================================================================
// Notifier
// ============================================================================

/// Lightweight fire-and-forget sender detached from the connection.
///
/// Holds only the outgoing command channel, so event handlers can keep one
/// without creating a reference cycle through the handler map.
#[derive(Clone)]
pub struct Notifier {
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
}

impl Notifier {
    /// Sends a request without waiting for a response.
    ///
    /// Errors are logged, not surfaced: notifications are best-effort.
    pub fn notify(&self, request: Request) {
        if self.command_tx.send(ConnectionCommand::Notify(request)).is_err() {
            debug!("Notify dropped: connection closed");
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

/// WebSocket connection to the host browser engine.
///
/// Handles request/response correlation and per-tab event routing.
/// The connection spawns an internal event loop task.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and can be shared across tasks.
/// All operations are non-blocking.
pub struct Connection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Correlation map (shared with event loop).
    correlation: Arc<Mutex<CorrelationMap>>,
    /// Per-tab event handlers (shared with event loop).
    handlers: Arc<Mutex<HandlerMap>>,
}

impl Clone for Connection {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            correlation: Arc::clone(&self.correlation),
            handlers: Arc::clone(&self.handlers),
        }
    }
}

impl Connection {
    /// Connects to the host engine's automation endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WebSocket`] if the connection cannot be established.
    pub async fn connect(ws_url: &str) -> Result<Self> {
        debug!(url = %ws_url, "Connecting to host engine");
        let (ws_stream, _) = connect_async(ws_url).await?;
        Ok(Self::new(ws_stream))
    }

    /// Creates a new connection from an established WebSocket stream.
    ///
    /// Spawns the event loop task internally.
    pub(crate) fn new(ws_stream: WsStream) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        let handlers: Arc<Mutex<HandlerMap>> = Arc::new(Mutex::new(HandlerMap::default()));

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&correlation),
            Arc::clone(&handlers),
        ));

        Self {
            command_tx,
            correlation,
            handlers,
        }
    }

    /// Waits for the READY handshake message.
    ///
    /// Must be called after the connection is established. The host sends
    /// READY with the nil UUID immediately after the upgrade.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if READY not received within 30s
    /// - [`Error::ConnectionClosed`] if connection closes before READY
    pub async fn wait_ready(&self) -> Result<ReadyData> {
        let (tx, rx) = oneshot::channel();

        {
            let mut correlation = self.correlation.lock();
            correlation.insert(CommandId::ready(), tx);
        }

        let response = timeout(READY_TIMEOUT, rx)
            .await
            .map_err(|_| Error::connection_timeout(READY_TIMEOUT.as_millis() as u64))??;

        let response = response?;

        let session_id = SessionId::from_u32(response.get_u64("sessionId").max(1) as u32);
        let engine = response.get_string("engine");

        debug!(session_id = %session_id, engine = %engine, "READY handshake completed");

        Ok(ReadyData { session_id, engine })
    }

    /// Registers the event handler for a tab.
    ///
    /// Replaces any previous handler for the same tab.
    pub fn register_tab(&self, tab_id: TabId, handler: EventHandler) {
        let mut handlers = self.handlers.lock();
        handlers.insert(tab_id, Arc::new(handler));
        debug!(tab_id = %tab_id, "Tab event handler registered");
    }

    /// Removes the event handler for a tab.
    pub fn unregister_tab(&self, tab_id: TabId) {
        let mut handlers = self.handlers.lock();
        if handlers.remove(&tab_id).is_some() {
            debug!(tab_id = %tab_id, "Tab event handler removed");
        }
    }

    /// Returns a fire-and-forget sender for this connection.
    #[must_use]
    pub fn notifier(&self) -> Notifier {
        Notifier {
            command_tx: self.command_tx.clone(),
        }
    }

    /// Sends a request and waits for the response with default timeout (30s).
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if connection is closed
    /// - [`Error::CommandTimeout`] if response not received within timeout
    /// - [`Error::Protocol`] if too many pending requests
    pub async fn send(&self, request: Request) -> Result<Response> {
        self.send_with_timeout(request, DEFAULT_COMMAND_TIMEOUT)
            .await
    }

    /// Sends a request and waits for the response with custom timeout.
    ///
    /// # Arguments
    ///
    /// * `request` - The request to send
    /// * `request_timeout` - Maximum time to wait for response
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if connection is closed
    /// - [`Error::CommandTimeout`] if response not received within timeout
    /// - [`Error::Protocol`] if too many pending requests
    pub async fn send_with_timeout(
        &self,
        request: Request,
        request_timeout: Duration,
    ) -> Result<Response> {
        let command_id = request.id;

        {
            let correlation = self.correlation.lock();
            if correlation.len() >= MAX_PENDING_REQUESTS {
                warn!(
                    pending = correlation.len(),
                    max = MAX_PENDING_REQUESTS,
                    "Too many pending requests"
                );
                return Err(Error::protocol(format!(
                    "Too many pending requests: {}/{}",
                    correlation.len(),
                    MAX_PENDING_REQUESTS
                )));
            }
        }

        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(ConnectionCommand::Send {
                request,
                response_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        match timeout(request_timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                // Timeout - clean up correlation entry
                let _ = self
                    .command_tx
                    .send(ConnectionCommand::RemoveCorrelation(command_id));

                Err(Error::command_timeout(
                    command_id,
                    request_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Returns the number of pending requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlation.lock().len()
    }

    /// Shuts down the connection gracefully.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop(
        ws_stream: WsStream,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        correlation: Arc<Mutex<CorrelationMap>>,
        handlers: Arc<Mutex<HandlerMap>>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming messages from the host
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            let reply = Self::handle_incoming_message(
                                &text,
                                &correlation,
                                &handlers,
                            );

                            if let Some(reply) = reply
                                && let Ok(json) = to_string(&reply)
                                && let Err(e) = ws_write.send(Message::Text(json.into())).await
                            {
                                warn!(error = %e, "Failed to send event reply");
                            }
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by host");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Commands from the Rust API
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { request, response_tx }) => {
                            Self::handle_send_command(
                                request,
                                response_tx,
                                &mut ws_write,
                                &correlation,
                            ).await;
                        }

                        Some(ConnectionCommand::Notify(request)) => {
                            match to_string(&request) {
                                Ok(json) => {
                                    if let Err(e) = ws_write.send(Message::Text(json.into())).await {
                                        warn!(error = %e, "Failed to send notification");
                                    }
                                }
                                Err(e) => warn!(error = %e, "Failed to serialize notification"),
                            }
                        }

                        Some(ConnectionCommand::RemoveCorrelation(command_id)) => {
                            correlation.lock().remove(&command_id);
                            debug!(%command_id, "Removed timed-out correlation");
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        // Fail all pending requests and drop handlers on shutdown
        Self::fail_pending_requests(&correlation);
        handlers.lock().clear();

        debug!("Event loop terminated");
    }

    /// Handles an incoming text message from the host.
    fn handle_incoming_message(
        text: &str,
        correlation: &Arc<Mutex<CorrelationMap>>,
        handlers: &Arc<Mutex<HandlerMap>>,
    ) -> Option<EventReply> {
        // Try to parse as Response first
        if let Ok(response) = from_str::<Response>(text) {
            let tx = correlation.lock().remove(&response.id);

            if let Some(tx) = tx {
                let _ = tx.send(Ok(response));
            } else {
                trace!(id = %response.id, "Response for unknown request");
            }

            return None;
        }

        // Try to parse as Event and route by tab
        if let Ok(event) = from_str::<Event>(text) {
            let Some(raw_tab) = event.tab_id() else {
                trace!(method = %event.method, "Event without tab target");
                return None;
            };
            let Some(tab_id) = TabId::new(raw_tab) else {
                warn!(method = %event.method, "Event with invalid tab id 0");
                return None;
            };

            // Clone the Arc out so the handler runs without the map lock held
            let handler = handlers.lock().get(&tab_id).cloned();
            if let Some(handler) = handler {
                return handler(event);
            }

            trace!(tab_id = %tab_id, method = %event.method, "Event for unrouted tab");
            return None;
        }

        warn!(text = %text, "Failed to parse incoming message");
        None
    }

    /// Handles a send command from the Rust API.
    async fn handle_send_command(
        request: Request,
        response_tx: oneshot::Sender<Result<Response>>,
        ws_write: &mut WsSink,
        correlation: &Arc<Mutex<CorrelationMap>>,
    ) {
        let command_id = request.id;

        let json = match to_string(&request) {
            Ok(j) => j,
            Err(e) => {
                let _ = response_tx.send(Err(Error::Json(e)));
                return;
            }
        };

        // Store correlation before sending
        correlation.lock().insert(command_id, response_tx);

        if let Err(e) = ws_write.send(Message::Text(json.into())).await {
            // Remove correlation and notify caller
            if let Some(tx) = correlation.lock().remove(&command_id) {
                let _ = tx.send(Err(Error::connection(e.to_string())));
            }
        }

        trace!(%command_id, "Request sent");
    }

    /// Fails all pending requests with ConnectionClosed error.
    fn fail_pending_requests(correlation: &Arc<Mutex<CorrelationMap>>) {
        let pending: Vec<_> = correlation.lock().drain().collect();
        let count = pending.len();

        for (_, tx) in pending {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending requests on shutdown");
        }
    }
}

// ============================================================================
// Test Support
// ============================================================================

#[cfg(test)]
impl Connection {
    /// Creates a connection with no live event loop.
    ///
    /// Sends fail immediately and notifications are dropped; useful for unit
    /// tests that exercise components holding a [`Notifier`].
    pub(crate) fn dead() -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        drop(command_rx);
        Self {
            command_tx,
            correlation: Arc::new(Mutex::new(CorrelationMap::default())),
            handlers: Arc::new(Mutex::new(HandlerMap::default())),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_COMMAND_TIMEOUT.as_secs(), 30);
        assert_eq!(MAX_PENDING_REQUESTS, 100);
        assert_eq!(READY_TIMEOUT.as_secs(), 30);
    }

    #[test]
    fn test_ready_data_fields() {
        let data = ReadyData {
            session_id: SessionId::from_u32(1),
            engine: "mock/1.0".to_string(),
        };
        assert_eq!(data.session_id.as_u32(), 1);
        assert_eq!(data.engine, "mock/1.0");
    }
}
