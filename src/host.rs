//! Host engine handle.
//!
//! A [`Host`] owns one WebSocket control connection to a running browser
//! engine's automation endpoint. Page sessions are spawned from it; each
//! session drives an independent tab over the shared connection.
//!
//! # Example
//!
//! ```ignore
//! use tabpilot::{Host, Result};
//!
//! # async fn example() -> Result<()> {
//! let host = Host::connect("ws://127.0.0.1:9222").await?;
//! println!("engine: {}", host.engine());
//!
//! let session = host.page().build();
//! session.open().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::identifiers::SessionId;
use crate::page::PageSessionBuilder;
use crate::protocol::{Command, Request, SessionCommand};
use crate::transport::Connection;

// ============================================================================
// Host
// ============================================================================

/// Internal shared state for a host handle.
struct HostInner {
    connection: Connection,
    session_id: SessionId,
    engine: String,
}

/// A handle to a running browser engine.
///
/// Cloning is cheap and shares the same connection.
#[derive(Clone)]
pub struct Host {
    inner: Arc<HostInner>,
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("session_id", &self.inner.session_id)
            .field("engine", &self.inner.engine)
            .finish_non_exhaustive()
    }
}

impl Host {
    /// Connects to the engine's automation endpoint and completes the
    /// READY handshake.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the endpoint is unreachable or the
    /// handshake does not complete.
    pub async fn connect(ws_url: &str) -> Result<Self> {
        let connection = Connection::connect(ws_url).await?;
        let ready = connection.wait_ready().await?;

        info!(
            session_id = %ready.session_id,
            engine = %ready.engine,
            "Host connected"
        );

        Ok(Self {
            inner: Arc::new(HostInner {
                connection,
                session_id: ready.session_id,
                engine: ready.engine,
            }),
        })
    }

    /// Returns the control session ID.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.inner.session_id
    }

    /// Returns the engine identification string from the handshake.
    #[inline]
    #[must_use]
    pub fn engine(&self) -> &str {
        &self.inner.engine
    }

    /// Returns a builder for a new page session.
    #[must_use]
    pub fn page(&self) -> PageSessionBuilder<'_> {
        PageSessionBuilder::new(self)
    }

    /// Queries the engine's status report.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Protocol`] if the host answers with an error.
    pub async fn status(&self) -> Result<serde_json::Value> {
        let response = self
            .inner
            .connection
            .send(Request::session(Command::Session(SessionCommand::Status)))
            .await?;
        response.into_result()
    }

    /// Shuts down the control connection.
    ///
    /// All sessions on this host stop receiving events; pending commands
    /// fail with a connection error.
    pub fn disconnect(&self) {
        self.inner.connection.shutdown();
    }

    /// Returns the underlying connection.
    pub(crate) fn connection(&self) -> &Connection {
        &self.inner.connection
    }
}

// ============================================================================
// Tests
// ============================================================================
