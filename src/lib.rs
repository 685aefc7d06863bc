//! tabpilot - Scripted headless-style control of browser tabs.
//!
//! This library drives tabs of a running browser engine over a WebSocket
//! control protocol: open a URL, wait deterministically for a well-defined
//! load outcome, intercept every request and response, inject per-session
//! cookies and HTTP authentication, and expose the result (page text,
//! rendered bitmap, evaluated script values) to the calling script.
//!
//! # Architecture
//!
//! The hard part is fusing many independently-firing, order-adversarial
//! host signals (DOM events, progress flags, timers) into one promise-like
//! outcome per navigation:
//!
//! - Each [`PageSession`] owns: a [`Tab`] engine + cookie jar + credentials
//! - The tab walks an ordered phase timeline per `load()`, guarded by
//!   two timeout windows and a quiescence delay
//! - The interceptor consults the jar and the authorization policy on every
//!   outgoing request, and harvests `Set-Cookie` from every response
//! - Credentials are strictly origin-scoped: third-party sub-resources
//!   never see them
//!
//! # Quick Start
//!
//! ```no_run
//! use tabpilot::{Host, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Connect to a running engine's automation endpoint
//!     let host = Host::connect("ws://127.0.0.1:9222").await?;
//!
//!     // Spawn an independent page session
//!     let session = host.page().build();
//!     session.open().await?;
//!
//!     // Navigate and wait for the single resolved outcome
//!     let outcome = session.load("https://example.com").await?;
//!     if outcome.is_success() {
//!         println!("{}", session.text());
//!     }
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`page`] | Navigation engine, cookies, interception, sessions |
//! | [`host`] | Host engine handle and connection bootstrap |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | WebSocket message types (internal) |
//! | [`transport`] | WebSocket transport layer (internal) |
//!
//! # Outcomes vs. Errors
//!
//! A navigation that times out or is rejected by the host is NOT an `Err`:
//! `load()` resolves to [`LoadOutcome::Fail`] with a [`FailReason`] and the
//! session emits a `loadFail` event. `Err` is reserved for genuine faults:
//! operating a closed tab, malformed cookies, transport breakage.

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Host engine handle.
///
/// Use [`Host::connect`] to bootstrap a control session.
pub mod host;

/// Type-safe identifiers for host entities.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Page automation: navigation engine, cookies, interception, sessions.
pub mod page;

/// WebSocket protocol message types.
///
/// Internal module defining command/response/event structures.
pub mod protocol;

/// WebSocket transport layer.
///
/// Internal module handling the connection and event routing.
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

// ============================================================================
// Re-exports
// ============================================================================

// Page types
pub use page::{
    Cookie, CookieJar, Credentials, FailReason, LoadOutcome, NavigationEvents, NavigationPhase,
    PageEvent, PageSession, PageSessionBuilder, PageSettings, Renderer, ResourceKind,
    ResourceRequest, ResourceResponse, Sandbox, Tab, TabState, WindowEvents,
};

// Host types
pub use host::Host;

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CommandId, ResourceId, SessionId, TabId};

// Protocol types useful to callers
pub use protocol::ClipRect;
