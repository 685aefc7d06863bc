//! Page automation: the navigation engine and its collaborators.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `auth` | Per-origin Basic authorization policy |
//! | `cookie` | [`Cookie`], [`CookieJar`]: matching, parsing, serialization |
//! | `events` | [`PageEvent`], phases, outcomes, capability traits |
//! | `interceptor` | Request/response interception, resource numbering |
//! | `navigation` | [`Tab`]: the navigation state machine |
//! | `sandbox` | [`Sandbox`] and [`Renderer`] collaborator seams |
//! | `session` | [`PageSession`]: the caller-facing composition |
//!
//! # Example
//!
//! ```ignore
//! let session = host.page().build();
//! session.open().await?;
//!
//! let outcome = session.load("https://example.com/").await?;
//! if outcome.is_success() {
//!     let png = session.capture_bitmap(None, None).await?;
//!     println!("{} ({}x{})", session.text(), png.width(), png.height());
//! }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Basic authorization policy.
pub mod auth;

/// Cookie model and jar.
pub mod cookie;

/// Lifecycle events, phases and outcomes.
pub mod events;

/// Network interception layer.
pub mod interceptor;

/// Tab navigation engine.
pub mod navigation;

/// Sandbox and rendering seams.
pub mod sandbox;

/// Page session composition.
pub mod session;

// ============================================================================
// Re-exports
// ============================================================================

pub use auth::Credentials;
pub use cookie::{Cookie, CookieJar};
pub use events::{
    FailReason, LoadOutcome, NavigationEvents, NavigationPhase, PageEvent, TabState, WindowEvents,
};
pub use interceptor::{ResourceKind, ResourceRequest, ResourceResponse};
pub use navigation::Tab;
pub use sandbox::{Renderer, Sandbox};
pub use session::{PageSession, PageSessionBuilder, PageSettings};
