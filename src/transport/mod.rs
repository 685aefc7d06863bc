//! WebSocket transport layer.
//!
//! Client-mode connection to the host engine's automation endpoint:
//! request/response correlation, per-tab event routing, fire-and-forget
//! notifications.

// ============================================================================
// Submodules
// ============================================================================

pub mod connection;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, EventHandler, Notifier, ReadyData};
