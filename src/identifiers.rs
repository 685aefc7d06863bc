//! Type-safe identifiers for host entities.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time:
//! a [`TabId`] can never be passed where a [`ResourceId`] is expected.
//!
//! | Type | Backing | Source |
//! |------|---------|--------|
//! | [`TabId`] | `u32` (non-zero) | Assigned by the host on tab creation |
//! | [`SessionId`] | `u32` | Announced in the READY handshake |
//! | [`CommandId`] | UUID | Generated locally for correlation |
//! | [`ResourceId`] | `u64` | Assigned per navigation; main document is `0` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// TabId
// ============================================================================

/// Host-assigned identifier for a browser tab.
///
/// Tab IDs are non-zero; `0` is reserved by the host protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(NonZeroU32);

impl TabId {
    /// Creates a tab ID from a raw value.
    ///
    /// Returns `None` if `raw` is zero.
    #[inline]
    #[must_use]
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// SessionId
// ============================================================================

/// Identifier for one host control session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u32);

impl SessionId {
    /// Creates a session ID from a raw value.
    #[inline]
    #[must_use]
    pub fn from_u32(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// CommandId
// ============================================================================

/// Unique identifier for command/response correlation.
///
/// The nil UUID is reserved for the READY handshake message the host sends
/// immediately after connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(Uuid);

impl CommandId {
    /// Generates a fresh random command ID.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the reserved READY handshake ID (nil UUID).
    #[inline]
    #[must_use]
    pub fn ready() -> Self {
        Self(Uuid::nil())
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// ResourceId
// ============================================================================

/// Per-navigation resource identifier.
///
/// Assigned by the interception layer in request order, starting at `0`.
/// The main document request of a navigation attempt is always id `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(u64);

impl ResourceId {
    /// The main document request of a navigation attempt.
    pub const MAIN: Self = Self(0);

    /// Creates a resource ID from a raw value.
    #[inline]
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns `true` if this is the main document request.
    #[inline]
    #[must_use]
    pub fn is_main(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
