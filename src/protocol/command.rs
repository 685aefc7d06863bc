//! Command definitions organized by module.
//!
//! Commands follow `module.methodName` format.
//!
//! # Command Modules
//!
//! | Module | Commands |
//! |--------|----------|
//! | `page` | Tab allocation, navigation, selection, teardown |
//! | `script` | JavaScript evaluation in the page sandbox |
//! | `render` | Bitmap capture |
//! | `network` | Interception enable/disable |
//! | `security` | Strict-transport state stripping |
//! | `session` | Status |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Command Wrapper
// ============================================================================

/// All protocol commands organized by module.
///
/// This enum wraps module-specific command enums for unified serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Command {
    /// Page module commands.
    Page(PageCommand),
    /// Script module commands.
    Script(ScriptCommand),
    /// Render module commands.
    Render(RenderCommand),
    /// Network module commands.
    Network(NetworkCommand),
    /// Security module commands.
    Security(SecurityCommand),
    /// Session module commands.
    Session(SessionCommand),
}

// ============================================================================
// Page Commands
// ============================================================================

/// Page module commands for tab lifecycle and navigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum PageCommand {
    /// Allocate a new browser tab.
    ///
    /// The response carries the host-assigned `tabId` once the tab exists
    /// and its initial empty document has settled.
    #[serde(rename = "page.openTab")]
    OpenTab,

    /// Navigate the tab to a URL.
    #[serde(rename = "page.navigate")]
    Navigate {
        /// URL to navigate to.
        url: String,
    },

    /// Force the tab to a neutral blank document.
    ///
    /// Issued before every navigation to avoid racing an in-flight load.
    #[serde(rename = "page.blank")]
    Blank,

    /// Bring the tab to the foreground.
    ///
    /// The response carries `wasActive`; if `false`, the host follows up
    /// with a `page.tabActivated` event once activation completes.
    #[serde(rename = "page.selectTab")]
    SelectTab,

    /// Close the tab and release host resources.
    #[serde(rename = "page.closeTab")]
    CloseTab,
}

// ============================================================================
// Script Commands
// ============================================================================

/// Script module commands for sandbox evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum ScriptCommand {
    /// Evaluate a function source synchronously against the document.
    #[serde(rename = "script.evaluate")]
    Evaluate {
        /// Function source text.
        source: String,
        /// Arguments passed to the function.
        #[serde(default)]
        args: Vec<Value>,
    },

    /// Evaluate a function source asynchronously (fire-and-settle).
    #[serde(rename = "script.evaluateAsync")]
    EvaluateAsync {
        /// Function source text.
        source: String,
        /// Arguments passed to the function.
        #[serde(default)]
        args: Vec<Value>,
    },
}

// ============================================================================
// Render Commands
// ============================================================================

/// Render module commands for bitmap capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum RenderCommand {
    /// Capture the tab's rendered content as a base64 PNG.
    #[serde(rename = "render.captureBitmap")]
    CaptureBitmap {
        /// Optional clip rectangle in page coordinates.
        #[serde(skip_serializing_if = "Option::is_none")]
        clip: Option<ClipRect>,
        /// Optional device pixel ratio override.
        #[serde(skip_serializing_if = "Option::is_none")]
        ratio: Option<f64>,
    },
}

// ============================================================================
// ClipRect
// ============================================================================

/// Clip rectangle for bitmap capture, in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipRect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl ClipRect {
    /// Creates a new clip rectangle.
    #[inline]
    #[must_use]
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

// ============================================================================
// Network Commands
// ============================================================================

/// Network module commands for interception control.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum NetworkCommand {
    /// Start delivering request/response events for the tab.
    ///
    /// Request events carry mutable headers and require a reply.
    #[serde(rename = "network.enable")]
    Enable,

    /// Stop delivering request/response events for the tab.
    #[serde(rename = "network.disable")]
    Disable,
}

// ============================================================================
// Security Commands
// ============================================================================

/// Security module commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum SecurityCommand {
    /// Drop recorded strict-transport-security state for a host.
    ///
    /// Repeated automated loads must not be silently upgraded or blocked by
    /// security policy accumulated from earlier runs in the same process.
    #[serde(rename = "security.clearStrictTransport")]
    ClearStrictTransport {
        /// Host whose STS state is dropped.
        host: String,
    },
}

// ============================================================================
// Session Commands
// ============================================================================

/// Session module commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum SessionCommand {
    /// Query host status.
    #[serde(rename = "session.status")]
    Status,
}

// ============================================================================
// Tests
// ============================================================================
