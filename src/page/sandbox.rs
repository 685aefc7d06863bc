//! Script-sandbox and rendering collaborator seams.
//!
//! The navigation core consumes these facilities only through the narrow
//! [`Sandbox`] and [`Renderer`] traits; the host-backed implementations
//! below translate them into `script.*` and `render.*` commands. Faults in
//! caller-supplied script are caught at this boundary and re-surfaced as an
//! `error` page event as well as an `Err` return - never swallowed, never a
//! panic.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use image::DynamicImage;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{ClipRect, Command, RenderCommand, ScriptCommand};

use super::events::PageEvent;
use super::navigation::Tab;

// ============================================================================
// Sandbox
// ============================================================================

/// Evaluation facility running caller-supplied functions against the
/// loaded document.
#[async_trait]
pub trait Sandbox {
    /// Evaluates a function source synchronously and returns its value.
    async fn evaluate(&self, source: &str, args: &[Value]) -> Result<Value>;

    /// Evaluates a function source that settles asynchronously.
    async fn evaluate_async(&self, source: &str, args: &[Value]) -> Result<Value>;
}

// ============================================================================
// Renderer
// ============================================================================

/// Bitmap capture facility for the rendered page.
#[async_trait]
pub trait Renderer {
    /// Captures the rendered page, optionally clipped and scaled.
    async fn capture_bitmap(
        &self,
        clip: Option<ClipRect>,
        ratio: Option<f64>,
    ) -> Result<DynamicImage>;
}

// ============================================================================
// HostSandbox
// ============================================================================

/// Host-backed sandbox driving `script.evaluate` commands.
pub(crate) struct HostSandbox {
    tab: Tab,
    events: broadcast::Sender<PageEvent>,
}

impl HostSandbox {
    pub(crate) fn new(tab: Tab, events: broadcast::Sender<PageEvent>) -> Self {
        Self { tab, events }
    }

    async fn run(&self, command: ScriptCommand) -> Result<Value> {
        let tab_id = self.tab.tab_id().ok_or(Error::TabNotOpen)?;
        let response = self.tab.send(tab_id, Command::Script(command)).await?;

        if response.is_error() {
            let message = response
                .message
                .unwrap_or_else(|| "script failed".to_string());
            let _ = self.events.send(PageEvent::Error(message.clone()));
            return Err(Error::script(message));
        }

        let value = response
            .result
            .as_ref()
            .and_then(|v| v.get("value"))
            .cloned()
            .unwrap_or(Value::Null);

        Ok(value)
    }
}

#[async_trait]
impl Sandbox for HostSandbox {
    async fn evaluate(&self, source: &str, args: &[Value]) -> Result<Value> {
        debug!(source_len = source.len(), "Evaluating script");
        self.run(ScriptCommand::Evaluate {
            source: source.to_string(),
            args: args.to_vec(),
        })
        .await
    }

    async fn evaluate_async(&self, source: &str, args: &[Value]) -> Result<Value> {
        debug!(source_len = source.len(), "Evaluating async script");
        self.run(ScriptCommand::EvaluateAsync {
            source: source.to_string(),
            args: args.to_vec(),
        })
        .await
    }
}

// ============================================================================
// HostRenderer
// ============================================================================

/// Host-backed renderer driving `render.captureBitmap` commands.
pub(crate) struct HostRenderer {
    tab: Tab,
}

impl HostRenderer {
    pub(crate) fn new(tab: Tab) -> Self {
        Self { tab }
    }
}

#[async_trait]
impl Renderer for HostRenderer {
    async fn capture_bitmap(
        &self,
        clip: Option<ClipRect>,
        ratio: Option<f64>,
    ) -> Result<DynamicImage> {
        let tab_id = self.tab.tab_id().ok_or(Error::TabNotOpen)?;
        debug!(tab_id = %tab_id, ?clip, ?ratio, "Capturing bitmap");

        let response = self
            .tab
            .send(
                tab_id,
                Command::Render(RenderCommand::CaptureBitmap { clip, ratio }),
            )
            .await?;

        let data = response.get_string("data");
        if data.is_empty() {
            return Err(Error::protocol("Bitmap response missing data field"));
        }

        let bytes = Base64Standard
            .decode(&data)
            .map_err(|e| Error::protocol(format!("Bitmap payload not base64: {e}")))?;

        image::load_from_memory(&bytes)
            .map_err(|e| Error::protocol(format!("Bitmap payload not decodable: {e}")))
    }
}
