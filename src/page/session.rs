//! Page session: the object an automation script drives.
//!
//! A [`PageSession`] composes one tab navigation engine with the session's
//! cookie jar, credentials, accumulated page text and sandbox/render
//! access. Sessions are independent: each owns its tab and interceptor, so
//! multiple sessions can be awaited concurrently over one host connection
//! without interference.
//!
//! # Example
//!
//! ```ignore
//! use tabpilot::{Host, Result};
//!
//! # async fn example() -> Result<()> {
//! let host = Host::connect("ws://127.0.0.1:9222").await?;
//! let session = host.page().credentials("user", "pass").build();
//!
//! session.open().await?;
//! let outcome = session.load("https://example.com/").await?;
//! if outcome.is_success() {
//!     println!("{}", session.text());
//! }
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;
use url::Url;

use crate::error::Result;
use crate::host::Host;
use crate::protocol::ClipRect;
use crate::transport::Connection;

use super::auth::Credentials;
use super::cookie::{Cookie, CookieJar};
use super::events::{
    LoadOutcome, NavigationEvents, NavigationPhase, PageEvent, TabState, WindowEvents,
};
use super::interceptor::ResourceKind;
use super::navigation::Tab;
use super::sandbox::{HostRenderer, HostSandbox, Renderer, Sandbox};

// ============================================================================
// Constants
// ============================================================================

/// Default budget for reaching the ready phase, measured from Init.
const DEFAULT_START_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default budget for the full load event, measured from Ready.
const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Default quiescence delay after the load event.
const DEFAULT_LOAD_WAIT: Duration = Duration::from_millis(500);

/// Event channel capacity.
const EVENT_CAPACITY: usize = 256;

/// Script capturing the document's text content.
const PAGE_TEXT_SOURCE: &str =
    "return document.documentElement ? document.documentElement.textContent : ''";

// ============================================================================
// PageSettings
// ============================================================================

/// Per-session navigation configuration.
#[derive(Debug, Clone)]
pub struct PageSettings {
    /// Budget for reaching the ready phase, measured from Init.
    pub start_timeout: Duration,

    /// Budget for the full load event, measured from Ready.
    pub load_timeout: Duration,

    /// Quiescence delay after the load event before declaring the page
    /// stable.
    pub load_wait: Duration,

    /// Resource kinds relayed as `resourceRequested`/`resourceReceived`
    /// events. Kinds outside the set are still processed internally for
    /// cookies and authorization.
    pub capture_types: HashSet<ResourceKind>,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            start_timeout: DEFAULT_START_TIMEOUT,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            load_wait: DEFAULT_LOAD_WAIT,
            capture_types: ResourceKind::all(),
        }
    }
}

// ============================================================================
// PageSession
// ============================================================================

/// Internal shared state for a page session.
struct SessionInner {
    tab: Tab,
    events: broadcast::Sender<PageEvent>,
    settings: Arc<Mutex<PageSettings>>,
    jar: Arc<Mutex<CookieJar>>,
    credentials: Arc<Mutex<Option<Credentials>>>,
    url: Mutex<Option<String>>,
    text: Mutex<String>,
    sandbox: HostSandbox,
    renderer: HostRenderer,
}

/// A scripted browser page.
///
/// Cloning is cheap and shares the same underlying session.
#[derive(Clone)]
pub struct PageSession {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for PageSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageSession")
            .field("tab", &self.inner.tab)
            .field("url", &*self.inner.url.lock())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// PageSession - Construction
// ============================================================================

impl PageSession {
    /// Creates a session over a connection.
    ///
    /// The tab engine exists immediately; the host tab itself is allocated
    /// by [`PageSession::open`].
    pub(crate) fn new(
        connection: Connection,
        settings: PageSettings,
        credentials: Option<Credentials>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let settings = Arc::new(Mutex::new(settings));
        let jar = Arc::new(Mutex::new(CookieJar::new()));
        let credentials = Arc::new(Mutex::new(credentials));
        let base_url = Arc::new(Mutex::new(None::<Url>));

        let tab = Tab::new(
            connection,
            events.clone(),
            Arc::clone(&settings),
            Arc::clone(&jar),
            Arc::clone(&credentials),
            base_url,
        );

        Self {
            inner: Arc::new(SessionInner {
                sandbox: HostSandbox::new(tab.clone(), events.clone()),
                renderer: HostRenderer::new(tab.clone()),
                tab,
                events,
                settings,
                jar,
                credentials,
                url: Mutex::new(None),
                text: Mutex::new(String::new()),
            }),
        }
    }
}

// ============================================================================
// PageSession - Lifecycle
// ============================================================================

impl PageSession {
    /// Allocates the host tab. See [`Tab::open`].
    pub async fn open(&self) -> Result<()> {
        self.inner.tab.open().await
    }

    /// Navigates to a URL and resolves its outcome. See [`Tab::load`].
    ///
    /// On success the session records the loaded URL and appends the page's
    /// text content to the accumulated text buffer.
    pub async fn load(&self, url: &str) -> Result<LoadOutcome> {
        let outcome = self.inner.tab.load(url).await?;

        if outcome.is_success() {
            *self.inner.url.lock() = Some(url.to_string());
            match self.inner.sandbox.evaluate(PAGE_TEXT_SOURCE, &[]).await {
                Ok(Value::String(text)) => self.inner.text.lock().push_str(&text),
                Ok(_) => {}
                Err(e) => debug!(error = %e, "Page text capture failed"),
            }
        }

        Ok(outcome)
    }

    /// Brings the tab to the foreground. See [`Tab::select`].
    pub async fn select(&self) -> Result<()> {
        self.inner.tab.select().await
    }

    /// Tears down the host tab. Idempotent. See [`Tab::close`].
    pub async fn close(&self) -> Result<()> {
        self.inner.tab.close().await
    }
}

// ============================================================================
// PageSession - Accessors
// ============================================================================

impl PageSession {
    /// Returns the underlying tab engine.
    #[inline]
    #[must_use]
    pub fn tab(&self) -> &Tab {
        &self.inner.tab
    }

    /// Subscribes to the session's event stream.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<PageEvent> {
        self.inner.events.subscribe()
    }

    /// Returns the URL of the last successfully loaded page.
    #[must_use]
    pub fn url(&self) -> Option<String> {
        self.inner.url.lock().clone()
    }

    /// Returns the accumulated page text.
    #[must_use]
    pub fn text(&self) -> String {
        self.inner.text.lock().clone()
    }

    /// Returns a snapshot of the current settings.
    #[must_use]
    pub fn settings(&self) -> PageSettings {
        self.inner.settings.lock().clone()
    }

    /// Updates the settings in place.
    ///
    /// Changes apply from the next `load()`; an in-flight attempt keeps the
    /// configuration it started with.
    pub fn update_settings(&self, update: impl FnOnce(&mut PageSettings)) {
        update(&mut self.inner.settings.lock());
    }
}

// ============================================================================
// PageSession - Cookies & Credentials
// ============================================================================

impl PageSession {
    /// Adds a cookie to the session jar, replacing any same-named cookie.
    pub fn add_cookie(&self, cookie: Cookie) {
        self.inner.jar.lock().add(cookie);
    }

    /// Removes a cookie by name. Returns `true` if one was removed.
    pub fn delete_cookie(&self, name: &str) -> bool {
        self.inner.jar.lock().remove(name)
    }

    /// Removes all cookies.
    pub fn clear_cookies(&self) {
        self.inner.jar.lock().clear();
    }

    /// Returns a snapshot of the jar in insertion order.
    #[must_use]
    pub fn cookies(&self) -> Vec<Cookie> {
        self.inner.jar.lock().cookies().to_vec()
    }

    /// Sets or clears the session's HTTP credentials.
    ///
    /// Mutation never affects a request whose headers were already
    /// computed; the next intercepted request sees the new value.
    pub fn set_credentials(&self, credentials: Option<Credentials>) {
        *self.inner.credentials.lock() = credentials;
    }

    /// Returns the session's credentials, if set.
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials> {
        self.inner.credentials.lock().clone()
    }
}

// ============================================================================
// PageSession - Sandbox & Rendering
// ============================================================================

impl PageSession {
    /// Returns the script-sandbox seam.
    #[must_use]
    pub fn sandbox(&self) -> &dyn Sandbox {
        &self.inner.sandbox
    }

    /// Returns the rendering seam.
    #[must_use]
    pub fn renderer(&self) -> &dyn Renderer {
        &self.inner.renderer
    }

    /// Evaluates a function source against the loaded document.
    pub async fn evaluate(&self, source: &str, args: &[Value]) -> Result<Value> {
        self.inner.sandbox.evaluate(source, args).await
    }

    /// Evaluates a function source that settles asynchronously.
    pub async fn evaluate_async(&self, source: &str, args: &[Value]) -> Result<Value> {
        self.inner.sandbox.evaluate_async(source, args).await
    }

    /// Captures the rendered page as a bitmap.
    pub async fn capture_bitmap(
        &self,
        clip: Option<ClipRect>,
        ratio: Option<f64>,
    ) -> Result<image::DynamicImage> {
        self.inner.renderer.capture_bitmap(clip, ratio).await
    }

    /// Captures the rendered page and writes it to a file.
    ///
    /// The image format is chosen by the file extension.
    pub async fn save_bitmap(&self, path: impl AsRef<Path>) -> Result<()> {
        let bitmap = self.capture_bitmap(None, None).await?;
        bitmap
            .save(path.as_ref())
            .map_err(|e| crate::error::Error::protocol(format!("Bitmap save failed: {e}")))
    }
}

// ============================================================================
// Capability Impls
// ============================================================================

impl NavigationEvents for PageSession {
    fn navigation_phase(&self) -> NavigationPhase {
        self.inner.tab.phase()
    }

    fn navigation_events(&self) -> broadcast::Receiver<PageEvent> {
        self.events()
    }
}

impl WindowEvents for PageSession {
    fn window_state(&self) -> TabState {
        self.inner.tab.state()
    }

    fn window_events(&self) -> broadcast::Receiver<PageEvent> {
        self.events()
    }
}

// ============================================================================
// PageSessionBuilder
// ============================================================================

/// Builder for page sessions.
///
/// # Example
///
/// ```ignore
/// let session = host.page()
///     .start_timeout(Duration::from_secs(10))
///     .capture_types([ResourceKind::Document].into())
///     .credentials("user", "pass")
///     .build();
/// ```
pub struct PageSessionBuilder<'a> {
    host: &'a Host,
    settings: PageSettings,
    credentials: Option<Credentials>,
}

impl<'a> PageSessionBuilder<'a> {
    /// Creates a builder with default settings.
    pub(crate) fn new(host: &'a Host) -> Self {
        Self {
            host,
            settings: PageSettings::default(),
            credentials: None,
        }
    }

    /// Sets the start timeout (default 5000 ms).
    #[must_use]
    pub fn start_timeout(mut self, timeout: Duration) -> Self {
        self.settings.start_timeout = timeout;
        self
    }

    /// Sets the load timeout (default 30 000 ms).
    #[must_use]
    pub fn load_timeout(mut self, timeout: Duration) -> Self {
        self.settings.load_timeout = timeout;
        self
    }

    /// Sets the quiescence delay (default 500 ms).
    #[must_use]
    pub fn load_wait(mut self, wait: Duration) -> Self {
        self.settings.load_wait = wait;
        self
    }

    /// Sets the resource kinds relayed to subscribers (default: all).
    #[must_use]
    pub fn capture_types(mut self, types: HashSet<ResourceKind>) -> Self {
        self.settings.capture_types = types;
        self
    }

    /// Sets HTTP credentials for the session.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    /// Builds the session. No host tab is allocated yet.
    #[must_use]
    pub fn build(self) -> PageSession {
        PageSession::new(
            self.host.connection().clone(),
            self.settings,
            self.credentials,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
