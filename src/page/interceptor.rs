//! Network interception layer.
//!
//! For one tab, the interceptor receives the host's per-request and
//! per-response notifications for the lifetime of one navigation attempt and
//! re-emits them as two public event kinds: `resourceRequested` (request
//! about to be sent, headers mutable) and `resourceReceived` (response data
//! arriving, observational).
//!
//! On the request path the interceptor is where the cookie jar and the
//! authorization policy are consulted: headers are computed exactly once,
//! here, and never re-derived for an already-dispatched request. On the
//! response path `Set-Cookie` headers are harvested into the jar and the
//! host's recorded strict-transport state for the response host is stripped
//! so repeated automated loads stay reproducible.
//!
//! Requests are numbered per navigation attempt in arrival order; the main
//! document request is always id `0`.

// ============================================================================
// Imports
// ============================================================================

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use url::Url;

use crate::identifiers::{ResourceId, TabId};
use crate::protocol::{Command, Request, SecurityCommand};
use crate::transport::Notifier;

use super::auth::{Credentials, apply_authorization};
use super::cookie::CookieJar;
use super::events::PageEvent;

// ============================================================================
// ResourceKind
// ============================================================================

/// Resource category reported by the host for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Main or frame document.
    Document,
    /// Stylesheet.
    Stylesheet,
    /// Script.
    Script,
    /// Image.
    Image,
    /// Font.
    Font,
    /// Audio/video media.
    Media,
    /// XHR/fetch.
    Xhr,
    /// Anything else.
    Other,
}

impl ResourceKind {
    /// Parses the host's kind string. Unknown kinds map to `Other`.
    #[must_use]
    pub fn from_wire(kind: &str) -> Self {
        match kind.to_ascii_lowercase().as_str() {
            "document" => Self::Document,
            "stylesheet" => Self::Stylesheet,
            "script" => Self::Script,
            "image" => Self::Image,
            "font" => Self::Font,
            "media" => Self::Media,
            "xhr" | "fetch" => Self::Xhr,
            _ => Self::Other,
        }
    }

    /// Returns the wire string for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Stylesheet => "stylesheet",
            Self::Script => "script",
            Self::Image => "image",
            Self::Font => "font",
            Self::Media => "media",
            Self::Xhr => "xhr",
            Self::Other => "other",
        }
    }

    /// Returns the set of all resource kinds.
    #[must_use]
    pub fn all() -> HashSet<Self> {
        HashSet::from([
            Self::Document,
            Self::Stylesheet,
            Self::Script,
            Self::Image,
            Self::Font,
            Self::Media,
            Self::Xhr,
            Self::Other,
        ])
    }
}

// ============================================================================
// ResourceRequest / ResourceResponse
// ============================================================================

/// A request about to be sent, with its finalized headers.
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    /// Per-navigation resource id; `0` is the main document.
    pub id: ResourceId,

    /// Request URL.
    pub url: String,

    /// HTTP method (GET, POST, ...).
    pub method: String,

    /// Resource category.
    pub kind: ResourceKind,

    /// Headers as they will be sent, after cookie/authorization injection.
    pub headers: Vec<(String, String)>,
}

/// Response data arriving for an earlier request.
#[derive(Debug, Clone)]
pub struct ResourceResponse {
    /// Per-navigation resource id matching the request.
    pub id: ResourceId,

    /// Response URL.
    pub url: String,

    /// HTTP status code.
    pub status: u16,

    /// HTTP status text.
    pub status_text: String,

    /// Resource category.
    pub kind: ResourceKind,

    /// Response headers (duplicate names preserved).
    pub headers: Vec<(String, String)>,
}

// ============================================================================
// InterceptContext
// ============================================================================

/// Session state the interceptor consults on every request and response.
///
/// Shared with the page session; all mutation happens behind the locks.
pub(crate) struct InterceptContext {
    /// Target tab.
    pub tab_id: TabId,
    /// Session cookie jar.
    pub jar: Arc<Mutex<CookieJar>>,
    /// Session credentials.
    pub credentials: Arc<Mutex<Option<Credentials>>>,
    /// Base URL of the page that initiated the navigation.
    pub base_url: Arc<Mutex<Option<Url>>>,
    /// Resource kinds relayed to external subscribers.
    pub capture_types: HashSet<ResourceKind>,
    /// Public event stream.
    pub events: broadcast::Sender<PageEvent>,
    /// Fire-and-forget sender for security commands.
    pub notifier: Notifier,
}

// ============================================================================
// NetworkInterceptor
// ============================================================================

/// Per-navigation interceptor instance.
///
/// Created by `load()` at registration time and dropped when the attempt
/// finishes or the tab closes. Re-registration on a still-registered tab
/// replaces the previous instance, since a prior attempt is necessarily
/// finished or superseded.
pub(crate) struct NetworkInterceptor {
    ctx: InterceptContext,
    /// Next resource id to assign; the first request observed gets `0`.
    next_id: AtomicU64,
    /// Host request id to resource id mapping for this attempt.
    host_ids: Mutex<FxHashMap<String, ResourceId>>,
}

impl NetworkInterceptor {
    /// Creates an interceptor for one navigation attempt.
    pub(crate) fn new(ctx: InterceptContext) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            next_id: AtomicU64::new(0),
            host_ids: Mutex::new(FxHashMap::default()),
        })
    }

    /// Maps a host request id to this attempt's resource id, assigning the
    /// next id on first sight.
    fn resource_id(&self, host_request_id: &str) -> ResourceId {
        let mut host_ids = self.host_ids.lock();
        *host_ids
            .entry(host_request_id.to_string())
            .or_insert_with(|| ResourceId::new(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    /// Returns `true` if the kind is relayed to external subscribers.
    ///
    /// Requests outside the configured set are still observed here for
    /// cookie and authorization processing; only the public relay is
    /// filtered.
    #[inline]
    fn relays(&self, kind: ResourceKind) -> bool {
        self.ctx.capture_types.contains(&kind)
    }

    /// Handles a request notification; returns the finalized header set.
    ///
    /// Header mutation order matters: any engine-applied `Cookie` or stale
    /// `Authorization` header is cleared before the session's own values go
    /// in.
    pub(crate) fn on_request(
        &self,
        host_request_id: &str,
        url: &str,
        method: &str,
        kind: &str,
        mut headers: Vec<(String, String)>,
    ) -> Vec<(String, String)> {
        let id = self.resource_id(host_request_id);
        let kind = ResourceKind::from_wire(kind);

        if let Ok(request_url) = Url::parse(url) {
            // The jar is authoritative for this session's cookies.
            headers.retain(|(name, _)| !name.eq_ignore_ascii_case("cookie"));
            if let Some(header) = self.ctx.jar.lock().header_for(&request_url) {
                headers.push(("Cookie".to_string(), header));
            }

            let credentials = self.ctx.credentials.lock().clone();
            let base_url = self.ctx.base_url.lock().clone();
            let attached = apply_authorization(
                &mut headers,
                credentials.as_ref(),
                base_url.as_ref(),
                &request_url,
                id.is_main(),
            );

            debug!(
                tab_id = %self.ctx.tab_id,
                resource_id = %id,
                url = %url,
                kind = kind.as_str(),
                credentialed = attached,
                "Request intercepted"
            );
        } else {
            warn!(tab_id = %self.ctx.tab_id, url = %url, "Unparseable request URL");
        }

        if self.relays(kind) {
            let _ = self.ctx.events.send(PageEvent::ResourceRequested(ResourceRequest {
                id,
                url: url.to_string(),
                method: method.to_string(),
                kind,
                headers: headers.clone(),
            }));
        }

        headers
    }

    /// Handles a response notification.
    pub(crate) fn on_response(
        &self,
        host_request_id: &str,
        url: &str,
        status: u16,
        status_text: &str,
        kind: &str,
        headers: Vec<(String, String)>,
    ) {
        let id = self.resource_id(host_request_id);
        let kind = ResourceKind::from_wire(kind);

        if let Ok(response_url) = Url::parse(url) {
            for (name, value) in &headers {
                if name.eq_ignore_ascii_case("set-cookie")
                    && let Err(e) = self.ctx.jar.lock().set_from_header(value, &response_url)
                {
                    warn!(tab_id = %self.ctx.tab_id, error = %e, "Rejected Set-Cookie header");
                    let _ = self
                        .ctx
                        .events
                        .send(PageEvent::Error(format!("{e} (from {url})")));
                }
            }

            // Accumulated security policy from earlier runs must not alter
            // later loads in the same process.
            if let Some(host) = response_url.host_str() {
                self.ctx.notifier.notify(Request::new(
                    self.ctx.tab_id,
                    Command::Security(SecurityCommand::ClearStrictTransport {
                        host: host.to_string(),
                    }),
                ));
            }
        }

        debug!(
            tab_id = %self.ctx.tab_id,
            resource_id = %id,
            url = %url,
            status,
            "Response intercepted"
        );

        if self.relays(kind) {
            let _ = self.ctx.events.send(PageEvent::ResourceReceived(ResourceResponse {
                id,
                url: url.to_string(),
                status,
                status_text: status_text.to_string(),
                kind,
                headers,
            }));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::page::cookie::Cookie;
    use crate::transport::Connection;

    fn context(
        capture_types: HashSet<ResourceKind>,
    ) -> (InterceptContext, broadcast::Receiver<PageEvent>) {
        let (events, rx) = broadcast::channel(64);

        (
            InterceptContext {
                tab_id: TabId::new(1).expect("valid tab id"),
                jar: Arc::new(Mutex::new(CookieJar::new())),
                credentials: Arc::new(Mutex::new(None)),
                base_url: Arc::new(Mutex::new(None)),
                capture_types,
                events,
                // Detached from any live connection: notifications are
                // silently dropped, which is what these unit tests want.
                notifier: Connection::dead().notifier(),
            },
            rx,
        )
    }

    fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
        headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_resource_ids_increment_from_zero() {
        let (ctx, _rx) = context(ResourceKind::all());
        let interceptor = NetworkInterceptor::new(ctx);

        let _ = interceptor.on_request("r-a", "http://example.com/", "GET", "document", vec![]);
        let _ = interceptor.on_request("r-b", "http://example.com/a.js", "GET", "script", vec![]);

        assert_eq!(interceptor.resource_id("r-a"), ResourceId::MAIN);
        assert_eq!(interceptor.resource_id("r-b"), ResourceId::new(1));
        // Stable on re-lookup
        assert_eq!(interceptor.resource_id("r-a"), ResourceId::MAIN);
    }

    #[test]
    fn test_request_gets_matching_cookies() {
        let (ctx, _rx) = context(ResourceKind::all());
        ctx.jar
            .lock()
            .add(Cookie::new("session", "abc").expect("valid cookie"));
        let interceptor = NetworkInterceptor::new(ctx);

        let headers =
            interceptor.on_request("r-0", "http://example.com/", "GET", "document", vec![]);

        assert_eq!(header(&headers, "cookie"), Some("session=abc"));
    }

    #[test]
    fn test_engine_cookie_header_replaced() {
        let (ctx, _rx) = context(ResourceKind::all());
        ctx.jar
            .lock()
            .add(Cookie::new("ours", "1").expect("valid cookie"));
        let interceptor = NetworkInterceptor::new(ctx);

        let headers = interceptor.on_request(
            "r-0",
            "http://example.com/",
            "GET",
            "document",
            vec![("Cookie".to_string(), "engine=stale".to_string())],
        );

        assert_eq!(header(&headers, "cookie"), Some("ours=1"));
    }

    #[test]
    fn test_main_document_credentialed_subresource_scoped() {
        let (ctx, _rx) = context(ResourceKind::all());
        *ctx.credentials.lock() = Some(Credentials::new("user", "pass"));
        *ctx.base_url.lock() = Some(Url::parse("https://example.com/").expect("valid url"));
        let interceptor = NetworkInterceptor::new(ctx);

        let main =
            interceptor.on_request("r-0", "https://example.com/", "GET", "document", vec![]);
        let cross = interceptor.on_request(
            "r-1",
            "https://cdn.example.net/lib.js",
            "GET",
            "script",
            vec![],
        );

        assert!(header(&main, "authorization").is_some());
        assert!(header(&cross, "authorization").is_none());
    }

    #[test]
    fn test_capture_filter_suppresses_relay_not_processing() {
        let (ctx, mut rx) = context(HashSet::from([ResourceKind::Document]));
        let jar = Arc::clone(&ctx.jar);
        jar.lock()
            .add(Cookie::new("session", "abc").expect("valid cookie"));
        let interceptor = NetworkInterceptor::new(ctx);

        // Script is outside the capture set: no public relay...
        let headers =
            interceptor.on_request("r-s", "http://example.com/a.js", "GET", "script", vec![]);
        assert!(rx.try_recv().is_err());
        // ...but cookie processing still happened.
        assert_eq!(header(&headers, "cookie"), Some("session=abc"));

        // Document is inside the set and is relayed.
        let _ = interceptor.on_request("r-d", "http://example.com/", "GET", "document", vec![]);
        assert!(matches!(
            rx.try_recv(),
            Ok(PageEvent::ResourceRequested(_))
        ));
    }

    #[test]
    fn test_response_harvests_set_cookie() {
        let (ctx, _rx) = context(ResourceKind::all());
        let jar = Arc::clone(&ctx.jar);
        let interceptor = NetworkInterceptor::new(ctx);

        interceptor.on_response(
            "r-0",
            "http://example.com/",
            200,
            "OK",
            "document",
            vec![
                ("Content-Type".to_string(), "text/html".to_string()),
                ("Set-Cookie".to_string(), "a=1; Path=/".to_string()),
                ("Set-Cookie".to_string(), "b=2".to_string()),
            ],
        );

        let jar = jar.lock();
        assert_eq!(jar.len(), 2);
        assert_eq!(jar.get("a").map(|c| c.value.as_str()), Some("1"));
        assert_eq!(jar.get("b").map(|c| c.domain.as_str()), Some("example.com"));
    }

    #[test]
    fn test_malformed_set_cookie_surfaces_error_event() {
        let (ctx, mut rx) = context(HashSet::new());
        let interceptor = NetworkInterceptor::new(ctx);

        interceptor.on_response(
            "r-0",
            "http://example.com/",
            200,
            "OK",
            "document",
            vec![("Set-Cookie".to_string(), "=nameless".to_string())],
        );

        assert!(matches!(rx.try_recv(), Ok(PageEvent::Error(_))));
    }

    #[test]
    fn test_kind_from_wire() {
        assert_eq!(ResourceKind::from_wire("Document"), ResourceKind::Document);
        assert_eq!(ResourceKind::from_wire("fetch"), ResourceKind::Xhr);
        assert_eq!(ResourceKind::from_wire("widget"), ResourceKind::Other);
    }
}
