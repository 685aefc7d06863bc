//! Event message types.
//!
//! Events are notifications sent from the host engine to the local end when
//! tab activity occurs. Network request events require a decision reply; all
//! other events are observational.
//!
//! # Event Types
//!
//! | Module | Events |
//! |--------|--------|
//! | `page` | `progress`, `contentLoaded`, `load`, `navigationFailed`, `tabActivated` |
//! | `network` | `requestWillBeSent` (reply-carrying), `responseReceived` |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::identifiers::CommandId;

// ============================================================================
// Event
// ============================================================================

/// An event notification from the host to the local end.
///
/// # Format
///
/// ```json
/// {
///   "id": "event-uuid",
///   "type": "event",
///   "method": "module.eventName",
///   "params": { "tabId": 1, ... }
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    /// Unique identifier for EventReply correlation.
    pub id: CommandId,

    /// Event type marker (always "event").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Event name in `module.eventName` format.
    pub method: String,

    /// Event-specific data.
    pub params: Value,
}

impl Event {
    /// Returns the module name from the method.
    #[inline]
    #[must_use]
    pub fn module(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }

    /// Returns the event name from the method.
    #[inline]
    #[must_use]
    pub fn event_name(&self) -> &str {
        self.method.split('.').nth(1).unwrap_or_default()
    }

    /// Returns the tab ID the event targets, if present.
    #[inline]
    #[must_use]
    pub fn tab_id(&self) -> Option<u32> {
        self.params
            .get("tabId")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
    }

    /// Parses the event into a typed variant.
    #[must_use]
    pub fn parse(&self) -> ParsedEvent {
        self.parse_internal()
    }
}

// ============================================================================
// EventReply
// ============================================================================

/// A reply from the local end to the host for events requiring a decision.
///
/// Used for network interception to continue a request with patched headers.
///
/// # Format
///
/// ```json
/// {
///   "id": "event-uuid",
///   "replyTo": "network.requestWillBeSent",
///   "result": { "action": "continue", "headers": [ ... ] }
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct EventReply {
    /// Matches the event's ID.
    pub id: CommandId,

    /// Event method being replied to.
    #[serde(rename = "replyTo")]
    pub reply_to: String,

    /// Decision/action to take.
    pub result: Value,
}

impl EventReply {
    /// Creates a new event reply.
    #[inline]
    #[must_use]
    pub fn new(id: CommandId, reply_to: impl Into<String>, result: Value) -> Self {
        Self {
            id,
            reply_to: reply_to.into(),
            result,
        }
    }

    /// Creates a "continue unchanged" reply for network request events.
    #[inline]
    #[must_use]
    pub fn proceed(id: CommandId, reply_to: impl Into<String>) -> Self {
        Self::new(id, reply_to, json!({ "action": "continue" }))
    }

    /// Creates a "continue with patched headers" reply.
    #[must_use]
    pub fn patch_headers(
        id: CommandId,
        reply_to: impl Into<String>,
        headers: &[(String, String)],
    ) -> Self {
        let headers: Vec<Value> = headers
            .iter()
            .map(|(name, value)| json!({ "name": name, "value": value }))
            .collect();
        Self::new(
            id,
            reply_to,
            json!({ "action": "continue", "headers": headers }),
        )
    }
}

// ============================================================================
// ProgressState
// ============================================================================

/// The host's four-state transfer/document progress flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressState {
    /// First bytes of the main transfer are moving.
    StartTransfer,
    /// Document-level loading has begun.
    StartWindow,
    /// Network activity for the document has stopped.
    StopNetwork,
    /// The document window has stopped loading.
    StopWindow,
}

impl ProgressState {
    /// Parses a wire flag into a progress state.
    #[must_use]
    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "startTransfer" => Some(Self::StartTransfer),
            "startWindow" => Some(Self::StartWindow),
            "stopNetwork" => Some(Self::StopNetwork),
            "stopWindow" => Some(Self::StopWindow),
            _ => None,
        }
    }
}

// ============================================================================
// ParsedEvent
// ============================================================================

/// Parsed event types for type-safe handling.
#[derive(Debug, Clone)]
pub enum ParsedEvent {
    /// Transfer/document progress flag changed.
    PageProgress {
        /// Tab ID.
        tab_id: u32,
        /// Progress state.
        state: ProgressState,
    },

    /// DOM content parsed (sub-resources may still be loading).
    PageContentLoaded {
        /// Tab ID.
        tab_id: u32,
        /// Document URL.
        url: String,
    },

    /// Full load event received (sub-resources settled).
    PageLoad {
        /// Tab ID.
        tab_id: u32,
        /// Document URL.
        url: String,
    },

    /// Host could not open or continue the navigation.
    PageNavigationFailed {
        /// Tab ID.
        tab_id: u32,
        /// URL that failed.
        url: String,
        /// Host error message.
        error: String,
    },

    /// Tab activation completed after a select request.
    PageTabActivated {
        /// Tab ID.
        tab_id: u32,
    },

    /// Network request about to be sent (reply-carrying, mutable headers).
    NetworkRequestWillBeSent {
        /// Tab ID.
        tab_id: u32,
        /// Host-side request ID.
        request_id: String,
        /// Request URL.
        url: String,
        /// HTTP method.
        method: String,
        /// Resource kind string (document, script, ...).
        kind: String,
        /// Request headers as name/value pairs.
        headers: Vec<(String, String)>,
    },

    /// Network response data arriving (observational).
    NetworkResponseReceived {
        /// Tab ID.
        tab_id: u32,
        /// Host-side request ID.
        request_id: String,
        /// Response URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// HTTP status text.
        status_text: String,
        /// Resource kind string.
        kind: String,
        /// Response headers as name/value pairs (duplicates preserved).
        headers: Vec<(String, String)>,
    },

    /// Unknown event type.
    Unknown {
        /// Event method.
        method: String,
        /// Event params.
        params: Value,
    },
}

// ============================================================================
// Event Parsing Implementation
// ============================================================================

impl Event {
    /// Internal parsing implementation.
    fn parse_internal(&self) -> ParsedEvent {
        match self.method.as_str() {
            "page.progress" => {
                let flag = self.get_string("state");
                match ProgressState::from_flag(&flag) {
                    Some(state) => ParsedEvent::PageProgress {
                        tab_id: self.get_u32("tabId"),
                        state,
                    },
                    None => ParsedEvent::Unknown {
                        method: self.method.clone(),
                        params: self.params.clone(),
                    },
                }
            }

            "page.contentLoaded" => ParsedEvent::PageContentLoaded {
                tab_id: self.get_u32("tabId"),
                url: self.get_string("url"),
            },

            "page.load" => ParsedEvent::PageLoad {
                tab_id: self.get_u32("tabId"),
                url: self.get_string("url"),
            },

            "page.navigationFailed" => ParsedEvent::PageNavigationFailed {
                tab_id: self.get_u32("tabId"),
                url: self.get_string("url"),
                error: self.get_string("error"),
            },

            "page.tabActivated" => ParsedEvent::PageTabActivated {
                tab_id: self.get_u32("tabId"),
            },

            "network.requestWillBeSent" => ParsedEvent::NetworkRequestWillBeSent {
                tab_id: self.get_u32("tabId"),
                request_id: self.get_string("requestId"),
                url: self.get_string("url"),
                method: self.get_string_or("method", "GET"),
                kind: self.get_string_or("kind", "other"),
                headers: self.get_headers("headers"),
            },

            "network.responseReceived" => ParsedEvent::NetworkResponseReceived {
                tab_id: self.get_u32("tabId"),
                request_id: self.get_string("requestId"),
                url: self.get_string("url"),
                status: self.get_u16("status"),
                status_text: self.get_string("statusText"),
                kind: self.get_string_or("kind", "other"),
                headers: self.get_headers("headers"),
            },

            _ => ParsedEvent::Unknown {
                method: self.method.clone(),
                params: self.params.clone(),
            },
        }
    }

    /// Gets a string from params.
    #[inline]
    fn get_string(&self, key: &str) -> String {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    /// Gets a string from params with default.
    #[inline]
    fn get_string_or(&self, key: &str, default: &str) -> String {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or(default)
            .to_string()
    }

    /// Gets a u32 from params.
    #[inline]
    fn get_u32(&self, key: &str) -> u32 {
        self.params
            .get(key)
            .and_then(|v| v.as_u64())
            .unwrap_or_default() as u32
    }

    /// Gets a u16 from params.
    #[inline]
    fn get_u16(&self, key: &str) -> u16 {
        self.params
            .get(key)
            .and_then(|v| v.as_u64())
            .unwrap_or_default() as u16
    }

    /// Gets a header list from params.
    ///
    /// Headers travel as an array of `{name, value}` objects so duplicate
    /// names (Set-Cookie) survive.
    fn get_headers(&self, key: &str) -> Vec<(String, String)> {
        self.params
            .get(key)
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|entry| {
                        let name = entry.get("name")?.as_str()?;
                        let value = entry.get("value")?.as_str()?;
                        Some((name.to_string(), value.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_event_parsing() {
        let json_str = r#"{
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "type": "event",
            "method": "page.progress",
            "params": { "tabId": 1, "state": "startTransfer" }
        }"#;

        let event: Event = serde_json::from_str(json_str).expect("parse event");
        assert_eq!(event.module(), "page");
        assert_eq!(event.event_name(), "progress");
        assert_eq!(event.tab_id(), Some(1));

        match event.parse() {
            ParsedEvent::PageProgress { tab_id, state } => {
                assert_eq!(tab_id, 1);
                assert_eq!(state, ProgressState::StartTransfer);
            }
            other => panic!("unexpected parsed event: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_progress_flag() {
        let json_str = r#"{
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "type": "event",
            "method": "page.progress",
            "params": { "tabId": 1, "state": "warp" }
        }"#;

        let event: Event = serde_json::from_str(json_str).expect("parse event");
        assert!(matches!(event.parse(), ParsedEvent::Unknown { .. }));
    }

    #[test]
    fn test_request_event_parsing() {
        let json_str = r#"{
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "type": "event",
            "method": "network.requestWillBeSent",
            "params": {
                "tabId": 2,
                "requestId": "r-7",
                "url": "https://example.com/app.js",
                "method": "GET",
                "kind": "script",
                "headers": [
                    { "name": "Accept", "value": "*/*" },
                    { "name": "Referer", "value": "https://example.com/" }
                ]
            }
        }"#;

        let event: Event = serde_json::from_str(json_str).expect("parse event");
        match event.parse() {
            ParsedEvent::NetworkRequestWillBeSent {
                request_id,
                kind,
                headers,
                ..
            } => {
                assert_eq!(request_id, "r-7");
                assert_eq!(kind, "script");
                assert_eq!(headers.len(), 2);
                assert_eq!(headers[0].0, "Accept");
            }
            other => panic!("unexpected parsed event: {other:?}"),
        }
    }

    #[test]
    fn test_response_event_keeps_duplicate_headers() {
        let json_str = r#"{
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "type": "event",
            "method": "network.responseReceived",
            "params": {
                "tabId": 2,
                "requestId": "r-0",
                "url": "https://example.com/",
                "status": 200,
                "statusText": "OK",
                "kind": "document",
                "headers": [
                    { "name": "Set-Cookie", "value": "a=1" },
                    { "name": "Set-Cookie", "value": "b=2" }
                ]
            }
        }"#;

        let event: Event = serde_json::from_str(json_str).expect("parse event");
        match event.parse() {
            ParsedEvent::NetworkResponseReceived {
                status, headers, ..
            } => {
                assert_eq!(status, 200);
                assert_eq!(headers.len(), 2);
                assert_eq!(headers[1].1, "b=2");
            }
            other => panic!("unexpected parsed event: {other:?}"),
        }
    }

    #[test]
    fn test_event_reply_patch_headers() {
        let id = CommandId::generate();
        let headers = vec![("Cookie".to_string(), "session=abc".to_string())];
        let reply = EventReply::patch_headers(id, "network.requestWillBeSent", &headers);
        let json = serde_json::to_string(&reply).expect("serialize");

        assert!(json.contains("replyTo"));
        assert!(json.contains("continue"));
        assert!(json.contains("session=abc"));
    }

    #[test]
    fn test_event_reply_proceed() {
        let id = CommandId::generate();
        let reply = EventReply::proceed(id, "network.requestWillBeSent");
        let json = serde_json::to_string(&reply).expect("serialize");

        assert!(json.contains("continue"));
        assert!(!json.contains("headers"));
    }

    #[test]
    fn test_navigation_failed_parsing() {
        let json_str = r#"{
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "type": "event",
            "method": "page.navigationFailed",
            "params": { "tabId": 3, "url": "https://down.invalid/", "error": "dns failure" }
        }"#;

        let event: Event = serde_json::from_str(json_str).expect("parse event");
        match event.parse() {
            ParsedEvent::PageNavigationFailed { tab_id, error, .. } => {
                assert_eq!(tab_id, 3);
                assert_eq!(error, "dns failure");
            }
            other => panic!("unexpected parsed event: {other:?}"),
        }
    }
}
