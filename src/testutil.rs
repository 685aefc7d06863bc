//! In-process mock host engine for integration-style tests.
//!
//! Speaks the wire protocol over a real WebSocket: READY handshake,
//! command responses, scripted navigation event sequences, and recording of
//! the engine's interception replies so tests can assert on the headers
//! that would actually have been sent.

// ============================================================================
// Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use url::Url;
use uuid::Uuid;

// ============================================================================
// HostScript
// ============================================================================

/// Scripted behavior for the mock host.
#[derive(Debug, Clone)]
pub(crate) struct HostScript {
    /// Value returned for every `script.evaluate` command.
    pub fixture_text: String,
    /// `Set-Cookie` headers on the main document response.
    pub set_cookies: Vec<String>,
    /// Extra `(url, kind)` requests emitted during a navigation.
    pub subresources: Vec<(String, String)>,
    /// Hosts whose navigation fails with `page.navigationFailed`.
    pub fail_hosts: Vec<String>,
    /// Hosts whose navigation produces no signals at all.
    pub silent_hosts: Vec<String>,
    /// How long a silent navigation occupies the host.
    pub silent_delay: Duration,
    /// `wasActive` answer for `page.selectTab`.
    pub was_active: bool,
}

impl Default for HostScript {
    fn default() -> Self {
        Self {
            fixture_text: "Mock fixture page text".to_string(),
            set_cookies: Vec::new(),
            subresources: Vec::new(),
            fail_hosts: Vec::new(),
            silent_hosts: Vec::new(),
            silent_delay: Duration::from_millis(300),
            was_active: true,
        }
    }
}

// ============================================================================
// MockHost
// ============================================================================

/// Recorded request header sets, keyed by request URL.
type RecordedRequests = Arc<Mutex<Vec<(String, Vec<(String, String)>)>>>;

/// A mock host engine listening on a local port.
pub(crate) struct MockHost {
    /// WebSocket URL to connect the engine under test to.
    pub ws_url: String,
    /// Headers the engine replied with, per request URL, in arrival order.
    pub request_headers: RecordedRequests,
    handle: JoinHandle<()>,
}

/// Installs a test log subscriber once; later calls are no-ops.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl MockHost {
    /// Binds a local port and serves one connection with the given script.
    pub(crate) async fn spawn(script: HostScript) -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        let ws_url = format!("ws://127.0.0.1:{port}");

        let request_headers: RecordedRequests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&request_headers);

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let ws = tokio_tungstenite::accept_async(stream)
                .await
                .expect("websocket upgrade");
            run_host(ws, script, recorded).await;
        });

        Self {
            ws_url,
            request_headers,
            handle,
        }
    }

    /// Waits until the engine has replied to at least `n` requests.
    pub(crate) async fn wait_for_requests(&self, n: usize) {
        for _ in 0..400 {
            if self.request_headers.lock().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("mock host never saw {n} request replies");
    }

    /// Returns the replied headers for a request URL.
    pub(crate) fn headers_for(&self, url: &str) -> Option<Vec<(String, String)>> {
        self.request_headers
            .lock()
            .iter()
            .find(|(u, _)| u == url)
            .map(|(_, headers)| headers.clone())
    }
}

impl Drop for MockHost {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ============================================================================
// Host Loop
// ============================================================================

async fn run_host(
    mut ws: WebSocketStream<TcpStream>,
    script: HostScript,
    recorded: RecordedRequests,
) {
    // READY handshake: nil UUID, as the engine expects.
    let ready = json!({
        "id": Uuid::nil().to_string(),
        "type": "success",
        "result": { "sessionId": 1, "engine": "mockhost/1.0" }
    });
    if ws.send(Message::Text(ready.to_string().into())).await.is_err() {
        return;
    }

    // Event id -> request URL, for correlating interception replies.
    let mut pending: HashMap<String, String> = HashMap::new();
    let mut next_tab: u64 = 1;
    let mut next_request: u64 = 0;

    while let Some(Ok(message)) = ws.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<Value>(&text) else {
            continue;
        };

        // Interception reply from the engine: record the final headers.
        if value.get("replyTo").is_some() {
            let id = value
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            if let Some(url) = pending.remove(&id) {
                let headers = value
                    .get("result")
                    .and_then(|r| r.get("headers"))
                    .and_then(|h| h.as_array())
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|entry| {
                                Some((
                                    entry.get("name")?.as_str()?.to_string(),
                                    entry.get("value")?.as_str()?.to_string(),
                                ))
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                recorded.lock().push((url, headers));
            }
            continue;
        }

        let id = value
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let method = value
            .get("method")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let tab = value.get("tabId").and_then(|v| v.as_u64()).unwrap_or(1);

        match method.as_str() {
            "page.openTab" => {
                let tab_id = next_tab;
                next_tab += 1;
                respond(&mut ws, &id, json!({ "tabId": tab_id })).await;
            }

            "page.blank" | "network.enable" | "network.disable" | "page.closeTab" => {
                respond(&mut ws, &id, json!({})).await;
            }

            "page.selectTab" => {
                respond(&mut ws, &id, json!({ "wasActive": script.was_active })).await;
                if !script.was_active {
                    emit(&mut ws, "page.tabActivated", json!({ "tabId": tab })).await;
                }
            }

            "script.evaluate" | "script.evaluateAsync" => {
                respond(&mut ws, &id, json!({ "value": script.fixture_text })).await;
            }

            "session.status" => {
                respond(&mut ws, &id, json!({ "ok": true })).await;
            }

            "page.navigate" => {
                let url = value
                    .get("params")
                    .and_then(|p| p.get("url"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                respond(&mut ws, &id, json!({})).await;
                drive_navigation(&mut ws, &script, &mut pending, &mut next_request, tab, &url)
                    .await;
            }

            // security.clearStrictTransport and anything else: notifications,
            // no response expected.
            _ => {}
        }
    }
}

/// Plays the scripted event sequence for one navigation.
async fn drive_navigation(
    ws: &mut WebSocketStream<TcpStream>,
    script: &HostScript,
    pending: &mut HashMap<String, String>,
    next_request: &mut u64,
    tab: u64,
    url: &str,
) {
    let host = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();

    if script.silent_hosts.contains(&host) {
        tokio::time::sleep(script.silent_delay).await;
        return;
    }

    if script.fail_hosts.contains(&host) {
        emit(
            ws,
            "page.navigationFailed",
            json!({ "tabId": tab, "url": url, "error": "unreachable" }),
        )
        .await;
        return;
    }

    let main_id = send_request_event(ws, pending, next_request, tab, url, "document").await;
    for (sub_url, kind) in &script.subresources {
        send_request_event(ws, pending, next_request, tab, sub_url, kind).await;
    }

    emit(
        ws,
        "page.progress",
        json!({ "tabId": tab, "state": "startTransfer" }),
    )
    .await;
    emit(
        ws,
        "page.progress",
        json!({ "tabId": tab, "state": "startWindow" }),
    )
    .await;

    let mut headers = vec![json!({ "name": "Content-Type", "value": "text/html" })];
    for cookie in &script.set_cookies {
        headers.push(json!({ "name": "Set-Cookie", "value": cookie }));
    }
    emit(
        ws,
        "network.responseReceived",
        json!({
            "tabId": tab,
            "requestId": main_id,
            "url": url,
            "status": 200,
            "statusText": "OK",
            "kind": "document",
            "headers": headers,
        }),
    )
    .await;

    emit(ws, "page.contentLoaded", json!({ "tabId": tab, "url": url })).await;
    emit(ws, "page.load", json!({ "tabId": tab, "url": url })).await;
    emit(
        ws,
        "page.progress",
        json!({ "tabId": tab, "state": "stopNetwork" }),
    )
    .await;
    emit(
        ws,
        "page.progress",
        json!({ "tabId": tab, "state": "stopWindow" }),
    )
    .await;
}

/// Emits a `network.requestWillBeSent` event and returns its host request id.
async fn send_request_event(
    ws: &mut WebSocketStream<TcpStream>,
    pending: &mut HashMap<String, String>,
    next_request: &mut u64,
    tab: u64,
    url: &str,
    kind: &str,
) -> String {
    let host_id = format!("h-{}", *next_request);
    *next_request += 1;

    let event_id = Uuid::new_v4().to_string();
    pending.insert(event_id.clone(), url.to_string());

    let event = json!({
        "id": event_id,
        "type": "event",
        "method": "network.requestWillBeSent",
        "params": {
            "tabId": tab,
            "requestId": host_id,
            "url": url,
            "method": "GET",
            "kind": kind,
            "headers": [ { "name": "Accept", "value": "*/*" } ],
        }
    });
    let _ = ws.send(Message::Text(event.to_string().into())).await;
    host_id
}

/// Sends a success response.
async fn respond(ws: &mut WebSocketStream<TcpStream>, id: &str, result: Value) {
    let response = json!({ "id": id, "type": "success", "result": result });
    let _ = ws.send(Message::Text(response.to_string().into())).await;
}

/// Sends an event.
async fn emit(ws: &mut WebSocketStream<TcpStream>, method: &str, params: Value) {
    let event = json!({
        "id": Uuid::new_v4().to_string(),
        "type": "event",
        "method": method,
        "params": params,
    });
    let _ = ws.send(Message::Text(event.to_string().into())).await;
}
