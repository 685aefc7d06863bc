//! Tab navigation engine.
//!
//! Owns one browser tab and fuses the host's independently-firing signals
//! (progress flags, DOM lifecycle events, timers) into a single ordered
//! phase timeline per navigation attempt, resolving each `load()` call to
//! exactly one [`LoadOutcome`].
//!
//! # Phase Timeline
//!
//! ```text
//! Idle → Init → Start → LoadStart → Ready → Loaded → FullyLoaded
//!          |______________________________|    |________|
//!                 start timeout                load timeout, then
//!                 (armed at Init,              the loadWait
//!                  cleared at Ready)           quiescence delay
//! ```
//!
//! Host event ordering is treated as adversarial: every transition is
//! guarded by `current phase < target phase`, so a late or re-ordered
//! signal can never regress the timeline. Each attempt owns its timers and
//! its single signal subscription; both are torn down exactly once, either
//! on the terminal phase or on `close()`.
//!
//! A second `load()` while one is in flight supersedes it: the previous
//! attempt is atomically invalidated (listeners unsubscribed, timers
//! cancelled, outcome resolved as failed) before the tab is touched for the
//! new navigation.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::TabId;
use crate::protocol::{
    Command, EventReply, NetworkCommand, PageCommand, ParsedEvent, ProgressState, Request,
    Response,
};
use crate::transport::{Connection, EventHandler, Notifier};

use super::auth::Credentials;
use super::cookie::CookieJar;
use super::events::{
    FailReason, LoadOutcome, NavigationEvents, NavigationPhase, PageEvent, TabState, WindowEvents,
};
use super::interceptor::{InterceptContext, NetworkInterceptor};
use super::session::PageSettings;

// ============================================================================
// Constants
// ============================================================================

/// Timeout for the host's tab-activation confirmation after a select.
const SELECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// PageSignal
// ============================================================================

/// Normalized host signal routed to the active attempt's watcher.
#[derive(Debug)]
enum PageSignal {
    /// Four-state transfer/document progress flag.
    Progress(ProgressState),
    /// DOM content parsed.
    ContentLoaded,
    /// Full load event.
    WindowLoad,
    /// Host reported the navigation unreachable or blocked.
    Failed(String),
}

// ============================================================================
// TabRouter
// ============================================================================

/// Per-tab routing state consulted by the connection's event handler.
///
/// The handler itself is installed once, at `open()`; what changes per
/// navigation attempt is the signal route and the interceptor instance.
/// Swapping either to `None` is how an attempt's subscription is torn down.
pub(crate) struct TabRouter {
    /// Signal route to the active attempt's watcher.
    signals: Mutex<Option<mpsc::UnboundedSender<PageSignal>>>,
    /// Interceptor for the active attempt.
    interceptor: Mutex<Option<Arc<NetworkInterceptor>>>,
    /// Waiter for the next tab-activation confirmation.
    activation: Mutex<Option<oneshot::Sender<()>>>,
}

impl TabRouter {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            signals: Mutex::new(None),
            interceptor: Mutex::new(None),
            activation: Mutex::new(None),
        })
    }

    /// Routes a signal to the active attempt, if any.
    fn signal(&self, signal: PageSignal) {
        if let Some(tx) = self.signals.lock().as_ref() {
            let _ = tx.send(signal);
        } else {
            trace!(?signal, "Signal with no active attempt");
        }
    }
}

// ============================================================================
// AttemptShared
// ============================================================================

/// State shared between one `load()` call, its watcher task, and anything
/// that may terminate the attempt (`close()`, a superseding `load()`).
///
/// The `finished` latch guarantees exactly-once completion: whoever flips
/// it first tears down the subscription, emits the terminal event and
/// resolves the outcome; everyone else no-ops.
struct AttemptShared {
    /// Target tab.
    tab_id: TabId,
    /// Exactly-once completion latch.
    finished: AtomicBool,
    /// Outcome channel back to the pending `load()` call.
    outcome_tx: Mutex<Option<oneshot::Sender<LoadOutcome>>>,
    /// Public event stream.
    events: broadcast::Sender<PageEvent>,
    /// Router whose route/interceptor slots this attempt occupies.
    router: Arc<TabRouter>,
    /// Tab state, shared with the engine.
    state: Arc<Mutex<TabState>>,
    /// Phase of this attempt, shared with the engine for observers.
    phase: Arc<Mutex<NavigationPhase>>,
    /// Fire-and-forget sender for the interception disable command.
    notifier: Notifier,
}

impl AttemptShared {
    /// Advances the phase if `target` is strictly ahead, emitting `event`.
    ///
    /// Returns `true` if the transition was taken. Out-of-order or late
    /// signals fall through here without effect.
    fn advance(&self, target: NavigationPhase, event: PageEvent) -> bool {
        if self.finished.load(Ordering::SeqCst) {
            return false;
        }

        {
            let mut phase = self.phase.lock();
            if phase.is_terminal() || *phase >= target {
                trace!(current = ?*phase, ?target, "Phase transition skipped");
                return false;
            }
            *phase = target;
        }

        debug!(tab_id = %self.tab_id, phase = ?target, "Navigation phase advanced");
        let _ = self.events.send(event);
        true
    }

    /// Completes the attempt exactly once.
    ///
    /// Tears down the signal route and interceptor, disables host-side
    /// interception, emits the terminal event, returns the tab to idle and
    /// resolves the pending outcome.
    fn finish(&self, outcome: LoadOutcome) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }

        *self.router.signals.lock() = None;
        *self.router.interceptor.lock() = None;
        self.notifier.notify(Request::new(
            self.tab_id,
            Command::Network(NetworkCommand::Disable),
        ));

        match &outcome {
            LoadOutcome::Success => {
                *self.phase.lock() = NavigationPhase::FullyLoaded;
            }
            LoadOutcome::Fail(reason) => {
                *self.phase.lock() = NavigationPhase::Failed;
                debug!(tab_id = %self.tab_id, reason = %reason, "Navigation failed");
                let _ = self.events.send(PageEvent::LoadFail(reason.clone()));
            }
        }

        {
            let mut state = self.state.lock();
            if *state == TabState::Navigating {
                *state = TabState::Idle;
            }
        }

        if let Some(tx) = self.outcome_tx.lock().take() {
            let _ = tx.send(outcome);
        }
    }
}

// ============================================================================
// AttemptHandle
// ============================================================================

/// Handle to an in-flight navigation attempt.
struct AttemptHandle {
    shared: Arc<AttemptShared>,
    watcher: JoinHandle<()>,
}

impl AttemptHandle {
    /// Terminates the attempt with `reason`, synchronously.
    ///
    /// The completion latch fires before the watcher is aborted, so no
    /// stale timer or signal can act against a successor attempt.
    fn invalidate(self, reason: FailReason) {
        self.shared.finish(LoadOutcome::Fail(reason));
        self.watcher.abort();
    }
}

// ============================================================================
// Tab
// ============================================================================

/// Internal shared state for a tab engine.
pub(crate) struct TabInner {
    /// Connection to the host engine.
    connection: Connection,
    /// Public event stream.
    events: broadcast::Sender<PageEvent>,
    /// Coarse lifecycle state.
    state: Arc<Mutex<TabState>>,
    /// Phase of the active (or last) navigation attempt.
    phase: Arc<Mutex<NavigationPhase>>,
    /// Host tab handle, set by `open()`.
    tab_id: Mutex<Option<TabId>>,
    /// Per-tab event routing.
    router: Arc<TabRouter>,
    /// Timeouts and capture configuration, shared with the session.
    settings: Arc<Mutex<PageSettings>>,
    /// Session cookie jar, consulted by the interceptor.
    jar: Arc<Mutex<CookieJar>>,
    /// Session credentials, consulted by the interceptor.
    credentials: Arc<Mutex<Option<Credentials>>>,
    /// Base URL of the current navigation.
    base_url: Arc<Mutex<Option<Url>>>,
    /// Active navigation attempt.
    attempt: Mutex<Option<AttemptHandle>>,
    /// Monotonic attempt sequence; a newer number supersedes older calls.
    attempt_seq: AtomicU64,
}

/// One browser tab driven through its navigation phases.
///
/// Created by a page session; the host tab itself is allocated lazily by
/// [`Tab::open`] and destroyed by [`Tab::close`].
#[derive(Clone)]
pub struct Tab {
    pub(crate) inner: Arc<TabInner>,
}

impl fmt::Debug for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tab")
            .field("tab_id", &*self.inner.tab_id.lock())
            .field("state", &*self.inner.state.lock())
            .field("phase", &*self.inner.phase.lock())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tab - Construction
// ============================================================================

impl Tab {
    /// Creates a tab engine bound to a connection.
    ///
    /// No host tab is allocated until [`Tab::open`].
    pub(crate) fn new(
        connection: Connection,
        events: broadcast::Sender<PageEvent>,
        settings: Arc<Mutex<PageSettings>>,
        jar: Arc<Mutex<CookieJar>>,
        credentials: Arc<Mutex<Option<Credentials>>>,
        base_url: Arc<Mutex<Option<Url>>>,
    ) -> Self {
        Self {
            inner: Arc::new(TabInner {
                connection,
                events,
                state: Arc::new(Mutex::new(TabState::Unopened)),
                phase: Arc::new(Mutex::new(NavigationPhase::Idle)),
                tab_id: Mutex::new(None),
                router: TabRouter::new(),
                settings,
                jar,
                credentials,
                base_url,
                attempt: Mutex::new(None),
                attempt_seq: AtomicU64::new(0),
            }),
        }
    }
}

// ============================================================================
// Tab - Accessors
// ============================================================================

impl Tab {
    /// Returns the host tab handle, if the tab is open.
    #[inline]
    #[must_use]
    pub fn tab_id(&self) -> Option<TabId> {
        *self.inner.tab_id.lock()
    }

    /// Returns the coarse lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> TabState {
        *self.inner.state.lock()
    }

    /// Returns the phase of the active (or last) navigation attempt.
    #[inline]
    #[must_use]
    pub fn phase(&self) -> NavigationPhase {
        *self.inner.phase.lock()
    }

    /// Subscribes to the tab's event stream.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<PageEvent> {
        self.inner.events.subscribe()
    }

    /// Returns the open tab handle or fails with [`Error::TabNotOpen`].
    fn require_open(&self) -> Result<TabId> {
        match *self.inner.state.lock() {
            TabState::Idle | TabState::Navigating => {
                (*self.inner.tab_id.lock()).ok_or(Error::TabNotOpen)
            }
            TabState::Unopened | TabState::Closed => Err(Error::TabNotOpen),
        }
    }

    /// Emits a public event with a debug trace.
    fn emit(&self, event: PageEvent) {
        debug!(event = event.name(), "Page event");
        let _ = self.inner.events.send(event);
    }

    /// Sends a tab-scoped command.
    pub(crate) async fn send(&self, tab_id: TabId, command: Command) -> Result<Response> {
        self.inner.connection.send(Request::new(tab_id, command)).await
    }
}

// ============================================================================
// Tab - Open / Select / Close
// ============================================================================

impl Tab {
    /// Allocates a host tab.
    ///
    /// Emits `opened` once the tab exists, then `openReady` once its initial
    /// empty document has settled (the host confirms both in its response;
    /// tab creation is synchronous on the host side and carries no timeout
    /// of its own). Calling `open()` on an already-open tab is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Navigation`] if the host refuses tab creation.
    pub async fn open(&self) -> Result<()> {
        match *self.inner.state.lock() {
            TabState::Idle | TabState::Navigating => return Ok(()),
            TabState::Unopened | TabState::Closed => {}
        }

        let response = self
            .inner
            .connection
            .send(Request::session(Command::Page(PageCommand::OpenTab)))
            .await?;

        if response.is_error() {
            let message = response
                .message
                .unwrap_or_else(|| "host refused tab creation".to_string());
            return Err(Error::navigation(message));
        }

        let raw = response.get_u64("tabId") as u32;
        let tab_id =
            TabId::new(raw).ok_or_else(|| Error::protocol("Invalid tabId in openTab response"))?;

        *self.inner.tab_id.lock() = Some(tab_id);
        self.inner
            .connection
            .register_tab(tab_id, self.event_handler());
        *self.inner.state.lock() = TabState::Idle;
        *self.inner.phase.lock() = NavigationPhase::Idle;

        debug!(tab_id = %tab_id, "Tab opened");
        self.emit(PageEvent::Opened);
        self.emit(PageEvent::OpenReady);
        Ok(())
    }

    /// Brings the tab to the foreground.
    ///
    /// Emits `selected` immediately if the tab was already foregrounded,
    /// otherwise after the host's activation confirmation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TabNotOpen`] if the tab is not open, or
    /// [`Error::Timeout`] if the host never confirms activation.
    pub async fn select(&self) -> Result<()> {
        let tab_id = self.require_open()?;

        let (tx, rx) = oneshot::channel();
        *self.inner.router.activation.lock() = Some(tx);

        let response = self
            .send(tab_id, Command::Page(PageCommand::SelectTab))
            .await?;

        if response.is_error() {
            *self.inner.router.activation.lock() = None;
            let message = response
                .message
                .unwrap_or_else(|| "select failed".to_string());
            return Err(Error::protocol(message));
        }

        if response.get_bool("wasActive") {
            *self.inner.router.activation.lock() = None;
            self.emit(PageEvent::Selected);
            return Ok(());
        }

        match timeout(SELECT_TIMEOUT, rx).await {
            Ok(Ok(())) => {
                self.emit(PageEvent::Selected);
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                *self.inner.router.activation.lock() = None;
                Err(Error::timeout(
                    "tab activation",
                    SELECT_TIMEOUT.as_millis() as u64,
                ))
            }
        }
    }

    /// Tears down the host tab.
    ///
    /// Stops any in-flight load, removes interceptor registrations, cancels
    /// pending timers and emits `closed`. Idempotent: closing an
    /// already-closed or never-opened tab emits `closed` again without
    /// touching host state, and never errors.
    pub async fn close(&self) -> Result<()> {
        self.abort_attempt(FailReason::Aborted);
        *self.inner.router.activation.lock() = None;

        let tab_id = self.inner.tab_id.lock().take();
        if let Some(tab_id) = tab_id {
            self.inner.connection.unregister_tab(tab_id);
            // Best-effort: the tab is gone for us whatever the host says.
            if let Err(e) = self.send(tab_id, Command::Page(PageCommand::CloseTab)).await {
                debug!(tab_id = %tab_id, error = %e, "CloseTab command failed");
            }
            debug!(tab_id = %tab_id, "Tab closed");
        }

        *self.inner.state.lock() = TabState::Closed;
        self.emit(PageEvent::Closed);
        Ok(())
    }

    /// Invalidates the current attempt, if any.
    fn abort_attempt(&self, reason: FailReason) {
        if let Some(attempt) = self.inner.attempt.lock().take() {
            attempt.invalidate(reason);
        }
    }
}

// ============================================================================
// Tab - Load
// ============================================================================

impl Tab {
    /// Begins a navigation attempt.
    ///
    /// The tab is always forced to a neutral blank state first, to avoid
    /// racing any in-flight previous navigation. A previous attempt still
    /// in flight is superseded: atomically invalidated before the blanking
    /// step, and its pending `load()` resolves as failed.
    ///
    /// Resolves exactly once, to [`LoadOutcome::Success`] when the page
    /// reaches the fully-loaded phase, or [`LoadOutcome::Fail`] on timeout
    /// or host navigation error. Timeouts are outcomes, not `Err` values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TabNotOpen`] if the tab is not open,
    /// [`Error::InvalidArgument`] for an unparseable URL, or a transport
    /// error if the host connection breaks.
    pub async fn load(&self, url: &str) -> Result<LoadOutcome> {
        let tab_id = self.require_open()?;
        let target = Url::parse(url)
            .map_err(|e| Error::invalid_argument(format!("invalid URL {url:?}: {e}")))?;

        let seq = self.inner.attempt_seq.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(tab_id = %tab_id, url = %url, seq, "Navigation requested");

        // Atomically invalidate any previous attempt before touching the
        // tab, so no stale listener can fire against this attempt's state.
        self.abort_attempt(FailReason::Superseded);

        *self.inner.base_url.lock() = Some(target);

        // Neutral blank state before navigating. The blanking step has no
        // timer of its own; only a superseding load() cancels it.
        self.send(tab_id, Command::Page(PageCommand::Blank)).await?;
        if self.inner.attempt_seq.load(Ordering::SeqCst) != seq {
            return Ok(LoadOutcome::Fail(FailReason::Superseded));
        }

        let (start_timeout, load_timeout, load_wait, capture_types) = {
            let settings = self.inner.settings.lock();
            (
                settings.start_timeout,
                settings.load_timeout,
                settings.load_wait,
                settings.capture_types.clone(),
            )
        };

        let interceptor = NetworkInterceptor::new(InterceptContext {
            tab_id,
            jar: Arc::clone(&self.inner.jar),
            credentials: Arc::clone(&self.inner.credentials),
            base_url: Arc::clone(&self.inner.base_url),
            capture_types,
            events: self.inner.events.clone(),
            notifier: self.inner.connection.notifier(),
        });

        let shared = Arc::new(AttemptShared {
            tab_id,
            finished: AtomicBool::new(false),
            outcome_tx: Mutex::new(None),
            events: self.inner.events.clone(),
            router: Arc::clone(&self.inner.router),
            state: Arc::clone(&self.inner.state),
            phase: Arc::clone(&self.inner.phase),
            notifier: self.inner.connection.notifier(),
        });

        let (outcome_tx, outcome_rx) = oneshot::channel();
        *shared.outcome_tx.lock() = Some(outcome_tx);

        // Register the attempt: signal route, interceptor, watcher. The
        // sequence re-check under the lock closes the window in which a
        // concurrent load() could have superseded us during the blank.
        {
            let mut attempt = self.inner.attempt.lock();
            if self.inner.attempt_seq.load(Ordering::SeqCst) != seq {
                return Ok(LoadOutcome::Fail(FailReason::Superseded));
            }

            let (signal_tx, signal_rx) = mpsc::unbounded_channel();
            *self.inner.router.signals.lock() = Some(signal_tx);
            *self.inner.router.interceptor.lock() = Some(interceptor);
            *self.inner.state.lock() = TabState::Navigating;
            *self.inner.phase.lock() = NavigationPhase::Init;

            // Emitted before the watcher exists so `init` always precedes
            // any event the attempt can produce, even with a zero timeout.
            self.emit(PageEvent::Init);

            let watcher = tokio::spawn(run_watcher(
                Arc::clone(&shared),
                signal_rx,
                start_timeout,
                load_timeout,
                load_wait,
            ));

            *attempt = Some(AttemptHandle {
                shared: Arc::clone(&shared),
                watcher,
            });
        }

        if let Err(e) = self.begin_navigation(tab_id, url).await {
            self.abort_attempt(FailReason::Aborted);
            return Err(e);
        }

        let outcome = outcome_rx.await?;
        debug!(tab_id = %tab_id, url = %url, ?outcome, "Navigation resolved");
        Ok(outcome)
    }

    /// Enables interception and issues the navigation command.
    ///
    /// A host-side error response counts as a navigation failure for the
    /// attempt, not a caller-facing error.
    async fn begin_navigation(&self, tab_id: TabId, url: &str) -> Result<()> {
        self.send(tab_id, Command::Network(NetworkCommand::Enable))
            .await?;

        let response = self
            .send(
                tab_id,
                Command::Page(PageCommand::Navigate {
                    url: url.to_string(),
                }),
            )
            .await?;

        if response.is_error() {
            warn!(tab_id = %tab_id, url = %url, "Host rejected navigation");
            self.inner.router.signal(PageSignal::Failed(
                response.message.unwrap_or_else(|| "rejected".to_string()),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Tab - Event Handler
// ============================================================================

impl Tab {
    /// Builds the per-tab event handler installed at `open()`.
    ///
    /// Lifecycle signals go to the active attempt's watcher; network events
    /// go to the active interceptor. A request event observed with no
    /// interceptor registered is answered with an unmodified continue so
    /// the host never stalls.
    fn event_handler(&self) -> EventHandler {
        let router = Arc::clone(&self.inner.router);

        Box::new(move |event| {
            let parsed = event.parse();
            match parsed {
                ParsedEvent::PageProgress { state, .. } => {
                    router.signal(PageSignal::Progress(state));
                    None
                }

                ParsedEvent::PageContentLoaded { .. } => {
                    router.signal(PageSignal::ContentLoaded);
                    None
                }

                ParsedEvent::PageLoad { .. } => {
                    router.signal(PageSignal::WindowLoad);
                    None
                }

                ParsedEvent::PageNavigationFailed { error, .. } => {
                    router.signal(PageSignal::Failed(error));
                    None
                }

                ParsedEvent::PageTabActivated { .. } => {
                    if let Some(tx) = router.activation.lock().take() {
                        let _ = tx.send(());
                    }
                    None
                }

                ParsedEvent::NetworkRequestWillBeSent {
                    request_id,
                    url,
                    method,
                    kind,
                    headers,
                    ..
                } => {
                    let interceptor = router.interceptor.lock().clone();
                    match interceptor {
                        Some(interceptor) => {
                            let patched =
                                interceptor.on_request(&request_id, &url, &method, &kind, headers);
                            Some(EventReply::patch_headers(
                                event.id,
                                event.method.as_str(),
                                &patched,
                            ))
                        }
                        None => Some(EventReply::proceed(event.id, event.method.as_str())),
                    }
                }

                ParsedEvent::NetworkResponseReceived {
                    request_id,
                    url,
                    status,
                    status_text,
                    kind,
                    headers,
                    ..
                } => {
                    let interceptor = router.interceptor.lock().clone();
                    if let Some(interceptor) = interceptor {
                        interceptor.on_response(
                            &request_id,
                            &url,
                            status,
                            &status_text,
                            &kind,
                            headers,
                        );
                    }
                    None
                }

                ParsedEvent::Unknown { method, .. } => {
                    trace!(method = %method, "Unhandled host event");
                    None
                }
            }
        })
    }
}

// ============================================================================
// Capability Impls
// ============================================================================

impl NavigationEvents for Tab {
    fn navigation_phase(&self) -> NavigationPhase {
        self.phase()
    }

    fn navigation_events(&self) -> broadcast::Receiver<PageEvent> {
        self.events()
    }
}

impl WindowEvents for Tab {
    fn window_state(&self) -> TabState {
        self.state()
    }

    fn window_events(&self) -> broadcast::Receiver<PageEvent> {
        self.events()
    }
}

// ============================================================================
// Watcher
// ============================================================================

/// Which failure (or success) the single live timer represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerRole {
    /// Armed at Init, cleared at Ready: expiry is a start timeout.
    Start,
    /// Armed at Ready, cleared at Loaded: expiry is a load timeout.
    Load,
    /// Armed at Loaded: expiry is the quiescence delay completing.
    Settle,
}

/// Drives one navigation attempt's phase timeline.
///
/// At any moment exactly one timer window is relevant, so a single deadline
/// plus its role replaces separate handles; re-arming the deadline is what
/// "clears" the previous window. The select is biased toward the timer so a
/// zero timeout always loses the race against queued signals.
async fn run_watcher(
    shared: Arc<AttemptShared>,
    mut signals: mpsc::UnboundedReceiver<PageSignal>,
    start_timeout: Duration,
    load_timeout: Duration,
    load_wait: Duration,
) {
    let mut role = TimerRole::Start;
    let mut deadline = Instant::now() + start_timeout;
    let mut stopped_network = false;
    let mut stopped_window = false;

    loop {
        tokio::select! {
            biased;

            _ = sleep_until(deadline) => match role {
                TimerRole::Start => {
                    shared.finish(LoadOutcome::Fail(FailReason::StartTimeout));
                    return;
                }
                TimerRole::Load => {
                    shared.finish(LoadOutcome::Fail(FailReason::LoadTimeout));
                    return;
                }
                TimerRole::Settle => {
                    shared.advance(NavigationPhase::FullyLoaded, PageEvent::FullLoad);
                    shared.finish(LoadOutcome::Success);
                    return;
                }
            },

            signal = signals.recv() => {
                // Route torn down: the attempt was invalidated externally.
                let Some(signal) = signal else { return };

                match signal {
                    PageSignal::Progress(ProgressState::StartTransfer) => {
                        shared.advance(NavigationPhase::Start, PageEvent::Start);
                    }

                    PageSignal::Progress(ProgressState::StartWindow) => {
                        shared.advance(NavigationPhase::LoadStart, PageEvent::LoadStart);
                    }

                    PageSignal::ContentLoaded => {
                        if shared.advance(NavigationPhase::Ready, PageEvent::Ready) {
                            role = TimerRole::Load;
                            deadline = Instant::now() + load_timeout;
                        }
                    }

                    PageSignal::WindowLoad => {
                        if shared.advance(NavigationPhase::Loaded, PageEvent::Load) {
                            role = TimerRole::Settle;
                            deadline = Instant::now() + load_wait;
                        }
                    }

                    // Both stop flags observed is an alternate loaded signal
                    // for hosts whose window-load event goes missing.
                    PageSignal::Progress(ProgressState::StopNetwork) => {
                        stopped_network = true;
                        if stopped_window
                            && shared.advance(NavigationPhase::Loaded, PageEvent::Load)
                        {
                            role = TimerRole::Settle;
                            deadline = Instant::now() + load_wait;
                        }
                    }

                    PageSignal::Progress(ProgressState::StopWindow) => {
                        stopped_window = true;
                        if stopped_network
                            && shared.advance(NavigationPhase::Loaded, PageEvent::Load)
                        {
                            role = TimerRole::Settle;
                            deadline = Instant::now() + load_wait;
                        }
                    }

                    PageSignal::Failed(error) => {
                        debug!(tab_id = %shared.tab_id, error = %error, "Host navigation error");
                        shared.finish(LoadOutcome::Fail(FailReason::Unreachable));
                        return;
                    }
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::page::interceptor::ResourceKind;

    #[test]
    fn test_tab_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<Tab>();
    }

    fn attempt(events: broadcast::Sender<PageEvent>) -> Arc<AttemptShared> {
        Arc::new(AttemptShared {
            tab_id: TabId::new(1).expect("valid tab id"),
            finished: AtomicBool::new(false),
            outcome_tx: Mutex::new(None),
            events,
            router: TabRouter::new(),
            state: Arc::new(Mutex::new(TabState::Navigating)),
            phase: Arc::new(Mutex::new(NavigationPhase::Init)),
            notifier: Connection::dead().notifier(),
        })
    }

    #[test]
    fn test_advance_is_monotonic() {
        let (events, _rx) = broadcast::channel(16);
        let shared = attempt(events);

        assert!(shared.advance(NavigationPhase::Start, PageEvent::Start));
        assert!(shared.advance(NavigationPhase::Ready, PageEvent::Ready));
        // A late LoadStart signal must not regress the timeline.
        assert!(!shared.advance(NavigationPhase::LoadStart, PageEvent::LoadStart));
        assert_eq!(*shared.phase.lock(), NavigationPhase::Ready);
    }

    #[test]
    fn test_advance_skips_intermediate_phases() {
        let (events, _rx) = broadcast::channel(16);
        let shared = attempt(events);

        // Adversarial ordering: window-start before transfer-start.
        assert!(shared.advance(NavigationPhase::LoadStart, PageEvent::LoadStart));
        assert!(!shared.advance(NavigationPhase::Start, PageEvent::Start));
    }

    #[test]
    fn test_finish_is_exactly_once() {
        let (events, mut rx) = broadcast::channel(16);
        let shared = attempt(events);

        shared.finish(LoadOutcome::Fail(FailReason::StartTimeout));
        shared.finish(LoadOutcome::Fail(FailReason::LoadTimeout));
        shared.finish(LoadOutcome::Success);

        // Only the first completion emitted an event.
        assert!(matches!(
            rx.try_recv(),
            Ok(PageEvent::LoadFail(FailReason::StartTimeout))
        ));
        assert!(rx.try_recv().is_err());
        assert_eq!(*shared.phase.lock(), NavigationPhase::Failed);
    }

    #[test]
    fn test_finish_blocks_further_advances() {
        let (events, _rx) = broadcast::channel(16);
        let shared = attempt(events);

        shared.finish(LoadOutcome::Fail(FailReason::Unreachable));
        assert!(!shared.advance(NavigationPhase::Ready, PageEvent::Ready));
        assert_eq!(*shared.phase.lock(), NavigationPhase::Failed);
    }

    #[test]
    fn test_finish_tears_down_router_slots() {
        let (events, _rx) = broadcast::channel(16);
        let shared = attempt(events.clone());

        let (signal_tx, _signal_rx) = mpsc::unbounded_channel();
        *shared.router.signals.lock() = Some(signal_tx);
        *shared.router.interceptor.lock() = Some(NetworkInterceptor::new(InterceptContext {
            tab_id: TabId::new(1).expect("valid tab id"),
            jar: Arc::new(Mutex::new(CookieJar::new())),
            credentials: Arc::new(Mutex::new(None)),
            base_url: Arc::new(Mutex::new(None)),
            capture_types: ResourceKind::all(),
            events,
            notifier: Connection::dead().notifier(),
        }));

        shared.finish(LoadOutcome::Success);

        assert!(shared.router.signals.lock().is_none());
        assert!(shared.router.interceptor.lock().is_none());
    }

    #[tokio::test]
    async fn test_watcher_zero_start_timeout_fails_before_signals() {
        let (events, _rx) = broadcast::channel(16);
        let shared = attempt(events);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        *shared.outcome_tx.lock() = Some(outcome_tx);

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        // Signals already queued must still lose to the expired timer.
        signal_tx
            .send(PageSignal::Progress(ProgressState::StartTransfer))
            .expect("queued");
        signal_tx.send(PageSignal::ContentLoaded).expect("queued");

        let watcher = tokio::spawn(run_watcher(
            Arc::clone(&shared),
            signal_rx,
            Duration::ZERO,
            Duration::from_secs(30),
            Duration::from_millis(500),
        ));

        let outcome = outcome_rx.await.expect("outcome resolved");
        assert_eq!(outcome, LoadOutcome::Fail(FailReason::StartTimeout));
        assert_eq!(*shared.phase.lock(), NavigationPhase::Failed);
        watcher.await.expect("watcher exits");
    }

    #[tokio::test]
    async fn test_watcher_full_success_sequence() {
        let (events, mut rx) = broadcast::channel(64);
        let shared = attempt(events);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        *shared.outcome_tx.lock() = Some(outcome_tx);

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let watcher = tokio::spawn(run_watcher(
            Arc::clone(&shared),
            signal_rx,
            Duration::from_secs(5),
            Duration::from_secs(30),
            Duration::from_millis(10),
        ));

        signal_tx
            .send(PageSignal::Progress(ProgressState::StartTransfer))
            .expect("send");
        signal_tx
            .send(PageSignal::Progress(ProgressState::StartWindow))
            .expect("send");
        signal_tx.send(PageSignal::ContentLoaded).expect("send");
        signal_tx.send(PageSignal::WindowLoad).expect("send");

        let outcome = outcome_rx.await.expect("outcome resolved");
        assert_eq!(outcome, LoadOutcome::Success);
        assert_eq!(*shared.phase.lock(), NavigationPhase::FullyLoaded);

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        assert_eq!(
            names,
            vec!["start", "loadStart", "ready", "load", "fullLoad"]
        );
        watcher.await.expect("watcher exits");
    }

    #[tokio::test]
    async fn test_watcher_load_timeout_after_ready() {
        let (events, _rx) = broadcast::channel(64);
        let shared = attempt(events);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        *shared.outcome_tx.lock() = Some(outcome_tx);

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let watcher = tokio::spawn(run_watcher(
            Arc::clone(&shared),
            signal_rx,
            Duration::from_secs(5),
            Duration::from_millis(20), // short load window
            Duration::from_millis(500),
        ));

        signal_tx
            .send(PageSignal::Progress(ProgressState::StartTransfer))
            .expect("send");
        signal_tx.send(PageSignal::ContentLoaded).expect("send");
        // No WindowLoad: the load window must expire.

        let outcome = outcome_rx.await.expect("outcome resolved");
        assert_eq!(outcome, LoadOutcome::Fail(FailReason::LoadTimeout));
        watcher.await.expect("watcher exits");
    }

    #[tokio::test]
    async fn test_watcher_stop_flags_substitute_for_window_load() {
        let (events, _rx) = broadcast::channel(64);
        let shared = attempt(events);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        *shared.outcome_tx.lock() = Some(outcome_tx);

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let watcher = tokio::spawn(run_watcher(
            Arc::clone(&shared),
            signal_rx,
            Duration::from_secs(5),
            Duration::from_secs(30),
            Duration::from_millis(10),
        ));

        signal_tx
            .send(PageSignal::Progress(ProgressState::StartTransfer))
            .expect("send");
        signal_tx.send(PageSignal::ContentLoaded).expect("send");
        signal_tx
            .send(PageSignal::Progress(ProgressState::StopNetwork))
            .expect("send");
        signal_tx
            .send(PageSignal::Progress(ProgressState::StopWindow))
            .expect("send");

        let outcome = outcome_rx.await.expect("outcome resolved");
        assert_eq!(outcome, LoadOutcome::Success);
        watcher.await.expect("watcher exits");
    }

    #[tokio::test]
    async fn test_watcher_host_failure_before_start() {
        let (events, mut rx) = broadcast::channel(64);
        let shared = attempt(events);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        *shared.outcome_tx.lock() = Some(outcome_tx);

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let watcher = tokio::spawn(run_watcher(
            Arc::clone(&shared),
            signal_rx,
            Duration::from_secs(5),
            Duration::from_secs(30),
            Duration::from_millis(500),
        ));

        signal_tx
            .send(PageSignal::Failed("dns failure".to_string()))
            .expect("send");

        let outcome = outcome_rx.await.expect("outcome resolved");
        assert_eq!(outcome, LoadOutcome::Fail(FailReason::Unreachable));
        assert!(matches!(
            rx.try_recv(),
            Ok(PageEvent::LoadFail(FailReason::Unreachable))
        ));
        watcher.await.expect("watcher exits");
    }
}
