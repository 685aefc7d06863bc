//! Public page lifecycle events, navigation phases and load outcomes.
//!
//! Every signal the engine emits flows through one [`PageEvent`] stream,
//! delivered over a `tokio::sync::broadcast` channel. The ordered
//! [`NavigationPhase`] tag is what makes adversarial event ordering safe:
//! a transition is taken only when the target phase is strictly greater
//! than the current one.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tokio::sync::broadcast;

use super::interceptor::{ResourceRequest, ResourceResponse};

// ============================================================================
// NavigationPhase
// ============================================================================

/// Ordered phase tag for one navigation attempt.
///
/// `Idle → Init → Start → LoadStart → Ready → Loaded → FullyLoaded`, with
/// the orthogonal terminal [`NavigationPhase::Failed`] reachable from any
/// non-terminal phase. Once `FullyLoaded` or `Failed` is reached no further
/// phase event is emitted for that attempt; a new `load()` begins a fresh
/// attempt at `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum NavigationPhase {
    /// No navigation in progress.
    #[default]
    Idle,
    /// Navigation request issued to the host.
    Init,
    /// Host reported transfer begun (first byte).
    Start,
    /// Document-level loading has begun.
    LoadStart,
    /// DOM content parsed; sub-resources may still be loading.
    Ready,
    /// Full load event received.
    Loaded,
    /// Quiescence delay elapsed after `Loaded`. Terminal success.
    FullyLoaded,
    /// Terminal failure.
    Failed,
}

impl NavigationPhase {
    /// Returns `true` for the two terminal phases.
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::FullyLoaded | Self::Failed)
    }
}

// ============================================================================
// FailReason
// ============================================================================

/// Why a navigation attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailReason {
    /// The host did not reach the ready phase within the start timeout.
    StartTimeout,
    /// The full load event did not arrive within the load timeout.
    LoadTimeout,
    /// The host reported the URL unreachable or blocked.
    Unreachable,
    /// A newer `load()` call superseded this attempt.
    Superseded,
    /// The tab was closed while the attempt was in flight.
    Aborted,
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::StartTimeout => "Start timeout",
            Self::LoadTimeout => "Load timeout",
            Self::Unreachable => "Unable to open URL",
            Self::Superseded => "Load superseded",
            Self::Aborted => "Tab closed",
        };
        f.write_str(text)
    }
}

// ============================================================================
// LoadOutcome
// ============================================================================

/// The single resolved outcome of one `load()` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The page reached `FullyLoaded`.
    Success,
    /// The attempt terminated early.
    Fail(FailReason),
}

impl LoadOutcome {
    /// Returns `true` if the navigation succeeded.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

// ============================================================================
// TabState
// ============================================================================

/// Coarse lifecycle state of a tab.
///
/// A tab is exactly one of these at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TabState {
    /// Engine exists, no host tab allocated yet.
    #[default]
    Unopened,
    /// Host tab allocated, no navigation in flight.
    Idle,
    /// A navigation attempt is in flight.
    Navigating,
    /// Host tab torn down.
    Closed,
}

// ============================================================================
// PageEvent
// ============================================================================

/// Public events emitted by a page session.
#[derive(Debug, Clone)]
pub enum PageEvent {
    /// Host tab allocated.
    Opened,
    /// The tab's initial empty document has settled.
    OpenReady,
    /// Tab brought to the foreground.
    Selected,
    /// Tab torn down.
    Closed,
    /// Navigation request issued.
    Init,
    /// Transfer begun.
    Start,
    /// Document loading begun.
    LoadStart,
    /// DOM content parsed.
    Ready,
    /// Full load event received.
    Load,
    /// Page stable after the quiescence delay. Terminal success.
    FullLoad,
    /// Attempt terminated early. Terminal failure.
    LoadFail(FailReason),
    /// A request is about to be sent (headers already finalized).
    ResourceRequested(ResourceRequest),
    /// Response data arrived.
    ResourceReceived(ResourceResponse),
    /// A fault surfaced from the sandbox or host.
    Error(String),
}

impl PageEvent {
    /// Returns a short name for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Opened => "opened",
            Self::OpenReady => "openReady",
            Self::Selected => "selected",
            Self::Closed => "closed",
            Self::Init => "init",
            Self::Start => "start",
            Self::LoadStart => "loadStart",
            Self::Ready => "ready",
            Self::Load => "load",
            Self::FullLoad => "fullLoad",
            Self::LoadFail(_) => "loadFail",
            Self::ResourceRequested(_) => "resourceRequested",
            Self::ResourceReceived(_) => "resourceReceived",
            Self::Error(_) => "error",
        }
    }
}

// ============================================================================
// Capability Traits
// ============================================================================

/// Navigation-side observation capability.
///
/// Implemented by every type that exposes a navigation phase timeline;
/// checked at compile time rather than by probing for methods at runtime.
pub trait NavigationEvents {
    /// Current phase of the active (or last) navigation attempt.
    fn navigation_phase(&self) -> NavigationPhase;

    /// Subscribes to the lifecycle event stream.
    fn navigation_events(&self) -> broadcast::Receiver<PageEvent>;
}

/// Window-side observation capability.
///
/// The counterpart pair to [`NavigationEvents`] for tab lifecycle
/// (open/select/close) concerns.
pub trait WindowEvents {
    /// Current coarse tab state.
    fn window_state(&self) -> TabState;

    /// Subscribes to the lifecycle event stream.
    fn window_events(&self) -> broadcast::Receiver<PageEvent>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_ordering() {
        assert!(NavigationPhase::Idle < NavigationPhase::Init);
        assert!(NavigationPhase::Init < NavigationPhase::Start);
        assert!(NavigationPhase::Start < NavigationPhase::LoadStart);
        assert!(NavigationPhase::LoadStart < NavigationPhase::Ready);
        assert!(NavigationPhase::Ready < NavigationPhase::Loaded);
        assert!(NavigationPhase::Loaded < NavigationPhase::FullyLoaded);
    }

    #[test]
    fn test_terminal_phases() {
        assert!(NavigationPhase::FullyLoaded.is_terminal());
        assert!(NavigationPhase::Failed.is_terminal());
        assert!(!NavigationPhase::Loaded.is_terminal());
        assert!(!NavigationPhase::Idle.is_terminal());
    }

    #[test]
    fn test_fail_reason_display() {
        assert_eq!(FailReason::StartTimeout.to_string(), "Start timeout");
        assert_eq!(FailReason::LoadTimeout.to_string(), "Load timeout");
        assert_eq!(FailReason::Unreachable.to_string(), "Unable to open URL");
    }

    #[test]
    fn test_outcome_predicates() {
        assert!(LoadOutcome::Success.is_success());
        assert!(!LoadOutcome::Fail(FailReason::StartTimeout).is_success());
    }

    #[test]
    fn test_event_names() {
        assert_eq!(PageEvent::FullLoad.name(), "fullLoad");
        assert_eq!(
            PageEvent::LoadFail(FailReason::LoadTimeout).name(),
            "loadFail"
        );
    }
}
