//! Proxy lifecycle states.

use std::fmt;

/// Where the supervised proxy is in its lifecycle.
///
/// ```text
/// NotStarted ─► Starting ─► HealthPolling ─► Ready ─► Stopping ─► Stopped
///     │            │   └──────────┬────────────┘ ▲
///     │            │              ▼              │
///     └────────────┼──────────► Failed ──────────┘ (via Stopping)
///                  └─► Ready (already running)
/// ```
///
/// An externally managed proxy goes straight from `NotStarted` to
/// `HealthPolling`. Every state except `Stopped` may move to `Stopping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    /// Nothing has happened yet.
    NotStarted,
    /// Probing for an existing instance or spawning one.
    Starting,
    /// Waiting for the readiness route to answer.
    HealthPolling,
    /// The readiness route answered 200.
    Ready,
    /// Termination requested.
    Stopping,
    /// Terminated, or nothing to terminate.
    Stopped,
    /// Spawn failed or readiness timed out.
    Failed,
}

impl ProxyState {
    /// Whether moving from `self` to `next` is a legal step.
    pub fn can_transition_to(self, next: ProxyState) -> bool {
        use ProxyState::*;

        match (self, next) {
            (Stopped, _) => false,
            (_, Stopping) => true,
            (NotStarted, Starting | HealthPolling) => true,
            (Starting, HealthPolling | Ready | Failed) => true,
            (HealthPolling, Ready | Failed) => true,
            (Failed, HealthPolling) => true,
            (Stopping, Stopped) => true,
            _ => false,
        }
    }

    /// Whether the proxy can serve requests.
    pub fn is_ready(self) -> bool {
        self == ProxyState::Ready
    }
}

impl fmt::Display for ProxyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
