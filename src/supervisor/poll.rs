//! Readiness polling.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::client::ProxyClient;

/// How long and how often to probe the readiness route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Pause between probes.
    pub interval: Duration,
    /// Timeout applied to each probe.
    pub request_timeout: Duration,
    /// Total time allowed for the proxy to become ready.
    pub startup_timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(250),
            request_timeout: Duration::from_secs(10),
            startup_timeout: Duration::from_secs(60),
        }
    }
}

impl PollPolicy {
    /// Hard upper bound on a whole polling run: the startup timeout plus one
    /// probe that began just before it expired.
    pub fn hard_limit(&self) -> Duration {
        self.startup_timeout + self.request_timeout
    }
}

/// Result of a polling run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    /// Whether a probe returned 200.
    pub ready: bool,
    /// Probes issued.
    pub attempts: u32,
    /// Wall time spent.
    pub elapsed: Duration,
}

/// Probe `client` until it reports available or `policy` runs out.
///
/// Stops at the first 200. No probe is started after the startup timeout.
pub async fn poll_until_available(client: &ProxyClient, policy: &PollPolicy) -> PollOutcome {
    let started = Instant::now();
    let deadline = started + policy.startup_timeout;
    let mut attempts = 0u32;

    let probing = async {
        loop {
            attempts += 1;
            if client.is_available().await {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            debug!(attempt = attempts, "Proxy not ready, retrying");
            tokio::time::sleep(policy.interval.min(deadline - now)).await;
        }
    };

    let ready = tokio::time::timeout(policy.hard_limit(), probing)
        .await
        .unwrap_or(false);

    PollOutcome {
        ready,
        attempts,
        elapsed: started.elapsed(),
    }
}
