//! Error types for proxy process supervision.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::state::ProxyState;

/// Errors raised while starting or waiting on the proxy.
///
/// Termination failures are deliberately absent: `stop` logs and swallows them.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The proxy executable could not be spawned.
    #[error("Failed to spawn proxy '{program}': {source}")]
    Spawn {
        /// Program that was launched.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The CI log file could not be opened.
    #[error("Failed to open proxy log {path}: {source}")]
    LogFile {
        /// Log file location.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The proxy never answered its readiness route.
    #[error("Proxy did not report ready within {waited:?} ({attempts} probes)")]
    ProxyNotReady {
        /// Time spent polling.
        waited: Duration,
        /// Number of probes issued.
        attempts: u32,
    },

    /// A lifecycle step was invoked out of order.
    #[error("Invalid proxy state transition {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current state.
        from: ProxyState,
        /// Requested state.
        to: ProxyState,
    },
}
