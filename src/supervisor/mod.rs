//! Proxy process supervision.
//!
//! [`ProcessSupervisor`] owns the proxy for one session: it reuses an instance
//! that already answers the readiness route, otherwise spawns one, polls until
//! it is ready, and terminates it at teardown. See [`ProxyState`] for the
//! lifecycle.

pub mod error;
pub mod handle;
pub mod launch;
pub mod poll;
pub mod state;

use std::fs::OpenOptions;
use std::process::Stdio;
use std::time::Duration;

pub use error::SupervisorError;
use handle::clear_exported_pid;
pub use handle::{PID_ENV_VAR, ProxyProcessHandle};
pub use launch::{LaunchSpec, ProxyExecutable};
pub use poll::{PollOutcome, PollPolicy, poll_until_available};
pub use state::ProxyState;

use tracing::{debug, info, warn};

use crate::client::ProxyClient;

/// Time a terminated proxy gets to exit before it is killed.
pub const STOP_GRACE: Duration = Duration::from_secs(5);

/// Starts, watches, and stops one proxy instance.
#[derive(Debug)]
pub struct ProcessSupervisor {
    client: ProxyClient,
    policy: PollPolicy,
    state: ProxyState,
    handle: Option<ProxyProcessHandle>,
    externally_managed: bool,
}

impl ProcessSupervisor {
    /// Supervisor that spawns and stops the proxy itself.
    pub fn new(client: ProxyClient, policy: PollPolicy) -> Self {
        Self {
            client,
            policy,
            state: ProxyState::NotStarted,
            handle: None,
            externally_managed: false,
        }
    }

    /// Supervisor for a proxy someone else runs: `start` and `stop` do nothing,
    /// `wait_ready` still polls.
    pub fn externally_managed(client: ProxyClient, policy: PollPolicy) -> Self {
        Self {
            externally_managed: true,
            ..Self::new(client, policy)
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProxyState {
        self.state
    }

    /// Client for the supervised proxy.
    pub fn client(&self) -> &ProxyClient {
        &self.client
    }

    /// Whether start and stop are skipped.
    pub fn is_externally_managed(&self) -> bool {
        self.externally_managed
    }

    /// Handle to the spawned process, if this supervisor spawned one.
    pub fn handle(&self) -> Option<&ProxyProcessHandle> {
        self.handle.as_ref()
    }

    fn transition(&mut self, next: ProxyState) -> Result<(), SupervisorError> {
        if !self.state.can_transition_to(next) {
            return Err(SupervisorError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!(from = %self.state, to = %next, "Proxy state change");
        self.state = next;
        Ok(())
    }

    /// Reuse a running proxy or spawn one from `spec`.
    ///
    /// Returns the state reached: `Ready` when an instance already answered,
    /// `HealthPolling` after a spawn. Externally managed supervisors return
    /// immediately without probing.
    pub async fn start(&mut self, spec: &LaunchSpec) -> Result<ProxyState, SupervisorError> {
        self.start_with(|| async { Ok::<_, SupervisorError>(spec.clone()) })
            .await
    }

    /// Like [`start`](Self::start), but only builds the launch spec once the
    /// liveness probe has failed, so nothing is downloaded for a proxy that
    /// is already running.
    ///
    /// # Environment
    ///
    /// Writes process-wide variables ([`PID_ENV_VAR`]). Drive it from a
    /// single-threaded runtime and do not read or write the environment from
    /// other threads while it runs.
    pub async fn start_with<F, Fut, E>(&mut self, prepare: F) -> Result<ProxyState, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<LaunchSpec, E>>,
        E: From<SupervisorError>,
    {
        if self.externally_managed {
            info!("Proxy is externally managed, not starting one");
            return Ok(self.state);
        }

        self.transition(ProxyState::Starting)?;

        if self.client.is_available().await {
            info!(url = %self.client.base_url(), "Proxy already running, reusing it");
            self.transition(ProxyState::Ready)?;
            return Ok(self.state);
        }

        let spawned = match prepare().await {
            Ok(spec) => spawn(&spec).map(|handle| (spec, handle)).map_err(E::from),
            Err(e) => Err(e),
        };

        match spawned {
            Ok((spec, handle)) => {
                info!(pid = handle.pid, command = %spec.command_line(), "Started proxy");
                handle.export_pid();
                self.handle = Some(handle);
                self.transition(ProxyState::HealthPolling)?;
                Ok(self.state)
            }
            Err(e) => {
                self.transition(ProxyState::Failed)?;
                Err(e)
            }
        }
    }

    /// Poll until the proxy answers 200 or the startup timeout passes.
    ///
    /// A proxy already known to be ready is not probed again. On timeout the
    /// state becomes `Failed` and [`SupervisorError::ProxyNotReady`] is returned.
    pub async fn wait_ready(&mut self) -> Result<(), SupervisorError> {
        if self.state.is_ready() {
            return Ok(());
        }
        if self.state != ProxyState::HealthPolling {
            self.transition(ProxyState::HealthPolling)?;
        }

        let outcome = poll_until_available(&self.client, &self.policy).await;
        if outcome.ready {
            info!(
                attempts = outcome.attempts,
                elapsed = ?outcome.elapsed,
                "Proxy is ready"
            );
            return self.transition(ProxyState::Ready);
        }

        self.transition(ProxyState::Failed)?;
        Err(SupervisorError::ProxyNotReady {
            waited: outcome.elapsed,
            attempts: outcome.attempts,
        })
    }

    /// Terminate the proxy this session started.
    ///
    /// A supervisor that never ran `start` falls back to the PID recorded in
    /// [`PID_ENV_VAR`], so teardown can happen in a separate step. A reused
    /// proxy is left running. Never fails: a missing PID or a failed signal
    /// is logged. Clears [`PID_ENV_VAR`] under the same threading rules as
    /// [`start_with`](Self::start_with).
    pub async fn stop(&mut self) {
        if self.externally_managed {
            debug!("Proxy is externally managed, not stopping it");
            return;
        }
        if self.state == ProxyState::Stopped {
            return;
        }
        let fresh = self.state == ProxyState::NotStarted;
        // Every state except Stopped may move to Stopping.
        let _ = self.transition(ProxyState::Stopping);

        let handle = match self.handle.take() {
            Some(handle) => Some(handle),
            None if fresh => ProxyProcessHandle::from_env(),
            None => None,
        };
        match handle {
            Some(handle) => {
                handle.terminate(STOP_GRACE).await;
                clear_exported_pid();
            }
            None if fresh => warn!("No proxy PID recorded, nothing to stop"),
            None => debug!("Proxy was not spawned by this session, leaving it running"),
        }

        let _ = self.transition(ProxyState::Stopped);
    }
}

fn spawn(spec: &LaunchSpec) -> Result<ProxyProcessHandle, SupervisorError> {
    let mut cmd = spec.command();

    match &spec.log_file {
        Some(path) => {
            let log_err = |source: std::io::Error| SupervisorError::LogFile {
                path: path.clone(),
                source,
            };
            let stdout = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(log_err)?;
            let stderr = stdout.try_clone().map_err(log_err)?;
            cmd.stdout(stdout).stderr(stderr);
        }
        None => {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
    }

    let child = cmd.spawn().map_err(|source| SupervisorError::Spawn {
        program: spec.executable.program().to_string_lossy().into_owned(),
        source,
    })?;
    Ok(ProxyProcessHandle::spawned(child, spec.log_file.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::client::HEALTH_PATH;

    fn policy() -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(20),
            request_timeout: Duration::from_millis(500),
            startup_timeout: Duration::from_millis(300),
        }
    }

    fn client(base: &str) -> ProxyClient {
        ProxyClient::new(base, Duration::from_millis(500), None).unwrap()
    }

    fn missing_binary_spec(url: &str) -> LaunchSpec {
        LaunchSpec::new(
            ProxyExecutable::Binary(PathBuf::from("/nonexistent/Azure.Sdk.Tools.TestProxy")),
            Path::new("/"),
            url,
            Path::new("/nonexistent/dotnet-devcert.pfx"),
            |_| None,
        )
    }

    async fn healthy_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(HEALTH_PATH))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_start_reuses_running_proxy() {
        let server = healthy_server().await;
        let mut supervisor = ProcessSupervisor::new(client(&server.uri()), policy());

        let state = supervisor
            .start(&missing_binary_spec(&server.uri()))
            .await
            .unwrap();

        assert_eq!(state, ProxyState::Ready);
        assert!(supervisor.handle().is_none());
        supervisor.wait_ready().await.unwrap();
    }

    #[tokio::test]
    async fn test_running_proxy_skips_preparation() {
        let server = healthy_server().await;
        let mut supervisor = ProcessSupervisor::new(client(&server.uri()), policy());

        let mut prepared = false;
        let state = supervisor
            .start_with(|| {
                prepared = true;
                async { Ok::<_, SupervisorError>(missing_binary_spec("http://unused")) }
            })
            .await
            .unwrap();

        assert_eq!(state, ProxyState::Ready);
        assert!(!prepared);
    }

    #[tokio::test]
    async fn test_preparation_failure_is_failed_state() {
        let mut supervisor = ProcessSupervisor::new(client("http://127.0.0.1:9"), policy());

        let err = supervisor
            .start_with(|| async {
                Err::<LaunchSpec, SupervisorError>(SupervisorError::ProxyNotReady {
                    waited: Duration::ZERO,
                    attempts: 0,
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SupervisorError::ProxyNotReady { .. }));
        assert_eq!(supervisor.state(), ProxyState::Failed);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_failed_state() {
        let mut supervisor = ProcessSupervisor::new(client("http://127.0.0.1:9"), policy());

        let err = supervisor
            .start(&missing_binary_spec("http://127.0.0.1:9"))
            .await
            .unwrap_err();

        assert!(matches!(err, SupervisorError::Spawn { .. }));
        assert_eq!(supervisor.state(), ProxyState::Failed);
    }

    #[tokio::test]
    async fn test_wait_ready_timeout_is_typed_error() {
        let mut supervisor = ProcessSupervisor::new(client("http://127.0.0.1:9"), policy());

        let err = supervisor.wait_ready().await.unwrap_err();

        assert!(matches!(err, SupervisorError::ProxyNotReady { .. }));
        assert_eq!(supervisor.state(), ProxyState::Failed);
    }

    #[tokio::test]
    async fn test_externally_managed_still_polls() {
        let server = healthy_server().await;
        let mut supervisor =
            ProcessSupervisor::externally_managed(client(&server.uri()), policy());

        let state = supervisor
            .start(&missing_binary_spec(&server.uri()))
            .await
            .unwrap();
        assert_eq!(state, ProxyState::NotStarted);

        supervisor.wait_ready().await.unwrap();
        assert_eq!(supervisor.state(), ProxyState::Ready);

        supervisor.stop().await;
        assert_eq!(supervisor.state(), ProxyState::Ready);
    }

    #[tokio::test]
    async fn test_stop_after_failure_reaches_stopped() {
        let mut supervisor = ProcessSupervisor::new(client("http://127.0.0.1:9"), policy());
        let _ = supervisor.wait_ready().await;

        supervisor.stop().await;
        assert_eq!(supervisor.state(), ProxyState::Stopped);

        supervisor.stop().await;
        assert_eq!(supervisor.state(), ProxyState::Stopped);
    }
}
