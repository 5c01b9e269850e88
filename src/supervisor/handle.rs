//! Handle to a running proxy process.

use std::path::PathBuf;
use std::process::Child;
use std::time::Duration;

use tracing::{debug, info, warn};

/// Environment variable carrying the proxy PID between lifecycle steps.
pub const PID_ENV_VAR: &str = "PROXY_PID";

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Handle to a proxy process.
///
/// A handle created by [`spawned`](Self::spawned) owns the child and reaps it
/// on termination. One recovered through [`from_env`](Self::from_env) only
/// knows the PID.
#[derive(Debug)]
pub struct ProxyProcessHandle {
    child: Option<Child>,
    /// PID of the proxy.
    pub pid: u32,
    /// File receiving the proxy's output, if any.
    pub log_file: Option<PathBuf>,
}

impl ProxyProcessHandle {
    pub(crate) fn spawned(child: Child, log_file: Option<PathBuf>) -> Self {
        Self {
            pid: child.id(),
            child: Some(child),
            log_file,
        }
    }

    /// Handle for a process this session did not spawn.
    pub fn from_pid(pid: u32) -> Self {
        Self {
            child: None,
            pid,
            log_file: None,
        }
    }

    /// Handle recorded by an earlier step through [`PID_ENV_VAR`].
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let raw = lookup(PID_ENV_VAR)?;
        match raw.trim().parse() {
            Ok(pid) => Some(Self::from_pid(pid)),
            Err(_) => {
                warn!(value = %raw, "Ignoring unparsable {PID_ENV_VAR}");
                None
            }
        }
    }

    /// Publish the PID so a later, independent step can stop the proxy.
    pub(crate) fn export_pid(&self) {
        // SAFETY: called from the session's control thread while no other
        // thread touches the environment.
        unsafe { std::env::set_var(PID_ENV_VAR, self.pid.to_string()) };
        debug!(pid = self.pid, "Exported {PID_ENV_VAR}");
    }

    /// Whether an owned child is still running. `None` when the child is not owned.
    fn is_running(&mut self) -> Option<bool> {
        self.child
            .as_mut()
            .map(|child| matches!(child.try_wait(), Ok(None)))
    }

    /// Ask the proxy to exit, then reap an owned child.
    ///
    /// An owned child that already exited is not signalled, since its PID may
    /// have been reused. One still running after `grace` is killed. Every
    /// failure is logged and swallowed.
    pub async fn terminate(mut self, grace: Duration) {
        if self.is_running() == Some(false) {
            debug!(pid = self.pid, "Proxy already exited, nothing to signal");
            return;
        }

        match send_terminate(self.pid) {
            Ok(()) => info!(pid = self.pid, "Sent termination signal to proxy"),
            Err(e) => warn!(pid = self.pid, error = %e, "Failed to signal proxy"),
        }

        let Some(child) = self.child.as_mut() else {
            return;
        };

        let deadline = tokio::time::Instant::now() + grace;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(pid = self.pid, %status, "Proxy exited");
                    return;
                }
                Ok(None) if tokio::time::Instant::now() < deadline => {
                    tokio::time::sleep(EXIT_POLL_INTERVAL).await;
                }
                Ok(None) => {
                    warn!(pid = self.pid, ?grace, "Proxy ignored termination, killing");
                    if let Err(e) = child.kill() {
                        warn!(pid = self.pid, error = %e, "Failed to kill proxy");
                    }
                    if let Err(e) = child.wait() {
                        warn!(pid = self.pid, error = %e, "Failed to reap killed proxy");
                    }
                    return;
                }
                Err(e) => {
                    warn!(pid = self.pid, error = %e, "Failed to query proxy exit status");
                    return;
                }
            }
        }
    }
}

/// Remove [`PID_ENV_VAR`] once the recorded process is gone.
pub(crate) fn clear_exported_pid() {
    // SAFETY: see `ProxyProcessHandle::export_pid`.
    unsafe { std::env::remove_var(PID_ENV_VAR) };
}

#[cfg(unix)]
fn send_terminate(pid: u32) -> std::io::Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| std::io::Error::other("PID out of range"))?;
    kill(Pid::from_raw(raw), Signal::SIGTERM).map_err(std::io::Error::from)
}

#[cfg(not(unix))]
fn send_terminate(pid: u32) -> std::io::Result<()> {
    let status = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(std::io::Error::other(format!("taskkill exited with {status}")))
    }
}
