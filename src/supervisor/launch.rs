//! Proxy command line and environment construction.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Kestrel default certificate path variable.
pub const KESTREL_CERT_PATH_ENV: &str = "ASPNETCORE_Kestrel__Certificates__Default__Path";

/// Kestrel default certificate password variable.
pub const KESTREL_CERT_PASSWORD_ENV: &str = "ASPNETCORE_Kestrel__Certificates__Default__Password";

/// Password of the vendored development certificate.
pub const DEV_CERT_PASSWORD: &str = "password";

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyExecutable {
    /// A downloaded binary at an absolute path.
    Binary(PathBuf),
    /// A tool already installed on `PATH`, launched by name.
    SystemTool(String),
}

impl ProxyExecutable {
    /// Program as passed to the OS.
    pub fn program(&self) -> OsString {
        match self {
            Self::Binary(path) => path.as_os_str().to_owned(),
            Self::SystemTool(name) => OsString::from(name),
        }
    }
}

/// Everything needed to spawn one proxy instance.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Program to run.
    pub executable: ProxyExecutable,
    /// Recording storage root (normally the repository root).
    pub storage_root: PathBuf,
    /// URL the proxy binds.
    pub proxy_url: String,
    /// Environment passed to the child, already merged.
    pub env: BTreeMap<String, String>,
    /// Where stdout and stderr go; `None` discards them.
    pub log_file: Option<PathBuf>,
}

impl LaunchSpec {
    /// Launch spec with the default certificate environment.
    ///
    /// `pfx` is the PKCS#12 development certificate Kestrel serves. Any
    /// same-named variable found through `lookup` overrides the default.
    pub fn new(
        executable: ProxyExecutable,
        storage_root: &Path,
        proxy_url: &str,
        pfx: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let defaults = [
            (KESTREL_CERT_PATH_ENV, pfx.to_string_lossy().into_owned()),
            (KESTREL_CERT_PASSWORD_ENV, DEV_CERT_PASSWORD.to_string()),
        ];
        let env = defaults
            .into_iter()
            .map(|(key, default)| {
                let value = lookup(key).unwrap_or(default);
                (key.to_string(), value)
            })
            .collect();

        Self {
            executable,
            storage_root: storage_root.to_path_buf(),
            proxy_url: proxy_url.to_string(),
            env,
            log_file: None,
        }
    }

    /// Send output to `path` instead of discarding it.
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Arguments after the program name.
    pub fn args(&self) -> Vec<String> {
        vec![
            "start".to_string(),
            format!("--storage-location={}", self.storage_root.display()),
            "--".to_string(),
            "--urls".to_string(),
            self.proxy_url.clone(),
        ]
    }

    /// Human-readable command line, for logs.
    pub fn command_line(&self) -> String {
        let program = self.executable.program();
        let mut line = program.to_string_lossy().into_owned();
        for arg in self.args() {
            line.push(' ');
            if arg.contains(' ') {
                line.push('"');
                line.push_str(&arg);
                line.push('"');
            } else {
                line.push_str(&arg);
            }
        }
        line
    }

    /// A `Command` with arguments and environment applied. Stdio is left to the caller.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(self.executable.program());
        cmd.args(self.args())
            .envs(&self.env)
            .current_dir(&self.storage_root)
            .stdin(Stdio::null());
        cmd
    }
}
