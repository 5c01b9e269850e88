//! Snapshot of the environment variables that steer a session.

use std::path::PathBuf;

/// Declares the proxy is started and stopped outside this tool.
pub const MANUAL_START_ENV: &str = "PROXY_MANUAL_START";
/// Set on Azure Pipelines agents.
pub const TF_BUILD_ENV: &str = "TF_BUILD";
/// Set by most CI systems.
pub const CI_ENV: &str = "CI";
/// Overrides the configured proxy URL.
pub const PROXY_URL_ENV: &str = "PROXY_URL";
/// Checkout root on Azure Pipelines agents.
pub const BUILD_SOURCES_DIR_ENV: &str = "BUILD_SOURCESDIRECTORY";
/// Name of the tox environment running the tests.
pub const TOX_ENV_NAME_ENV: &str = "TOX_ENV_NAME";
/// Tests run against live services.
pub const RUN_LIVE_ENV: &str = "AZURE_TEST_RUN_LIVE";
/// Live runs skip recording.
pub const SKIP_LIVE_RECORDING_ENV: &str = "AZURE_SKIP_LIVE_RECORDING";
/// Per-environment recording assets folder handed to the proxy.
pub const ASSETS_FOLDER_ENV: &str = "PROXY_ASSETS_FOLDER";

/// Environment name used when none is given.
pub const DEFAULT_ENV_NAME: &str = "default";

/// Environment inputs, read once per session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionEnv {
    /// The proxy is managed outside this tool.
    pub manual_start: bool,
    /// Running on an Azure Pipelines agent.
    pub tf_build: bool,
    /// Running under any CI system.
    pub in_ci: bool,
    /// Proxy URL override.
    pub proxy_url: Option<String>,
    /// Storage root override on CI.
    pub build_sources_dir: Option<PathBuf>,
    /// Test environment name.
    pub env_name: Option<String>,
    /// Tests run against live services.
    pub run_live: bool,
    /// Live runs skip recording.
    pub skip_live_recording: bool,
    /// PID recorded by an earlier step.
    pub proxy_pid: Option<u32>,
}

impl SessionEnv {
    /// Read the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str| lookup(key).is_some_and(|v| is_truthy(&v));
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let tf_build = flag(TF_BUILD_ENV);
        Self {
            manual_start: flag(MANUAL_START_ENV),
            tf_build,
            in_ci: tf_build || flag(CI_ENV),
            proxy_url: text(PROXY_URL_ENV),
            build_sources_dir: text(BUILD_SOURCES_DIR_ENV).map(PathBuf::from),
            env_name: text(TOX_ENV_NAME_ENV),
            run_live: flag(RUN_LIVE_ENV),
            skip_live_recording: flag(SKIP_LIVE_RECORDING_ENV),
            proxy_pid: text(crate::supervisor::PID_ENV_VAR).and_then(|v| v.trim().parse().ok()),
        }
    }

    /// Live tests that record nothing need no proxy.
    pub fn live_and_not_recording(&self) -> bool {
        self.run_live && self.skip_live_recording
    }

    /// Use the pre-installed tool instead of downloading a build.
    pub fn use_system_tool(&self) -> bool {
        self.tf_build
    }

    /// Environment name for log and assets paths.
    pub fn env_name(&self) -> &str {
        self.env_name.as_deref().unwrap_or(DEFAULT_ENV_NAME)
    }
}

fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && !value.eq_ignore_ascii_case("false") && value != "0"
}
