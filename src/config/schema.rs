//! Configuration schema definitions.
//!
//! Every field is optional in the files so that layers can be merged; the
//! accessor methods apply the built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::acquire::{DEFAULT_CACHE_DIR, DEFAULT_RELEASE_URL, DEFAULT_VERSION_MANIFEST};
use crate::sanitize::SanitizerRule;
use crate::supervisor::PollPolicy;
use crate::trust::{DEFAULT_CERTIFICATE_DIR, DEFAULT_DEV_CERTIFICATE};

/// URL the proxy listens on unless configured otherwise.
pub const DEFAULT_PROXY_URL: &str = "https://localhost:5001";

/// Name of the pre-installed proxy tool used on CI agents.
pub const DEFAULT_SYSTEM_TOOL: &str = "test-proxy";

/// PKCS#12 development certificate served by the proxy.
pub const DEFAULT_DEV_CERTIFICATE_PFX: &str = "eng/common/testproxy/dotnet-devcert.pfx";

/// Top-level configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Proxy process and endpoint settings.
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Repository-relative file locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Sanitizer rule set.
    #[serde(default)]
    pub sanitizers: SanitizersConfig,
}

impl Config {
    /// Merge another config into this one.
    ///
    /// Scalars set in `other` override. Rule lists are appended.
    pub fn merge(&mut self, other: Config) {
        self.proxy.merge(other.proxy);
        self.paths.merge(other.paths);
        self.sanitizers.merge(other.sanitizers);
    }
}

fn take<T>(slot: &mut Option<T>, other: Option<T>) {
    if other.is_some() {
        *slot = other;
    }
}

/// `[proxy]` section.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    /// URL the proxy binds and clients call.
    pub url: Option<String>,
    /// Release asset URL template with `{version}` and `{file}` placeholders.
    pub release_url: Option<String>,
    /// Name of the pre-installed tool used on CI agents.
    pub system_tool: Option<String>,
    /// Seconds to wait for readiness.
    pub startup_timeout_secs: Option<u64>,
    /// Seconds allowed for one HTTP request to the proxy.
    pub request_timeout_secs: Option<u64>,
    /// Milliseconds between readiness probes.
    pub poll_interval_ms: Option<u64>,
    /// Fail the session when the proxy never reports ready.
    pub strict_readiness: Option<bool>,
}

impl ProxyConfig {
    fn merge(&mut self, other: ProxyConfig) {
        take(&mut self.url, other.url);
        take(&mut self.release_url, other.release_url);
        take(&mut self.system_tool, other.system_tool);
        take(&mut self.startup_timeout_secs, other.startup_timeout_secs);
        take(&mut self.request_timeout_secs, other.request_timeout_secs);
        take(&mut self.poll_interval_ms, other.poll_interval_ms);
        take(&mut self.strict_readiness, other.strict_readiness);
    }

    /// Proxy URL.
    pub fn url(&self) -> &str {
        self.url.as_deref().unwrap_or(DEFAULT_PROXY_URL)
    }

    /// Release URL template.
    pub fn release_url(&self) -> &str {
        self.release_url.as_deref().unwrap_or(DEFAULT_RELEASE_URL)
    }

    /// System tool name.
    pub fn system_tool(&self) -> &str {
        self.system_tool.as_deref().unwrap_or(DEFAULT_SYSTEM_TOOL)
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(10))
    }

    /// Whether a readiness timeout aborts the session.
    pub fn strict_readiness(&self) -> bool {
        self.strict_readiness.unwrap_or(false)
    }

    /// Readiness polling policy.
    pub fn poll_policy(&self) -> PollPolicy {
        let defaults = PollPolicy::default();
        PollPolicy {
            interval: self
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.interval),
            request_timeout: self.request_timeout(),
            startup_timeout: self
                .startup_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.startup_timeout),
        }
    }
}

/// `[paths]` section. Relative paths resolve against the repository root.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    /// File holding the required proxy version.
    pub version_manifest: Option<PathBuf>,
    /// Directory the proxy build is unpacked into.
    pub cache_dir: Option<PathBuf>,
    /// PEM development certificate.
    pub dev_certificate: Option<PathBuf>,
    /// PKCS#12 development certificate served by the proxy.
    pub dev_certificate_pfx: Option<PathBuf>,
    /// Directory receiving the merged trust bundle.
    pub certificate_dir: Option<PathBuf>,
    /// Host root bundle to merge instead of the auto-detected one.
    pub system_ca_bundle: Option<PathBuf>,
}

impl PathsConfig {
    fn merge(&mut self, other: PathsConfig) {
        take(&mut self.version_manifest, other.version_manifest);
        take(&mut self.cache_dir, other.cache_dir);
        take(&mut self.dev_certificate, other.dev_certificate);
        take(&mut self.dev_certificate_pfx, other.dev_certificate_pfx);
        take(&mut self.certificate_dir, other.certificate_dir);
        take(&mut self.system_ca_bundle, other.system_ca_bundle);
    }

    /// Version manifest path.
    pub fn version_manifest(&self) -> &Path {
        path_or(&self.version_manifest, DEFAULT_VERSION_MANIFEST)
    }

    /// Cache directory.
    pub fn cache_dir(&self) -> &Path {
        path_or(&self.cache_dir, DEFAULT_CACHE_DIR)
    }

    /// PEM dev certificate.
    pub fn dev_certificate(&self) -> &Path {
        path_or(&self.dev_certificate, DEFAULT_DEV_CERTIFICATE)
    }

    /// PKCS#12 dev certificate.
    pub fn dev_certificate_pfx(&self) -> &Path {
        path_or(&self.dev_certificate_pfx, DEFAULT_DEV_CERTIFICATE_PFX)
    }

    /// Trust bundle directory.
    pub fn certificate_dir(&self) -> &Path {
        path_or(&self.certificate_dir, DEFAULT_CERTIFICATE_DIR)
    }
}

fn path_or<'a>(value: &'a Option<PathBuf>, default: &'static str) -> &'a Path {
    value.as_deref().unwrap_or(Path::new(default))
}

/// `[sanitizers]` section.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SanitizersConfig {
    /// Apply the common rule set before `rules`.
    pub defaults: Option<bool>,
    /// Extra rules.
    #[serde(default)]
    pub rules: Vec<SanitizerRule>,
}

impl SanitizersConfig {
    fn merge(&mut self, other: SanitizersConfig) {
        take(&mut self.defaults, other.defaults);
        self.rules.extend(other.rules);
    }

    /// Whether the common rules apply.
    pub fn use_defaults(&self) -> bool {
        self.defaults.unwrap_or(true)
    }
}
