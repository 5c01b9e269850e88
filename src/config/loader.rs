//! Configuration loading with hierarchy merging.
//!
//! Configuration is loaded from multiple sources and merged in order:
//!
//! 1. Built-in defaults
//! 2. User config: `~/.config/recproxy/config.toml`
//! 3. Repository config: `<repo>/.recproxy.toml`
//! 4. Additional config file (via `--config` flag)
//! 5. Environment (`PROXY_URL`)
//!
//! Rule lists are **merged** (appended). Scalars are **overridden**.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::env::SessionEnv;
use super::error::ConfigError;
use super::schema::Config;

/// User configuration directory name.
pub const USER_CONFIG_DIR: &str = "recproxy";

/// User configuration filename.
pub const USER_CONFIG_FILE: &str = "config.toml";

/// Per-repository configuration filename.
pub const REPO_CONFIG_FILE: &str = ".recproxy.toml";

/// Configuration loader with support for hierarchy merging.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Path to user configuration.
    user_path: PathBuf,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new ConfigLoader with the default user path.
    #[must_use]
    pub fn new() -> Self {
        let user_config_dir = dirs::config_dir()
            .map(|p| p.join(USER_CONFIG_DIR))
            .unwrap_or_else(|| PathBuf::from(".config").join(USER_CONFIG_DIR));

        Self {
            user_path: user_config_dir.join(USER_CONFIG_FILE),
        }
    }

    /// Create a ConfigLoader with a custom user path (for testing).
    #[must_use]
    pub fn with_paths(user_path: PathBuf) -> Self {
        Self { user_path }
    }

    /// Load and merge configuration from all sources.
    ///
    /// Missing user and repository files are skipped. A missing `extra` file
    /// is an error, as is invalid TOML anywhere.
    pub fn load(
        &self,
        repo_root: Option<&Path>,
        extra: Option<&Path>,
        env: &SessionEnv,
    ) -> Result<Config, ConfigError> {
        let mut config = Config::default();

        if let Some(user_config) = self.load_file(&self.user_path)? {
            config.merge(user_config);
            debug!("Loaded user config from {:?}", self.user_path);
        } else {
            debug!("No user config found at {:?}", self.user_path);
        }

        if let Some(repo_root) = repo_root {
            let repo_path = repo_root.join(REPO_CONFIG_FILE);
            if let Some(repo_config) = self.load_file(&repo_path)? {
                config.merge(repo_config);
                debug!("Loaded repository config from {:?}", repo_path);
            }
        }

        if let Some(extra_path) = extra {
            match self.load_file(extra_path)? {
                Some(extra_config) => {
                    config.merge(extra_config);
                    debug!("Loaded additional config from {:?}", extra_path);
                }
                None => {
                    // Unlike user/repo config, a missing CLI-specified config is an error
                    return Err(ConfigError::ReadError {
                        path: extra_path.to_path_buf(),
                        source: std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            "Specified config file not found",
                        ),
                    });
                }
            }
        }

        if let Some(url) = &env.proxy_url {
            debug!(%url, "Proxy URL overridden by environment");
            config.proxy.url = Some(url.clone());
        }

        validate(&config)?;
        Ok(config)
    }

    /// Load a config file, returning None if it doesn't exist.
    fn load_file(&self, path: &Path) -> Result<Option<Config>, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let config: Config =
                    toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
                        path: path.to_path_buf(),
                        source: e,
                    })?;
                Ok(Some(config))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ConfigError::ReadError {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    let invalid = |field: &str, message: &str| ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    };

    let url = config.proxy.url();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(invalid("proxy.url", "must start with http:// or https://"));
    }
    if !config.proxy.release_url().contains("{file}") {
        return Err(invalid("proxy.release_url", "must contain a {file} placeholder"));
    }
    if config.proxy.startup_timeout_secs == Some(0) {
        return Err(invalid("proxy.startup_timeout_secs", "must be greater than zero"));
    }
    if config.proxy.request_timeout_secs == Some(0) {
        return Err(invalid("proxy.request_timeout_secs", "must be greater than zero"));
    }
    Ok(())
}
