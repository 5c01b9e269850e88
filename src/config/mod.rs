//! Configuration for recproxy.
//!
//! TOML configuration with hierarchy merging, plus a snapshot of the
//! environment variables that change how a session runs.
//!
//! # Configuration Hierarchy
//!
//! 1. Built-in defaults
//! 2. User config: `~/.config/recproxy/config.toml`
//! 3. Repository config: `<repo>/.recproxy.toml`
//! 4. Additional config file (via `--config` flag)
//! 5. `PROXY_URL` from the environment
//!
//! # Example
//!
//! ```toml
//! [proxy]
//! url = "http://localhost:5000"
//! startup_timeout_secs = 120
//!
//! [paths]
//! cache_dir = ".proxy"
//!
//! [[sanitizers.rules]]
//! kind = "body_key"
//! json_path = "$..connectionSecret"
//! value = "Sanitized"
//! ```

mod env;
mod error;
mod loader;
mod schema;

pub use env::{ASSETS_FOLDER_ENV, DEFAULT_ENV_NAME, SessionEnv};
pub use error::ConfigError;
pub use loader::{ConfigLoader, REPO_CONFIG_FILE};
pub use schema::{
    Config, DEFAULT_DEV_CERTIFICATE_PFX, DEFAULT_PROXY_URL, DEFAULT_SYSTEM_TOOL, PathsConfig,
    ProxyConfig, SanitizersConfig,
};
