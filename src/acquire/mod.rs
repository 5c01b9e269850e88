//! Proxy binary acquisition.
//!
//! Resolves which proxy version the repository needs, compares it with the
//! version already unpacked in the per-repository cache, and downloads the
//! matching platform build when they differ.
//!
//! ```text
//! manifest ──► VersionResolver ──► VersionState ──┐
//!                                                 ├──► BinaryAcquirer::ensure ──► executable
//! host os/arch ──► PlatformCatalog ──► target ────┘
//! ```

pub mod archive;
pub mod download;
pub mod error;
pub mod version;

use std::path::{Path, PathBuf};

pub use download::{BinaryAcquirer, DEFAULT_RELEASE_URL};
pub use error::AcquireError;
pub use version::{
    DEFAULT_CACHE_DIR, DEFAULT_VERSION_MANIFEST, VERSION_MARKER_FILE, VersionResolver,
    VersionState,
};

use crate::platform::{PlatformCatalog, PlatformTarget};

/// Look up the build for an (os, arch) pair, failing when none is published.
pub fn resolve_target(
    catalog: &PlatformCatalog,
    os: &str,
    arch: &str,
) -> Result<&'static PlatformTarget, AcquireError> {
    catalog
        .lookup(os, arch)
        .ok_or_else(|| AcquireError::UnsupportedPlatform {
            os: os.to_string(),
            arch: arch.to_string(),
        })
}

/// Resolve versions and make the host's build available under `repo_root`.
pub async fn prepare_local_tool(
    repo_root: &Path,
    resolver: &VersionResolver,
    acquirer: &BinaryAcquirer,
) -> Result<PathBuf, AcquireError> {
    let state = resolver.resolve(repo_root)?;
    let target = resolve_target(
        &PlatformCatalog::new(),
        std::env::consts::OS,
        std::env::consts::ARCH,
    )?;
    acquirer.ensure(repo_root, target, &state).await
}
