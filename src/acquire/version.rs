//! Required and cached proxy versions.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::AcquireError;

/// Default manifest location, relative to the repository root.
pub const DEFAULT_VERSION_MANIFEST: &str = "eng/common/testproxy/target_version.txt";

/// Default download cache directory, relative to the repository root.
pub const DEFAULT_CACHE_DIR: &str = ".proxy";

/// Marker file inside the cache directory holding the last downloaded version.
pub const VERSION_MARKER_FILE: &str = "downloaded_version.txt";

/// The version a test run needs and the version already on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionState {
    /// Version named by the repository manifest.
    pub required: String,
    /// Version recorded by the last successful download, if any.
    pub cached: Option<String>,
}

impl VersionState {
    /// Whether the cached binary already matches the manifest.
    pub fn is_current(&self) -> bool {
        self.cached.as_deref() == Some(self.required.as_str())
    }
}

/// Reads the version manifest and the cache marker.
#[derive(Debug, Clone)]
pub struct VersionResolver {
    manifest: PathBuf,
    cache_dir: PathBuf,
}

impl Default for VersionResolver {
    fn default() -> Self {
        Self::new(DEFAULT_VERSION_MANIFEST, DEFAULT_CACHE_DIR)
    }
}

impl VersionResolver {
    /// Resolver for a manifest and cache directory, both relative to the repository root.
    pub fn new(manifest: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            manifest: manifest.into(),
            cache_dir: cache_dir.into(),
        }
    }

    /// Absolute manifest path for a repository.
    pub fn manifest_path(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.manifest)
    }

    /// Absolute cache directory for a repository.
    pub fn cache_dir(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.cache_dir)
    }

    /// Absolute cache marker path for a repository.
    pub fn marker_path(&self, repo_root: &Path) -> PathBuf {
        self.cache_dir(repo_root).join(VERSION_MARKER_FILE)
    }

    /// Read both versions. Has no side effects.
    ///
    /// # Errors
    ///
    /// `ManifestMissing` when the manifest is absent, `ManifestEmpty` when it
    /// holds only whitespace. A missing marker is not an error.
    pub fn resolve(&self, repo_root: &Path) -> Result<VersionState, AcquireError> {
        let manifest = self.manifest_path(repo_root);
        let required = match fs::read_to_string(&manifest) {
            Ok(contents) => contents.trim().to_string(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AcquireError::ManifestMissing { path: manifest });
            }
            Err(e) => return Err(AcquireError::io(manifest, e)),
        };
        if required.is_empty() {
            return Err(AcquireError::ManifestEmpty { path: manifest });
        }

        let marker = self.marker_path(repo_root);
        let cached = match fs::read_to_string(&marker) {
            Ok(contents) => Some(contents.trim().to_string()).filter(|v| !v.is_empty()),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(AcquireError::io(marker, e)),
        };

        debug!(required = %required, cached = ?cached, "Resolved proxy versions");
        Ok(VersionState { required, cached })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_manifest(root: &Path, contents: &str) {
        let path = root.join(DEFAULT_VERSION_MANIFEST);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_missing_manifest_is_error() {
        let dir = tempdir().unwrap();
        let err = VersionResolver::default().resolve(dir.path()).unwrap_err();
        assert!(matches!(err, AcquireError::ManifestMissing { .. }));
    }

    #[test]
    fn test_empty_manifest_is_error() {
        let dir = tempdir().unwrap();
        write_manifest(dir.path(), "  \n");
        let err = VersionResolver::default().resolve(dir.path()).unwrap_err();
        assert!(matches!(err, AcquireError::ManifestEmpty { .. }));
    }

    #[test]
    fn test_first_run_has_no_cached_version() {
        let dir = tempdir().unwrap();
        write_manifest(dir.path(), "1.0.0-dev.20240410.1\n");

        let state = VersionResolver::default().resolve(dir.path()).unwrap();
        assert_eq!(state.required, "1.0.0-dev.20240410.1");
        assert_eq!(state.cached, None);
        assert!(!state.is_current());
    }

    #[test]
    fn test_cached_version_is_trimmed() {
        let dir = tempdir().unwrap();
        write_manifest(dir.path(), "1.2.3");
        let resolver = VersionResolver::default();
        fs::create_dir_all(resolver.cache_dir(dir.path())).unwrap();
        fs::write(resolver.marker_path(dir.path()), "1.2.3\r\n").unwrap();

        let state = resolver.resolve(dir.path()).unwrap();
        assert_eq!(state.cached.as_deref(), Some("1.2.3"));
        assert!(state.is_current());
    }

    #[test]
    fn test_stale_cache_is_not_current() {
        let state = VersionState {
            required: "1.2.3".to_string(),
            cached: Some("1.2.2".to_string()),
        };
        assert!(!state.is_current());
    }
}
