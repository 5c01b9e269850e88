//! Download and unpack the standalone proxy into the repository cache.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::archive;
use super::error::AcquireError;
use super::version::{VERSION_MARKER_FILE, VersionState};
use crate::platform::PlatformTarget;

/// Release asset URL template. `{version}` and `{file}` are substituted.
pub const DEFAULT_RELEASE_URL: &str = "https://github.com/Azure/azure-sdk-tools/releases/download/Azure.Sdk.Tools.TestProxy_{version}/{file}";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches a platform build when the cached version is stale.
#[derive(Debug, Clone)]
pub struct BinaryAcquirer {
    client: reqwest::Client,
    release_url: String,
    cache_dir: PathBuf,
}

impl BinaryAcquirer {
    /// Acquirer using a release URL template and a cache directory relative
    /// to the repository root.
    pub fn new(
        release_url: impl Into<String>,
        cache_dir: impl Into<PathBuf>,
    ) -> Result<Self, AcquireError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(AcquireError::Client)?;

        Ok(Self {
            client,
            release_url: release_url.into(),
            cache_dir: cache_dir.into(),
        })
    }

    /// Release asset URL for a version and target.
    pub fn download_url(&self, version: &str, target: &PlatformTarget) -> String {
        self.release_url
            .replace("{version}", version)
            .replace("{file}", target.file_name)
    }

    /// Absolute, forward-slash path to the target's executable in the cache.
    pub fn executable_path(&self, repo_root: &Path, target: &PlatformTarget) -> PathBuf {
        let path = repo_root.join(&self.cache_dir).join(target.executable);
        let absolute = std::path::absolute(&path).unwrap_or(path);
        PathBuf::from(absolute.to_string_lossy().replace('\\', "/"))
    }

    /// Make sure the required build is unpacked and return its executable.
    ///
    /// When `state` is current nothing touches the network. Otherwise the cache
    /// directory is recreated from empty, the archive is streamed down,
    /// extracted, deleted, and the marker rewritten. Failures are not retried.
    pub async fn ensure(
        &self,
        repo_root: &Path,
        target: &PlatformTarget,
        state: &VersionState,
    ) -> Result<PathBuf, AcquireError> {
        let executable = self.executable_path(repo_root, target);

        if state.is_current() {
            debug!(version = %state.required, "Cached proxy is current, skipping download");
        } else {
            info!(
                required = %state.required,
                cached = ?state.cached,
                %target,
                "Downloading standalone proxy"
            );
            self.download(repo_root, target, &state.required).await?;
            if !executable.exists() {
                return Err(AcquireError::ExecutableMissing { path: executable });
            }
        }

        if target.restore_exec_bit {
            mark_executable(&executable)?;
        }

        Ok(executable)
    }

    async fn download(
        &self,
        repo_root: &Path,
        target: &PlatformTarget,
        version: &str,
    ) -> Result<(), AcquireError> {
        let cache_dir = repo_root.join(&self.cache_dir);
        recreate_dir(&cache_dir)?;

        let url = self.download_url(version, target);
        let archive_path = cache_dir.join(target.file_name);
        self.fetch(&url, &archive_path).await?;

        archive::extract(target.archive, &archive_path, &cache_dir)?;
        fs::remove_file(&archive_path).map_err(|e| AcquireError::io(&archive_path, e))?;

        let marker = cache_dir.join(VERSION_MARKER_FILE);
        fs::write(&marker, version).map_err(|e| AcquireError::io(&marker, e))?;

        info!(version, dir = %cache_dir.display(), "Standalone proxy unpacked");
        Ok(())
    }

    /// Stream `url` into `dest` chunk by chunk.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), AcquireError> {
        let transport = |source| AcquireError::DownloadFailed {
            url: url.to_string(),
            source,
        };

        let mut response = self.client.get(url).send().await.map_err(transport)?;
        if !response.status().is_success() {
            return Err(AcquireError::DownloadStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| AcquireError::io(dest, e))?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(transport)? {
            file.write_all(&chunk)
                .await
                .map_err(|e| AcquireError::io(dest, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| AcquireError::io(dest, e))?;

        debug!(url, bytes = written, "Download complete");
        Ok(())
    }
}

/// Remove `dir` if present, then create it empty.
fn recreate_dir(dir: &Path) -> Result<(), AcquireError> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|e| AcquireError::io(dir, e))?;
    }
    fs::create_dir_all(dir).map_err(|e| AcquireError::io(dir, e))
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<(), AcquireError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .map_err(|e| AcquireError::io(path, e))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<(), AcquireError> {
    Ok(())
}
