//! Error types for version resolution and binary acquisition.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while resolving or acquiring the proxy binary.
///
/// All of these are fatal for a session: nothing here is retried.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// The repository does not carry a version manifest.
    #[error("Proxy version manifest not found at {path}")]
    ManifestMissing {
        /// Expected manifest location.
        path: PathBuf,
    },

    /// The manifest exists but names no version.
    #[error("Proxy version manifest {path} is empty")]
    ManifestEmpty {
        /// Manifest location.
        path: PathBuf,
    },

    /// No standalone build is published for this host.
    #[error(
        "No standalone proxy build is published for {os}/{arch}; \
         install the proxy manually and set PROXY_MANUAL_START"
    )]
    UnsupportedPlatform {
        /// Host operating system.
        os: String,
        /// Host CPU architecture.
        arch: String,
    },

    /// The release download failed in transport.
    #[error("Failed to download {url}: {source}")]
    DownloadFailed {
        /// Release asset URL.
        url: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The release host answered with a non-success status.
    #[error("Download of {url} returned HTTP {status}")]
    DownloadStatus {
        /// Release asset URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The downloaded archive could not be unpacked.
    #[error("Failed to extract {archive}: {message}")]
    ExtractionFailed {
        /// Archive on disk.
        archive: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// The extracted archive does not contain the expected executable.
    #[error("Executable {path} missing after extraction")]
    ExecutableMissing {
        /// Expected executable location.
        path: PathBuf,
    },

    /// Filesystem operation on the cache failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being operated on.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The HTTP client could not be constructed.
    #[error("Failed to build download client: {0}")]
    Client(#[source] reqwest::Error),
}

impl AcquireError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
