//! Certificate trust error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building the merged CA bundle.
#[derive(Debug, Error)]
pub enum TrustError {
    /// The proxy's development certificate is not in the repository.
    #[error("Proxy development certificate not found at {path}")]
    DevCertificateMissing {
        /// Expected certificate location.
        path: PathBuf,
    },

    /// Failed to read a certificate or bundle.
    #[error("Failed to read {path}: {source}")]
    ReadFile {
        /// File being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write the merged bundle.
    #[error("Failed to write {path}: {source}")]
    WriteFile {
        /// File being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
