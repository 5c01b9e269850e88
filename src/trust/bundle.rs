//! Merged CA bundle management.
//!
//! # Example
//!
//! ```ignore
//! use recproxy::trust::{CertificateBundle, ensure_trust};
//!
//! let bundle = CertificateBundle::for_repo(repo_root, DEFAULT_DEV_CERTIFICATE, DEFAULT_CERTIFICATE_DIR, None);
//! let env = ensure_trust(&bundle)?;
//! for (key, value) in env.vars() {
//!     println!("export {key}=\"{value}\"");
//! }
//! ```

use std::fs::{self, File};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::error::TrustError;

/// Default development certificate location, relative to the repository root.
pub const DEFAULT_DEV_CERTIFICATE: &str = "eng/common/testproxy/dotnet-devcert.crt";

/// Default directory for the merged bundle, relative to the repository root.
pub const DEFAULT_CERTIFICATE_DIR: &str = ".certificate";

/// Standard host CA bundle locations to try.
pub const HOST_CA_BUNDLES: &[&str] = &[
    "/etc/ssl/certs/ca-certificates.crt", // Debian/Ubuntu
    "/etc/pki/tls/certs/ca-bundle.crt",   // RHEL/Fedora
    "/etc/ssl/ca-bundle.pem",             // openSUSE
    "/etc/ssl/cert.pem",                  // Alpine/macOS
];

/// Find the first existing host CA bundle.
pub fn find_host_ca_bundle() -> Option<&'static Path> {
    HOST_CA_BUNDLES
        .iter()
        .map(|p| Path::new(*p))
        .find(|p| p.exists())
}

/// What [`CertificateBundle::ensure`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleStatus {
    /// No bundle existed; one was written.
    Created,
    /// The bundle's prefix no longer matched the dev certificate; it was rewritten.
    Rebuilt,
    /// The bundle already started with the current dev certificate.
    Current,
}

/// Locations of the dev certificate, the merged bundle and the host roots.
#[derive(Debug, Clone)]
pub struct CertificateBundle {
    dev_cert: PathBuf,
    bundle: PathBuf,
    system_roots: Option<PathBuf>,
}

impl CertificateBundle {
    /// Bundle for a repository.
    ///
    /// The merged file is named after the dev certificate's stem with a `.pem`
    /// extension and lives in `cert_dir`. When `system_roots` is `None` the
    /// first existing entry of [`HOST_CA_BUNDLES`] is used.
    pub fn for_repo(
        repo_root: &Path,
        dev_cert: impl AsRef<Path>,
        cert_dir: impl AsRef<Path>,
        system_roots: Option<PathBuf>,
    ) -> Self {
        let dev_cert = repo_root.join(dev_cert);
        let stem = dev_cert
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.split('.').next())
            .filter(|s| !s.is_empty())
            .unwrap_or("proxy-ca");
        let bundle = repo_root.join(cert_dir).join(format!("{stem}.pem"));
        let system_roots =
            system_roots.or_else(|| find_host_ca_bundle().map(Path::to_path_buf));

        Self {
            dev_cert,
            bundle,
            system_roots,
        }
    }

    /// Path to the repository's dev certificate.
    pub fn dev_cert_path(&self) -> &Path {
        &self.dev_cert
    }

    /// Path to the merged bundle.
    pub fn bundle_path(&self) -> &Path {
        &self.bundle
    }

    /// Directory holding the merged bundle.
    pub fn bundle_dir(&self) -> &Path {
        self.bundle.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Host root bundle appended after the dev certificate, if one was found.
    pub fn system_roots_path(&self) -> Option<&Path> {
        self.system_roots.as_deref()
    }

    /// Create or refresh the merged bundle. Idempotent.
    pub fn ensure(&self) -> Result<BundleStatus, TrustError> {
        let dev_cert = self.read_dev_cert()?;

        if !self.bundle.exists() {
            info!(
                dir = %self.bundle_dir().display(),
                "No proxy certificate bundle found, creating one"
            );
            self.write(&dev_cert)?;
            return Ok(BundleStatus::Created);
        }

        if self.prefix_matches(&dev_cert)? {
            debug!(bundle = %self.bundle.display(), "Certificate bundle is current");
            Ok(BundleStatus::Current)
        } else {
            info!("Proxy certificate changed, rebuilding certificate bundle");
            self.write(&dev_cert)?;
            Ok(BundleStatus::Rebuilt)
        }
    }

    fn read_dev_cert(&self) -> Result<Vec<u8>, TrustError> {
        fs::read(&self.dev_cert).map_err(|e| match e.kind() {
            ErrorKind::NotFound => TrustError::DevCertificateMissing {
                path: self.dev_cert.clone(),
            },
            _ => TrustError::ReadFile {
                path: self.dev_cert.clone(),
                source: e,
            },
        })
    }

    /// Compare the first `dev_cert.len()` bytes of the bundle with `dev_cert`.
    fn prefix_matches(&self, dev_cert: &[u8]) -> Result<bool, TrustError> {
        let read_err = |source| TrustError::ReadFile {
            path: self.bundle.clone(),
            source,
        };
        let file = File::open(&self.bundle).map_err(read_err)?;
        let mut prefix = Vec::with_capacity(dev_cert.len());
        file.take(dev_cert.len() as u64)
            .read_to_end(&mut prefix)
            .map_err(read_err)?;
        Ok(prefix == dev_cert)
    }

    fn write(&self, dev_cert: &[u8]) -> Result<(), TrustError> {
        let write_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| TrustError::WriteFile { path, source }
        };

        let dir = self.bundle_dir();
        fs::create_dir_all(dir).map_err(write_err(dir))?;

        let mut contents = dev_cert.to_vec();
        match &self.system_roots {
            Some(roots) => {
                let host = fs::read(roots).map_err(|source| TrustError::ReadFile {
                    path: roots.clone(),
                    source,
                })?;
                if !contents.ends_with(b"\n") {
                    contents.push(b'\n');
                }
                contents.extend_from_slice(&host);
                debug!(roots = %roots.display(), bytes = host.len(), "Appended host CA bundle");
            }
            None => warn!("No host CA bundle found, trusting the proxy certificate only"),
        }

        fs::write(&self.bundle, &contents).map_err(write_err(&self.bundle))?;
        debug!(bundle = %self.bundle.display(), bytes = contents.len(), "Wrote certificate bundle");
        Ok(())
    }
}

/// Trust-store environment pointing at a merged bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustEnv {
    /// Directory containing the bundle (`SSL_CERT_DIR`).
    pub cert_dir: PathBuf,
    /// Bundle file (`SSL_CERT_FILE`, `REQUESTS_CA_BUNDLE`).
    pub cert_file: PathBuf,
}

impl TrustEnv {
    /// The variables to export, in a stable order.
    pub fn vars(&self) -> [(&'static str, String); 3] {
        let file = self.cert_file.display().to_string();
        [
            ("SSL_CERT_DIR", self.cert_dir.display().to_string()),
            ("SSL_CERT_FILE", file.clone()),
            ("REQUESTS_CA_BUNDLE", file),
        ]
    }

    /// Export the variables into this process's environment.
    ///
    /// Must run on the session's control thread before any other thread reads
    /// the environment. Callers outside the crate go through
    /// `ProxySession::start`, which upholds that.
    pub(crate) fn export(&self) {
        for (key, value) in self.vars() {
            // SAFETY: the session runs on a single-threaded runtime and exports
            // before spawning anything that reads the environment.
            unsafe { std::env::set_var(key, value) };
        }
        info!(
            cert_dir = %self.cert_dir.display(),
            cert_file = %self.cert_file.display(),
            "Exported SSL_CERT_DIR, SSL_CERT_FILE and REQUESTS_CA_BUNDLE for this session"
        );
    }
}

/// Make sure the bundle is current and return the environment describing it.
pub fn ensure_trust(bundle: &CertificateBundle) -> Result<TrustEnv, TrustError> {
    bundle.ensure()?;
    Ok(TrustEnv {
        cert_dir: bundle.bundle_dir().to_path_buf(),
        cert_file: bundle.bundle_path().to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const DEV_CERT: &str = "-----BEGIN CERTIFICATE-----\nDEVCERT\n-----END CERTIFICATE-----\n";
    const HOST_ROOTS: &str = "-----BEGIN CERTIFICATE-----\nHOSTCA\n-----END CERTIFICATE-----\n";

    fn fixture() -> (tempfile::TempDir, CertificateBundle) {
        let dir = tempdir().unwrap();
        let cert = dir.path().join(DEFAULT_DEV_CERTIFICATE);
        fs::create_dir_all(cert.parent().unwrap()).unwrap();
        fs::write(&cert, DEV_CERT).unwrap();
        let roots = dir.path().join("roots.pem");
        fs::write(&roots, HOST_ROOTS).unwrap();

        let bundle = CertificateBundle::for_repo(
            dir.path(),
            DEFAULT_DEV_CERTIFICATE,
            DEFAULT_CERTIFICATE_DIR,
            Some(roots),
        );
        (dir, bundle)
    }

    #[test]
    fn test_bundle_named_after_dev_cert() {
        let (dir, bundle) = fixture();
        assert_eq!(
            bundle.bundle_path(),
            dir.path().join(".certificate").join("dotnet-devcert.pem")
        );
    }

    #[test]
    fn test_first_ensure_creates_bundle() {
        let (_dir, bundle) = fixture();
        assert_eq!(bundle.ensure().unwrap(), BundleStatus::Created);

        let contents = fs::read_to_string(bundle.bundle_path()).unwrap();
        assert!(contents.starts_with(DEV_CERT));
        assert!(contents.ends_with(HOST_ROOTS));
    }

    #[test]
    fn test_second_ensure_is_current() {
        let (_dir, bundle) = fixture();
        bundle.ensure().unwrap();
        let before = fs::read(bundle.bundle_path()).unwrap();

        assert_eq!(bundle.ensure().unwrap(), BundleStatus::Current);
        assert_eq!(fs::read(bundle.bundle_path()).unwrap(), before);
    }

    #[test]
    fn test_rotated_dev_cert_triggers_rebuild() {
        let (_dir, bundle) = fixture();
        bundle.ensure().unwrap();

        let rotated = "-----BEGIN CERTIFICATE-----\nROTATED\n-----END CERTIFICATE-----\n";
        fs::write(bundle.dev_cert_path(), rotated).unwrap();

        assert_eq!(bundle.ensure().unwrap(), BundleStatus::Rebuilt);
        let contents = fs::read_to_string(bundle.bundle_path()).unwrap();
        assert!(contents.starts_with(rotated));
        assert!(!contents.contains("DEVCERT"));
    }

    #[test]
    fn test_truncated_bundle_triggers_rebuild() {
        let (_dir, bundle) = fixture();
        fs::create_dir_all(bundle.bundle_dir()).unwrap();
        fs::write(bundle.bundle_path(), &DEV_CERT[..10]).unwrap();

        assert_eq!(bundle.ensure().unwrap(), BundleStatus::Rebuilt);
    }

    #[test]
    fn test_trailing_content_after_prefix_is_ignored() {
        let (_dir, bundle) = fixture();
        fs::create_dir_all(bundle.bundle_dir()).unwrap();
        fs::write(bundle.bundle_path(), format!("{DEV_CERT}anything else")).unwrap();

        assert_eq!(bundle.ensure().unwrap(), BundleStatus::Current);
    }

    #[test]
    fn test_missing_dev_cert_is_error() {
        let dir = tempdir().unwrap();
        let bundle = CertificateBundle::for_repo(
            dir.path(),
            DEFAULT_DEV_CERTIFICATE,
            DEFAULT_CERTIFICATE_DIR,
            None,
        );
        let err = bundle.ensure().unwrap_err();
        assert!(matches!(err, TrustError::DevCertificateMissing { .. }));
    }

    #[test]
    fn test_trust_env_vars() {
        let (_dir, bundle) = fixture();
        let env = ensure_trust(&bundle).unwrap();
        let vars = env.vars();

        assert_eq!(vars[0].0, "SSL_CERT_DIR");
        assert_eq!(vars[0].1, bundle.bundle_dir().display().to_string());
        assert_eq!(vars[1].1, bundle.bundle_path().display().to_string());
        assert_eq!(vars[1].1, vars[2].1);
    }

    #[test]
    fn test_find_host_ca_bundle() {
        // Depends on the host; only check it doesn't panic.
        let _ = find_host_ca_bundle();
    }
}
