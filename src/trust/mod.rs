//! Trust bootstrapping for the proxy's self-signed certificate.
//!
//! The proxy serves HTTPS with a development certificate checked into the
//! repository. Clients in the session trust it through a merged bundle that
//! starts with that certificate followed by the host's root CAs:
//!
//! ```text
//! <repo>/.certificate/dotnet-devcert.pem
//! ├── dotnet-devcert.crt contents (byte-for-byte prefix)
//! └── host CA bundle contents
//! ```
//!
//! The bundle is rebuilt whenever its prefix stops matching the repository
//! certificate, which covers certificate rotation.

pub mod bundle;
pub mod error;

pub use bundle::{
    BundleStatus, CertificateBundle, DEFAULT_CERTIFICATE_DIR, DEFAULT_DEV_CERTIFICATE,
    HOST_CA_BUNDLES, TrustEnv, ensure_trust, find_host_ca_bundle,
};
pub use error::TrustError;
