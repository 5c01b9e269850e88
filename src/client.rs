//! HTTP client for the proxy's control surface.
//!
//! Every call to the proxy goes through [`ProxyClient`]: the readiness probe,
//! the default matcher override, and the batch sanitizer submission. The
//! client trusts the merged certificate bundle so HTTPS to the proxy's
//! self-signed endpoint works.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::sanitize::{DefaultMatcher, SanitizerBatch};

/// Readiness route on the proxy.
pub const HEALTH_PATH: &str = "/Info/Available";

/// Batch sanitizer route on the proxy.
pub const ADD_SANITIZERS_PATH: &str = "/Admin/AddSanitizers";

/// Matcher route on the proxy.
pub const SET_MATCHER_PATH: &str = "/Admin/SetMatcher";

/// Header naming which matcher `SetMatcher` configures.
pub const ABSTRACTION_HEADER: &str = "x-abstraction-identifier";

/// Errors from talking to the proxy.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The underlying HTTP client could not be built.
    #[error("Failed to build proxy client: {0}")]
    Build(#[source] reqwest::Error),

    /// The certificate bundle could not be loaded.
    #[error("Failed to load certificate bundle {path}: {message}")]
    Certificate {
        /// Bundle location.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// The request failed in transport.
    #[error("Request to {url} failed: {source}")]
    Request {
        /// Target URL.
        url: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The proxy rejected the request.
    #[error("Proxy returned HTTP {status} for {url}: {body}")]
    Status {
        /// Target URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
}

/// Client bound to one proxy base URL.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    http: reqwest::Client,
    base_url: String,
}

impl ProxyClient {
    /// Build a client for `base_url` with a per-request timeout.
    ///
    /// When `ca_bundle` is set, every certificate in it is added as a trust root.
    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        ca_bundle: Option<&Path>,
    ) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder().timeout(request_timeout);

        if let Some(path) = ca_bundle {
            let cert_err = |message: String| ClientError::Certificate {
                path: path.to_path_buf(),
                message,
            };
            let pem = fs::read(path).map_err(|e| cert_err(e.to_string()))?;
            let certs =
                reqwest::Certificate::from_pem_bundle(&pem).map_err(|e| cert_err(e.to_string()))?;
            debug!(bundle = %path.display(), count = certs.len(), "Loaded trust roots");
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        Ok(Self {
            http: builder.build().map_err(ClientError::Build)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Proxy base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Probe the readiness route once.
    ///
    /// Only HTTP 200 counts as available. Transport and TLS failures mean
    /// "not yet" and are logged at debug level.
    pub async fn is_available(&self) -> bool {
        let url = self.url(HEALTH_PATH);
        match self.http.get(&url).send().await {
            Ok(response) => {
                let ok = response.status() == reqwest::StatusCode::OK;
                if !ok {
                    debug!(status = response.status().as_u16(), "Proxy not available yet");
                }
                ok
            }
            Err(e) => {
                debug!(error = %e, "Proxy availability probe failed");
                false
            }
        }
    }

    /// Override the default matcher for all subsequent interactions.
    pub async fn set_matcher(&self, matcher: &DefaultMatcher) -> Result<(), ClientError> {
        let url = self.url(SET_MATCHER_PATH);
        let request = self
            .http
            .post(&url)
            .header(ABSTRACTION_HEADER, DefaultMatcher::ABSTRACTION_ID)
            .json(&matcher.wire_body());
        self.send(&url, request).await
    }

    /// Submit every sanitizer in `batch` in one request.
    pub async fn add_sanitizers(&self, batch: &SanitizerBatch) -> Result<(), ClientError> {
        let url = self.url(ADD_SANITIZERS_PATH);
        let request = self.http.post(&url).json(&batch.to_wire());
        self.send(&url, request).await
    }

    async fn send(&self, url: &str, request: reqwest::RequestBuilder) -> Result<(), ClientError> {
        let response = request.send().await.map_err(|source| ClientError::Request {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}
