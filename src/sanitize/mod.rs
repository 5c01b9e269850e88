//! Sanitizer configuration for a recording session.
//!
//! Sanitizers strip or mask secrets before the proxy persists an interaction.
//! A session submits its whole rule set once, right after the proxy reports
//! ready:
//!
//! 1. the last [`SanitizerRule::DefaultMatcher`] in the list (if any) goes to
//!    the matcher endpoint;
//! 2. every other rule is grouped by [`SanitizerKind`] into one
//!    [`SanitizerBatch`] and posted in a single request.
//!
//! Re-applying the same list re-sends the same batch; the proxy replaces
//! rather than duplicates identical sanitizers.

pub mod batch;
pub mod defaults;
pub mod rules;

pub use batch::SanitizerBatch;
pub use defaults::{FAKE_ACCESS_TOKEN, FAKE_ID, SANITIZED, SERVICEBUS_FAKE_SAS, common_rules};
pub use rules::{DefaultMatcher, RegexParams, SanitizerKind, SanitizerRule};

use tracing::{debug, info};

use crate::client::{ClientError, ProxyClient};

/// Submits rule sets to a running proxy.
#[derive(Debug, Clone, Copy)]
pub struct SanitizerConfigurator<'a> {
    client: &'a ProxyClient,
}

impl<'a> SanitizerConfigurator<'a> {
    /// Configurator for the proxy behind `client`.
    pub fn new(client: &'a ProxyClient) -> Self {
        Self { client }
    }

    /// Apply `rules` to the proxy. Returns the batch that was submitted.
    pub async fn apply(&self, rules: &[SanitizerRule]) -> Result<SanitizerBatch, ClientError> {
        let matcher = rules.iter().rev().find_map(|rule| match rule {
            SanitizerRule::DefaultMatcher(matcher) => Some(matcher),
            _ => None,
        });
        if let Some(matcher) = matcher {
            debug!(?matcher, "Overriding default matcher");
            self.client.set_matcher(matcher).await?;
        }

        let batch: SanitizerBatch = rules.iter().collect();
        if batch.is_empty() {
            debug!("No sanitizers to submit");
            return Ok(batch);
        }

        self.client.add_sanitizers(&batch).await?;
        info!(
            sanitizers = batch.len(),
            kinds = batch.kinds().len(),
            "Registered sanitizers with proxy"
        );
        Ok(batch)
    }
}
