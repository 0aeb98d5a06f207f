//! Single-shot reachability probe of one target through one client
//!
//! The prober issues exactly one GET with a fixed deadline and a browser-like
//! header set, and classifies the result:
//! - transport or timeout error: unreachable, status 0, empty body, error text set
//! - HTTP exchange completed: status and body captured, reachable only on
//!   `200 OK` or `304 Not Modified`
//!
//! Retries never happen here; the fallback executor moves on to the next proxy.

pub mod headers;

use chrono::Utc;
use reqwest::{header::HeaderMap, Client, StatusCode};
use std::time::Duration;

use crate::config::DEFAULT_PROBE_TIMEOUT_SECS;
use crate::error::ProbeError;
use crate::models::{CheckOutcome, Country, Target};

/// A probe that did not complete an HTTP exchange
///
/// Carries the failing outcome so the caller can still persist it when no
/// other proxy is left to try.
#[derive(Debug)]
pub struct ProbeFailure {
    pub outcome: CheckOutcome,
    pub error: ProbeError,
}

/// Result of a single probe
pub type ProbeResult = Result<CheckOutcome, ProbeFailure>;

/// Whether a status code counts as the site being reachable
pub fn is_reachable_status(status: StatusCode) -> bool {
    status == StatusCode::OK || status == StatusCode::NOT_MODIFIED
}

/// HTTP prober with a fixed deadline and header set
#[derive(Debug, Clone)]
pub struct SiteProber {
    /// Deadline covering connect, headers and body
    timeout: Duration,

    /// Headers sent with every probe
    headers: HeaderMap,
}

impl Default for SiteProber {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteProber {
    /// Create a prober with the default 20 second deadline
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS))
    }

    /// Create a prober with a custom deadline
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            headers: headers::build_probe_headers(),
        }
    }

    /// Get the probe deadline
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe `target` through `client` on behalf of `country`
    ///
    /// # Errors
    ///
    /// Returns a [`ProbeFailure`] when no HTTP response was obtained. A
    /// completed exchange with a non-OK status is `Ok` with
    /// `is_active == false`.
    pub async fn probe(&self, client: &Client, target: &Target, country: &Country) -> ProbeResult {
        tracing::debug!(url = %target.url, country = %country, "Probing target");

        let (status, body) = self
            .fetch(client, &target.url)
            .await
            .map_err(|error| self.failure(target, country, error))?;

        Ok(CheckOutcome {
            target_id: target.id,
            country: country.clone(),
            proxy_id: None,
            is_active: is_reachable_status(status),
            status_code: status.as_u16(),
            body,
            error_text: String::new(),
            updated_at: Utc::now(),
        })
    }

    /// Probe a URL that is not a stored target yet
    ///
    /// Used to vet a site over a direct connection before it is monitored.
    /// Returns whether the site answered with a reachable status.
    pub async fn check_url(&self, client: &Client, url: &str) -> Result<bool, ProbeError> {
        let (status, _) = self.fetch(client, url).await?;
        tracing::debug!(url = %url, status = status.as_u16(), "Direct check finished");
        Ok(is_reachable_status(status))
    }

    async fn fetch(&self, client: &Client, url: &str) -> Result<(StatusCode, String), ProbeError> {
        let response = client
            .get(url.trim())
            .headers(self.headers.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ProbeError::from_send(e, self.timeout))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProbeError::from_body(e, self.timeout))?;

        Ok((status, body))
    }

    fn failure(&self, target: &Target, country: &Country, error: ProbeError) -> ProbeFailure {
        ProbeFailure {
            outcome: CheckOutcome::failed(target.id, country.clone(), error.detail()),
            error,
        }
    }
}
