// Core data structures for blockwatch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Error;

/// ISO 3166-1 alpha-2 country code a proxy pool is bound to (e.g. "RU")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Country(String);

impl Country {
    /// Parse a two-letter country code, case-insensitive
    pub fn parse(code: &str) -> Option<Self> {
        let code = code.trim();
        if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Some(Self(code.to_ascii_uppercase()))
        } else {
            None
        }
    }

    /// Get the upper-case code
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human-readable name used in digests
    pub fn display_name(&self) -> &str {
        match self.0.as_str() {
            "RU" => "Russia",
            "BY" => "Belarus",
            "UA" => "Ukraine",
            "KZ" => "Kazakhstan",
            other => other,
        }
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Country {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid country code '{value}'"))
    }
}

impl From<Country> for String {
    fn from(country: Country) -> Self {
        country.0
    }
}

impl std::str::FromStr for Country {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| Error::invalid_input(format!("invalid country code '{s}'")))
    }
}

/// A monitored URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: i64,
    pub url: String,
    pub created_at: DateTime<Utc>,
    /// Soft-delete marker; deleted targets are never probed
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Target {
    /// Normalize user input into a target URL
    ///
    /// Surrounding whitespace is trimmed, a missing scheme is filled in and
    /// the scheme is forced to `https`.
    pub fn normalize_url(input: &str) -> Result<String, Error> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_input("empty URL"));
        }

        let candidate = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };

        let mut parsed = url::Url::parse(&candidate)
            .map_err(|e| Error::invalid_input(format!("invalid URL '{trimmed}': {e}")))?;

        if parsed.host_str().is_none() {
            return Err(Error::invalid_input(format!("URL '{trimmed}' has no host")));
        }

        if parsed.scheme() != "https" && parsed.set_scheme("https").is_err() {
            return Err(Error::invalid_input(format!(
                "unsupported scheme in '{trimmed}'"
            )));
        }

        Ok(parsed.to_string())
    }
}

/// A proxy endpoint row as stored; the live client is held by
/// [`crate::proxy::ProxyEndpoint`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub id: i64,
    pub country: Country,
    /// `host:port` of the SOCKS5 proxy
    pub addr: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub active: bool,
}

/// Persisted reachability verdict for one (target, country) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub target_id: i64,
    pub country: Country,
    /// Proxy whose probe produced this outcome
    pub proxy_id: Option<i64>,
    pub is_active: bool,
    /// HTTP status code, 0 when no response was received
    pub status_code: u16,
    pub body: String,
    /// Empty on a completed HTTP exchange
    pub error_text: String,
    pub updated_at: DateTime<Utc>,
}

impl CheckOutcome {
    /// Outcome of a probe that never got an HTTP response
    pub fn failed(target_id: i64, country: Country, error_text: impl Into<String>) -> Self {
        Self {
            target_id,
            country,
            proxy_id: None,
            is_active: false,
            status_code: 0,
            body: String::new(),
            error_text: error_text.into(),
            updated_at: Utc::now(),
        }
    }

    /// Attribute the outcome to a proxy endpoint
    pub fn with_proxy(mut self, proxy_id: i64) -> Self {
        self.proxy_id = Some(proxy_id);
        self
    }

    /// Whether the outcome records a transport failure
    pub fn has_error(&self) -> bool {
        !self.error_text.is_empty()
    }
}

/// A chat recipient of broadcast digests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub chat_id: i64,
    pub subscribe_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A flip of the reachability verdict observed between two cycles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReachabilityChange {
    pub url: String,
    pub country: Country,
    /// Verdict before this cycle, `None` when never checked
    pub previous: Option<bool>,
    pub current: bool,
}
