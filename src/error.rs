//! Unified error handling for the blockwatch crate
//!
//! Every failure in the checking core is a value with a kind, consumed by the
//! caller that decides whether to continue, abort the current unit of work, or
//! log and move on:
//!
//! - [`ProbeError`] - transport and timeout failures of a single probe
//! - [`ProxyError`] - failures to construct a proxied client for an endpoint
//! - [`StoreError`] - load and persist failures of the backing store
//! - [`ChannelError`] - delivery failures of a notification
//!
//! [`Error`] wraps all of them for module boundaries (CLI commands, startup),
//! and [`ErrorCategory`] classifies them for handling strategies.

use std::io;
use std::time::Duration;
use thiserror::Error;

pub use crate::notifications::channels::ChannelError;

/// Errors produced by a single HTTP probe
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The request did not complete within the probe deadline
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Connection, DNS, TLS or proxy handshake failure
    #[error("HTTP request failed")]
    Transport(#[source] reqwest::Error),

    /// Response headers arrived but the body could not be read
    #[error("failed to read response body")]
    Body(#[source] reqwest::Error),
}

impl ProbeError {
    /// Classify a reqwest error raised while sending the request
    pub fn from_send(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Transport(err)
        }
    }

    /// Message including every underlying cause, as stored in `error_text`
    ///
    /// reqwest keeps the interesting part (connection refused, DNS, SOCKS
    /// handshake) in the source chain, not in its own message.
    pub fn detail(&self) -> String {
        error_chain(self)
    }

    /// Classify a reqwest error raised while reading the body
    pub fn from_body(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Body(err)
        }
    }
}

/// Render an error and its sources as `outer: inner: root`
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    anyhow::Chain::new(err)
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ")
}

/// Errors raised while building the client bound to a proxy endpoint
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Address or credentials do not form a valid proxy URL
    #[error("invalid proxy address '{addr}': {reason}")]
    InvalidAddress { addr: String, reason: String },

    /// reqwest refused the proxy or client configuration
    #[error("failed to build proxied client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Errors raised by the backing store
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite failure
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A previous panic poisoned the connection lock
    #[error("store lock poisoned")]
    LockPoisoned,

    /// A stored value could not be decoded
    #[error("invalid stored value for {field}: {reason}")]
    InvalidData { field: &'static str, reason: String },

    /// Filesystem failure while opening the store
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Store is temporarily unreachable
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Probe transport and timeout errors
    Network,
    /// Proxy client construction errors
    Proxy,
    /// Load and persist errors
    Storage,
    /// Subscriber delivery errors
    Notification,
    /// Startup configuration errors
    Config,
}

impl ErrorCategory {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Proxy => "proxy",
            Self::Storage => "storage",
            Self::Notification => "notification",
            Self::Config => "config",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for the blockwatch crate
#[derive(Error, Debug)]
pub enum Error {
    /// Probe errors
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    /// Proxy client construction errors
    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),

    /// Store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Notification delivery errors
    #[error("Notification error: {0}")]
    Channel(#[from] ChannelError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid user input (URL, country code, chat id)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Probe(_) => ErrorCategory::Network,
            Self::Proxy(_) => ErrorCategory::Proxy,
            Self::Store(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Channel(_) => ErrorCategory::Notification,
            Self::InvalidInput(_) | Self::Config(_) => ErrorCategory::Config,
        }
    }

    /// Whether the failed operation may succeed when attempted again later
    ///
    /// Everything except configuration and input errors is retried naturally
    /// by the next scheduled cycle.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.category(), ErrorCategory::Config)
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let probe_err = Error::Probe(ProbeError::Timeout(Duration::from_secs(20)));
        assert_eq!(probe_err.category(), ErrorCategory::Network);

        let store_err = Error::Store(StoreError::LockPoisoned);
        assert_eq!(store_err.category(), ErrorCategory::Storage);

        let proxy_err = Error::Proxy(ProxyError::InvalidAddress {
            addr: "::".to_string(),
            reason: "bad".to_string(),
        });
        assert_eq!(proxy_err.category(), ErrorCategory::Proxy);
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::Store(StoreError::Unavailable("down".into())).is_recoverable());
        assert!(!Error::config("missing token").is_recoverable());
        assert!(!Error::invalid_input("not a url").is_recoverable());
    }

    #[test]
    fn test_timeout_message() {
        let err = ProbeError::Timeout(Duration::from_secs(20));
        assert_eq!(err.to_string(), "request timed out after 20s");
    }

    #[derive(Error, Debug)]
    #[error("HTTP request failed")]
    struct Wrapped(#[source] io::Error);

    #[test]
    fn test_error_chain_includes_sources() {
        let err = Wrapped(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"));
        assert_eq!(error_chain(&err), "HTTP request failed: connection refused");

        let timeout = ProbeError::Timeout(Duration::from_secs(20));
        assert_eq!(timeout.detail(), "request timed out after 20s");
    }

    #[test]
    fn test_error_conversion() {
        let unified: Error = StoreError::LockPoisoned.into();
        assert!(matches!(unified, Error::Store(_)));
        assert_eq!(unified.to_string(), "Store error: store lock poisoned");
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::Network.to_string(), "network");
        assert_eq!(ErrorCategory::Config.as_str(), "config");
    }
}
