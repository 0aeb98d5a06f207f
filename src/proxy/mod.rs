//! Per-country proxy endpoints and their cached HTTP clients
//!
//! Each [`ProxyEndpoint`] owns at most one client, built lazily on first use
//! through a [`ClientFactory`] and reused for every later probe against that
//! endpoint. [`EndpointCache`] keeps endpoints alive across cycles so the
//! connection setup is paid once per process, not once per cycle.

mod cache;

pub use cache::EndpointCache;

use reqwest::Client;
use std::time::Duration;
use tokio::sync::OnceCell;
use url::Url;

use crate::error::ProxyError;
use crate::models::{Country, ProxyRecord};

/// Builds the HTTP client bound to one proxy endpoint
pub trait ClientFactory: Send + Sync {
    /// Build a client that routes every request through `record`
    fn build(&self, record: &ProxyRecord) -> Result<Client, ProxyError>;
}

/// Factory for SOCKS5 proxies with remote DNS resolution
#[derive(Debug, Clone)]
pub struct Socks5ClientFactory {
    connect_timeout: Duration,
}

impl Default for Socks5ClientFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl Socks5ClientFactory {
    /// Create a factory whose clients give up connecting after `connect_timeout`
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl ClientFactory for Socks5ClientFactory {
    fn build(&self, record: &ProxyRecord) -> Result<Client, ProxyError> {
        let proxy_url = socks5_url(record)?;
        let proxy = reqwest::Proxy::all(proxy_url.as_str())?;

        let client = Client::builder()
            .proxy(proxy)
            .connect_timeout(self.connect_timeout)
            .gzip(true)
            .deflate(true)
            .build()?;

        Ok(client)
    }
}

/// Build the `socks5h://` URL for a proxy record
///
/// `socks5h` makes the proxy resolve target host names, so DNS-level blocking
/// inside the proxy's country is observed too.
pub fn socks5_url(record: &ProxyRecord) -> Result<Url, ProxyError> {
    let addr = record.addr.trim();
    let invalid = |reason: &str| ProxyError::InvalidAddress {
        addr: addr.to_string(),
        reason: reason.to_string(),
    };

    let mut url = Url::parse(&format!("socks5h://{addr}")).map_err(|e| invalid(&e.to_string()))?;

    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host"));
    }
    if url.port().is_none() {
        return Err(invalid("missing port"));
    }

    let username = record.username.as_deref().map(str::trim).unwrap_or_default();
    if !username.is_empty() {
        let password = record.password.as_deref().map(str::trim).unwrap_or_default();
        url.set_username(username)
            .map_err(|()| invalid("username not allowed"))?;
        url.set_password(Some(password))
            .map_err(|()| invalid("password not allowed"))?;
    }

    Ok(url)
}

/// A proxy endpoint with its lazily-built, cached client
#[derive(Debug)]
pub struct ProxyEndpoint {
    record: ProxyRecord,
    client: OnceCell<Client>,
}

impl ProxyEndpoint {
    /// Wrap a stored proxy record
    pub fn new(record: ProxyRecord) -> Self {
        Self {
            record,
            client: OnceCell::new(),
        }
    }

    /// Stored proxy id
    pub fn id(&self) -> i64 {
        self.record.id
    }

    /// Country this endpoint exits in
    pub fn country(&self) -> &Country {
        &self.record.country
    }

    /// The stored record
    pub fn record(&self) -> &ProxyRecord {
        &self.record
    }

    /// Get the cached client, building it on first use
    ///
    /// A failed build is not cached; the next call tries again.
    pub async fn client(&self, factory: &dyn ClientFactory) -> Result<&Client, ProxyError> {
        self.client
            .get_or_try_init(|| async { factory.build(&self.record) })
            .await
    }

    /// Whether a client has been built for this endpoint
    pub fn has_client(&self) -> bool {
        self.client.initialized()
    }

    /// Whether `other` describes the same exit country, address and credentials
    pub(crate) fn same_connection(&self, other: &ProxyRecord) -> bool {
        self.record.country == other.country
            && self.record.addr.trim() == other.addr.trim()
            && self.record.username == other.username
            && self.record.password == other.password
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(addr: &str, username: Option<&str>, password: Option<&str>) -> ProxyRecord {
        ProxyRecord {
            id: 1,
            country: Country::parse("RU").unwrap(),
            addr: addr.to_string(),
            username: username.map(String::from),
            password: password.map(String::from),
            active: true,
        }
    }

    struct CountingFactory {
        builds: AtomicUsize,
    }

    impl ClientFactory for CountingFactory {
        fn build(&self, _record: &ProxyRecord) -> Result<Client, ProxyError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            Ok(Client::new())
        }
    }

    #[test]
    fn test_socks5_url_without_auth() {
        let url = socks5_url(&record(" 10.0.0.1:1080 ", None, None)).unwrap();
        assert_eq!(url.as_str(), "socks5h://10.0.0.1:1080");
    }

    #[test]
    fn test_socks5_url_with_auth() {
        let url = socks5_url(&record("proxy.example:9050", Some(" user "), Some("p@ss"))).unwrap();
        assert_eq!(url.username(), "user");
        assert_eq!(url.password(), Some("p%40ss"));
        assert_eq!(url.port(), Some(9050));
    }

    #[test]
    fn test_socks5_url_blank_username_is_ignored() {
        let url = socks5_url(&record("10.0.0.1:1080", Some("  "), Some("secret"))).unwrap();
        assert_eq!(url.username(), "");
        assert!(url.password().is_none());
    }

    #[test]
    fn test_socks5_url_invalid() {
        assert!(socks5_url(&record("not a proxy", None, None)).is_err());
        assert!(socks5_url(&record("10.0.0.1", None, None)).is_err());
        assert!(socks5_url(&record("", None, None)).is_err());
    }

    #[test]
    fn test_socks5_factory_builds_client() {
        let factory = Socks5ClientFactory::default();
        assert!(factory.build(&record("127.0.0.1:1080", Some("u"), Some("p"))).is_ok());
        assert!(factory.build(&record("127.0.0.1", None, None)).is_err());
    }

    #[tokio::test]
    async fn test_client_is_built_once() {
        let factory = CountingFactory {
            builds: AtomicUsize::new(0),
        };
        let endpoint = ProxyEndpoint::new(record("127.0.0.1:1080", None, None));
        assert!(!endpoint.has_client());

        endpoint.client(&factory).await.unwrap();
        endpoint.client(&factory).await.unwrap();
        endpoint.client(&factory).await.unwrap();

        assert!(endpoint.has_client());
        assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_build_is_not_cached() {
        let endpoint = ProxyEndpoint::new(record("broken", None, None));
        let factory = Socks5ClientFactory::default();

        assert!(endpoint.client(&factory).await.is_err());
        assert!(!endpoint.has_client());
    }
}
