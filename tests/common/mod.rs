//! Common test utilities
//!
//! Proxy endpoints are simulated with [`TestClientFactory`], keyed on the
//! record's address:
//! - `direct` builds a client without any proxy, so the probe reaches the
//!   mock target server itself
//! - `broken` fails client construction
//! - anything else is used as an HTTP proxy address; pair it with
//!   [`dead_proxy_addr`] to get a transport failure

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Proxy};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use blockwatch::error::ProxyError;
use blockwatch::models::{Country, ProxyRecord, Target};
use blockwatch::notifications::channels::{ChannelError, ChannelResult, Messenger};
use blockwatch::proxy::{ClientFactory, ProxyEndpoint};

pub const DIRECT: &str = "direct";
pub const BROKEN: &str = "broken";

/// Client factory for tests
#[derive(Default)]
pub struct TestClientFactory {
    builds: AtomicUsize,
}

impl TestClientFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of build attempts so far
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl ClientFactory for TestClientFactory {
    fn build(&self, record: &ProxyRecord) -> Result<Client, ProxyError> {
        self.builds.fetch_add(1, Ordering::SeqCst);

        match record.addr.as_str() {
            DIRECT => Ok(Client::builder().no_proxy().build()?),
            BROKEN => Err(ProxyError::InvalidAddress {
                addr: record.addr.clone(),
                reason: "broken on purpose".to_string(),
            }),
            addr => Ok(Client::builder()
                .proxy(Proxy::all(format!("http://{addr}"))?)
                .build()?),
        }
    }
}

/// Address of a local port nothing listens on
pub fn dead_proxy_addr() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

pub fn ru() -> Country {
    Country::parse("RU").unwrap()
}

pub fn by() -> Country {
    Country::parse("BY").unwrap()
}

pub fn target(id: i64, url: &str) -> Target {
    Target {
        id,
        url: url.to_string(),
        created_at: Utc::now(),
        deleted_at: None,
    }
}

pub fn proxy(id: i64, country: Country, addr: &str) -> ProxyRecord {
    ProxyRecord {
        id,
        country,
        addr: addr.to_string(),
        username: None,
        password: None,
        active: true,
    }
}

/// Build a pool of endpoints from (id, addr) pairs
pub fn pool(country: &Country, proxies: &[(i64, &str)]) -> Vec<Arc<ProxyEndpoint>> {
    proxies
        .iter()
        .map(|(id, addr)| Arc::new(ProxyEndpoint::new(proxy(*id, country.clone(), addr))))
        .collect()
}

/// Messenger that records every delivery with its send time
#[derive(Default)]
pub struct RecordingMessenger {
    pub sent: Mutex<Vec<(i64, String, Instant)>>,
    pub reject: Vec<i64>,
    pub attempts: AtomicUsize,
}

impl RecordingMessenger {
    pub fn rejecting(reject: Vec<i64>) -> Self {
        Self {
            reject,
            ..Default::default()
        }
    }

    pub fn recipients(&self) -> Vec<i64> {
        self.sent.lock().unwrap().iter().map(|s| s.0).collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|s| s.1.clone()).collect()
    }

    pub fn send_times(&self) -> Vec<Instant> {
        self.sent.lock().unwrap().iter().map(|s| s.2).collect()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, recipient: i64, text: &str) -> ChannelResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.reject.contains(&recipient) {
            return Err(ChannelError::Other(format!("chat {recipient} rejected")));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient, text.to_string(), Instant::now()));
        Ok(())
    }
}
