//! blockwatch - multi-country site blocking checker
//!
//! Periodically probes monitored sites through per-country proxy pools,
//! records one reachability outcome per (site, country) pair and broadcasts
//! changes to subscribers at a capped rate.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`scheduler`] - Periodic cycles with concurrent country checkers
//! - [`checker`] - Per-country target iteration and proxy fallback
//! - [`probe`] - Single HTTP reachability probe
//! - [`proxy`] - Proxy endpoints and their cached clients
//! - [`storage`] - Store traits with SQLite and in-memory backends
//! - [`notifications`] - Digest queue, rate-limited broadcaster, Telegram channel
//! - [`metrics`] - Prometheus metrics and their HTTP exposition
//! - [`models`] - Core data structures and types
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use blockwatch::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let store = Arc::new(SqliteStore::open(&config.database.sqlite_path)?);
//!
//!     let factory = Arc::new(Socks5ClientFactory::new(config.connect_timeout()));
//!     let executor = FallbackExecutor::new(SiteProber::new(), factory);
//!     let checker = CountryChecker::new(executor, store.clone());
//!
//!     let scheduler = CycleScheduler::new(
//!         store,
//!         checker,
//!         config.checker.countries.clone(),
//!         config.interval(),
//!     );
//!     let report = scheduler.run_cycle().await;
//!     println!("cycle {}", report.status);
//!     Ok(())
//! }
//! ```

pub mod checker;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod probe;
pub mod proxy;
pub mod scheduler;
pub mod storage;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::checker::{CountryChecker, FallbackExecutor};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::models::{CheckOutcome, Country, ProxyRecord, Subscriber, Target};
    pub use crate::notifications::{Broadcaster, DigestSender, Messenger, TelegramChannel};
    pub use crate::probe::SiteProber;
    pub use crate::proxy::{ClientFactory, Socks5ClientFactory};
    pub use crate::scheduler::{CycleReport, CycleScheduler, CycleStatus};
    pub use crate::storage::{MemoryStore, SqliteStore, Store, SubscriberSource};
}

// Direct re-exports for convenience
pub use models::{CheckOutcome, Country, Target};
