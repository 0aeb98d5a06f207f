//! Persistence for targets, proxy pools, check outcomes and subscribers
//!
//! The checking core only talks to the store through the traits below, so
//! business logic stays decoupled from the storage backend:
//!
//! ```text
//! ┌──────────────────────┐      ┌────────────────────────┐
//! │   CycleScheduler     │      │  Broadcaster           │
//! │   CountryChecker     │      │                        │
//! └──────────┬───────────┘      └───────────┬────────────┘
//!            ▼                              ▼
//!     ┌─────────────┐              ┌──────────────────┐
//!     │    Store    │              │ SubscriberSource │
//!     └──────┬──────┘              └────────┬─────────┘
//!            └───────────────┬──────────────┘
//!                ┌───────────┴───────────┐
//!                ▼                       ▼
//!        ┌──────────────┐        ┌──────────────┐
//!        │ SqliteStore  │        │ MemoryStore  │
//!        └──────────────┘        └──────────────┘
//! ```

mod memory;
mod sqlite;

use std::sync::Arc;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreResult;
use crate::models::{CheckOutcome, Country, ProxyRecord, Subscriber, Target};

/// Store of targets, proxy pools and check outcomes
///
/// Outcomes are keyed by (target id, country): one row per pair, upserts
/// overwrite in place.
pub trait Store: Send + Sync {
    /// All targets that are not soft-deleted, in insertion order
    fn list_targets(&self) -> StoreResult<Vec<Target>>;

    /// Add a target URL (whitespace-trimmed)
    ///
    /// Returns `None` when the URL is already monitored. A soft-deleted URL
    /// is restored instead of duplicated.
    fn add_target(&self, url: &str) -> StoreResult<Option<Target>>;

    /// Soft-delete a target, returning whether one was removed
    fn remove_target(&self, url: &str) -> StoreResult<bool>;

    /// Active proxies of one country, in stored order
    fn list_active_proxies(&self, country: &Country) -> StoreResult<Vec<ProxyRecord>>;

    /// Register a new active proxy
    fn add_proxy(
        &self,
        country: &Country,
        addr: &str,
        username: Option<&str>,
        password: Option<&str>,
    ) -> StoreResult<ProxyRecord>;

    /// Create or replace the outcome of (target, country)
    fn upsert_outcome(&self, outcome: &CheckOutcome) -> StoreResult<()>;

    /// Latest outcomes of one country joined with their targets
    fn list_outcomes(&self, country: &Country) -> StoreResult<Vec<(Target, CheckOutcome)>>;

    /// Create a subscriber or flip its subscription flag
    fn set_subscription(&self, chat_id: i64, active: bool) -> StoreResult<()>;
}

/// Supplier of the recipients that currently want digests
pub trait SubscriberSource: Send + Sync {
    /// Subscribers whose subscription flag is set
    fn list_subscribed_recipients(&self) -> StoreResult<Vec<Subscriber>>;
}

/// Thread-safe shared store
pub type SharedStore = Arc<dyn Store>;

/// Thread-safe shared subscriber source
pub type SharedSubscriberSource = Arc<dyn SubscriberSource>;
