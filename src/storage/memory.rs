//! In-memory store (for testing and dry runs)

use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Store, SubscriberSource};
use crate::error::{StoreError, StoreResult};
use crate::models::{CheckOutcome, Country, ProxyRecord, Subscriber, Target};

/// In-memory implementation of [`Store`] and [`SubscriberSource`]
///
/// Besides the plain contract it can inject load and persist failures and
/// counts target loads and upserts, which is what cycle tests need.
#[derive(Default)]
pub struct MemoryStore {
    targets: RwLock<BTreeMap<i64, Target>>,
    proxies: RwLock<BTreeMap<i64, ProxyRecord>>,
    outcomes: RwLock<HashMap<(i64, Country), CheckOutcome>>,
    subscribers: RwLock<BTreeMap<i64, Subscriber>>,

    next_id: AtomicUsize,
    target_loads: AtomicUsize,
    upserts: AtomicUsize,

    fail_target_loads: AtomicBool,
    fail_proxy_loads: AtomicBool,
    fail_subscriber_loads: AtomicBool,
    fail_upserts_for: RwLock<HashSet<i64>>,
}

fn read<T>(lock: &RwLock<T>) -> StoreResult<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| StoreError::LockPoisoned)
}

fn write<T>(lock: &RwLock<T>) -> StoreResult<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| StoreError::LockPoisoned)
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1
    }

    /// Make `list_targets` fail until reset
    pub fn fail_target_loads(&self, fail: bool) {
        self.fail_target_loads.store(fail, Ordering::SeqCst);
    }

    /// Make `list_active_proxies` fail until reset
    pub fn fail_proxy_loads(&self, fail: bool) {
        self.fail_proxy_loads.store(fail, Ordering::SeqCst);
    }

    /// Make `list_subscribed_recipients` fail until reset
    pub fn fail_subscriber_loads(&self, fail: bool) {
        self.fail_subscriber_loads.store(fail, Ordering::SeqCst);
    }

    /// Make upserts of one target fail
    pub fn fail_upserts_for(&self, target_id: i64) {
        if let Ok(mut ids) = self.fail_upserts_for.write() {
            ids.insert(target_id);
        }
    }

    /// Number of `list_targets` calls so far
    pub fn target_loads(&self) -> usize {
        self.target_loads.load(Ordering::SeqCst)
    }

    /// Number of successful upserts so far
    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    /// Number of stored outcome rows
    pub fn outcome_rows(&self) -> usize {
        self.outcomes.read().map(|o| o.len()).unwrap_or_default()
    }

    /// Stored outcome of one (target, country) pair
    pub fn outcome(&self, target_id: i64, country: &Country) -> Option<CheckOutcome> {
        self.outcomes
            .read()
            .ok()
            .and_then(|o| o.get(&(target_id, country.clone())).cloned())
    }
}

impl Store for MemoryStore {
    fn list_targets(&self) -> StoreResult<Vec<Target>> {
        self.target_loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_target_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("target load disabled".to_string()));
        }

        Ok(read(&self.targets)?
            .values()
            .filter(|t| t.deleted_at.is_none())
            .cloned()
            .collect())
    }

    fn add_target(&self, url: &str) -> StoreResult<Option<Target>> {
        let url = url.trim();
        let mut targets = write(&self.targets)?;

        if let Some(existing) = targets.values_mut().find(|t| t.url == url) {
            if existing.deleted_at.take().is_some() {
                return Ok(Some(existing.clone()));
            }
            return Ok(None);
        }

        let target = Target {
            id: self.next_id(),
            url: url.to_string(),
            created_at: Utc::now(),
            deleted_at: None,
        };
        targets.insert(target.id, target.clone());
        Ok(Some(target))
    }

    fn remove_target(&self, url: &str) -> StoreResult<bool> {
        let url = url.trim();
        let mut targets = write(&self.targets)?;

        match targets
            .values_mut()
            .find(|t| t.url == url && t.deleted_at.is_none())
        {
            Some(target) => {
                target.deleted_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn list_active_proxies(&self, country: &Country) -> StoreResult<Vec<ProxyRecord>> {
        if self.fail_proxy_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("proxy load disabled".to_string()));
        }

        Ok(read(&self.proxies)?
            .values()
            .filter(|p| p.active && &p.country == country)
            .cloned()
            .collect())
    }

    fn add_proxy(
        &self,
        country: &Country,
        addr: &str,
        username: Option<&str>,
        password: Option<&str>,
    ) -> StoreResult<ProxyRecord> {
        let record = ProxyRecord {
            id: self.next_id(),
            country: country.clone(),
            addr: addr.trim().to_string(),
            username: username.map(String::from),
            password: password.map(String::from),
            active: true,
        };
        write(&self.proxies)?.insert(record.id, record.clone());
        Ok(record)
    }

    fn upsert_outcome(&self, outcome: &CheckOutcome) -> StoreResult<()> {
        if read(&self.fail_upserts_for)?.contains(&outcome.target_id) {
            return Err(StoreError::Unavailable(format!(
                "upsert disabled for target {}",
                outcome.target_id
            )));
        }

        write(&self.outcomes)?.insert(
            (outcome.target_id, outcome.country.clone()),
            outcome.clone(),
        );
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn list_outcomes(&self, country: &Country) -> StoreResult<Vec<(Target, CheckOutcome)>> {
        let targets = read(&self.targets)?;
        let outcomes = read(&self.outcomes)?;

        Ok(targets
            .values()
            .filter(|t| t.deleted_at.is_none())
            .filter_map(|t| {
                outcomes
                    .get(&(t.id, country.clone()))
                    .map(|o| (t.clone(), o.clone()))
            })
            .collect())
    }

    fn set_subscription(&self, chat_id: i64, active: bool) -> StoreResult<()> {
        write(&self.subscribers)?
            .entry(chat_id)
            .and_modify(|s| s.subscribe_active = active)
            .or_insert_with(|| Subscriber {
                chat_id,
                subscribe_active: active,
                created_at: Utc::now(),
            });
        Ok(())
    }
}

impl SubscriberSource for MemoryStore {
    fn list_subscribed_recipients(&self) -> StoreResult<Vec<Subscriber>> {
        if self.fail_subscriber_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("subscriber load disabled".to_string()));
        }

        Ok(read(&self.subscribers)?
            .values()
            .filter(|s| s.subscribe_active)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_injection() {
        let store = MemoryStore::new();
        store.fail_target_loads(true);
        assert!(store.list_targets().is_err());
        assert_eq!(store.target_loads(), 1);

        store.fail_target_loads(false);
        assert!(store.list_targets().is_ok());
        assert_eq!(store.target_loads(), 2);

        store.fail_proxy_loads(true);
        assert!(store
            .list_active_proxies(&Country::parse("RU").unwrap())
            .is_err());

        store.fail_subscriber_loads(true);
        assert!(store.list_subscribed_recipients().is_err());
    }

    #[test]
    fn test_upsert_failure_for_one_target() {
        let store = MemoryStore::new();
        let ru = Country::parse("RU").unwrap();
        store.fail_upserts_for(2);

        assert!(store.upsert_outcome(&CheckOutcome::failed(1, ru.clone(), "x")).is_ok());
        assert!(store.upsert_outcome(&CheckOutcome::failed(2, ru.clone(), "x")).is_err());
        assert_eq!(store.upserts(), 1);
        assert_eq!(store.outcome_rows(), 1);
        assert!(store.outcome(1, &ru).is_some());
        assert!(store.outcome(2, &ru).is_none());
    }
}
