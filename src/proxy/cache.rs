//! Process-lifetime registry of proxy endpoints keyed by proxy id

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::ProxyEndpoint;
use crate::models::{Country, ProxyRecord};

/// Keeps [`ProxyEndpoint`]s (and their built clients) alive between cycles
///
/// Every cycle reloads the active proxy list from the store; `resolve` maps
/// the fresh records back onto the endpoints from earlier cycles. An endpoint
/// is replaced when its address or credentials change and dropped when it
/// disappears from its country's active list.
#[derive(Debug, Default)]
pub struct EndpointCache {
    endpoints: Mutex<HashMap<i64, Arc<ProxyEndpoint>>>,
}

impl EndpointCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the active pool of `country`, preserving record order
    pub fn resolve(&self, country: &Country, records: Vec<ProxyRecord>) -> Vec<Arc<ProxyEndpoint>> {
        let mut endpoints = self
            .endpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let records: Vec<ProxyRecord> = records
            .into_iter()
            .filter(|r| r.active && &r.country == country)
            .collect();

        endpoints.retain(|id, endpoint| {
            endpoint.country() != country || records.iter().any(|r| r.id == *id)
        });

        let mut pool = Vec::with_capacity(records.len());
        for record in records {
            let reusable = endpoints
                .get(&record.id)
                .filter(|existing| existing.same_connection(&record))
                .cloned();

            let endpoint = match reusable {
                Some(endpoint) => endpoint,
                None => {
                    tracing::debug!(
                        proxy_id = record.id,
                        country = %country,
                        "Registering proxy endpoint"
                    );
                    let endpoint = Arc::new(ProxyEndpoint::new(record));
                    endpoints.insert(endpoint.id(), Arc::clone(&endpoint));
                    endpoint
                }
            };
            pool.push(endpoint);
        }

        pool
    }

    /// Number of cached endpoints across all countries
    pub fn len(&self) -> usize {
        self.endpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, country: &str, addr: &str) -> ProxyRecord {
        ProxyRecord {
            id,
            country: Country::parse(country).unwrap(),
            addr: addr.to_string(),
            username: None,
            password: None,
            active: true,
        }
    }

    #[test]
    fn test_resolve_reuses_endpoints() {
        let cache = EndpointCache::new();
        let ru = Country::parse("RU").unwrap();

        let first = cache.resolve(&ru, vec![record(1, "RU", "a:1"), record(2, "RU", "b:1")]);
        let second = cache.resolve(&ru, vec![record(1, "RU", "a:1"), record(2, "RU", "b:1")]);

        assert_eq!(first.len(), 2);
        assert!(Arc::ptr_eq(&first[0], &second[0]));
        assert!(Arc::ptr_eq(&first[1], &second[1]));
    }

    #[test]
    fn test_resolve_preserves_order() {
        let cache = EndpointCache::new();
        let ru = Country::parse("RU").unwrap();

        let pool = cache.resolve(
            &ru,
            vec![record(5, "RU", "e:1"), record(2, "RU", "b:1"), record(9, "RU", "i:1")],
        );
        let ids: Vec<i64> = pool.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec![5, 2, 9]);
    }

    #[test]
    fn test_changed_address_replaces_endpoint() {
        let cache = EndpointCache::new();
        let ru = Country::parse("RU").unwrap();

        let first = cache.resolve(&ru, vec![record(1, "RU", "a:1")]);
        let second = cache.resolve(&ru, vec![record(1, "RU", "a:2")]);

        assert!(!Arc::ptr_eq(&first[0], &second[0]));
        assert_eq!(second[0].record().addr, "a:2");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_removed_endpoints_are_pruned_per_country() {
        let cache = EndpointCache::new();
        let ru = Country::parse("RU").unwrap();
        let by = Country::parse("BY").unwrap();

        cache.resolve(&ru, vec![record(1, "RU", "a:1"), record(2, "RU", "b:1")]);
        cache.resolve(&by, vec![record(3, "BY", "c:1")]);
        assert_eq!(cache.len(), 3);

        cache.resolve(&ru, vec![record(2, "RU", "b:1")]);
        assert_eq!(cache.len(), 2);

        cache.resolve(&by, Vec::new());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_inactive_and_foreign_records_are_skipped() {
        let cache = EndpointCache::new();
        let ru = Country::parse("RU").unwrap();

        let mut inactive = record(1, "RU", "a:1");
        inactive.active = false;

        let pool = cache.resolve(&ru, vec![inactive, record(2, "BY", "b:1"), record(3, "RU", "c:1")]);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].id(), 3);
        assert!(!cache.is_empty());
    }
}
