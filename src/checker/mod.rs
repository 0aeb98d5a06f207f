//! Per-country checking of all targets
//!
//! A [`CountryChecker`] walks the target list strictly in order, one target at
//! a time, delegating each to the [`FallbackExecutor`] and persisting exactly
//! one outcome per target. Targets are never probed in parallel within a
//! country so the load on the country's proxy pool stays predictable.

mod fallback;

pub use fallback::{FallbackExecutor, FallbackResult};

use std::sync::Arc;

use crate::metrics;
use crate::models::{CheckOutcome, Country, Target};
use crate::proxy::ProxyEndpoint;
use crate::storage::SharedStore;

/// Summary of one country's pass over the target list
#[derive(Debug, Clone)]
pub struct CountryReport {
    pub country: Country,

    /// Outcomes that were persisted, in target order
    pub outcomes: Vec<CheckOutcome>,

    /// Targets whose outcome could not be persisted
    pub persist_failures: usize,

    /// Targets for which no proxy client could be built
    pub unchecked: usize,

    /// Whether the country was skipped for lack of proxies
    pub no_proxies: bool,
}

impl CountryReport {
    fn new(country: &Country) -> Self {
        Self {
            country: country.clone(),
            outcomes: Vec::new(),
            persist_failures: 0,
            unchecked: 0,
            no_proxies: false,
        }
    }

    /// Number of persisted outcomes marked reachable
    pub fn reachable(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_active).count()
    }
}

/// Checks every target for one country through its proxy pool
pub struct CountryChecker {
    executor: FallbackExecutor,
    store: SharedStore,
}

impl CountryChecker {
    /// Create a checker persisting into `store`
    pub fn new(executor: FallbackExecutor, store: SharedStore) -> Self {
        Self { executor, store }
    }

    /// Check all `targets` for `country`
    ///
    /// An empty pool is logged and nothing is persisted. A failed upsert is
    /// logged and the remaining targets are still checked.
    pub async fn check(
        &self,
        country: &Country,
        pool: &[Arc<ProxyEndpoint>],
        targets: &[Target],
    ) -> CountryReport {
        let mut report = CountryReport::new(country);

        if pool.is_empty() {
            tracing::warn!(country = %country, "no proxy for country {country}");
            report.no_proxies = true;
            return report;
        }

        tracing::info!(
            country = %country,
            targets = targets.len(),
            proxies = pool.len(),
            "Start handling targets for country"
        );

        for target in targets {
            let Some(result) = self.executor.execute(target, country, pool).await else {
                report.unchecked += 1;
                continue;
            };

            tracing::info!(
                url = %target.url,
                country = %country,
                proxy_id = result.proxy_id,
                probes = result.probes,
                reachable = result.outcome.is_active,
                status = result.outcome.status_code,
                has_error = result.outcome.has_error(),
                "Done checking target"
            );

            match self.store.upsert_outcome(&result.outcome) {
                Ok(()) => {
                    metrics::record_outcome_persisted(country.as_str(), result.outcome.is_active);
                    report.outcomes.push(result.outcome);
                }
                Err(e) => {
                    tracing::error!(
                        proxy_id = result.proxy_id,
                        target_id = target.id,
                        url = %target.url,
                        country = %country,
                        error = %e,
                        "Could not persist check outcome"
                    );
                    report.persist_failures += 1;
                }
            }
        }

        tracing::info!(
            country = %country,
            persisted = report.outcomes.len(),
            reachable = report.reachable(),
            persist_failures = report.persist_failures,
            "Done handling targets for country"
        );

        report
    }
}
