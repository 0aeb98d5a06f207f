//! Ordered proxy fallback for one target in one country

use std::sync::Arc;

use crate::metrics;
use crate::models::{CheckOutcome, Country, Target};
use crate::probe::SiteProber;
use crate::proxy::{ClientFactory, ProxyEndpoint};

/// The outcome accepted for one (target, country) pair
#[derive(Debug, Clone)]
pub struct FallbackResult {
    /// Outcome to persist, attributed to `proxy_id`
    pub outcome: CheckOutcome,

    /// Proxy whose probe produced the outcome
    pub proxy_id: i64,

    /// Probes actually issued (client construction failures are not probes)
    pub probes: usize,
}

/// Walks a country's proxy pool in order until one probe completes
///
/// - first completed HTTP exchange wins, later endpoints are never probed
/// - a transport failure on a non-last endpoint is discarded
/// - a transport failure on the last endpoint is accepted, so the outcome
///   records the last-tried proxy's failure
/// - an endpoint whose client cannot be built is skipped without counting
///   as a probe
pub struct FallbackExecutor {
    prober: SiteProber,
    factory: Arc<dyn ClientFactory>,
}

impl FallbackExecutor {
    /// Create an executor probing with `prober` through clients from `factory`
    pub fn new(prober: SiteProber, factory: Arc<dyn ClientFactory>) -> Self {
        Self { prober, factory }
    }

    /// Run the fallback chain for `target`
    ///
    /// Returns `None` only when no endpoint yielded a usable client.
    pub async fn execute(
        &self,
        target: &Target,
        country: &Country,
        pool: &[Arc<ProxyEndpoint>],
    ) -> Option<FallbackResult> {
        let last = pool.len().checked_sub(1)?;
        let mut probes = 0;

        for (index, endpoint) in pool.iter().enumerate() {
            let is_last = index == last;

            let client = match endpoint.client(self.factory.as_ref()).await {
                Ok(client) => client,
                Err(e) => {
                    tracing::warn!(
                        proxy_id = endpoint.id(),
                        country = %country,
                        error = %e,
                        "Could not init proxy client"
                    );
                    continue;
                }
            };

            probes += 1;
            match self.prober.probe(client, target, country).await {
                Ok(outcome) => {
                    metrics::record_probe(
                        country.as_str(),
                        if outcome.is_active { "reachable" } else { "unreachable" },
                    );
                    return Some(FallbackResult {
                        outcome: outcome.with_proxy(endpoint.id()),
                        proxy_id: endpoint.id(),
                        probes,
                    });
                }
                Err(failure) => {
                    metrics::record_probe(country.as_str(), "error");
                    tracing::warn!(
                        proxy_id = endpoint.id(),
                        target_id = target.id,
                        url = %target.url,
                        country = %country,
                        error = %failure.outcome.error_text,
                        last = is_last,
                        "Could not check using proxy"
                    );

                    if is_last {
                        return Some(FallbackResult {
                            outcome: failure.outcome.with_proxy(endpoint.id()),
                            proxy_id: endpoint.id(),
                            probes,
                        });
                    }
                }
            }
        }

        tracing::warn!(
            target_id = target.id,
            url = %target.url,
            country = %country,
            "No proxy client could be built; nothing recorded"
        );
        None
    }
}
