//! Periodic multi-country checking cycles
//!
//! # Overview
//!
//! The [`CycleScheduler`] fires one cycle immediately on start and then one
//! per interval. A cycle loads the targets and every country's proxy pool,
//! runs one [`CountryChecker`] task per country concurrently and joins all of
//! them before the next tick can fire, so cycles never overlap.
//!
//! ```text
//!  tick ──▶ load targets ──▶ load pools ──▶ snapshot outcomes
//!                                               │
//!                       ┌───────────────────────┼───────────────────────┐
//!                       ▼                       ▼                       ▼
//!                 CountryChecker(RU)     CountryChecker(BY)      ...
//!                       └───────────────────────┬───────────────────────┘
//!                                               ▼
//!                                  join ──▶ diff ──▶ digest
//! ```
//!
//! Load failures abandon the cycle, an empty target list skips it; neither
//! stops the loop.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};

use crate::checker::{CountryChecker, CountryReport};
use crate::metrics;
use crate::models::{Country, ReachabilityChange, Target};
use crate::notifications::{format_changes, DigestSender, ReachabilitySnapshot};
use crate::proxy::{EndpointCache, ProxyEndpoint};
use crate::storage::SharedStore;

/// How a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    /// All country checkers ran and were joined
    Completed,
    /// No targets to check
    Skipped,
    /// Targets or a proxy pool could not be loaded
    Abandoned,
}

impl CycleStatus {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub status: CycleStatus,

    /// One report per country, in configured order
    pub countries: Vec<CountryReport>,

    /// Reachability flips found after the join
    pub changes: Vec<ReachabilityChange>,

    /// Whether every part of the change digest was enqueued
    pub digest_enqueued: bool,

    pub elapsed: Duration,
}

impl CycleReport {
    fn empty(status: CycleStatus, started: Instant) -> Self {
        Self {
            status,
            countries: Vec::new(),
            changes: Vec::new(),
            digest_enqueued: false,
            elapsed: started.elapsed(),
        }
    }

    /// Report of one country, if it was checked
    pub fn country(&self, country: &Country) -> Option<&CountryReport> {
        self.countries.iter().find(|r| &r.country == country)
    }
}

/// Drives checking cycles at a fixed period
pub struct CycleScheduler {
    store: SharedStore,
    checker: Arc<CountryChecker>,
    endpoints: EndpointCache,
    countries: Vec<Country>,
    interval: Duration,
    digests: Option<DigestSender>,
}

impl CycleScheduler {
    /// Create a scheduler for `countries`
    ///
    /// # Arguments
    ///
    /// * `store` - Source of targets and proxies, sink of outcomes
    /// * `checker` - Per-country checker shared by all country tasks
    /// * `countries` - Countries checked each cycle, in report order
    /// * `interval` - Period between cycle starts
    pub fn new(
        store: SharedStore,
        checker: CountryChecker,
        countries: Vec<Country>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            checker: Arc::new(checker),
            endpoints: EndpointCache::default(),
            countries,
            interval,
            digests: None,
        }
    }

    /// Enqueue a change digest after every cycle that observed changes
    pub fn with_digests(mut self, digests: DigestSender) -> Self {
        self.digests = Some(digests);
        self
    }

    /// Countries checked each cycle
    pub fn countries(&self) -> &[Country] {
        &self.countries
    }

    /// Run cycles until `shutdown` flips to `true` or its sender is dropped
    ///
    /// The first cycle starts immediately. Shutdown is only observed between
    /// cycles, so an in-flight cycle always finishes, and a pending shutdown
    /// wins over a due tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            countries = ?self.countries.iter().map(Country::as_str).collect::<Vec<_>>(),
            "Cycle scheduler started"
        );

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Cycle scheduler shutting down");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
            }
        }
    }

    /// Run a single cycle to completion
    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let timer = metrics::start_cycle_timer();

        tracing::info!("Cycle started");

        let targets = match self.store.list_targets() {
            Ok(targets) if targets.is_empty() => {
                tracing::info!("No targets to check, skipping cycle");
                return self.finish_early(CycleStatus::Skipped, started, timer);
            }
            Ok(targets) => targets,
            Err(e) => {
                tracing::error!(error = %e, "Could not load targets, abandoning cycle");
                return self.finish_early(CycleStatus::Abandoned, started, timer);
            }
        };

        let mut pools: Vec<(Country, Vec<Arc<ProxyEndpoint>>)> = Vec::new();
        for country in &self.countries {
            match self.store.list_active_proxies(country) {
                Ok(records) => pools.push((country.clone(), self.endpoints.resolve(country, records))),
                Err(e) => {
                    tracing::error!(
                        country = %country,
                        error = %e,
                        "Could not load proxies, abandoning cycle"
                    );
                    return self.finish_early(CycleStatus::Abandoned, started, timer);
                }
            }
        }

        let snapshot = self.snapshot();

        let targets: Arc<[Target]> = targets.into();
        let mut tasks = JoinSet::new();
        for (country, pool) in pools {
            let checker = Arc::clone(&self.checker);
            let targets = Arc::clone(&targets);
            tasks.spawn(async move { checker.check(&country, &pool, &targets).await });
        }

        let mut reports = Vec::with_capacity(self.countries.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => tracing::error!(error = %e, "Country task failed"),
            }
        }
        reports.sort_by_key(|r| self.countries.iter().position(|c| c == &r.country));

        let changes = snapshot
            .map(|s| s.changes(&targets, reports.iter().flat_map(|r| r.outcomes.iter())))
            .unwrap_or_default();
        let digest_enqueued = self.enqueue_digest(&changes).await;

        drop(timer);
        metrics::record_cycle(CycleStatus::Completed.as_str());

        let elapsed = started.elapsed();
        tracing::info!(
            targets = targets.len(),
            persisted = reports.iter().map(|r| r.outcomes.len()).sum::<usize>(),
            changes = changes.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Cycle finished"
        );

        CycleReport {
            status: CycleStatus::Completed,
            countries: reports,
            changes,
            digest_enqueued,
            elapsed,
        }
    }

    /// Record stored flags before the cycle; `None` disables change detection
    fn snapshot(&self) -> Option<ReachabilitySnapshot> {
        self.digests.as_ref()?;

        let mut snapshot = ReachabilitySnapshot::new();
        for country in &self.countries {
            match self.store.list_outcomes(country) {
                Ok(rows) => snapshot.record(country, &rows),
                Err(e) => {
                    tracing::warn!(
                        country = %country,
                        error = %e,
                        "Could not snapshot outcomes, change detection disabled for this cycle"
                    );
                    return None;
                }
            }
        }
        Some(snapshot)
    }

    async fn enqueue_digest(&self, changes: &[ReachabilityChange]) -> bool {
        let Some(digests) = &self.digests else {
            return false;
        };
        let messages = format_changes(changes, &self.countries);
        if messages.is_empty() {
            return false;
        }

        let parts = messages.len();
        for text in messages {
            if let Err(e) = digests.send(text).await {
                tracing::warn!(error = %e, "Could not enqueue change digest");
                return false;
            }
        }

        tracing::info!(changes = changes.len(), parts, "Change digest enqueued");
        true
    }

    fn finish_early(
        &self,
        status: CycleStatus,
        started: Instant,
        timer: metrics::MetricsTimer,
    ) -> CycleReport {
        timer.discard();
        metrics::record_cycle(status.as_str());
        CycleReport::empty(status, started)
    }
}
