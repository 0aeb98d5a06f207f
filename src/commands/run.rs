use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use blockwatch::checker::{CountryChecker, FallbackExecutor};
use blockwatch::config::Config;
use blockwatch::metrics;
use blockwatch::notifications::{Broadcaster, TelegramChannel, TelegramConfig};
use blockwatch::probe::SiteProber;
use blockwatch::proxy::Socks5ClientFactory;
use blockwatch::scheduler::CycleScheduler;
use blockwatch::storage::SqliteStore;

/// Time allowed for queued digests to drain on shutdown
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Start the scheduler, the broadcaster and the optional metrics listener
pub async fn run(config: Config) -> Result<()> {
    let token = config.require_telegram_token()?.to_string();

    let store = Arc::new(
        SqliteStore::open(&config.database.sqlite_path).with_context(|| {
            format!(
                "Failed to open database: {}",
                config.database.sqlite_path.display()
            )
        })?,
    );

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics initialization failed, continuing without metrics");
    }

    let channel = TelegramChannel::new(
        TelegramConfig::new(token).with_api_base(config.notifications.telegram_api_base.clone()),
    )
    .context("Failed to create Telegram channel")?;

    let (broadcaster, digests) = Broadcaster::new(
        config.notifications.queue_capacity,
        config.notifications.sends_per_second,
        store.clone(),
        Arc::new(channel),
    );

    let factory = Arc::new(Socks5ClientFactory::new(config.connect_timeout()));
    let executor = FallbackExecutor::new(SiteProber::with_timeout(config.probe_timeout()), factory);
    let checker = CountryChecker::new(executor, store.clone());
    let scheduler = CycleScheduler::new(
        store,
        checker,
        config.checker.countries.clone(),
        config.interval(),
    )
    .with_digests(digests);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let broadcaster_handle = tokio::spawn(broadcaster.run());

    let metrics_handle = config.metrics.listen_addr.map(|addr| {
        let mut rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let shutdown = async move {
                let _ = rx.changed().await;
            };
            if let Err(e) = metrics::serve(addr, shutdown).await {
                tracing::error!(addr = %addr, error = %e, "Metrics listener failed");
            }
        })
    });

    tracing::info!(
        database = %config.database.sqlite_path.display(),
        interval_secs = config.checker.interval_secs,
        "blockwatch service started"
    );

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received, finishing current cycle"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
        shutdown_tx.send(true).ok();
    });

    scheduler.run(shutdown_rx).await;

    // Dropping the scheduler closes the digest queue
    drop(scheduler);
    match tokio::time::timeout(DRAIN_TIMEOUT, broadcaster_handle).await {
        Ok(Ok(stats)) => tracing::info!(
            digests = stats.digests,
            delivered = stats.delivered,
            "Broadcaster drained"
        ),
        Ok(Err(e)) => tracing::error!(error = %e, "Broadcaster task failed"),
        Err(_) => tracing::warn!("Broadcaster did not drain in time"),
    }

    if let Some(handle) = metrics_handle {
        handle.await.ok();
    }

    Ok(())
}
