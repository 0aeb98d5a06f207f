//! Bounded digest queue and its single rate-limited consumer

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::channels::{ChannelError, ChannelResult, Messenger};
use crate::metrics;
use crate::storage::SharedSubscriberSource;

/// Producer handle of the digest queue
///
/// Cloneable; the broadcaster stops once every handle is dropped and the
/// queue is drained.
#[derive(Debug, Clone)]
pub struct DigestSender {
    tx: mpsc::Sender<String>,
}

impl DigestSender {
    /// Enqueue a digest, waiting while the queue is full
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Other`] when the broadcaster has stopped.
    pub async fn send(&self, digest: String) -> ChannelResult<()> {
        self.tx
            .send(digest)
            .await
            .map_err(|_| ChannelError::Other("broadcaster stopped".to_string()))
    }

    /// Free slots left in the queue
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }
}

/// Outcome of fanning out one digest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub recipients: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Totals over the broadcaster's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub digests: usize,
    pub dropped: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Fans digests out to every subscribed recipient at a capped rate
///
/// Subscribers are fetched fresh for each digest. One limiter token is spent
/// per recipient send; the quota has a burst of one and starts empty, so
/// sends are spaced evenly, N sends take at least N intervals, and no rolling
/// one-second window ever holds more than the configured number of sends.
pub struct Broadcaster {
    queue: mpsc::Receiver<String>,
    subscribers: SharedSubscriberSource,
    messenger: Arc<dyn Messenger>,
    limiter: DefaultDirectRateLimiter,
}

impl Broadcaster {
    /// Create a broadcaster and the sender feeding it
    ///
    /// # Arguments
    ///
    /// * `capacity` - Queue capacity in digests
    /// * `sends_per_second` - Maximum recipient sends per second
    /// * `subscribers` - Source of current recipients
    /// * `messenger` - Delivery channel
    pub fn new(
        capacity: usize,
        sends_per_second: u32,
        subscribers: SharedSubscriberSource,
        messenger: Arc<dyn Messenger>,
    ) -> (Self, DigestSender) {
        let (tx, queue) = mpsc::channel(capacity.max(1));

        let rate = NonZeroU32::new(sends_per_second).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(rate).allow_burst(NonZeroU32::MIN);
        let limiter = RateLimiter::direct(quota);
        // First send waits one interval like every other
        let _ = limiter.check();

        let broadcaster = Self {
            queue,
            subscribers,
            messenger,
            limiter,
        };

        (broadcaster, DigestSender { tx })
    }

    /// Consume digests until every sender is dropped
    pub async fn run(mut self) -> BroadcastStats {
        let mut stats = BroadcastStats::default();

        tracing::info!(channel = self.messenger.name(), "Broadcaster started");

        while let Some(digest) = self.queue.recv().await {
            stats.digests += 1;
            match self.broadcast(&digest).await {
                Some(report) => {
                    stats.delivered += report.delivered;
                    stats.failed += report.failed;
                }
                None => stats.dropped += 1,
            }
        }

        tracing::info!(
            digests = stats.digests,
            dropped = stats.dropped,
            delivered = stats.delivered,
            failed = stats.failed,
            "Broadcaster stopped"
        );

        stats
    }

    /// Send one digest to every current subscriber
    ///
    /// Returns `None` when the subscriber list could not be loaded; the
    /// digest is dropped in that case.
    pub async fn broadcast(&self, digest: &str) -> Option<DeliveryReport> {
        let recipients = match self.subscribers.list_subscribed_recipients() {
            Ok(recipients) => recipients,
            Err(e) => {
                tracing::error!(error = %e, "Could not load subscribers, dropping digest");
                metrics::record_digest_dropped();
                return None;
            }
        };

        let mut report = DeliveryReport {
            recipients: recipients.len(),
            ..DeliveryReport::default()
        };

        for subscriber in recipients {
            self.limiter.until_ready().await;

            match self.messenger.send(subscriber.chat_id, digest).await {
                Ok(()) => {
                    report.delivered += 1;
                    metrics::record_notification(true);
                }
                Err(e) => {
                    tracing::warn!(
                        chat_id = subscriber.chat_id,
                        channel = self.messenger.name(),
                        error = %e,
                        "Could not deliver digest"
                    );
                    report.failed += 1;
                    metrics::record_notification(false);
                }
            }
        }

        tracing::info!(
            recipients = report.recipients,
            delivered = report.delivered,
            failed = report.failed,
            "Digest broadcast finished"
        );

        Some(report)
    }
}
