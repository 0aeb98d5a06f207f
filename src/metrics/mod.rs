//! Prometheus metrics for the checking cycle and the broadcaster
//!
//! This module tracks:
//! - Scheduler: cycles by status, cycle wall time
//! - Checkers: probes by country and result, persisted outcomes
//! - Broadcaster: recipient sends by result, dropped digests
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use axum::{http::header, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Encoder,
    Histogram, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tower_http::trace::TraceLayer;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all checker metrics
struct CheckerMetrics {
    cycles: CounterVec,
    cycle_duration: Histogram,
    probes: CounterVec,
    outcomes_persisted: CounterVec,
}

/// Container for all broadcaster metrics
struct NotificationMetrics {
    sends: CounterVec,
    digests_dropped: Counter,
}

static CHECKER_METRICS: OnceLock<CheckerMetrics> = OnceLock::new();

static NOTIFICATION_METRICS: OnceLock<NotificationMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, subsequent metric operations become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = blockwatch::metrics::init_metrics() {
///     tracing::warn!(error = %e, "Metrics initialization failed");
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let checker = CheckerMetrics {
        cycles: register_counter_vec!(
            "blockwatch_cycles_total",
            "Total checking cycles by status",
            &["status"]
        )?,
        cycle_duration: register_histogram!(
            "blockwatch_cycle_duration_seconds",
            "Wall time of a completed checking cycle in seconds",
            vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]
        )?,
        probes: register_counter_vec!(
            "blockwatch_probes_total",
            "Total probes by country and result",
            &["country", "result"]
        )?,
        outcomes_persisted: register_counter_vec!(
            "blockwatch_outcomes_persisted_total",
            "Total persisted outcomes by country and reachability",
            &["country", "reachable"]
        )?,
    };

    let notifications = NotificationMetrics {
        sends: register_counter_vec!(
            "blockwatch_notifications_sent_total",
            "Total recipient sends by result",
            &["result"]
        )?,
        digests_dropped: register_counter!(
            "blockwatch_digests_dropped_total",
            "Digests dropped because subscribers could not be loaded"
        )?,
    };

    CHECKER_METRICS
        .set(checker)
        .map_err(|_| "Checker metrics already initialized")?;
    NOTIFICATION_METRICS
        .set(notifications)
        .map_err(|_| "Notification metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    CHECKER_METRICS.get().is_some() && NOTIFICATION_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record the end of a cycle (`completed`, `skipped` or `abandoned`)
pub fn record_cycle(status: &str) {
    if let Some(m) = CHECKER_METRICS.get() {
        m.cycles.with_label_values(&[status]).inc();
    }
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    /// Create a no-op timer when metrics are not initialized
    fn noop() -> Self {
        Self { timer: None }
    }

    /// Drop the timer without recording
    pub fn discard(mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_discard();
        }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start a cycle timer (returns a timer handle)
pub fn start_cycle_timer() -> MetricsTimer {
    match CHECKER_METRICS.get() {
        Some(m) => MetricsTimer {
            timer: Some(m.cycle_duration.start_timer()),
        },
        None => MetricsTimer::noop(),
    }
}

/// Record one probe (`reachable`, `unreachable` or `error`)
pub fn record_probe(country: &str, result: &str) {
    if let Some(m) = CHECKER_METRICS.get() {
        m.probes.with_label_values(&[country, result]).inc();
    }
}

/// Record one persisted outcome
pub fn record_outcome_persisted(country: &str, reachable: bool) {
    let Some(m) = CHECKER_METRICS.get() else {
        return;
    };

    let reachable = if reachable { "true" } else { "false" };
    m.outcomes_persisted
        .with_label_values(&[country, reachable])
        .inc();
}

/// Record one recipient send
pub fn record_notification(delivered: bool) {
    let Some(m) = NOTIFICATION_METRICS.get() else {
        return;
    };

    let result = if delivered { "success" } else { "failure" };
    m.sends.with_label_values(&[result]).inc();
}

/// Record a digest dropped before fan-out
pub fn record_digest_dropped() {
    if let Some(m) = NOTIFICATION_METRICS.get() {
        m.digests_dropped.inc();
    }
}

// ============================================================================
// HTTP exposition
// ============================================================================

async fn metrics_handler() -> impl IntoResponse {
    match encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain")],
            format!("failed to encode metrics: {e}"),
        ),
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

/// Router exposing `GET /metrics` and `GET /health`
pub fn router() -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
}

/// Serve [`router`] on `addr` until `shutdown` resolves
pub async fn serve(
    addr: SocketAddr,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Metrics listener started");

    axum::serve(listener, router())
        .with_graceful_shutdown(shutdown)
        .await
}

// ============================================================================
// Tests
// ============================================================================
