//! Prometheus Metrics Module
//!
//! Exposes client metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Quotes**: quotes decoded, parse failures, quotes dropped by consumers
//! - **Connection**: lifecycle state, disconnects by reason, reconnects
//! - **Heartbeats**: application heartbeats sent
//!
//! # Integration
//!
//! When a port is configured, metrics are served over HTTP by the
//! exporter's built-in listener. Without an installed recorder every
//! recording call is a no-op.

use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::connection::ConnectionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Errors installing the metrics recorder.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Exporter could not be built.
    #[error("failed to build Prometheus exporter: {0}")]
    Build(#[from] BuildError),

    /// Another recorder is already installed.
    #[error("a metrics recorder is already installed")]
    AlreadyInstalled,
}

/// Install the Prometheus recorder and serve it on `listen`.
///
/// Must be called from within a Tokio runtime. Calling it again returns
/// the existing handle.
///
/// # Errors
///
/// Returns an error if the exporter cannot be built or another recorder
/// is already installed.
pub fn init_metrics(listen: SocketAddr) -> Result<PrometheusHandle, MetricsError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let (recorder, exporter) = PrometheusBuilder::new()
        .with_http_listener(listen)
        .build()?;
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).map_err(|_| MetricsError::AlreadyInstalled)?;

    tokio::spawn(async move {
        if let Err(e) = exporter.await {
            tracing::error!(error = ?e, "Metrics exporter stopped");
        }
    });

    register_metrics();
    tracing::info!(addr = %listen, "Metrics endpoint listening");

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Quote counters
    describe_counter!(
        "quote_stream_quotes_received_total",
        "Total quotes decoded from the stream"
    );
    describe_counter!(
        "quote_stream_parse_errors_total",
        "Total inbound text frames that failed to decode"
    );
    describe_counter!(
        "quote_stream_quotes_dropped_total",
        "Total quotes dropped because a consumer was full or gone"
    );

    // Connection
    describe_gauge!(
        "quote_stream_connection_state",
        "Connection state (0 disconnected, 1 connecting, 2 handshake, 3 open, 4 closing)"
    );
    describe_counter!(
        "quote_stream_disconnects_total",
        "Total connections lost, by reason"
    );
    describe_counter!(
        "quote_stream_reconnects_total",
        "Total reconnection attempts scheduled, by cause"
    );

    // Heartbeats
    describe_counter!(
        "quote_stream_heartbeats_sent_total",
        "Total application heartbeats sent"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a decoded quote.
pub fn record_quote_received() {
    counter!("quote_stream_quotes_received_total").increment(1);
}

/// Record a text frame that failed to decode.
pub fn record_parse_error() {
    counter!("quote_stream_parse_errors_total").increment(1);
}

/// Record quotes dropped by a consumer.
pub fn record_quotes_dropped(consumer: &'static str, count: u64) {
    counter!(
        "quote_stream_quotes_dropped_total",
        "consumer" => consumer
    )
    .increment(count);
}

/// Update the connection state gauge.
pub fn set_connection_state(state: ConnectionState) {
    gauge!("quote_stream_connection_state").set(state.as_gauge());
}

/// Record a lost connection.
pub fn record_disconnect(reason: &'static str) {
    counter!(
        "quote_stream_disconnects_total",
        "reason" => reason
    )
    .increment(1);
}

/// Record a scheduled reconnection attempt.
pub fn record_reconnect(cause: &'static str) {
    counter!(
        "quote_stream_reconnects_total",
        "cause" => cause
    )
    .increment(1);
}

/// Record an application heartbeat.
pub fn record_heartbeat_sent() {
    counter!("quote_stream_heartbeats_sent_total").increment(1);
}

// =============================================================================
// Tests
// =============================================================================
