//! Quote Stream Client Binary
//!
//! Connects to the quote server, subscribes the configured product codes
//! and logs every decoded quote until interrupted.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin quote-stream-client
//! ```
//!
//! # Environment Variables
//!
//! - `QUOTE_STREAM_HOST` / `QUOTE_STREAM_PORT` / `QUOTE_STREAM_PATH`: server address
//! - `QUOTE_STREAM_CODES`: comma-separated product codes (default: btcusdt,ethusdt)
//! - `MARKET_DATA_BASE_URL`: base URL for quote snapshots
//! - `QUOTE_STREAM_METRICS_PORT`: Prometheus metrics port (default: 0, disabled)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use quote_stream_client::infrastructure::telemetry;
use quote_stream_client::{
    ClientConfig, ConnectionManager, MarketDataClient, QuoteBroadcast, StreamClientConfig,
    WebSocketTransport, init_metrics,
};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize telemetry (tracing + optional OTLP)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting quote stream client");

    let config = ClientConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    if config.metrics_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
        init_metrics(addr).context("failed to start metrics exporter")?;
    }

    let shutdown_token = CancellationToken::new();

    // Quotes fan out to any number of subscribers; the logger is one of them
    let quotes = QuoteBroadcast::new(config.stream.consumer_capacity);
    let quote_log = tokio::spawn(log_quotes(quotes.clone(), shutdown_token.clone()));

    let stream_config = StreamClientConfig::from_stream_settings(&config.stream)
        .context("invalid product codes")?;
    let (manager, handle) = ConnectionManager::new(
        WebSocketTransport::new(),
        stream_config,
        Arc::new(quotes),
        shutdown_token.clone(),
    );

    let mut client = tokio::spawn(manager.run());
    handle.connect();

    // Initial snapshots for the subscribed codes
    let market_data = MarketDataClient::from_settings(&config.rest)
        .context("failed to build market data client")?;
    tokio::spawn(log_snapshots(market_data, config.stream.codes.clone()));

    let finished = tokio::select! {
        () = await_shutdown() => None,
        result = &mut client => Some(result),
    };

    handle.shutdown();
    let result = match finished {
        Some(result) => Some(result),
        None => tokio::time::timeout(SHUTDOWN_TIMEOUT, client).await.ok(),
    };
    match result {
        Some(Ok(Ok(()))) => tracing::info!("Quote stream client finished"),
        Some(Ok(Err(e))) => tracing::error!(error = %e, "Quote stream client stopped"),
        Some(Err(e)) => tracing::error!(error = %e, "Quote stream task failed"),
        None => tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Quote stream client did not stop in time"
        ),
    }

    if quote_log.await.is_err() {
        tracing::warn!("Quote logger task failed");
    }

    tracing::info!("Quote stream client stopped");
    Ok(())
}

/// Log every broadcast quote until shutdown.
async fn log_quotes(quotes: QuoteBroadcast, shutdown: CancellationToken) {
    let mut rx = quotes.subscribe();
    drop(quotes);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            received = rx.recv() => match received {
                Ok(quote) => tracing::info!(
                    code = %quote.stock_code,
                    price = %quote.price,
                    diff_rate = ?quote.diff_rate,
                    bid = ?quote.bid_price,
                    ask = ?quote.ask_price,
                    time = %quote.time,
                    "Quote"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Quote logger lagging");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}

/// Fetch and log one snapshot per code.
async fn log_snapshots(client: MarketDataClient, codes: Vec<String>) {
    for code in codes {
        match client.fetch_quote(&code).await {
            Ok(snapshot) => tracing::info!(
                code = %snapshot.stock_code,
                price = %snapshot.price,
                time = %snapshot.time,
                "Snapshot"
            ),
            Err(e) => tracing::warn!(%code, error = %e, "Snapshot request failed"),
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &ClientConfig) {
    tracing::info!(
        host = %config.stream.host,
        port = config.stream.port,
        path = %config.stream.path,
        codes = ?config.stream.codes,
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
    tracing::debug!(
        write_idle_secs = config.stream.write_idle.as_secs(),
        read_idle_secs = config.stream.read_idle.map(|d| d.as_secs()),
        connect_retry_ms = config.stream.connect_retry_delay.as_millis(),
        reconnect_delay_ms = config.stream.reconnect_delay.as_millis(),
        rest_base_url = %config.rest.base_url,
        "Stream timing"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
