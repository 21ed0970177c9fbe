//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Quote stream client: connection lifecycle, handshake, heartbeat, decoding.
pub mod stream;

/// Historical bar and quote snapshot requests.
pub mod rest;

/// Quote consumer adapters (broadcast fan-out, bounded channel).
pub mod broadcast;

/// Configuration loading.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tracing subscriber and OpenTelemetry integration.
pub mod telemetry;
