#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Quote Stream Client - Real-time Market Quotes
//!
//! Keeps one upgraded connection to a quote server open, subscribes a fixed
//! set of product codes after every handshake, answers pings, sends
//! heartbeats when the outbound side goes quiet, reconnects when the
//! connection drops, and decodes quote envelopes for a downstream consumer.
//! Also carries one-shot fetchers for historical bars and quote snapshots.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Market data types and connection rules
//!   - `streaming`: Quote updates, snapshots, bars, time frames
//!   - `subscription`: Fixed code list and once-per-handshake subscribe
//!   - `connection`: Connection lifecycle states
//!
//! - **Application**: Port definitions
//!   - `ports`: Transport, frame connection, quote consumer
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `stream`: Connection manager, handshake, heartbeat, codec, WebSocket transport
//!   - `rest`: Bar and quote snapshot requests
//!   - `broadcast`: Fan-out and bounded-channel consumers
//!   - `config`: Environment configuration
//!   - `metrics` / `telemetry`: Prometheus and tracing
//!
//! # Data Flow
//!
//! ```text
//! quote server ──► WebSocketTransport ──► ConnectionManager ──► QuoteConsumer
//!                       ▲                   │  (one task)          ├─► QuoteBroadcast ─► subscribers
//!                       └── subscribe,      │                      └─► ChannelConsumer ─► mpsc
//!                           heartbeat, pong ┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core market data types with no I/O.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::ConnectionState;
pub use domain::streaming::{Bar, QuoteSnapshot, QuoteUpdate, TimeFrame};
pub use domain::subscription::{ProductCode, SubscriptionError, SubscriptionManager};

// Ports
pub use application::ports::{
    Endpoint, FrameConnection, InboundFrame, OutboundFrame, QuoteConsumer, Transport,
    TransportError,
};

// Infrastructure config
pub use infrastructure::config::{ClientConfig, ConfigError, RestSettings, StreamSettings};

// Stream client
pub use infrastructure::stream::{
    ClientHandle, ConnectionManager, DisconnectReason, StreamClientConfig, StreamClientError,
    WebSocketTransport,
};

// Request/response fetchers
pub use infrastructure::rest::{MarketDataClient, RestError};

// Consumers
pub use infrastructure::broadcast::{ChannelConsumer, QuoteBroadcast};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
