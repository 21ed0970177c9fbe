//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `Transport` / `FrameConnection`: the upgraded socket to the quote server
//! - `QuoteConsumer`: downstream receiver of decoded quotes

use std::fmt;

use async_trait::async_trait;

use crate::domain::streaming::QuoteUpdate;

// =============================================================================
// Endpoint
// =============================================================================

/// Address of the quote stream server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Upgrade request path.
    pub path: String,
}

impl Endpoint {
    /// Create an endpoint.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            path: path.into(),
        }
    }

    /// `host:port` for the TCP connect.
    #[must_use]
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Full `ws://` URL for the upgrade request.
    #[must_use]
    pub fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!("ws://{}:{}{}", self.host, self.port, path)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

// =============================================================================
// Frames
// =============================================================================

/// Upgrade request issued once per connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// Target URL, including path.
    pub url: String,
}

/// One unit received from the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Response to the upgrade request.
    HandshakeResponse {
        /// HTTP status code.
        status: u16,
    },
    /// UTF-8 text payload.
    Text(String),
    /// Binary payload.
    Binary(Vec<u8>),
    /// Protocol ping with payload.
    Ping(Vec<u8>),
    /// Protocol pong with payload.
    Pong(Vec<u8>),
    /// Close with raw payload (2-byte status code followed by reason).
    Close(Vec<u8>),
}

impl InboundFrame {
    /// Short kind label for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::HandshakeResponse { .. } => "handshake_response",
            Self::Text(_) => "text",
            Self::Binary(_) => "binary",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
            Self::Close(_) => "close",
        }
    }
}

/// One unit sent over the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// UTF-8 text payload.
    Text(String),
    /// Protocol pong answering a ping.
    Pong(Vec<u8>),
}

/// Transport-level failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// TCP connect failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Reading from or writing to the connection failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// Send or upgrade attempted on a connection in the wrong stage.
    #[error("connection not ready: {0}")]
    NotReady(&'static str),

    /// The connection has already been closed.
    #[error("connection closed")]
    Closed,
}

// =============================================================================
// Transport Ports
// =============================================================================

/// Factory for connections to the quote server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connection type produced by this transport.
    type Connection: FrameConnection + 'static;

    /// Open a raw connection. The upgrade has not happened yet.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Connection, TransportError>;
}

/// An open connection carrying frames.
///
/// `recv` must be cancel-safe: it is polled from `tokio::select!`.
#[async_trait]
pub trait FrameConnection: Send {
    /// Issue the upgrade request. The response arrives through `recv` as
    /// `InboundFrame::HandshakeResponse`.
    async fn upgrade(&mut self, request: &UpgradeRequest) -> Result<(), TransportError>;

    /// Send one frame.
    async fn send(&mut self, frame: OutboundFrame) -> Result<(), TransportError>;

    /// Receive the next frame. `None` means the peer went away.
    async fn recv(&mut self) -> Option<Result<InboundFrame, TransportError>>;

    /// Close the connection.
    async fn close(&mut self) -> Result<(), TransportError>;
}

// =============================================================================
// Consumer Port
// =============================================================================

/// Receiver of decoded quotes.
///
/// Called from the connection's event loop. Implementations must not block.
pub trait QuoteConsumer: Send + Sync {
    /// Handle one quote.
    fn on_quote(&self, quote: QuoteUpdate);
}

impl<F> QuoteConsumer for F
where
    F: Fn(QuoteUpdate) + Send + Sync,
{
    fn on_quote(&self, quote: QuoteUpdate) {
        self(quote);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_url_includes_path() {
        let endpoint = Endpoint::new("39.107.99.235", 80, "/ws");
        assert_eq!(endpoint.url(), "ws://39.107.99.235:80/ws");
        assert_eq!(endpoint.authority(), "39.107.99.235:80");
    }

    #[test]
    fn endpoint_url_adds_missing_slash() {
        let endpoint = Endpoint::new("localhost", 9000, "ws");
        assert_eq!(endpoint.url(), "ws://localhost:9000/ws");
    }

    #[test]
    fn closure_is_a_consumer() {
        use std::sync::Mutex;

        let seen = Mutex::new(Vec::new());
        let consumer = |quote: QuoteUpdate| seen.lock().unwrap().push(quote.stock_code);

        let quote: QuoteUpdate =
            serde_json::from_str(r#"{"StockCode":"btcusdt","Price":"1"}"#).unwrap();
        consumer.on_quote(quote);

        assert_eq!(seen.lock().unwrap().as_slice(), ["btcusdt"]);
    }
}
