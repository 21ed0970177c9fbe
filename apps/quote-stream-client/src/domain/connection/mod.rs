//! Connection Lifecycle
//!
//! ```text
//! Disconnected ──► Connecting ──► HandshakePending ──► Open ──► Closing
//!      ▲               │                 │              │          │
//!      └───────────────┴─────────────────┴──────────────┴──────────┘
//! ```
//!
//! Any failure returns to `Disconnected`; the connection manager decides
//! whether a retry is scheduled.

use std::fmt;

/// State of the single connection owned by a client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection and none being opened.
    #[default]
    Disconnected,

    /// Transport connect in flight.
    Connecting,

    /// Transport connected, upgrade response not yet received.
    HandshakePending,

    /// Handshake complete, quotes flowing.
    Open,

    /// Explicit close in progress.
    Closing,
}

impl ConnectionState {
    /// True while a connection exists or is being established.
    ///
    /// A connect request in any of these states is a no-op.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::HandshakePending | Self::Open)
    }

    /// True once the handshake has completed.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Numeric code exported as a gauge.
    #[must_use]
    pub const fn as_gauge(self) -> f64 {
        match self {
            Self::Disconnected => 0.0,
            Self::Connecting => 1.0,
            Self::HandshakePending => 2.0,
            Self::Open => 3.0,
            Self::Closing => 4.0,
        }
    }

    /// Lowercase label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::HandshakePending => "handshake_pending",
            Self::Open => "open",
            Self::Closing => "closing",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
