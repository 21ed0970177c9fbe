//! Upgrade Handshake
//!
//! Negotiates the protocol upgrade on a freshly connected transport.
//!
//! # Handshake Flow
//!
//! 1. Transport connected
//! 2. Send the upgrade request for `ws://host:port/ws`
//! 3. First inbound unit must be the handshake response with status 101
//! 4. Anything else fails the connection and takes the reconnect path
//!
//! The response's content type is not checked.

use thiserror::Error;

use crate::application::ports::{Endpoint, InboundFrame, UpgradeRequest};

// =============================================================================
// Constants
// =============================================================================

/// HTTP status for a successful protocol switch.
pub const SWITCHING_PROTOCOLS: u16 = 101;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// The server answered the upgrade with a non-101 status.
    #[error("upgrade rejected with status {0}")]
    Rejected(u16),

    /// The first inbound unit was not a handshake response.
    #[error("expected handshake response, got {0} frame")]
    Malformed(&'static str),

    /// A response arrived before the request was sent.
    #[error("handshake response received before request")]
    NotStarted,
}

// =============================================================================
// Handshake State
// =============================================================================

/// Current state of the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeState {
    /// Request not yet sent.
    #[default]
    Idle,

    /// Request sent, awaiting response.
    Pending,

    /// Upgrade accepted.
    Complete,

    /// Upgrade rejected or malformed response.
    Failed,
}

impl HandshakeState {
    /// Check if the handshake has completed.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Check if a response is awaited.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

// =============================================================================
// Protocol Negotiator
// =============================================================================

/// Handshake state machine for one connection.
///
/// # Example
///
/// ```rust
/// use quote_stream_client::application::ports::{Endpoint, InboundFrame};
/// use quote_stream_client::infrastructure::stream::handshake::ProtocolNegotiator;
///
/// let mut negotiator = ProtocolNegotiator::new(Endpoint::new("localhost", 80, "/ws"));
/// let request = negotiator.start();
/// assert_eq!(request.url, "ws://localhost:80/ws");
///
/// negotiator
///     .on_response(&InboundFrame::HandshakeResponse { status: 101 })
///     .unwrap();
/// assert!(negotiator.is_complete());
/// ```
#[derive(Debug)]
pub struct ProtocolNegotiator {
    endpoint: Endpoint,
    state: HandshakeState,
}

impl ProtocolNegotiator {
    /// Create a negotiator for a connection to `endpoint`.
    #[must_use]
    pub const fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            state: HandshakeState::Idle,
        }
    }

    /// Get the current handshake state.
    #[must_use]
    pub const fn state(&self) -> HandshakeState {
        self.state
    }

    /// Check if the handshake has completed.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.state.is_complete()
    }

    /// Build the upgrade request and mark the handshake pending.
    pub fn start(&mut self) -> UpgradeRequest {
        self.state = HandshakeState::Pending;
        UpgradeRequest {
            url: self.endpoint.url(),
        }
    }

    /// Process the first inbound unit.
    ///
    /// # Errors
    ///
    /// Returns `HandshakeError` unless the unit is a 101 handshake response
    /// received while pending.
    pub fn on_response(&mut self, frame: &InboundFrame) -> Result<(), HandshakeError> {
        if !self.state.is_pending() {
            self.state = HandshakeState::Failed;
            return Err(HandshakeError::NotStarted);
        }

        let result = match frame {
            InboundFrame::HandshakeResponse {
                status: SWITCHING_PROTOCOLS,
            } => Ok(()),
            InboundFrame::HandshakeResponse { status } => Err(HandshakeError::Rejected(*status)),
            other => Err(HandshakeError::Malformed(other.kind())),
        };

        self.state = if result.is_ok() {
            HandshakeState::Complete
        } else {
            HandshakeState::Failed
        };
        result
    }
}
