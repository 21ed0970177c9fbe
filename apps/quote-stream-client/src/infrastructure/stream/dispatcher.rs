//! Frame Dispatcher
//!
//! Routes each inbound unit of one connection. Until the handshake
//! completes every unit goes to the negotiator; afterwards:
//!
//! | Unit   | Effect                                       |
//! |--------|----------------------------------------------|
//! | text   | decode envelope, emit quote or drop          |
//! | binary | logged only                                  |
//! | ping   | answer with one pong, same payload           |
//! | pong   | idle bookkeeping only (done by the caller)   |
//! | close  | decode status and reason, connection is lost |

use crate::application::ports::{InboundFrame, OutboundFrame};
use crate::domain::streaming::QuoteUpdate;
use crate::infrastructure::metrics;

use super::client::DisconnectReason;
use super::codec::QuoteMessageParser;
use super::handshake::ProtocolNegotiator;

/// Result of dispatching one inbound unit.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The handshake just completed; the subscribe should go out now.
    HandshakeComplete,
    /// A decoded quote for the consumer.
    Quote(QuoteUpdate),
    /// A frame to send back immediately.
    Reply(OutboundFrame),
    /// Nothing further to do.
    Ignored,
}

/// Per-connection inbound router.
#[derive(Debug)]
pub struct FrameDispatcher {
    negotiator: ProtocolNegotiator,
    parser: QuoteMessageParser,
    handshake_complete: bool,
}

impl FrameDispatcher {
    /// Create a dispatcher for a new connection.
    #[must_use]
    pub const fn new(negotiator: ProtocolNegotiator) -> Self {
        Self {
            negotiator,
            parser: QuoteMessageParser::new(),
            handshake_complete: false,
        }
    }

    /// Whether the handshake has completed on this connection.
    #[must_use]
    pub const fn handshake_complete(&self) -> bool {
        self.handshake_complete
    }

    /// Route one inbound unit.
    ///
    /// # Errors
    ///
    /// Returns the reason the connection must be dropped: a failed
    /// handshake or a peer close.
    pub fn dispatch(&mut self, frame: InboundFrame) -> Result<DispatchOutcome, DisconnectReason> {
        if !self.handshake_complete {
            self.negotiator.on_response(&frame)?;
            self.handshake_complete = true;
            return Ok(DispatchOutcome::HandshakeComplete);
        }

        match frame {
            InboundFrame::Text(text) => Ok(self.on_text(&text)),
            InboundFrame::Binary(data) => {
                tracing::debug!(len = data.len(), "Binary frame ignored");
                Ok(DispatchOutcome::Ignored)
            }
            InboundFrame::Ping(payload) => Ok(DispatchOutcome::Reply(OutboundFrame::Pong(payload))),
            InboundFrame::Pong(_) => Ok(DispatchOutcome::Ignored),
            InboundFrame::Close(payload) => {
                let close = self.parser.decode_close(&payload);
                tracing::info!(
                    code = ?close.code,
                    reason = %close.reason,
                    "Server sent close frame"
                );
                Err(DisconnectReason::PeerClosed(close))
            }
            InboundFrame::HandshakeResponse { status } => {
                tracing::warn!(status, "Unexpected handshake response after upgrade");
                Ok(DispatchOutcome::Ignored)
            }
        }
    }

    fn on_text(&self, text: &str) -> DispatchOutcome {
        match self.parser.parse(text) {
            Ok(Some(quote)) => {
                metrics::record_quote_received();
                DispatchOutcome::Quote(quote)
            }
            Ok(None) => {
                tracing::trace!("Envelope without body");
                DispatchOutcome::Ignored
            }
            Err(e) => {
                metrics::record_parse_error();
                tracing::warn!(error = %e, len = text.len(), "Dropping undecodable message");
                DispatchOutcome::Ignored
            }
        }
    }
}
