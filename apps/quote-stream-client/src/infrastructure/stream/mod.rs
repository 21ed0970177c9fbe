//! Quote Stream Adapters
//!
//! The streaming client and its per-connection parts:
//!
//! - **client**: connection lifecycle, retry loop, per-connection session
//! - **handshake**: upgrade negotiation
//! - **dispatcher**: inbound frame routing
//! - **heartbeat**: read/write idle tracking
//! - **codec** / **messages**: JSON envelope and control messages
//! - **reconnect**: retry delay policy
//! - **websocket**: `tokio-tungstenite` transport

pub mod client;
pub mod codec;
pub mod dispatcher;
pub mod handshake;
pub mod heartbeat;
pub mod messages;
pub mod reconnect;
pub mod websocket;

pub use client::{
    ClientHandle, ConnectionManager, DisconnectReason, StreamClientConfig, StreamClientError,
};
pub use codec::{CodecError, QuoteMessageParser};
pub use dispatcher::{DispatchOutcome, FrameDispatcher};
pub use handshake::{HandshakeError, HandshakeState, ProtocolNegotiator};
pub use heartbeat::{HeartbeatAction, HeartbeatConfig, HeartbeatMonitor, IdleTimeoutError};
pub use messages::{ClosePayload, Envelope, HeartbeatRequest};
pub use reconnect::{ReconnectConfig, ReconnectPolicy, RetryCause};
pub use websocket::{WebSocketConnection, WebSocketTransport};
