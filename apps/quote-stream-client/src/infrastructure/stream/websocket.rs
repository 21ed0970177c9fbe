//! WebSocket Transport
//!
//! `tokio-tungstenite` adapter for the transport ports. A connection goes
//! through three stages:
//!
//! 1. `Connected`: raw TCP stream, no upgrade yet
//! 2. `Handshaking`: upgrade request in flight; the first `recv` drives it
//!    and yields `InboundFrame::HandshakeResponse`
//! 3. `Open`: frames flow
//!
//! A rejected upgrade (non-101) is reported as a handshake response with
//! the server's status so the negotiator can decide.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::application::ports::{
    Endpoint, FrameConnection, InboundFrame, OutboundFrame, Transport, TransportError,
    UpgradeRequest,
};

type HandshakeFuture = Pin<
    Box<
        dyn Future<
                Output = Result<
                    (
                        WebSocketStream<TcpStream>,
                        tungstenite::handshake::client::Response,
                    ),
                    tungstenite::Error,
                >,
            > + Send,
    >,
>;

/// Plain-TCP WebSocket transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Create a new transport.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;

    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Connection, TransportError> {
        let stream = TcpStream::connect(endpoint.authority())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
        }

        Ok(WebSocketConnection {
            stage: Stage::Connected(stream),
        })
    }
}

enum Stage {
    Connected(TcpStream),
    Handshaking(HandshakeFuture),
    Open(Box<WebSocketStream<TcpStream>>),
    Closed,
}

impl Stage {
    const fn name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::Handshaking(_) => "handshaking",
            Self::Open(_) => "open",
            Self::Closed => "closed",
        }
    }
}

/// One WebSocket connection.
pub struct WebSocketConnection {
    stage: Stage,
}

impl std::fmt::Debug for WebSocketConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketConnection")
            .field("stage", &self.stage.name())
            .finish()
    }
}

#[async_trait]
impl FrameConnection for WebSocketConnection {
    async fn upgrade(&mut self, request: &UpgradeRequest) -> Result<(), TransportError> {
        let stage = std::mem::replace(&mut self.stage, Stage::Closed);
        let Stage::Connected(stream) = stage else {
            self.stage = stage;
            return Err(TransportError::NotReady("upgrade requires a fresh connection"));
        };

        let url = request.url.clone();
        self.stage = Stage::Handshaking(Box::pin(async move {
            tokio_tungstenite::client_async(url, stream).await
        }));
        Ok(())
    }

    async fn send(&mut self, frame: OutboundFrame) -> Result<(), TransportError> {
        let Stage::Open(ws) = &mut self.stage else {
            return Err(TransportError::NotReady("send before upgrade"));
        };

        // tungstenite queues its own pong for each ping; an explicit pong
        // replaces it rather than adding a second one.
        let message = match frame {
            OutboundFrame::Text(text) => Message::Text(text.into()),
            OutboundFrame::Pong(payload) => Message::Pong(payload.into()),
        };
        ws.send(message)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<InboundFrame, TransportError>> {
        loop {
            match &mut self.stage {
                Stage::Handshaking(handshake) => {
                    let result = handshake.await;
                    return Some(match result {
                        Ok((ws, response)) => {
                            self.stage = Stage::Open(Box::new(ws));
                            Ok(InboundFrame::HandshakeResponse {
                                status: response.status().as_u16(),
                            })
                        }
                        Err(tungstenite::Error::Http(response)) => {
                            self.stage = Stage::Closed;
                            Ok(InboundFrame::HandshakeResponse {
                                status: response.status().as_u16(),
                            })
                        }
                        Err(e) => {
                            self.stage = Stage::Closed;
                            Err(TransportError::Io(e.to_string()))
                        }
                    });
                }
                Stage::Open(ws) => {
                    let message = match ws.next().await {
                        Some(Ok(message)) => message,
                        Some(Err(e)) => return Some(Err(TransportError::Io(e.to_string()))),
                        None => {
                            self.stage = Stage::Closed;
                            return None;
                        }
                    };

                    let frame = match message {
                        Message::Text(text) => InboundFrame::Text(text.as_str().to_owned()),
                        Message::Binary(data) => InboundFrame::Binary(data.to_vec()),
                        Message::Ping(data) => InboundFrame::Ping(data.to_vec()),
                        Message::Pong(data) => InboundFrame::Pong(data.to_vec()),
                        Message::Close(frame) => InboundFrame::Close(encode_close(frame.as_ref())),
                        Message::Frame(_) => continue,
                    };
                    return Some(Ok(frame));
                }
                Stage::Connected(_) | Stage::Closed => return None,
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let stage = std::mem::replace(&mut self.stage, Stage::Closed);
        match stage {
            Stage::Open(mut ws) => WebSocketStream::close(&mut ws, None)
                .await
                .map_err(|e| TransportError::Io(e.to_string())),
            _ => Ok(()),
        }
    }
}

/// Re-encode a close frame to its wire payload.
fn encode_close(frame: Option<&CloseFrame>) -> Vec<u8> {
    frame.map_or_else(Vec::new, |frame| {
        let mut payload = u16::from(frame.code).to_be_bytes().to_vec();
        payload.extend_from_slice(frame.reason.as_str().as_bytes());
        payload
    })
}
