//! Quote Stream Client
//!
//! Owns the single connection to the quote server and everything scoped
//! to it. One task runs `ConnectionManager::run`, a `tokio::select!` loop
//! over:
//!
//! - commands from `ClientHandle` (connect, disconnect)
//! - the in-flight transport connect
//! - the retry timer
//! - inbound frames of the live connection
//! - the heartbeat tick
//!
//! All mutable state lives in that task. Each connect builds a fresh
//! `ConnectionSession` (dispatcher, negotiator, heartbeat monitor,
//! subscription session); nothing carries over to the next connection.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    Endpoint, FrameConnection, InboundFrame, OutboundFrame, QuoteConsumer, Transport,
    TransportError,
};
use crate::domain::connection::ConnectionState;
use crate::domain::subscription::{SubscriptionError, SubscriptionManager, SubscriptionSession};
use crate::infrastructure::metrics;

use super::codec::QuoteMessageParser;
use super::dispatcher::{DispatchOutcome, FrameDispatcher};
use super::handshake::{HandshakeError, ProtocolNegotiator};
use super::heartbeat::{HeartbeatAction, HeartbeatConfig, HeartbeatMonitor, IdleTimeoutError};
use super::messages::ClosePayload;
use super::reconnect::{ReconnectConfig, ReconnectPolicy, RetryCause};

// =============================================================================
// Error Types
// =============================================================================

/// Why a connection ended. None of these are fatal to the client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DisconnectReason {
    /// Transport failed while connected.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Upgrade handshake failed.
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// Nothing received for the read-idle threshold.
    #[error("idle timeout: {0}")]
    IdleTimeout(#[from] IdleTimeoutError),

    /// Server sent a close frame.
    #[error("peer closed ({0})")]
    PeerClosed(ClosePayload),

    /// Stream ended without a close frame.
    #[error("connection ended")]
    EndOfStream,
}

impl DisconnectReason {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Handshake(_) => "handshake",
            Self::IdleTimeout(_) => "idle_timeout",
            Self::PeerClosed(_) => "peer_closed",
            Self::EndOfStream => "end_of_stream",
        }
    }
}

/// Errors that stop the client loop.
#[derive(Debug, thiserror::Error)]
pub enum StreamClientError {
    /// A finite attempt limit was configured and reached.
    #[error("maximum reconnection attempts ({0}) exceeded")]
    MaxReconnectAttemptsExceeded(u32),
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the stream client.
#[derive(Debug, Clone)]
pub struct StreamClientConfig {
    /// Server address and upgrade path.
    pub endpoint: Endpoint,
    /// Fixed product codes.
    pub subscription: SubscriptionManager,
    /// Idle thresholds.
    pub heartbeat: HeartbeatConfig,
    /// Retry delays.
    pub reconnect: ReconnectConfig,
}

impl StreamClientConfig {
    /// Create a configuration with default heartbeat and reconnect settings.
    #[must_use]
    pub fn new(endpoint: Endpoint, subscription: SubscriptionManager) -> Self {
        Self {
            endpoint,
            subscription,
            heartbeat: HeartbeatConfig::default(),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Create configuration from the stream settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured product codes are invalid.
    pub fn from_stream_settings(
        settings: &crate::StreamSettings,
    ) -> Result<Self, SubscriptionError> {
        Ok(Self {
            endpoint: Endpoint::new(settings.host.clone(), settings.port, settings.path.clone()),
            subscription: SubscriptionManager::new(settings.codes.iter().cloned())?,
            heartbeat: HeartbeatConfig::from_stream_settings(settings),
            reconnect: ReconnectConfig::from_stream_settings(settings),
        })
    }
}

// =============================================================================
// Client Handle
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Command {
    Connect,
    Disconnect,
}

/// Cloneable handle for controlling a running `ConnectionManager`.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
}

impl ClientHandle {
    /// Request a connection. No-op if one is already being established
    /// or open.
    ///
    /// Returns `false` if the client loop has stopped.
    pub fn connect(&self) -> bool {
        self.commands.send(Command::Connect).is_ok()
    }

    /// Close the connection and stop reconnecting.
    ///
    /// Returns `false` if the client loop has stopped.
    pub fn disconnect(&self) -> bool {
        self.commands.send(Command::Disconnect).is_ok()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Stop the client loop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// =============================================================================
// Per-connection Session
// =============================================================================

/// State scoped to one transport connection.
struct ConnectionSession<C> {
    conn: C,
    dispatcher: FrameDispatcher,
    heartbeat: HeartbeatMonitor,
    subscription: SubscriptionSession,
}

type ConnectFuture<C> = Pin<Box<dyn Future<Output = Result<C, TransportError>> + Send>>;

// =============================================================================
// Connection Manager
// =============================================================================

/// Drives the connection lifecycle for one client.
pub struct ConnectionManager<T: Transport> {
    transport: Arc<T>,
    config: StreamClientConfig,
    consumer: Arc<dyn QuoteConsumer>,
    codec: QuoteMessageParser,
    policy: ReconnectPolicy,
    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    connecting: Option<ConnectFuture<T::Connection>>,
    retry_at: Option<Instant>,
    live: Option<ConnectionSession<T::Connection>>,
}

impl<T: Transport + 'static> ConnectionManager<T> {
    /// Create a client and its control handle.
    ///
    /// Nothing connects until `ClientHandle::connect` is called and `run`
    /// is being polled.
    #[must_use]
    pub fn new(
        transport: T,
        config: StreamClientConfig,
        consumer: Arc<dyn QuoteConsumer>,
        cancel: CancellationToken,
    ) -> (Self, ClientHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let policy = ReconnectPolicy::new(config.reconnect.clone());

        let handle = ClientHandle {
            commands: command_tx,
            state: state_rx,
            cancel: cancel.clone(),
        };

        let manager = Self {
            transport: Arc::new(transport),
            config,
            consumer,
            codec: QuoteMessageParser::new(),
            policy,
            commands: command_rx,
            state_tx,
            cancel,
            connecting: None,
            retry_at: None,
            live: None,
        };

        (manager, handle)
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Run the event loop until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `StreamClientError::MaxReconnectAttemptsExceeded` if a finite
    /// attempt limit is configured and exhausted.
    pub async fn run(mut self) -> Result<(), StreamClientError> {
        let mut ticker = tokio::time::interval(self.config.heartbeat.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut commands_open = true;

        tracing::info!(
            endpoint = %self.config.endpoint,
            codes = ?self.config.subscription.codes(),
            "Quote stream client started"
        );

        let result = loop {
            let step = tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!("Quote stream client cancelled");
                    break Ok(());
                }
                command = self.commands.recv(), if commands_open => {
                    match command {
                        Some(Command::Connect) => self.connect(),
                        Some(Command::Disconnect) => self.disconnect().await,
                        None => {
                            tracing::debug!("All client handles dropped");
                            commands_open = false;
                        }
                    }
                    Ok(())
                }
                result = poll_connecting(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_connect_result(result).await
                }
                () = sleep_until_opt(self.retry_at) => {
                    self.retry_at = None;
                    self.connect();
                    Ok(())
                }
                frame = next_inbound(&mut self.live) => self.on_inbound(frame).await,
                _ = ticker.tick() => self.on_tick().await,
            };

            if let Err(e) = step {
                tracing::error!(error = %e, "Quote stream client stopping");
                break Err(e);
            }
        };

        self.disconnect().await;
        result
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    fn connect(&mut self) {
        let state = self.state();
        if state.is_active() || self.connecting.is_some() {
            tracing::debug!(state = %state, "Connect ignored, connection already active");
            return;
        }

        self.retry_at = None;
        self.set_state(ConnectionState::Connecting);
        tracing::info!(endpoint = %self.config.endpoint, "Connecting to quote stream");

        let transport = Arc::clone(&self.transport);
        let endpoint = self.config.endpoint.clone();
        self.connecting = Some(Box::pin(
            async move { transport.connect(&endpoint).await },
        ));
    }

    async fn disconnect(&mut self) {
        self.retry_at = None;
        self.connecting = None;
        self.policy.reset();

        if let Some(mut session) = self.live.take() {
            self.set_state(ConnectionState::Closing);
            if let Err(e) = session.conn.close().await {
                tracing::debug!(error = %e, "Close failed");
            }
            tracing::info!("Disconnected from quote stream");
        }

        self.set_state(ConnectionState::Disconnected);
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    async fn on_connect_result(
        &mut self,
        result: Result<T::Connection, TransportError>,
    ) -> Result<(), StreamClientError> {
        let mut conn = match result {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "Connect to quote stream failed");
                self.set_state(ConnectionState::Disconnected);
                return self.schedule_retry(RetryCause::ConnectFailed);
            }
        };

        self.set_state(ConnectionState::HandshakePending);

        let mut negotiator = ProtocolNegotiator::new(self.config.endpoint.clone());
        let request = negotiator.start();
        if let Err(e) = conn.upgrade(&request).await {
            if let Err(close_err) = conn.close().await {
                tracing::debug!(error = %close_err, "Close after failed upgrade failed");
            }
            return self.connection_lost(e.into()).await;
        }
        tracing::debug!(url = %request.url, "Upgrade requested");

        let now = Instant::now();
        self.live = Some(ConnectionSession {
            conn,
            dispatcher: FrameDispatcher::new(negotiator),
            heartbeat: HeartbeatMonitor::new(self.config.heartbeat.clone(), now),
            subscription: self.config.subscription.session(),
        });
        Ok(())
    }

    async fn on_inbound(
        &mut self,
        frame: Option<Result<InboundFrame, TransportError>>,
    ) -> Result<(), StreamClientError> {
        let frame = match frame {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => return self.connection_lost(e.into()).await,
            None => return self.connection_lost(DisconnectReason::EndOfStream).await,
        };

        let Some(session) = self.live.as_mut() else {
            return Ok(());
        };
        session.heartbeat.record_inbound(Instant::now());

        match session.dispatcher.dispatch(frame) {
            Ok(DispatchOutcome::HandshakeComplete) => {
                let subscribe = session.subscription.on_handshake_complete();
                self.set_state(ConnectionState::Open);
                self.policy.reset();
                tracing::info!("Quote stream handshake complete");

                if let Some(message) = subscribe {
                    tracing::info!(
                        codes = ?self.config.subscription.codes(),
                        "Subscribing"
                    );
                    self.send(OutboundFrame::Text(message)).await?;
                }
                Ok(())
            }
            Ok(DispatchOutcome::Quote(quote)) => {
                tracing::trace!(code = %quote.stock_code, price = %quote.price, "Quote");
                self.consumer.on_quote(quote);
                Ok(())
            }
            Ok(DispatchOutcome::Reply(reply)) => self.send(reply).await,
            Ok(DispatchOutcome::Ignored) => Ok(()),
            Err(reason) => self.connection_lost(reason).await,
        }
    }

    async fn on_tick(&mut self) -> Result<(), StreamClientError> {
        let now = Instant::now();
        let Some(session) = self.live.as_mut() else {
            return Ok(());
        };

        match session.heartbeat.poll(now) {
            Err(idle) => self.connection_lost(idle.into()).await,
            Ok(HeartbeatAction::SendHeartbeat) if session.dispatcher.handshake_complete() => {
                let stamp = session
                    .heartbeat
                    .next_stamp(chrono::Utc::now().timestamp());
                let text = match self.codec.encode_heartbeat(stamp) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to encode heartbeat");
                        return Ok(());
                    }
                };
                tracing::debug!(stamp, "Sending heartbeat");
                metrics::record_heartbeat_sent();
                self.send(OutboundFrame::Text(text)).await
            }
            Ok(_) => Ok(()),
        }
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    async fn send(&mut self, frame: OutboundFrame) -> Result<(), StreamClientError> {
        let Some(session) = self.live.as_mut() else {
            return Ok(());
        };

        match session.conn.send(frame).await {
            Ok(()) => {
                session.heartbeat.record_outbound(Instant::now());
                Ok(())
            }
            Err(e) => self.connection_lost(e.into()).await,
        }
    }

    async fn connection_lost(&mut self, reason: DisconnectReason) -> Result<(), StreamClientError> {
        if let Some(mut session) = self.live.take() {
            if let Err(e) = session.conn.close().await {
                tracing::debug!(error = %e, "Close after disconnect failed");
            }
        }

        metrics::record_disconnect(reason.as_str());
        tracing::warn!(reason = %reason, "Quote stream connection lost");
        self.set_state(ConnectionState::Disconnected);
        self.schedule_retry(RetryCause::ConnectionLost)
    }

    fn schedule_retry(&mut self, cause: RetryCause) -> Result<(), StreamClientError> {
        let Some(delay) = self.policy.next_delay(cause) else {
            return Err(StreamClientError::MaxReconnectAttemptsExceeded(
                self.policy.max_attempts(),
            ));
        };

        let attempt = self.policy.attempt_count();
        tracing::info!(
            attempt,
            cause = cause.as_str(),
            delay_ms = delay.as_millis(),
            "Reconnecting to quote stream"
        );
        metrics::record_reconnect(cause.as_str());
        self.retry_at = Some(Instant::now() + delay);
        Ok(())
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "Connection state changed");
            metrics::set_connection_state(state);
        }
    }
}

// =============================================================================
// Select helpers
// =============================================================================

async fn poll_connecting<C>(connecting: &mut Option<ConnectFuture<C>>) -> Result<C, TransportError> {
    match connecting {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_inbound<C: FrameConnection>(
    live: &mut Option<ConnectionSession<C>>,
) -> Option<Result<InboundFrame, TransportError>> {
    match live {
        Some(session) => session.conn.recv().await,
        None => std::future::pending().await,
    }
}
