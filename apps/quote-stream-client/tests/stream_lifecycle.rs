//! Connection Lifecycle Integration Tests
//!
//! Drives `ConnectionManager` against an in-memory transport with a paused
//! clock. Each accepted connection hands the test a `ServerEnd` that can
//! push frames to the client or drop the connection.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use quote_stream_client::infrastructure::stream::{
    HeartbeatConfig, ReconnectConfig, StreamClientError,
};
use quote_stream_client::{
    ClientHandle, ConnectionManager, ConnectionState, Endpoint, FrameConnection, InboundFrame,
    OutboundFrame, QuoteUpdate, StreamClientConfig, SubscriptionManager, Transport,
    TransportError,
};
use quote_stream_client::application::ports::UpgradeRequest;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Fake Transport
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Connect,
    Upgrade(String),
    Sent(OutboundFrame),
    Close,
}

#[derive(Debug, Clone, Copy)]
enum Plan {
    Refuse,
    Accept { status: u16 },
    /// Accept the TCP connection but never answer the upgrade.
    Stall,
    /// Accept the TCP connection, then fail the upgrade write and the close.
    BrokenUpgrade,
}

#[derive(Debug, Clone, Default)]
struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    fn snapshot(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    fn connects(&self) -> usize {
        self.count(|e| *e == Event::Connect)
    }

    fn closes(&self) -> usize {
        self.count(|e| *e == Event::Close)
    }

    fn sent_texts(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Event::Sent(OutboundFrame::Text(text)) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn subscribes(&self) -> usize {
        self.sent_texts().iter().filter(|t| t.starts_with("{\"Key\"")).count()
    }
}

/// Test-side end of one accepted connection.
struct ServerEnd {
    inbound: mpsc::UnboundedSender<InboundFrame>,
}

impl ServerEnd {
    fn push(&self, frame: InboundFrame) {
        self.inbound.send(frame).unwrap();
    }

    fn push_text(&self, text: &str) {
        self.push(InboundFrame::Text(text.to_string()));
    }
}

struct FakeTransport {
    plans: Mutex<VecDeque<Plan>>,
    recorder: Recorder,
    accepted: mpsc::UnboundedSender<ServerEnd>,
}

#[async_trait]
impl Transport for FakeTransport {
    type Connection = FakeConnection;

    async fn connect(&self, _endpoint: &Endpoint) -> Result<FakeConnection, TransportError> {
        self.recorder.push(Event::Connect);
        let plan = self
            .plans
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Plan::Accept { status: 101 });

        match plan {
            Plan::Refuse => Err(TransportError::Connect("connection refused".into())),
            Plan::Accept { .. } | Plan::Stall | Plan::BrokenUpgrade => {
                let (tx, rx) = mpsc::unbounded_channel();
                let _ = self.accepted.send(ServerEnd {
                    inbound: tx.clone(),
                });
                let status = match plan {
                    Plan::Accept { status } => Some(status),
                    _ => None,
                };
                Ok(FakeConnection {
                    status,
                    broken: matches!(plan, Plan::BrokenUpgrade),
                    handshake_tx: Some(tx),
                    inbound: rx,
                    recorder: self.recorder.clone(),
                })
            }
        }
    }
}

struct FakeConnection {
    status: Option<u16>,
    broken: bool,
    handshake_tx: Option<mpsc::UnboundedSender<InboundFrame>>,
    inbound: mpsc::UnboundedReceiver<InboundFrame>,
    recorder: Recorder,
}

#[async_trait]
impl FrameConnection for FakeConnection {
    async fn upgrade(&mut self, request: &UpgradeRequest) -> Result<(), TransportError> {
        self.recorder.push(Event::Upgrade(request.url.clone()));
        if self.broken {
            return Err(TransportError::Io("broken pipe".into()));
        }
        if let (Some(tx), Some(status)) = (self.handshake_tx.take(), self.status) {
            let _ = tx.send(InboundFrame::HandshakeResponse { status });
        }
        Ok(())
    }

    async fn send(&mut self, frame: OutboundFrame) -> Result<(), TransportError> {
        self.recorder.push(Event::Sent(frame));
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<InboundFrame, TransportError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.recorder.push(Event::Close);
        self.inbound.close();
        if self.broken {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    handle: ClientHandle,
    recorder: Recorder,
    accepted: mpsc::UnboundedReceiver<ServerEnd>,
    quotes: Arc<Mutex<Vec<QuoteUpdate>>>,
    task: JoinHandle<Result<(), StreamClientError>>,
}

fn quiet_heartbeat() -> HeartbeatConfig {
    HeartbeatConfig::new(Duration::from_secs(3600), None, Duration::from_secs(1))
}

fn start(plans: Vec<Plan>, heartbeat: HeartbeatConfig, reconnect: ReconnectConfig) -> Harness {
    let recorder = Recorder::default();
    let (accepted_tx, accepted) = mpsc::unbounded_channel();
    let transport = FakeTransport {
        plans: Mutex::new(plans.into()),
        recorder: recorder.clone(),
        accepted: accepted_tx,
    };

    let mut config = StreamClientConfig::new(
        Endpoint::new("quotes.test", 80, "/ws"),
        SubscriptionManager::new(["btcusdt", "ethusdt"]).unwrap(),
    );
    config.heartbeat = heartbeat;
    config.reconnect = reconnect;

    let quotes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&quotes);
    let consumer = move |quote: QuoteUpdate| sink.lock().unwrap().push(quote);

    let (manager, handle) = ConnectionManager::new(
        transport,
        config,
        Arc::new(consumer),
        CancellationToken::new(),
    );
    let task = tokio::spawn(manager.run());

    Harness {
        handle,
        recorder,
        accepted,
        quotes,
        task,
    }
}

fn start_default() -> Harness {
    start(Vec::new(), quiet_heartbeat(), ReconnectConfig::default())
}

impl Harness {
    async fn next_server(&mut self) -> ServerEnd {
        tokio::time::timeout(Duration::from_secs(600), self.accepted.recv())
            .await
            .expect("no connection accepted")
            .expect("transport dropped")
    }

    /// Connect and wait for the subscribe message on the first connection.
    async fn open(&mut self) -> ServerEnd {
        assert!(self.handle.connect());
        let server = self.next_server().await;
        let recorder = self.recorder.clone();
        eventually(|| recorder.subscribes() == 1).await;
        assert_eq!(self.handle.state(), ConnectionState::Open);
        server
    }
}

async fn eventually(cond: impl Fn() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(200)).await;
}

const QUOTE: &str = r#"{"body":"{\"StockCode\":\"btcusdt\",\"Price\":\"65000.5\",\"DiffRate\":\"1.25\",\"BP1\":\"65000.1\",\"SP1\":\"65000.9\",\"Time\":\"2024-01-01 00:00:00\"}"}"#;

// =============================================================================
// Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn subscribe_sent_once_per_handshake() {
    let mut harness = start_default();
    let server = harness.open().await;

    assert_eq!(
        harness.recorder.sent_texts(),
        [r#"{"Key":"btcusdt,ethusdt"}"#.to_string()]
    );
    assert_eq!(
        harness.recorder.snapshot()[..2],
        [
            Event::Connect,
            Event::Upgrade("ws://quotes.test:80/ws".to_string())
        ]
    );

    // More traffic on the same connection never re-sends it
    server.push_text(QUOTE);
    server.push(InboundFrame::Ping(b"p".to_vec()));
    settle().await;
    assert_eq!(harness.recorder.subscribes(), 1);

    // Server goes away; the next connection subscribes again
    drop(server);
    let _server = harness.next_server().await;
    let recorder = harness.recorder.clone();
    eventually(|| recorder.subscribes() == 2).await;

    settle().await;
    assert_eq!(harness.recorder.subscribes(), 2);
    assert_eq!(harness.recorder.connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn connect_while_open_does_nothing() {
    let mut harness = start_default();
    let _server = harness.open().await;
    let before = harness.recorder.len();

    for _ in 0..3 {
        assert!(harness.handle.connect());
    }
    settle().await;

    assert_eq!(harness.recorder.len(), before);
    assert_eq!(harness.handle.state(), ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn connect_while_connecting_does_nothing() {
    let mut harness = start_default();

    assert!(harness.handle.connect());
    assert!(harness.handle.connect());
    let _server = harness.next_server().await;
    let recorder = harness.recorder.clone();
    eventually(|| recorder.subscribes() == 1).await;

    settle().await;
    assert_eq!(harness.recorder.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn ping_answered_with_exactly_one_pong() {
    let mut harness = start_default();
    let server = harness.open().await;
    let before = harness.recorder.len();

    server.push(InboundFrame::Ping(b"are-you-there".to_vec()));
    let recorder = harness.recorder.clone();
    eventually(|| recorder.len() > before).await;
    settle().await;

    assert_eq!(
        harness.recorder.snapshot()[before..],
        [Event::Sent(OutboundFrame::Pong(b"are-you-there".to_vec()))]
    );
}

#[tokio::test(start_paused = true)]
async fn quotes_reach_consumer_in_order() {
    let mut harness = start_default();
    let server = harness.open().await;

    server.push_text(QUOTE);
    server.push_text(r#"{"body":{"StockCode":"ethusdt","Price":3000}}"#);
    let quotes = Arc::clone(&harness.quotes);
    eventually(|| quotes.lock().unwrap().len() == 2).await;

    let quotes = harness.quotes.lock().unwrap();
    assert_eq!(quotes[0].stock_code, "btcusdt");
    assert_eq!(quotes[0].price.to_string(), "65000.5");
    assert_eq!(quotes[0].time, "2024-01-01 00:00:00");
    assert_eq!(quotes[1].stock_code, "ethusdt");
}

#[tokio::test(start_paused = true)]
async fn malformed_messages_are_dropped_and_connection_stays_open() {
    let mut harness = start_default();
    let server = harness.open().await;

    server.push_text("not json at all");
    server.push_text(r#"{"body":"{\"StockCode\":"}"#);
    server.push_text(r#"{"body":"{\"StockCode\":\"btcusdt\",\"Price\":\"abc\"}"}"#);
    server.push_text(r#"{"body":[1,2,3]}"#);
    server.push_text(r#"{"body":""}"#);
    server.push_text(r#"{"ok":true}"#);
    settle().await;

    assert!(harness.quotes.lock().unwrap().is_empty());
    assert_eq!(harness.handle.state(), ConnectionState::Open);
    assert_eq!(harness.recorder.closes(), 0);
    assert_eq!(harness.recorder.connects(), 1);

    // Still usable afterwards
    server.push_text(QUOTE);
    let quotes = Arc::clone(&harness.quotes);
    eventually(|| quotes.lock().unwrap().len() == 1).await;
}

#[tokio::test(start_paused = true)]
async fn close_frame_triggers_exactly_one_reconnect() {
    let mut harness = start_default();
    let server = harness.open().await;

    let closed_at = Instant::now();
    server.push(InboundFrame::Close(vec![0x03, 0xE8, b'b', b'y', b'e']));
    let _server = harness.next_server().await;

    assert!(closed_at.elapsed() >= Duration::from_secs(1));
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(harness.recorder.connects(), 2);
    assert_eq!(harness.recorder.closes(), 1);
    assert_eq!(harness.handle.state(), ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn failed_connect_retries_after_connect_delay() {
    let mut harness = start(
        vec![Plan::Refuse],
        quiet_heartbeat(),
        ReconnectConfig::default(),
    );

    let started = Instant::now();
    assert!(harness.handle.connect());
    let _server = harness.next_server().await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(3), "retried after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(4), "retried after {elapsed:?}");
    assert_eq!(harness.recorder.connects(), 2);

    let recorder = harness.recorder.clone();
    eventually(|| recorder.subscribes() == 1).await;
}

#[tokio::test(start_paused = true)]
async fn rejected_handshake_reconnects_without_subscribing() {
    let mut harness = start(
        vec![Plan::Accept { status: 403 }],
        quiet_heartbeat(),
        ReconnectConfig::default(),
    );

    assert!(harness.handle.connect());
    let _rejected = harness.next_server().await;
    let _accepted = harness.next_server().await;
    let recorder = harness.recorder.clone();
    eventually(|| recorder.subscribes() == 1).await;

    let events = harness.recorder.snapshot();
    let first_close = events.iter().position(|e| *e == Event::Close).unwrap();
    assert!(
        events[..first_close]
            .iter()
            .all(|e| !matches!(e, Event::Sent(_))),
        "nothing may be sent before the handshake completes: {events:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn failed_upgrade_closes_and_reconnects() {
    let mut harness = start(
        vec![Plan::BrokenUpgrade],
        quiet_heartbeat(),
        ReconnectConfig::default(),
    );

    let started = Instant::now();
    assert!(harness.handle.connect());
    let _broken = harness.next_server().await;
    let _accepted = harness.next_server().await;
    assert!(started.elapsed() >= Duration::from_secs(1));

    let recorder = harness.recorder.clone();
    eventually(|| recorder.subscribes() == 1).await;

    let events = harness.recorder.snapshot();
    assert_eq!(
        events[..3],
        [
            Event::Connect,
            Event::Upgrade("ws://quotes.test:80/ws".to_string()),
            Event::Close,
        ]
    );
    assert_eq!(harness.recorder.closes(), 1);
    assert_eq!(harness.recorder.connects(), 2);
    assert_eq!(harness.handle.state(), ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn read_idle_forces_reconnect() {
    let heartbeat = HeartbeatConfig::new(
        Duration::from_secs(3600),
        Some(Duration::from_secs(5)),
        Duration::from_secs(1),
    );
    let mut harness = start(Vec::new(), heartbeat, ReconnectConfig::default());
    let _server = harness.open().await;

    let silent_since = Instant::now();
    let _second = harness.next_server().await;

    assert!(silent_since.elapsed() >= Duration::from_secs(5));
    assert_eq!(harness.recorder.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn inbound_traffic_keeps_read_idle_at_bay() {
    let heartbeat = HeartbeatConfig::new(
        Duration::from_secs(3600),
        Some(Duration::from_secs(5)),
        Duration::from_secs(1),
    );
    let mut harness = start(Vec::new(), heartbeat, ReconnectConfig::default());
    let server = harness.open().await;

    for _ in 0..6 {
        tokio::time::sleep(Duration::from_secs(3)).await;
        server.push_text(QUOTE);
    }
    settle().await;

    assert_eq!(harness.recorder.connects(), 1);
    assert_eq!(harness.quotes.lock().unwrap().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn heartbeats_sent_on_write_idle_with_non_decreasing_stamps() {
    let heartbeat = HeartbeatConfig::new(Duration::from_secs(2), None, Duration::from_secs(1));
    let mut harness = start(Vec::new(), heartbeat, ReconnectConfig::default());
    let _server = harness.open().await;

    let recorder = harness.recorder.clone();
    eventually(|| recorder.sent_texts().len() >= 4).await;

    let texts = harness.recorder.sent_texts();
    assert!(texts[0].starts_with("{\"Key\""), "subscribe comes first");

    let stamps: Vec<i64> = texts[1..]
        .iter()
        .map(|text| {
            let value: serde_json::Value = serde_json::from_str(text).unwrap();
            value["ping"].as_str().unwrap().parse().unwrap()
        })
        .collect();
    assert!(stamps.len() >= 3);
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]), "stamps: {stamps:?}");
}

#[tokio::test(start_paused = true)]
async fn no_heartbeat_before_handshake_completes() {
    let heartbeat = HeartbeatConfig::new(Duration::from_secs(1), None, Duration::from_secs(1));
    let mut harness = start(vec![Plan::Stall], heartbeat, ReconnectConfig::default());

    assert!(harness.handle.connect());
    let server = harness.next_server().await;
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert!(harness.recorder.sent_texts().is_empty());
    assert_eq!(harness.handle.state(), ConnectionState::HandshakePending);

    // Heartbeats start once the upgrade is answered
    server.push(InboundFrame::HandshakeResponse { status: 101 });
    let recorder = harness.recorder.clone();
    eventually(|| recorder.sent_texts().len() >= 2).await;
    assert!(harness.recorder.sent_texts()[0].starts_with("{\"Key\""));
}

#[tokio::test(start_paused = true)]
async fn disconnect_stops_reconnecting() {
    let mut harness = start_default();
    let _server = harness.open().await;

    assert!(harness.handle.disconnect());
    let mut state = harness.handle.subscribe_state();
    tokio::time::timeout(
        Duration::from_secs(10),
        state.wait_for(|s| *s == ConnectionState::Disconnected),
    )
    .await
    .unwrap()
    .unwrap();

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(harness.recorder.connects(), 1);
    assert_eq!(harness.recorder.closes(), 1);

    // An explicit connect afterwards works again
    assert!(harness.handle.connect());
    let _server = harness.next_server().await;
    let recorder = harness.recorder.clone();
    eventually(|| recorder.subscribes() == 2).await;
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_retry() {
    let mut harness = start(
        vec![Plan::Refuse],
        quiet_heartbeat(),
        ReconnectConfig::default(),
    );

    assert!(harness.handle.connect());
    let recorder = harness.recorder.clone();
    eventually(|| recorder.connects() == 1).await;
    assert!(harness.handle.disconnect());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(harness.recorder.connects(), 1);
    assert!(harness.accepted.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn exhausted_attempt_limit_stops_the_client() {
    let harness = start(
        vec![Plan::Refuse, Plan::Refuse, Plan::Refuse],
        quiet_heartbeat(),
        ReconnectConfig {
            max_attempts: 2,
            ..ReconnectConfig::default()
        },
    );

    assert!(harness.handle.connect());
    let result = tokio::time::timeout(Duration::from_secs(60), harness.task)
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(
        result,
        Err(StreamClientError::MaxReconnectAttemptsExceeded(2))
    ));
    assert_eq!(harness.recorder.connects(), 3);
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_live_connection() {
    let mut harness = start_default();
    let _server = harness.open().await;

    harness.handle.shutdown();
    let result = tokio::time::timeout(Duration::from_secs(10), harness.task)
        .await
        .unwrap()
        .unwrap();

    assert!(result.is_ok());
    assert_eq!(harness.recorder.closes(), 1);
    assert_eq!(harness.handle.state(), ConnectionState::Disconnected);
}
