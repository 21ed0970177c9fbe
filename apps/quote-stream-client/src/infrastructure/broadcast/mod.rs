//! Quote Consumer Adapters
//!
//! Implementations of the `QuoteConsumer` port that hand quotes off to other
//! tasks without blocking the connection's event loop:
//!
//! - `QuoteBroadcast`: fan-out to any number of subscribers over a tokio
//!   broadcast channel. Slow subscribers lag and skip, they never stall the
//!   stream.
//! - `ChannelConsumer`: a single bounded `mpsc` receiver. Quotes that do not
//!   fit are dropped and counted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{broadcast, mpsc};

use crate::application::ports::QuoteConsumer;
use crate::domain::streaming::QuoteUpdate;
use crate::infrastructure::metrics;

// =============================================================================
// Broadcast
// =============================================================================

/// Fan-out consumer over `tokio::sync::broadcast`.
///
/// # Example
///
/// ```rust
/// use quote_stream_client::infrastructure::broadcast::QuoteBroadcast;
///
/// let broadcast = QuoteBroadcast::new(1024);
/// let mut rx = broadcast.subscribe();
/// assert_eq!(broadcast.receiver_count(), 1);
/// # drop(rx);
/// ```
#[derive(Debug, Clone)]
pub struct QuoteBroadcast {
    tx: broadcast::Sender<Arc<QuoteUpdate>>,
}

impl QuoteBroadcast {
    /// Create a broadcast consumer with the given per-subscriber capacity.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity.max(1)).0,
        }
    }

    /// Get a new receiver. It sees quotes published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<QuoteUpdate>> {
        self.tx.subscribe()
    }

    /// Get the number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish a quote to all receivers.
    ///
    /// Returns the number of receivers that got it, or `None` if there are
    /// none.
    #[must_use]
    pub fn publish(&self, quote: QuoteUpdate) -> Option<usize> {
        self.tx.send(Arc::new(quote)).ok()
    }
}

impl QuoteConsumer for QuoteBroadcast {
    fn on_quote(&self, quote: QuoteUpdate) {
        if self.publish(quote).is_none() {
            tracing::trace!("No broadcast receivers, quote discarded");
        }
    }
}

// =============================================================================
// Bounded Channel
// =============================================================================

/// Consumer that forwards quotes into a bounded `mpsc` channel.
#[derive(Debug)]
pub struct ChannelConsumer {
    tx: mpsc::Sender<QuoteUpdate>,
    dropped: AtomicU64,
}

impl ChannelConsumer {
    /// Create a consumer and the receiving end of its channel.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<QuoteUpdate>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Number of quotes dropped because the channel was full or closed.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl QuoteConsumer for ChannelConsumer {
    fn on_quote(&self, quote: QuoteUpdate) {
        match self.tx.try_send(quote) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(quote)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                metrics::record_quotes_dropped("channel", 1);
                tracing::warn!(
                    stock_code = %quote.stock_code,
                    total_dropped = total,
                    "Quote channel full, dropping quote"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::record_quotes_dropped("channel", 1);
                tracing::debug!("Quote channel closed, dropping quote");
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(code: &str) -> QuoteUpdate {
        serde_json::from_str(&format!(r#"{{"StockCode":"{code}","Price":"1.5"}}"#)).unwrap()
    }

    #[test]
    fn receiver_count_tracks_subscribers() {
        let broadcast = QuoteBroadcast::new(16);
        assert_eq!(broadcast.receiver_count(), 0);

        let rx1 = broadcast.subscribe();
        let _rx2 = broadcast.subscribe();
        assert_eq!(broadcast.receiver_count(), 2);

        drop(rx1);
        assert_eq!(broadcast.receiver_count(), 1);
    }

    #[test]
    fn publish_without_receivers_returns_none() {
        let broadcast = QuoteBroadcast::new(16);
        assert_eq!(broadcast.publish(quote("btcusdt")), None);
    }

    #[tokio::test]
    async fn every_subscriber_sees_each_quote() {
        let broadcast = QuoteBroadcast::new(16);
        let mut rx1 = broadcast.subscribe();
        let mut rx2 = broadcast.subscribe();

        broadcast.on_quote(quote("btcusdt"));
        broadcast.on_quote(quote("ethusdt"));

        for rx in [&mut rx1, &mut rx2] {
            assert_eq!(rx.recv().await.unwrap().stock_code, "btcusdt");
            assert_eq!(rx.recv().await.unwrap().stock_code, "ethusdt");
        }
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let broadcast = QuoteBroadcast::new(2);
        let mut rx = broadcast.subscribe();

        for code in ["a", "b", "c", "d"] {
            broadcast.on_quote(quote(code));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(2))
        ));
        assert_eq!(rx.recv().await.unwrap().stock_code, "c");
    }

    #[tokio::test]
    async fn channel_consumer_delivers_in_order() {
        let (consumer, mut rx) = ChannelConsumer::channel(4);

        consumer.on_quote(quote("btcusdt"));
        consumer.on_quote(quote("ethusdt"));

        assert_eq!(rx.recv().await.unwrap().stock_code, "btcusdt");
        assert_eq!(rx.recv().await.unwrap().stock_code, "ethusdt");
        assert_eq!(consumer.dropped(), 0);
    }

    #[test]
    fn channel_consumer_drops_when_full() {
        let (consumer, _rx) = ChannelConsumer::channel(1);

        consumer.on_quote(quote("a"));
        consumer.on_quote(quote("b"));
        consumer.on_quote(quote("c"));

        assert_eq!(consumer.dropped(), 2);
    }

    #[test]
    fn channel_consumer_drops_when_closed() {
        let (consumer, rx) = ChannelConsumer::channel(4);
        drop(rx);

        consumer.on_quote(quote("a"));
        assert_eq!(consumer.dropped(), 1);
    }
}
