//! Reconnection Policy
//!
//! Decides how long the connection manager waits before the next connect
//! attempt. Two causes have their own base delay: a connect attempt that
//! failed outright, and an established connection that was lost. Growth
//! between consecutive attempts is a configurable multiplier (1.0 keeps
//! the delays fixed), capped at `max_delay`, with optional jitter.

use std::time::Duration;

use rand::Rng;

/// Why a new connect attempt is being scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCause {
    /// The transport connect itself failed.
    ConnectFailed,
    /// A connection existed and was lost (close, error, idle, handshake).
    ConnectionLost,
}

impl RetryCause {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConnectFailed => "connect_failed",
            Self::ConnectionLost => "connection_lost",
        }
    }
}

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Base delay after a failed connect attempt.
    pub connect_retry_delay: Duration,
    /// Base delay after losing an established connection.
    pub reconnect_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Growth factor applied per consecutive attempt.
    pub multiplier: f64,
    /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
    pub jitter_factor: f64,
    /// Maximum number of consecutive attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            connect_retry_delay: Duration::from_secs(3),
            reconnect_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 1.0,
            jitter_factor: 0.0,
            max_attempts: 0, // Unlimited
        }
    }
}

impl ReconnectConfig {
    /// Create configuration from the stream settings.
    #[must_use]
    pub const fn from_stream_settings(settings: &crate::StreamSettings) -> Self {
        Self {
            connect_retry_delay: settings.connect_retry_delay,
            reconnect_delay: settings.reconnect_delay,
            max_delay: settings.reconnect_max_delay,
            multiplier: settings.reconnect_multiplier,
            jitter_factor: 0.0,
            max_attempts: settings.max_reconnect_attempts,
        }
    }

    const fn base_delay(&self, cause: RetryCause) -> Duration {
        match cause {
            RetryCause::ConnectFailed => self.connect_retry_delay,
            RetryCause::ConnectionLost => self.reconnect_delay,
        }
    }
}

/// Reconnection policy with cause-specific base delays.
///
/// # Example
///
/// ```rust
/// use quote_stream_client::infrastructure::stream::reconnect::{
///     ReconnectConfig, ReconnectPolicy, RetryCause,
/// };
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
///
/// assert_eq!(policy.next_delay(RetryCause::ConnectFailed), Some(Duration::from_secs(3)));
/// assert_eq!(policy.next_delay(RetryCause::ConnectionLost), Some(Duration::from_secs(1)));
///
/// // Connection reached the open state
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Get the delay before the next attempt.
    ///
    /// Returns `None` if max attempts have been exhausted.
    #[must_use]
    pub fn next_delay(&mut self, cause: RetryCause) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }

        let exponent = i32::try_from(self.attempt_count).unwrap_or(i32::MAX);
        self.attempt_count += 1;

        let base = self.config.base_delay(cause);
        #[allow(clippy::cast_precision_loss)]
        let scaled = (base.as_millis() as f64 * self.config.multiplier.powi(exponent)).round();
        let max_millis = self.config.max_delay.as_millis();
        let millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                (scaled as u128).min(max_millis)
            }
        } else if scaled.is_infinite() {
            max_millis
        } else {
            0
        };
        let delay = Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX));

        Some(self.apply_jitter(delay))
    }

    /// Reset the policy once a connection is fully open.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Get the current attempt count.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Check if another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    /// Configured attempt limit (0 = unlimited).
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 || duration.is_zero() {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}
