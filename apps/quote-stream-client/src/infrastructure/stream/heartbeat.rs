//! Heartbeat Monitor
//!
//! Tracks read and write idle time for one connection. The connection
//! manager polls it from its event loop on a fixed interval:
//!
//! - nothing sent for `write_idle`: send an application heartbeat
//!   `{"ping":"<unix-seconds>"}`
//! - nothing received for `read_idle`: the connection is dead
//!
//! A monitor is created per connection and dropped with it.

use std::time::Duration;

use tokio::time::Instant;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Outbound silence after which a heartbeat is sent.
    pub write_idle: Duration,
    /// Inbound silence after which the connection is considered dead.
    /// `None` disables the check.
    pub read_idle: Option<Duration>,
    /// How often the event loop polls the monitor.
    pub check_interval: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            write_idle: Duration::from_secs(10),
            read_idle: Some(Duration::from_secs(180)),
            check_interval: Duration::from_secs(1),
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(
        write_idle: Duration,
        read_idle: Option<Duration>,
        check_interval: Duration,
    ) -> Self {
        Self {
            write_idle,
            read_idle,
            check_interval,
        }
    }

    /// Create configuration from the stream settings.
    #[must_use]
    pub const fn from_stream_settings(settings: &crate::StreamSettings) -> Self {
        Self {
            write_idle: settings.write_idle,
            read_idle: settings.read_idle,
            check_interval: settings.heartbeat_check_interval,
        }
    }
}

/// What the event loop should do after a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Connection healthy, nothing to send.
    Idle,
    /// Write idle reached; send a heartbeat.
    SendHeartbeat,
}

/// Inbound silence exceeded the read-idle threshold.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no inbound traffic for {idle:?} (threshold {threshold:?})")]
pub struct IdleTimeoutError {
    /// Time since the last inbound unit.
    pub idle: Duration,
    /// Configured read-idle threshold.
    pub threshold: Duration,
}

/// Per-connection idle bookkeeping.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    last_inbound_at: Instant,
    last_outbound_at: Instant,
    last_stamp: Option<i64>,
}

impl HeartbeatMonitor {
    /// Start monitoring a connection opened at `now`.
    #[must_use]
    pub const fn new(config: HeartbeatConfig, now: Instant) -> Self {
        Self {
            config,
            last_inbound_at: now,
            last_outbound_at: now,
            last_stamp: None,
        }
    }

    /// Record any inbound unit.
    pub fn record_inbound(&mut self, now: Instant) {
        self.last_inbound_at = now;
    }

    /// Record any outbound unit.
    pub fn record_outbound(&mut self, now: Instant) {
        self.last_outbound_at = now;
    }

    /// Time since the last inbound unit.
    #[must_use]
    pub fn read_idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_inbound_at)
    }

    /// Time since the last outbound unit.
    #[must_use]
    pub fn write_idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_outbound_at)
    }

    /// Check both idle thresholds.
    ///
    /// # Errors
    ///
    /// Returns `IdleTimeoutError` if read idle has been reached.
    pub fn poll(&self, now: Instant) -> Result<HeartbeatAction, IdleTimeoutError> {
        if let Some(threshold) = self.config.read_idle {
            let idle = self.read_idle_for(now);
            if idle >= threshold {
                return Err(IdleTimeoutError { idle, threshold });
            }
        }

        if self.write_idle_for(now) >= self.config.write_idle {
            Ok(HeartbeatAction::SendHeartbeat)
        } else {
            Ok(HeartbeatAction::Idle)
        }
    }

    /// Stamp for the next heartbeat given the wall clock.
    ///
    /// Never lower than a stamp already issued on this connection.
    pub fn next_stamp(&mut self, wall_unix_secs: i64) -> i64 {
        let stamp = self
            .last_stamp
            .map_or(wall_unix_secs, |last| last.max(wall_unix_secs));
        self.last_stamp = Some(stamp);
        stamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HeartbeatConfig {
        HeartbeatConfig::new(
            Duration::from_secs(10),
            Some(Duration::from_secs(30)),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn default_config_values() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.write_idle, Duration::from_secs(10));
        assert_eq!(config.read_idle, Some(Duration::from_secs(180)));
        assert_eq!(config.check_interval, Duration::from_secs(1));
    }

    #[test]
    fn fresh_monitor_is_idle() {
        let start = Instant::now();
        let monitor = HeartbeatMonitor::new(config(), start);
        assert_eq!(monitor.poll(start), Ok(HeartbeatAction::Idle));
    }

    #[test]
    fn write_idle_requests_heartbeat() {
        let start = Instant::now();
        let mut monitor = HeartbeatMonitor::new(config(), start);
        monitor.record_inbound(start + Duration::from_secs(9));

        assert_eq!(
            monitor.poll(start + Duration::from_secs(9)),
            Ok(HeartbeatAction::Idle)
        );
        assert_eq!(
            monitor.poll(start + Duration::from_secs(10)),
            Ok(HeartbeatAction::SendHeartbeat)
        );
    }

    #[test]
    fn outbound_resets_write_idle() {
        let start = Instant::now();
        let mut monitor = HeartbeatMonitor::new(config(), start);
        monitor.record_outbound(start + Duration::from_secs(8));

        assert_eq!(
            monitor.poll(start + Duration::from_secs(12)),
            Ok(HeartbeatAction::Idle)
        );
    }

    #[test]
    fn read_idle_times_out() {
        let start = Instant::now();
        let monitor = HeartbeatMonitor::new(config(), start);

        let err = monitor.poll(start + Duration::from_secs(31)).unwrap_err();
        assert_eq!(err.threshold, Duration::from_secs(30));
        assert_eq!(err.idle, Duration::from_secs(31));
    }

    #[test]
    fn inbound_resets_read_idle() {
        let start = Instant::now();
        let mut monitor = HeartbeatMonitor::new(config(), start);
        monitor.record_inbound(start + Duration::from_secs(25));

        assert!(monitor.poll(start + Duration::from_secs(40)).is_ok());
    }

    #[test]
    fn read_idle_disabled() {
        let start = Instant::now();
        let monitor = HeartbeatMonitor::new(
            HeartbeatConfig::new(Duration::from_secs(10), None, Duration::from_secs(1)),
            start,
        );

        assert_eq!(
            monitor.poll(start + Duration::from_secs(3600)),
            Ok(HeartbeatAction::SendHeartbeat)
        );
    }

    #[test]
    fn stamps_never_decrease() {
        let mut monitor = HeartbeatMonitor::new(config(), Instant::now());

        assert_eq!(monitor.next_stamp(1_000), 1_000);
        assert_eq!(monitor.next_stamp(1_010), 1_010);
        // Wall clock stepped back
        assert_eq!(monitor.next_stamp(990), 1_010);
        assert_eq!(monitor.next_stamp(1_020), 1_020);
    }
}
