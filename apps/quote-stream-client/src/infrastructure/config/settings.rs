//! Client Configuration Settings
//!
//! Configuration types for the quote stream client, loaded from environment
//! variables. Unset or unparsable values fall back to defaults; only the
//! product code list is validated.

use std::time::Duration;

/// Stream connection settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Quote server host.
    pub host: String,
    /// Quote server port.
    pub port: u16,
    /// Upgrade request path.
    pub path: String,
    /// Product codes to subscribe to, in order.
    pub codes: Vec<String>,
    /// Outbound silence before a heartbeat is sent.
    pub write_idle: Duration,
    /// Inbound silence before the connection is dropped (`None` = never).
    pub read_idle: Option<Duration>,
    /// Heartbeat poll interval.
    pub heartbeat_check_interval: Duration,
    /// Delay after a failed connect attempt.
    pub connect_retry_delay: Duration,
    /// Delay after losing an established connection.
    pub reconnect_delay: Duration,
    /// Growth factor per consecutive attempt (1.0 = fixed delays).
    pub reconnect_multiplier: f64,
    /// Maximum reconnection delay.
    pub reconnect_max_delay: Duration,
    /// Maximum consecutive attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Capacity of the quote channel handed to consumers.
    pub consumer_capacity: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            host: "39.107.99.235".to_string(),
            port: 80,
            path: "/ws".to_string(),
            codes: vec!["btcusdt".to_string(), "ethusdt".to_string()],
            write_idle: Duration::from_secs(10),
            read_idle: Some(Duration::from_secs(180)),
            heartbeat_check_interval: Duration::from_millis(1000),
            connect_retry_delay: Duration::from_millis(3000),
            reconnect_delay: Duration::from_millis(1000),
            reconnect_multiplier: 1.0,
            reconnect_max_delay: Duration::from_secs(30),
            max_reconnect_attempts: 0, // Unlimited
            consumer_capacity: 4096,
        }
    }
}

/// Market data request/response settings.
#[derive(Debug, Clone)]
pub struct RestSettings {
    /// Base URL for the bar and quote snapshot calls.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for RestSettings {
    fn default() -> Self {
        Self {
            base_url: "http://39.107.99.235:1008".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Stream connection settings.
    pub stream: StreamSettings,
    /// Market data request settings.
    pub rest: RestSettings,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl ClientConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the product code list is empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the product code list is empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let defaults = StreamSettings::default();

        let codes = match env.get("QUOTE_STREAM_CODES") {
            Some(raw) => {
                let codes: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect();
                if codes.is_empty() {
                    return Err(ConfigError::EmptyValue("QUOTE_STREAM_CODES".to_string()));
                }
                codes
            }
            None => defaults.codes.clone(),
        };

        let read_idle_secs = env.u64(
            "QUOTE_STREAM_READ_IDLE_SECS",
            defaults.read_idle.map_or(0, |d| d.as_secs()),
        );

        let stream = StreamSettings {
            host: env.string("QUOTE_STREAM_HOST", &defaults.host),
            port: env.u16("QUOTE_STREAM_PORT", defaults.port),
            path: env.string("QUOTE_STREAM_PATH", &defaults.path),
            codes,
            write_idle: env.duration_secs("QUOTE_STREAM_WRITE_IDLE_SECS", defaults.write_idle),
            read_idle: (read_idle_secs > 0).then(|| Duration::from_secs(read_idle_secs)),
            heartbeat_check_interval: env.duration_millis(
                "QUOTE_STREAM_HEARTBEAT_CHECK_MS",
                defaults.heartbeat_check_interval,
            ),
            connect_retry_delay: env.duration_millis(
                "QUOTE_STREAM_CONNECT_RETRY_MS",
                defaults.connect_retry_delay,
            ),
            reconnect_delay: env
                .duration_millis("QUOTE_STREAM_RECONNECT_DELAY_MS", defaults.reconnect_delay),
            reconnect_multiplier: env.f64(
                "QUOTE_STREAM_RECONNECT_MULTIPLIER",
                defaults.reconnect_multiplier,
            ),
            reconnect_max_delay: env.duration_secs(
                "QUOTE_STREAM_RECONNECT_MAX_DELAY_SECS",
                defaults.reconnect_max_delay,
            ),
            max_reconnect_attempts: env.u32(
                "QUOTE_STREAM_MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            ),
            consumer_capacity: env
                .usize("QUOTE_STREAM_CONSUMER_CAPACITY", defaults.consumer_capacity)
                .max(1),
        };

        let rest_defaults = RestSettings::default();
        let rest = RestSettings {
            base_url: env
                .string("MARKET_DATA_BASE_URL", &rest_defaults.base_url)
                .trim_end_matches('/')
                .to_string(),
            timeout: env.duration_secs("MARKET_DATA_TIMEOUT_SECS", rest_defaults.timeout),
        };

        Ok(Self {
            stream,
            rest,
            metrics_port: env.u16("QUOTE_STREAM_METRICS_PORT", 0),
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    fn u16(&self, key: &str, default: u16) -> u16 {
        self.parse(key).unwrap_or(default)
    }

    fn u32(&self, key: &str, default: u32) -> u32 {
        self.parse(key).unwrap_or(default)
    }

    fn u64(&self, key: &str, default: u64) -> u64 {
        self.parse(key).unwrap_or(default)
    }

    fn usize(&self, key: &str, default: usize) -> usize {
        self.parse(key).unwrap_or(default)
    }

    fn f64(&self, key: &str, default: f64) -> f64 {
        self.parse::<f64>(key)
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(default)
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.parse::<u64>(key).map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.parse::<u64>(key).map_or(default, Duration::from_millis)
    }
}
