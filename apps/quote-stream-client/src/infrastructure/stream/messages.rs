//! Quote Stream Message Types
//!
//! Wire format types for the JSON text frames exchanged with the quote
//! server, and the close payload carried by close frames.
//!
//! # Message Types
//!
//! ## Outbound
//! - `SubscribeRequest`: `{"Key":"btcusdt,ethusdt"}` (see the subscription domain)
//! - `HeartbeatRequest`: `{"ping":"1704189600"}`
//!
//! ## Inbound
//! - `Envelope`: `{"body":"<nested quote JSON>"}`; no `body` means an ack
//! - `ClosePayload`: 2-byte big-endian status code followed by a UTF-8 reason

use std::fmt;

use serde::{Deserialize, Serialize};

pub use crate::domain::subscription::SubscribeRequest;

// =============================================================================
// Inbound
// =============================================================================

/// Outer envelope of every inbound text frame.
///
/// # Wire Format (JSON)
/// ```json
/// {"body": "{\"StockCode\":\"btcusdt\",\"Price\":\"43250.5\"}"}
/// ```
///
/// Some servers send `body` as an object instead of a string; both are kept
/// as a raw value here and resolved by the codec.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Envelope {
    /// Quote payload. Absent, `null` or empty for acks.
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

/// Decoded close payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosePayload {
    /// Close status code, if the payload carried one.
    pub code: Option<u16>,
    /// Close reason (lossy UTF-8).
    pub reason: String,
}

impl ClosePayload {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;

    /// Check if the peer closed normally.
    #[must_use]
    pub const fn is_normal(&self) -> bool {
        matches!(self.code, Some(Self::NORMAL))
    }
}

impl fmt::Display for ClosePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{code}: {}", self.reason),
            None => f.write_str("no status"),
        }
    }
}

// =============================================================================
// Outbound
// =============================================================================

/// Application-level heartbeat sent on write idle.
///
/// # Wire Format (JSON)
/// ```json
/// {"ping": "1704189600"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    /// Unix seconds, as a decimal string.
    pub ping: String,
}

impl HeartbeatRequest {
    /// Build a heartbeat stamped with `unix_secs`.
    #[must_use]
    pub fn at(unix_secs: i64) -> Self {
        Self {
            ping: unix_secs.to_string(),
        }
    }
}
