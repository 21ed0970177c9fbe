//! Subscription Management Types
//!
//! The client subscribes to a fixed, ordered set of product codes chosen at
//! construction. The set is sent as one comma-joined `Key` once per
//! completed handshake.
//!
//! # Design
//!
//! `SubscriptionManager` is immutable and shared across connections.
//! Each connection gets its own `SubscriptionSession`, which hands out the
//! encoded subscribe message at most once. A reconnect builds a new
//! session, so the subscribe goes out again on the new connection.

use serde::{Deserialize, Serialize};

// =============================================================================
// Types
// =============================================================================

/// A product code (e.g. `btcusdt`).
pub type ProductCode = String;

/// Subscribe control message.
///
/// # Wire Format (JSON)
/// ```json
/// {"Key":"btcusdt,ethusdt"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Comma-joined product codes.
    #[serde(rename = "Key")]
    pub key: String,
}

/// Error building a subscription.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    /// No product codes were supplied.
    #[error("subscription requires at least one product code")]
    Empty,

    /// A code was blank or contained the `,` separator.
    #[error("invalid product code: {0:?}")]
    InvalidCode(String),

    /// The subscribe message could not be encoded.
    #[error("failed to encode subscribe message: {0}")]
    Encode(String),
}

// =============================================================================
// Subscription Manager
// =============================================================================

/// Fixed set of product codes for the lifetime of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionManager {
    codes: Vec<ProductCode>,
    message: String,
}

impl SubscriptionManager {
    /// Build a subscription from an ordered list of codes.
    ///
    /// Order is preserved. Codes are trimmed.
    ///
    /// # Errors
    ///
    /// Returns an error if the list is empty or a code is blank or contains
    /// a comma.
    pub fn new<I, S>(codes: I) -> Result<Self, SubscriptionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let codes = codes
            .into_iter()
            .map(|code| {
                let code: String = code.into();
                let trimmed = code.trim();
                if trimmed.is_empty() || trimmed.contains(',') {
                    Err(SubscriptionError::InvalidCode(code.clone()))
                } else {
                    Ok(trimmed.to_string())
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        if codes.is_empty() {
            return Err(SubscriptionError::Empty);
        }

        let request = SubscribeRequest {
            key: codes.join(","),
        };
        let message = serde_json::to_string(&request)
            .map_err(|e| SubscriptionError::Encode(e.to_string()))?;

        Ok(Self { codes, message })
    }

    /// Subscribed codes, in order.
    #[must_use]
    pub fn codes(&self) -> &[ProductCode] {
        &self.codes
    }

    /// Encoded subscribe message.
    #[must_use]
    pub fn encode(&self) -> &str {
        &self.message
    }

    /// Start tracking the subscribe for a fresh connection.
    #[must_use]
    pub fn session(&self) -> SubscriptionSession {
        SubscriptionSession {
            message: self.message.clone(),
            sent: false,
        }
    }
}

// =============================================================================
// Per-connection Session
// =============================================================================

/// Subscribe bookkeeping for one connection.
#[derive(Debug)]
pub struct SubscriptionSession {
    message: String,
    sent: bool,
}

impl SubscriptionSession {
    /// Take the subscribe message after the handshake completes.
    ///
    /// Returns `Some` on the first call only.
    pub fn on_handshake_complete(&mut self) -> Option<String> {
        if self.sent {
            return None;
        }
        self.sent = true;
        Some(self.message.clone())
    }

    /// Whether the subscribe has been handed out on this connection.
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        self.sent
    }
}
