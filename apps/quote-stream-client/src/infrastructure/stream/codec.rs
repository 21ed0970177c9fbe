//! Stream Codec Module
//!
//! Encoding and decoding for the quote stream's JSON text frames.
//!
//! Inbound quotes use a two-layer envelope: the outer object carries a
//! `body` field whose value is itself a JSON document (usually a string
//! holding JSON, occasionally an inline object).
//!
//! ```json
//! {"body":"{\"StockCode\":\"btcusdt\",\"Price\":\"43250.5\"}"}
//! ```

use crate::domain::streaming::QuoteUpdate;
use serde_json::Value;

use crate::infrastructure::stream::messages::{ClosePayload, Envelope, HeartbeatRequest};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The outer envelope is not valid JSON.
    #[error("invalid envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    /// The outer envelope is valid JSON but not an object.
    #[error("unexpected envelope type: {0}")]
    EnvelopeType(&'static str),

    /// The body did not decode into a quote.
    #[error("invalid quote body: {0}")]
    Body(#[source] serde_json::Error),

    /// `body` held something other than a string or an object, or a string
    /// whose JSON is not an object.
    #[error("unexpected body type: {0}")]
    BodyType(&'static str),

    /// JSON encoding failed.
    #[error("JSON encode error: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Stateless parser for quote frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuoteMessageParser;

impl QuoteMessageParser {
    /// Create a new parser.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode an inbound text frame.
    ///
    /// Returns `Ok(None)` for acks (no body, `null` body, empty body).
    ///
    /// # Errors
    ///
    /// Returns an error if either layer fails to decode. Nothing partial is
    /// ever returned.
    pub fn parse(&self, text: &str) -> Result<Option<QuoteUpdate>, CodecError> {
        let outer: Value = serde_json::from_str(text).map_err(CodecError::Envelope)?;
        let outer = match outer {
            Value::Object(map) => Value::Object(map),
            other => return Err(CodecError::EnvelopeType(json_type(&other))),
        };
        let envelope: Envelope = serde_json::from_value(outer).map_err(CodecError::Envelope)?;

        let body = match envelope.body {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::String(body)) => {
                if body.trim().is_empty() {
                    return Ok(None);
                }
                serde_json::from_str(&body).map_err(CodecError::Body)?
            }
            Some(other) => other,
        };

        match body {
            Value::Object(map) if map.is_empty() => Ok(None),
            Value::Object(map) => serde_json::from_value(Value::Object(map))
                .map(Some)
                .map_err(CodecError::Body),
            other => Err(CodecError::BodyType(json_type(&other))),
        }
    }

    /// Encode an application heartbeat.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode_heartbeat(&self, unix_secs: i64) -> Result<String, CodecError> {
        self.encode(&HeartbeatRequest::at(unix_secs))
    }

    /// Encode a value to JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode<T: serde::Serialize>(&self, value: &T) -> Result<String, CodecError> {
        serde_json::to_string(value).map_err(CodecError::Encode)
    }

    /// Decode a close payload: 2-byte big-endian status, then the reason.
    ///
    /// A payload shorter than two bytes has no status code; its bytes (if
    /// any) are not treated as a reason.
    #[must_use]
    pub fn decode_close(&self, payload: &[u8]) -> ClosePayload {
        match payload {
            [hi, lo, reason @ ..] => ClosePayload {
                code: Some(u16::from_be_bytes([*hi, *lo])),
                reason: String::from_utf8_lossy(reason).into_owned(),
            },
            _ => ClosePayload {
                code: None,
                reason: String::new(),
            },
        }
    }
}

/// JSON type name for error messages.
const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
