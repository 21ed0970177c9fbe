//! Market Data Streaming Types
//!
//! Value types for the quote stream and the request/response market-data
//! calls: streamed quote updates, quote snapshots, and historical bars.
//!
//! Numeric fields are `Decimal` and accept either JSON numbers or numeric
//! strings. A field that is present but not numeric fails the whole record.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// Quote Update (streamed)
// =============================================================================

/// A single quote pushed by the stream for one product code.
///
/// # Wire Format (JSON, nested inside the envelope `body`)
/// ```json
/// {"StockCode":"btcusdt","Price":"43250.5","Open":"42800","LastClose":"42790",
///  "High":"43500","Low":"42600","Diff":"460.5","DiffRate":"1.07",
///  "BP1":"43250.4","BV1":"1.2","SP1":"43250.6","SV1":"0.8",
///  "TotalVol":"1834.2","Time":"2024-01-02 10:00:00","LastTime":"1704189600",
///  "BS":[],"Depth":[]}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteUpdate {
    /// Product code.
    #[serde(rename = "StockCode")]
    pub stock_code: String,

    /// Last traded price.
    #[serde(rename = "Price")]
    pub price: Decimal,

    /// Session open price.
    #[serde(rename = "Open", default)]
    pub open: Option<Decimal>,

    /// Previous session close.
    #[serde(rename = "LastClose", default)]
    pub last_close: Option<Decimal>,

    /// Session high.
    #[serde(rename = "High", default)]
    pub high: Option<Decimal>,

    /// Session low.
    #[serde(rename = "Low", default)]
    pub low: Option<Decimal>,

    /// Absolute change versus previous close.
    #[serde(rename = "Diff", default)]
    pub diff: Option<Decimal>,

    /// Percentage change versus previous close.
    #[serde(rename = "DiffRate", default)]
    pub diff_rate: Option<Decimal>,

    /// Best bid price.
    #[serde(rename = "BP1", default)]
    pub bid_price: Option<Decimal>,

    /// Best bid volume.
    #[serde(rename = "BV1", default)]
    pub bid_volume: Option<Decimal>,

    /// Best ask price.
    #[serde(rename = "SP1", default)]
    pub ask_price: Option<Decimal>,

    /// Best ask volume.
    #[serde(rename = "SV1", default)]
    pub ask_volume: Option<Decimal>,

    /// Cumulative session volume.
    #[serde(rename = "TotalVol", default)]
    pub total_volume: Option<Decimal>,

    /// Quote timestamp as sent by the server.
    #[serde(rename = "Time", default, deserialize_with = "lenient_string")]
    pub time: String,

    /// Previous quote timestamp as sent by the server.
    #[serde(rename = "LastTime", default, deserialize_with = "lenient_string")]
    pub last_time: String,

    /// Trade ticks, passed through uninterpreted.
    #[serde(rename = "BS", default, deserialize_with = "lenient_sequence")]
    pub trade_ticks: Vec<serde_json::Value>,

    /// Order book levels, passed through uninterpreted.
    #[serde(rename = "Depth", default, deserialize_with = "lenient_sequence")]
    pub depth: Vec<serde_json::Value>,
}

// =============================================================================
// Quote Snapshot (request/response)
// =============================================================================

/// A point-in-time quote returned by the snapshot call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    /// Product code.
    #[serde(rename = "StockCode")]
    pub stock_code: String,
    /// Last traded price.
    #[serde(rename = "Price")]
    pub price: Decimal,
    /// Percentage change versus previous close.
    #[serde(rename = "DiffRate", default)]
    pub diff_rate: Option<Decimal>,
    /// Best bid price.
    #[serde(rename = "BP1", default)]
    pub bid_price: Option<Decimal>,
    /// Best bid volume.
    #[serde(rename = "BV1", default)]
    pub bid_volume: Option<Decimal>,
    /// Best ask price.
    #[serde(rename = "SP1", default)]
    pub ask_price: Option<Decimal>,
    /// Best ask volume.
    #[serde(rename = "SV1", default)]
    pub ask_volume: Option<Decimal>,
    /// Quote timestamp as sent by the server.
    #[serde(rename = "Time", default, deserialize_with = "lenient_string")]
    pub time: String,
}

// =============================================================================
// Bars
// =============================================================================

/// One OHLCV record from the historical bar call.
///
/// Each record arrives as a positional array:
/// `[timestamp, open, high, low, close, datetime, volume]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bar {
    /// Bar open time, unix seconds.
    pub timestamp: i64,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Human-readable bar time as sent by the server.
    pub datetime: String,
    /// Traded volume.
    pub volume: Decimal,
}

#[derive(Deserialize)]
struct BarRecord(
    #[serde(deserialize_with = "lenient_i64")] i64,
    Decimal,
    Decimal,
    Decimal,
    Decimal,
    #[serde(deserialize_with = "lenient_string")] String,
    Decimal,
);

impl<'de> Deserialize<'de> for Bar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let BarRecord(timestamp, open, high, low, close, datetime, volume) =
            BarRecord::deserialize(deserializer)?;
        Ok(Self {
            timestamp,
            open,
            high,
            low,
            close,
            datetime,
            volume,
        })
    }
}

/// Bar interval accepted by the historical bar call.
///
/// Case-sensitive: `1m` is one minute, `1M` is one month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeFrame {
    /// One minute.
    OneMinute,
    /// Five minutes.
    FiveMinutes,
    /// Fifteen minutes.
    FifteenMinutes,
    /// Thirty minutes.
    ThirtyMinutes,
    /// One hour.
    OneHour,
    /// One day.
    OneDay,
    /// One month.
    OneMonth,
}

impl TimeFrame {
    /// Get all time frames.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::OneMinute,
            Self::FiveMinutes,
            Self::FifteenMinutes,
            Self::ThirtyMinutes,
            Self::OneHour,
            Self::OneDay,
            Self::OneMonth,
        ]
    }

    /// Wire representation used in the `time` query parameter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::OneHour => "1h",
            Self::OneDay => "1d",
            Self::OneMonth => "1M",
        }
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a supported time frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported time frame: {0:?}")]
pub struct UnknownTimeFrame(pub String);

impl FromStr for TimeFrame {
    type Err = UnknownTimeFrame;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|tf| tf.as_str() == s)
            .ok_or_else(|| UnknownTimeFrame(s.to_string()))
    }
}

// =============================================================================
// Lenient field decoding
// =============================================================================

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom(format!("expected integer, got {n}"))),
        serde_json::Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("expected integer, got {s:?}"))),
        other => Err(serde::de::Error::custom(format!(
            "expected integer, got {other}"
        ))),
    }
}

fn lenient_sequence<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<serde_json::Value>, D::Error> {
    Ok(Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default())
}
