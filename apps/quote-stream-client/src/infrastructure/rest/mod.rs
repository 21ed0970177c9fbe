//! Market Data Request Client
//!
//! One-shot HTTP calls for historical bars and quote snapshots. Parameters
//! are validated before any request is built; there are no retries.
//!
//! Compressed responses are accepted (`Accept-Encoding: gzip`) and
//! decompressed transparently by `reqwest`.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::RestSettings;
use crate::domain::streaming::{Bar, QuoteSnapshot, TimeFrame};

/// Path of the historical bar call.
const BARS_PATH: &str = "/redis.php";

/// Path of the quote snapshot call.
const QUOTE_PATH: &str = "/getQuote.php";

/// Success value of the snapshot response's `code` field.
const API_OK: i64 = 200;

// =============================================================================
// Errors
// =============================================================================

/// Market data request error.
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    /// Rejected before any network call.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The request could not be sent or the body could not be read.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-200 HTTP status.
    #[error("unexpected HTTP status: {0}")]
    Status(StatusCode),

    /// The snapshot response carried a non-200 `code`.
    #[error("API error: {0}")]
    Api(String),

    /// The response body did not match the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

// =============================================================================
// Validation
// =============================================================================

/// Validated parameters for the historical bar call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarRequest {
    /// Product code.
    pub code: String,
    /// Bar interval.
    pub time_frame: TimeFrame,
    /// Number of bars requested.
    pub rows: u32,
}

impl BarRequest {
    /// Validate raw parameters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for a blank code, an unsupported time
    /// frame or a non-positive row count.
    pub fn new(code: &str, time_frame: &str, rows: i64) -> Result<Self, RestError> {
        let code = validate_code(code)?;
        let time_frame: TimeFrame = time_frame.parse().map_err(|_| {
            RestError::InvalidParameter(format!(
                "time frame {time_frame:?} not supported, expected one of {}",
                supported_time_frames()
            ))
        })?;
        if rows <= 0 {
            return Err(RestError::InvalidParameter(format!(
                "rows must be greater than 0, got {rows}"
            )));
        }
        let rows = u32::try_from(rows).map_err(|_| {
            RestError::InvalidParameter(format!("rows must fit in 32 bits, got {rows}"))
        })?;

        Ok(Self {
            code,
            time_frame,
            rows,
        })
    }

    fn query(&self) -> [(&'static str, String); 3] {
        [
            ("code", self.code.clone()),
            ("time", self.time_frame.as_str().to_string()),
            ("rows", self.rows.to_string()),
        ]
    }
}

fn validate_code(code: &str) -> Result<String, RestError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(RestError::InvalidParameter(
            "product code cannot be empty".to_string(),
        ));
    }
    Ok(code.to_string())
}

fn supported_time_frames() -> String {
    TimeFrame::all()
        .iter()
        .map(|tf| tf.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Client
// =============================================================================

#[derive(Deserialize)]
struct QuoteResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Option<QuoteData>,
}

#[derive(Deserialize)]
struct QuoteData {
    body: Value,
}

/// Client for the bar and quote snapshot calls.
#[derive(Debug, Clone)]
pub struct MarketDataClient {
    client: Client,
    base_url: String,
}

impl MarketDataClient {
    /// Build a client for `base_url` with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RestError> {
        let client = Client::builder().timeout(timeout).gzip(true).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn from_settings(settings: &RestSettings) -> Result<Self, RestError> {
        Self::new(settings.base_url.clone(), settings.timeout)
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch up to `rows` historical bars for `code`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` without touching the network if the
    /// parameters are invalid; otherwise any transport, status or decode
    /// failure.
    #[tracing::instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn fetch_bars(
        &self,
        code: &str,
        time_frame: &str,
        rows: i64,
    ) -> Result<Vec<Bar>, RestError> {
        let request = BarRequest::new(code, time_frame, rows)?;
        let body = self.get(BARS_PATH, &request.query()).await?;
        let bars: Vec<Bar> = serde_json::from_str(&body)?;

        tracing::debug!(count = bars.len(), "Fetched bars");
        Ok(bars)
    }

    /// Fetch the current quote snapshot for `code`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for a blank code, `Api` when the response
    /// reports failure, or any transport, status or decode failure.
    #[tracing::instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn fetch_quote(&self, code: &str) -> Result<QuoteSnapshot, RestError> {
        let code = validate_code(code)?;
        let body = self.get(QUOTE_PATH, &[("code", code)]).await?;
        parse_quote_response(&body)
    }

    async fn get(&self, path: &str, query: &[(&'static str, String)]) -> Result<String, RestError> {
        let url = format!("{}{path}", self.base_url);
        let response = self.client.get(&url).query(query).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            tracing::warn!(%url, %status, "Market data request failed");
            return Err(RestError::Status(status));
        }

        Ok(response.text().await?)
    }
}

/// Decode a snapshot response body.
///
/// The snapshot may arrive as a nested object or as a JSON-encoded string.
fn parse_quote_response(body: &str) -> Result<QuoteSnapshot, RestError> {
    let response: QuoteResponse = serde_json::from_str(body)?;
    if response.code != API_OK {
        let msg = if response.msg.is_empty() {
            format!("code {}", response.code)
        } else {
            response.msg
        };
        return Err(RestError::Api(msg));
    }

    let body = response
        .data
        .map(|data| data.body)
        .ok_or_else(|| RestError::Api("response has no data".to_string()))?;

    let snapshot = match body {
        Value::String(text) => serde_json::from_str(&text)?,
        other => serde_json::from_value(other)?,
    };
    Ok(snapshot)
}
