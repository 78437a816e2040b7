//! Broker historical-candle provider.
//!
//! Fetches intraday OHLCV candles from the Kite Connect v3 historical API.
//! Handles retries with exponential backoff, response parsing, and the
//! circuit breaker. Obtaining the daily access token happens outside this
//! crate; an expired token surfaces as `AuthenticationRequired`.

use super::circuit_breaker::CircuitBreaker;
use super::interval::Interval;
use super::provider::{BarSource, DataError};
use crate::domain::{Bar, Instrument};
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Offset, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.kite.trade";

/// Exchange-local offset used for the `from`/`to` query (IST, UTC+05:30).
const EXCHANGE_OFFSET_SECS: i32 = 330 * 60;

const CANDLE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";
const QUERY_TIME_FORMAT: &str = "%Y-%m-%d+%H:%M:%S";

/// Upper bound on any single wait between attempts.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct CandleResponse {
    status: String,
    #[serde(default)]
    data: Option<CandleData>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandleData {
    candles: Vec<Vec<Value>>,
}

/// Connection settings for the historical API.
#[derive(Debug, Clone)]
pub struct KiteSettings {
    pub api_key: String,
    pub access_token: String,
    pub base_url: String,
    /// Per-request timeout. A timed-out fetch is reported, not retried.
    pub timeout: Duration,
    /// Calendar days of history requested per fetch.
    pub history_days: u32,
}

impl KiteSettings {
    pub fn new(api_key: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            access_token: access_token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(20),
            history_days: 10,
        }
    }
}

pub struct KiteProvider {
    client: reqwest::blocking::Client,
    settings: KiteSettings,
    circuit_breaker: Arc<CircuitBreaker>,
    max_retries: u32,
    base_delay: Duration,
}

impl KiteProvider {
    pub fn new(
        settings: KiteSettings,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, DataError> {
        if settings.api_key.is_empty() || settings.access_token.is_empty() {
            return Err(DataError::AuthenticationRequired(
                "api key and access token must both be set".into(),
            ));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            settings,
            circuit_breaker,
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        })
    }

    /// Override the retry policy.
    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }

    fn candles_url(
        &self,
        instrument: &Instrument,
        interval: Interval,
        now: DateTime<Utc>,
    ) -> String {
        let offset = FixedOffset::east_opt(EXCHANGE_OFFSET_SECS).unwrap_or_else(|| Utc.fix());
        let to = now.with_timezone(&offset);
        let from = to - ChronoDuration::days(i64::from(self.settings.history_days));
        format!(
            "{}/instruments/historical/{}/{}?from={}&to={}",
            self.settings.base_url.trim_end_matches('/'),
            instrument.instrument_token,
            interval.as_str(),
            from.format(QUERY_TIME_FORMAT),
            to.format(QUERY_TIME_FORMAT),
        )
    }

    fn auth_header(&self) -> String {
        format!("token {}:{}", self.settings.api_key, self.settings.access_token)
    }

    fn fetch_with_retry(
        &self,
        instrument: &Instrument,
        interval: Interval,
    ) -> Result<Vec<Bar>, DataError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(DataError::CircuitBreakerTripped);
        }

        let url = self.candles_url(instrument, interval, Utc::now());
        let symbol = instrument.symbol.as_str();
        let mut last_error = None;
        let mut server_wait = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = retry_delay(self.base_delay, attempt, server_wait.take());
                log::debug!("{symbol}: retry {attempt} in {delay:?}");
                std::thread::sleep(delay);
            }

            if !self.circuit_breaker.is_allowed() {
                return Err(DataError::CircuitBreakerTripped);
            }

            let sent = self
                .client
                .get(&url)
                .header("X-Kite-Version", "3")
                .header("Authorization", self.auth_header())
                .send();

            let resp = match sent {
                Ok(resp) => resp,
                Err(e) if e.is_timeout() => return Err(DataError::Timeout(e.to_string())),
                Err(e) if e.is_connect() => {
                    last_error = Some(DataError::NetworkUnreachable(e.to_string()));
                    continue;
                }
                Err(e) => return Err(DataError::NetworkUnreachable(e.to_string())),
            };

            let status = resp.status();

            if status == reqwest::StatusCode::FORBIDDEN {
                // Expired or revoked session; every further call would fail too.
                self.circuit_breaker.trip();
                return Err(DataError::AuthenticationRequired(format!(
                    "HTTP 403 for {symbol}: access token rejected"
                )));
            }

            // Throttling is retried but never counted by the breaker.
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(1);
                log::debug!("{symbol}: HTTP 429, server asks for {retry_after}s");
                server_wait = Some(Duration::from_secs(retry_after));
                last_error = Some(DataError::RateLimited {
                    retry_after_secs: retry_after,
                });
                continue;
            }

            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(DataError::InstrumentNotFound {
                    symbol: symbol.to_string(),
                });
            }

            if status.is_server_error() {
                self.circuit_breaker.record_failure();
                last_error = Some(DataError::Other(format!("HTTP {status} for {symbol}")));
                continue;
            }

            let body: CandleResponse = resp.json().map_err(|e| {
                if e.is_timeout() {
                    DataError::Timeout(e.to_string())
                } else {
                    DataError::ResponseFormatChanged(format!(
                        "failed to parse response for {symbol}: {e}"
                    ))
                }
            })?;

            let bars = parse_candles(symbol, body)?;
            self.circuit_breaker.record_success();
            return Ok(bars);
        }

        Err(last_error.unwrap_or_else(|| DataError::Other("max retries exceeded".into())))
    }
}

impl BarSource for KiteProvider {
    fn name(&self) -> &str {
        "kite"
    }

    fn fetch(&self, instrument: &Instrument, interval: Interval) -> Result<Vec<Bar>, DataError> {
        self.fetch_with_retry(instrument, interval)
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }

    fn unavailable_for(&self) -> Duration {
        self.circuit_breaker.remaining_cooldown()
    }
}

/// Wait before `attempt` (1-based): doubling backoff from `base`, at least
/// the server's `Retry-After`, never more than `MAX_RETRY_DELAY`.
fn retry_delay(base: Duration, attempt: u32, server_wait: Option<Duration>) -> Duration {
    let factor = 2u32
        .checked_pow(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    let backoff = base.saturating_mul(factor);
    server_wait
        .map_or(backoff, |wait| backoff.max(wait))
        .min(MAX_RETRY_DELAY)
}

fn parse_candles(symbol: &str, resp: CandleResponse) -> Result<Vec<Bar>, DataError> {
    if resp.status != "success" {
        let message = resp.message.unwrap_or_default();
        return Err(match resp.error_type.as_deref() {
            Some("TokenException") | Some("PermissionException") => {
                DataError::AuthenticationRequired(message)
            }
            Some("InputException") if message.to_lowercase().contains("instrument") => {
                DataError::InstrumentNotFound {
                    symbol: symbol.to_string(),
                }
            }
            Some(kind) => DataError::Other(format!("{kind}: {message}")),
            None => DataError::ResponseFormatChanged(format!("status '{}'", resp.status)),
        });
    }

    let data = resp
        .data
        .ok_or_else(|| DataError::ResponseFormatChanged("no data in success response".into()))?;

    let mut bars = data
        .candles
        .iter()
        .map(|row| parse_candle(row))
        .collect::<Result<Vec<_>, _>>()?;
    bars.sort_by_key(|b| b.timestamp);
    Ok(bars)
}

/// One `[timestamp, open, high, low, close, volume(, oi)]` row.
fn parse_candle(row: &[Value]) -> Result<Bar, DataError> {
    if row.len() < 6 {
        return Err(DataError::ResponseFormatChanged(format!(
            "candle has {} fields, expected at least 6",
            row.len()
        )));
    }
    let ts = row[0].as_str().ok_or_else(|| {
        DataError::ResponseFormatChanged("candle timestamp is not a string".into())
    })?;
    let timestamp = DateTime::parse_from_str(ts, CANDLE_TIME_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(ts))
        .map_err(|e| DataError::ResponseFormatChanged(format!("invalid timestamp '{ts}': {e}")))?
        .with_timezone(&Utc);

    // Missing prices become NaN so the bar is dropped as void.
    let num = |i: usize| row[i].as_f64().unwrap_or(f64::NAN);
    let volume = row[5].as_f64().filter(|v| *v >= 0.0).unwrap_or(0.0) as u64;

    Ok(Bar {
        timestamp,
        open: num(1),
        high: num(2),
        low: num(3),
        close: num(4),
        volume,
    })
}
