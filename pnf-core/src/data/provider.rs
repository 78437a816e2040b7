//! Bar source trait and structured error types.
//!
//! The BarSource trait abstracts over data sources (the broker's historical
//! API, CSV files, synthetic data) so the orchestrator can swap
//! implementations and tests can inject mocks.

use std::time::Duration;

use thiserror::Error;

use super::interval::Interval;
use crate::domain::{Bar, Instrument};

/// Structured error types for data operations.
///
/// Every variant is a recoverable "data unavailable" failure for the
/// instrument concerned; none of them should abort a cycle.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("instrument not found: {symbol}")]
    InstrumentNotFound { symbol: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("circuit breaker open: provider is refusing requests")]
    CircuitBreakerTripped,

    #[error("insufficient history for {symbol}: got {got} bars, need {need}")]
    InsufficientHistory {
        symbol: String,
        got: usize,
        need: usize,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("data error: {0}")]
    Other(String),
}

/// A provider of historical bars.
///
/// Implementations return bars oldest first and must be callable from
/// several worker threads at once.
pub trait BarSource: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch the most recent history for an instrument at an interval.
    fn fetch(&self, instrument: &Instrument, interval: Interval) -> Result<Vec<Bar>, DataError>;

    /// False while the provider is refusing requests (breaker open).
    fn is_available(&self) -> bool {
        true
    }

    /// How long the provider will keep refusing requests. Zero when available.
    fn unavailable_for(&self) -> Duration {
        Duration::ZERO
    }
}

impl<T: BarSource + ?Sized> BarSource for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch(&self, instrument: &Instrument, interval: Interval) -> Result<Vec<Bar>, DataError> {
        (**self).fetch(instrument, interval)
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn unavailable_for(&self) -> Duration {
        (**self).unavailable_for()
    }
}

impl<T: BarSource + ?Sized> BarSource for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch(&self, instrument: &Instrument, interval: Interval) -> Result<Vec<Bar>, DataError> {
        (**self).fetch(instrument, interval)
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn unavailable_for(&self) -> Duration {
        (**self).unavailable_for()
    }
}
