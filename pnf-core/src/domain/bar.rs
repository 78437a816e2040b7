//! One OHLCV candle from a bar source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar for a single instrument over one interval.
///
/// `close` is authoritative for charting; `high`/`low` only feed the
/// true-range volatility estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    fn prices(&self) -> [f64; 4] {
        [self.open, self.high, self.low, self.close]
    }

    /// A bar with any non-finite price carries no usable information.
    pub fn is_void(&self) -> bool {
        self.prices().iter().any(|p| !p.is_finite())
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Wilder's true range against the previous close. NaN in, NaN out.
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let gap_up = (self.high - prev_close).abs();
        let gap_down = (self.low - prev_close).abs();
        if self.range().is_nan() || prev_close.is_nan() {
            return f64::NAN;
        }
        self.range().max(gap_up).max(gap_down)
    }
}

/// Drop void bars, keeping the remaining order intact.
pub fn drop_void(bars: Vec<Bar>) -> Vec<Bar> {
    bars.into_iter().filter(|b| !b.is_void()).collect()
}
