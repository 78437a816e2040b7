//! Average True Range box sizing.
//!
//! The box size is the simple mean of the last `lookback` true ranges. Each
//! true range needs the previous close, so `lookback + 1` bars are required.
//! Anything short of that, or an ATR that is zero or not finite, falls back
//! to 1% of the latest close and then to a flat 1.0.

use serde::{Deserialize, Serialize};

use crate::domain::Bar;

/// Fraction of the latest close used when the history is too short.
pub const FALLBACK_CLOSE_FRACTION: f64 = 0.01;

/// Box size used when nothing better is available.
pub const FALLBACK_BOX_SIZE: f64 = 1.0;

/// Where a box size came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoxSizeSource {
    /// Mean of the last `lookback` true ranges.
    Atr,
    /// 1% of the latest close.
    PercentOfClose,
    /// The fixed 1.0 fallback.
    Unit,
}

/// A positive, finite box size and its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxEstimate {
    pub box_size: f64,
    pub source: BoxSizeSource,
}

impl BoxEstimate {
    fn atr(box_size: f64) -> Option<Self> {
        (box_size.is_finite() && box_size > 0.0).then_some(Self {
            box_size,
            source: BoxSizeSource::Atr,
        })
    }

    fn fallback(last_close: Option<f64>) -> Self {
        match last_close.map(|c| c * FALLBACK_CLOSE_FRACTION) {
            Some(size) if size.is_finite() && size > 0.0 => Self {
                box_size: size,
                source: BoxSizeSource::PercentOfClose,
            },
            _ => Self {
                box_size: FALLBACK_BOX_SIZE,
                source: BoxSizeSource::Unit,
            },
        }
    }
}

/// True range of every bar against its predecessor.
///
/// One shorter than `bars`: the first bar has no previous close.
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    bars.windows(2)
        .map(|pair| pair[1].true_range(pair[0].close))
        .collect()
}

/// Estimate the box size for a bar history (oldest first). The result is
/// always positive and finite.
pub fn estimate_box_size(bars: &[Bar], lookback: usize) -> BoxEstimate {
    let last_close = bars.last().map(|b| b.close);
    if lookback == 0 || bars.len() <= lookback {
        return BoxEstimate::fallback(last_close);
    }

    let window = &bars[bars.len() - lookback - 1..];
    let atr = true_range(window).iter().sum::<f64>() / lookback as f64;
    BoxEstimate::atr(atr).unwrap_or_else(|| BoxEstimate::fallback(last_close))
}

/// Shorthand for `estimate_box_size(..).box_size`.
pub fn box_size(bars: &[Bar], lookback: usize) -> f64 {
    estimate_box_size(bars, lookback).box_size
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::fixtures::{bars_from_closes, bars_from_ohlc};

    fn close_to(actual: f64, expected: f64) -> bool {
        (actual - expected).abs() < 1e-10
    }

    #[test]
    fn true_range_series_skips_first_bar() {
        let bars = bars_from_ohlc(&[
            (100.0, 105.0, 95.0, 102.0),
            (102.0, 108.0, 100.0, 106.0), // 8
            (106.0, 107.0, 98.0, 99.0),   // 9
            (110.0, 115.0, 108.0, 112.0), // gap: |115 - 99| = 16
        ]);
        assert_eq!(true_range(&bars), vec![8.0, 9.0, 16.0]);
        assert!(true_range(&bars[..1]).is_empty());
    }

    #[test]
    fn box_size_is_mean_of_latest_window() {
        let bars = bars_from_ohlc(&[
            (100.0, 105.0, 95.0, 102.0),
            (102.0, 108.0, 100.0, 106.0), // 8
            (106.0, 107.0, 98.0, 99.0),   // 9
            (99.0, 103.0, 97.0, 101.0),   // 6
            (101.0, 106.0, 100.0, 105.0), // 6
        ]);
        let est = estimate_box_size(&bars, 3);
        assert_eq!(est.source, BoxSizeSource::Atr);
        assert!(close_to(est.box_size, 7.0));
        assert!(close_to(box_size(&bars, 4), 29.0 / 4.0));
    }

    #[test]
    fn short_history_falls_back_to_percent_of_close() {
        let bars = bars_from_closes(&[100.0, 101.0, 250.0]);
        let est = estimate_box_size(&bars, 14);
        assert_eq!(est.source, BoxSizeSource::PercentOfClose);
        assert!(close_to(est.box_size, 2.5));
    }

    #[test]
    fn needs_one_more_bar_than_lookback() {
        let bars = bars_from_closes(&[100.0, 101.0, 102.0]);
        assert_eq!(estimate_box_size(&bars, 3).source, BoxSizeSource::PercentOfClose);
        assert_eq!(estimate_box_size(&bars, 2).source, BoxSizeSource::Atr);
    }

    #[test]
    fn empty_history_falls_back_to_unit() {
        let est = estimate_box_size(&[], 14);
        assert_eq!(est.source, BoxSizeSource::Unit);
        assert_eq!(est.box_size, FALLBACK_BOX_SIZE);
    }

    #[test]
    fn non_positive_close_never_yields_non_positive_box() {
        assert_eq!(box_size(&bars_from_closes(&[0.0]), 14), 1.0);
        assert_eq!(box_size(&bars_from_closes(&[-50.0]), 14), 1.0);
    }

    #[test]
    fn flat_market_falls_back() {
        let flat = (50.0, 50.0, 50.0, 50.0);
        let est = estimate_box_size(&bars_from_ohlc(&[flat, flat, flat]), 2);
        assert_eq!(est.source, BoxSizeSource::PercentOfClose);
        assert!(close_to(est.box_size, 0.5));
    }

    #[test]
    fn nan_in_window_falls_back() {
        let mut bars = bars_from_closes(&[100.0, 101.0, 102.0, 103.0]);
        bars[2].high = f64::NAN;
        let est = estimate_box_size(&bars, 3);
        assert_ne!(est.source, BoxSizeSource::Atr);
        assert!(est.box_size > 0.0);
    }

    #[test]
    fn zero_lookback_falls_back() {
        let bars = bars_from_closes(&[100.0, 101.0]);
        assert_eq!(estimate_box_size(&bars, 0).source, BoxSizeSource::PercentOfClose);
    }
}
