//! Deterministic synthetic bars for demos and tests.
//!
//! A random walk with a slight upward drift: start price in [1000, 1500),
//! per-bar change uniform in [-7.2, 7.8), wicks up to 5 beyond the body.
//! The RNG is seeded with BLAKE3 over the master seed, the symbol and the
//! index of the window's last interval, so a given instrument yields the
//! same history for the same clock reading and a fresh one each period.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::interval::Interval;
use super::provider::{BarSource, DataError};
use crate::domain::{Bar, Instrument};

pub const DEFAULT_BAR_COUNT: usize = 101;

#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    master_seed: u64,
    bar_count: usize,
    /// Fixed clock; `None` uses the current time.
    now: Option<DateTime<Utc>>,
}

impl SyntheticProvider {
    pub fn new(master_seed: u64) -> Self {
        Self {
            master_seed,
            bar_count: DEFAULT_BAR_COUNT,
            now: None,
        }
    }

    pub fn with_bar_count(mut self, bar_count: usize) -> Self {
        self.bar_count = bar_count;
        self
    }

    /// Pin the clock so output does not depend on when it runs.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    fn seed(&self, symbol: &str, end_index: i64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(symbol.as_bytes());
        hasher.update(&end_index.to_le_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }

    /// Generate the window of bars ending at the last interval boundary
    /// at or before `now`.
    pub fn generate(&self, symbol: &str, interval: Interval, now: DateTime<Utc>) -> Vec<Bar> {
        let step_secs = (interval.minutes() * 60) as i64;
        let end_index = now.timestamp().div_euclid(step_secs);
        let mut rng = StdRng::seed_from_u64(self.seed(symbol, end_index));

        let step = ChronoDuration::seconds(step_secs);
        let end = Utc
            .timestamp_opt(end_index * step_secs, 0)
            .single()
            .unwrap_or(now);

        let mut last_price = 1000.0 + rng.gen::<f64>() * 500.0;
        let mut bars = Vec::with_capacity(self.bar_count);
        for i in (0..self.bar_count).rev() {
            let timestamp = end - step * i as i32;
            let change = (rng.gen::<f64>() - 0.48) * 15.0;
            let open = last_price;
            let close = open + change;
            let high = open.max(close) + rng.gen::<f64>() * 5.0;
            let low = open.min(close) - rng.gen::<f64>() * 5.0;
            let volume = rng.gen_range(0..100_000u64);
            bars.push(Bar {
                timestamp,
                open,
                high,
                low,
                close,
                volume,
            });
            last_price = close;
        }
        bars
    }
}

impl BarSource for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(&self, instrument: &Instrument, interval: Interval) -> Result<Vec<Bar>, DataError> {
        let now = self.now.unwrap_or_else(Utc::now);
        Ok(self.generate(&instrument.symbol, interval, now))
    }
}
