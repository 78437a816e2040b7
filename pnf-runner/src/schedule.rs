//! Market-hours gate and the periodic cycle loop.
//!
//! The loop runs one cycle immediately, then one per period while the
//! market-hours predicate holds. It sleeps in short slices so a cancel flag
//! is noticed promptly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use pnf_core::ConfigError;

/// 30 minutes, one intraday candle.
pub const DEFAULT_PERIOD_SECS: u64 = 30 * 60;

/// IST (UTC+05:30).
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 330;

/// `HH:MM` serde for times of day.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&t.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(d)?;
        NaiveTime::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)
    }
}

/// The `[schedule]` section of the monitor file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub period_secs: u64,
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
    pub weekdays: Vec<Weekday>,
    pub utc_offset_minutes: i32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            period_secs: DEFAULT_PERIOD_SECS,
            start: NaiveTime::from_hms_opt(9, 15, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(15, 30, 0).unwrap_or(NaiveTime::MIN),
            weekdays: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
        }
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period_secs == 0 {
            return Err(ConfigError::InvalidSchedule("period_secs must be positive".into()));
        }
        self.market_hours().map(|_| ())
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    pub fn market_hours(&self) -> Result<MarketHours, ConfigError> {
        MarketHours::new(
            self.start,
            self.end,
            self.weekdays.clone(),
            self.utc_offset_minutes,
        )
    }
}

/// Trading window in exchange-local time, bounds inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketHours {
    offset: FixedOffset,
    start: NaiveTime,
    end: NaiveTime,
    weekdays: Vec<Weekday>,
}

impl MarketHours {
    pub fn new(
        start: NaiveTime,
        end: NaiveTime,
        weekdays: Vec<Weekday>,
        utc_offset_minutes: i32,
    ) -> Result<Self, ConfigError> {
        if start >= end {
            return Err(ConfigError::InvalidSchedule(format!(
                "start {} must be before end {}",
                start.format("%H:%M"),
                end.format("%H:%M")
            )));
        }
        if weekdays.is_empty() {
            return Err(ConfigError::InvalidSchedule("no trading weekdays".into()));
        }
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60).ok_or_else(|| {
            ConfigError::InvalidSchedule(format!(
                "utc offset of {utc_offset_minutes} minutes is out of range"
            ))
        })?;
        Ok(Self {
            offset,
            start,
            end,
            weekdays,
        })
    }

    /// Whether the market is open at `now`.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.offset);
        if !self.weekdays.contains(&local.weekday()) {
            return false;
        }
        let t = local.time();
        self.start <= t && t <= self.end
    }
}

/// Fixed-period loop with a gate predicate.
#[derive(Debug, Clone)]
pub struct Scheduler {
    period: Duration,
    tick: Duration,
}

impl Scheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            tick: Duration::from_millis(250),
        }
    }

    /// Sleep granularity between cancel checks.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    /// Run `cycle` now, then once per period while `gate` holds, until
    /// `cancel` is set. Returns the number of cycles run.
    ///
    /// A cycle that overruns the period delays the next one; missed ticks
    /// are not queued.
    pub fn run<G, F>(&self, gate: G, cancel: &AtomicBool, mut cycle: F) -> usize
    where
        G: Fn(DateTime<Utc>) -> bool,
        F: FnMut(),
    {
        let mut runs = 0;
        if cancel.load(Ordering::Relaxed) {
            return runs;
        }
        cycle();
        runs += 1;
        let mut next_due = Instant::now() + self.period;

        while !cancel.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now < next_due {
                std::thread::sleep(self.tick.min(next_due - now));
                continue;
            }
            next_due = now + self.period;

            if gate(Utc::now()) {
                cycle();
                runs += 1;
            } else {
                log::debug!("market closed, skipping cycle");
            }
        }
        runs
    }
}
