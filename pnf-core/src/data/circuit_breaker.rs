//! Circuit breaker for broker rate limiting and access bans.
//!
//! A 403 opens the breaker at once; a run of 5xx responses opens it at the
//! failure threshold. Throttling (429) is retried but never counted. While
//! open, every fetch through the provider is refused until the cooldown
//! deadline passes. One breaker is shared by all
//! workers fetching through the same provider.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Cooldown for the broker provider: half an intraday cycle.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Default)]
struct Counters {
    open_until: Option<Instant>,
    failure_streak: u32,
    trips: u64,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    counters: Mutex<Counters>,
    cooldown: Duration,
    failure_threshold: u32,
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration) -> Self {
        Self::with_threshold(cooldown, DEFAULT_FAILURE_THRESHOLD)
    }

    /// A threshold of zero is raised to one.
    pub fn with_threshold(cooldown: Duration, failure_threshold: u32) -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            cooldown,
            failure_threshold: failure_threshold.max(1),
        }
    }

    pub fn default_provider() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }

    fn counters(&self) -> MutexGuard<'_, Counters> {
        let mut c = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        if c.open_until.is_some_and(|until| Instant::now() >= until) {
            c.open_until = None;
            c.failure_streak = 0;
            log::info!("circuit breaker closed after cooldown");
        }
        c
    }

    fn open(&self, c: &mut Counters, reason: &str) {
        c.open_until = Some(Instant::now() + self.cooldown);
        c.trips += 1;
        log::warn!(
            "circuit breaker open for {}s (trip {}): {reason}",
            self.cooldown.as_secs(),
            c.trips
        );
    }

    pub fn is_allowed(&self) -> bool {
        self.counters().open_until.is_none()
    }

    pub fn record_success(&self) {
        self.counters().failure_streak = 0;
    }

    /// Count a transient failure; opens the breaker at the threshold.
    pub fn record_failure(&self) {
        let mut c = self.counters();
        c.failure_streak += 1;
        if c.open_until.is_none() && c.failure_streak >= self.failure_threshold {
            let reason = format!("{} consecutive failures", c.failure_streak);
            self.open(&mut c, &reason);
        }
    }

    /// Open immediately, e.g. on 403 Forbidden.
    pub fn trip(&self) {
        let mut c = self.counters();
        self.open(&mut c, "tripped");
    }

    /// Zero when closed.
    pub fn remaining_cooldown(&self) -> Duration {
        self.counters()
            .open_until
            .map_or(Duration::ZERO, |until| {
                until.saturating_duration_since(Instant::now())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn fresh_breaker_allows() {
        let cb = CircuitBreaker::new(MINUTE);
        assert!(cb.is_allowed());
        assert_eq!(cb.remaining_cooldown(), Duration::ZERO);
        assert_eq!(cb.counters().trips, 0);
    }

    #[test]
    fn opens_on_third_straight_failure() {
        let cb = CircuitBreaker::new(MINUTE);
        cb.record_failure();
        cb.record_failure();
        assert!(cb.is_allowed());
        cb.record_failure();
        assert!(!cb.is_allowed());
        assert!(cb.remaining_cooldown() > Duration::from_secs(50));
        assert_eq!(cb.counters().trips, 1);

        // further failures while open do not re-open
        cb.record_failure();
        assert_eq!(cb.counters().trips, 1);
    }

    #[test]
    fn success_breaks_the_streak() {
        let cb = CircuitBreaker::new(MINUTE);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert!(cb.is_allowed());
    }

    #[test]
    fn closes_after_cooldown() {
        let cb = CircuitBreaker::new(Duration::from_millis(10));
        cb.trip();
        assert!(!cb.is_allowed());
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.is_allowed());
        assert_eq!(cb.remaining_cooldown(), Duration::ZERO);
        // the streak was cleared with the cooldown
        cb.record_failure();
        assert!(cb.is_allowed());
    }

    #[test]
    fn zero_threshold_opens_on_first_failure() {
        let cb = CircuitBreaker::with_threshold(MINUTE, 0);
        cb.record_failure();
        assert!(!cb.is_allowed());
    }
}
