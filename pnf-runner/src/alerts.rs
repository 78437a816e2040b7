//! Bounded in-memory log of emitted alerts, newest first.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use pnf_core::{ChangeEvent, ColumnKind};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ALERT_CAPACITY: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEntry {
    pub id: String,
    /// Wall-clock time the change was detected.
    pub detected_at: DateTime<Utc>,
    pub symbol: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: ColumnKind,
}

#[derive(Debug, Default)]
struct LogState {
    entries: VecDeque<AlertEntry>,
    next_id: u64,
}

#[derive(Debug)]
pub struct AlertLog {
    state: Mutex<LogState>,
    capacity: usize,
}

impl AlertLog {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(LogState {
                entries: VecDeque::with_capacity(capacity),
                next_id: 1,
            }),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a change, evicting the oldest entry when full.
    pub fn record(&self, event: &ChangeEvent) -> AlertEntry {
        let mut state = self.lock();
        let entry = AlertEntry {
            id: format!("{:08x}", state.next_id),
            detected_at: Utc::now(),
            symbol: event.symbol.clone(),
            message: format!("New {} column formed", event.kind),
            kind: event.kind,
        };
        state.next_id += 1;
        state.entries.push_front(entry.clone());
        state.entries.truncate(self.capacity);
        entry
    }

    /// Entries, newest first.
    pub fn entries(&self) -> Vec<AlertEntry> {
        self.lock().entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(symbol: &str, kind: ColumnKind) -> ChangeEvent {
        ChangeEvent {
            symbol: symbol.into(),
            kind,
            column_count: 4,
            box_size: 3.25,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn newest_first_with_message() {
        let log = AlertLog::default();
        log.record(&event("INFY", ColumnKind::X));
        log.record(&event("TCS", ColumnKind::O));
        let entries = log.entries();
        assert_eq!(entries[0].symbol, "TCS");
        assert_eq!(entries[0].message, "New O column formed");
        assert_eq!(entries[1].kind, ColumnKind::X);
        assert_ne!(entries[0].id, entries[1].id);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let log = AlertLog::new(3);
        for i in 0..5 {
            log.record(&event(&format!("S{i}"), ColumnKind::X));
        }
        let symbols: Vec<String> = log.entries().into_iter().map(|e| e.symbol).collect();
        assert_eq!(symbols, vec!["S4", "S3", "S2"]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn default_capacity_is_fifty() {
        let log = AlertLog::default();
        for _ in 0..60 {
            log.record(&event("ITC", ColumnKind::O));
        }
        assert_eq!(log.len(), DEFAULT_ALERT_CAPACITY);
        assert_eq!(AlertLog::new(0).capacity(), 1);
    }
}
