//! PnF Runner: cycle orchestration for the point-and-figure monitor.
//!
//! This crate builds on `pnf-core` to provide:
//! - The monitor config file (chart, schedule, runtime, secrets, watchlist)
//! - A per-instrument signature store with in-flight claims and JSON persistence
//! - The recompute cycle: fetch, chart, detect, alert, record
//! - A market-hours gated fixed-period scheduler
//! - Alert delivery (Telegram, log) and a bounded alert log

pub mod alerts;
pub mod config;
pub mod notify;
pub mod orchestrator;
pub mod schedule;
pub mod store;

pub use alerts::{AlertEntry, AlertLog, DEFAULT_ALERT_CAPACITY};
pub use config::{ChartSection, KiteSection, MonitorConfig, RuntimeConfig, TelegramSection};
pub use notify::{
    format_alert, FanoutNotifier, LogNotifier, Notifier, NotifyError, TelegramNotifier,
};
pub use orchestrator::{
    CycleReport, InstrumentError, InstrumentOutcome, InstrumentReport, Orchestrator,
};
pub use schedule::{MarketHours, ScheduleConfig, Scheduler};
pub use store::{SignatureGuard, SignatureStore, StoreError};
