//! PnF Sentinel Core: domain types, box sizing, the point-and-figure column
//! state machine, chart building and change detection.
//!
//! This crate contains the pure chart math plus the bar-source seam:
//! - Domain types (bars, instruments)
//! - ATR volatility estimate with a positive fallback box size
//! - Column state machine with integer box indices (no rounding drift)
//! - Chart builder and cross-cycle signature comparison
//! - Bar sources: broker historical API, CSV files, synthetic walk
//!
//! Everything except the HTTP provider is side-effect free and safe to call
//! from any number of threads on independent inputs.

pub mod chart;
pub mod config;
pub mod data;
pub mod domain;
pub mod indicators;

pub use chart::{build_chart, detect_change, ChangeEvent, Chart, ChartError, ColumnKind, Signature};
pub use config::{ChartConfig, ConfigError};
pub use data::{BarSource, DataError, Interval, Watchlist};
pub use domain::{Bar, Instrument};
