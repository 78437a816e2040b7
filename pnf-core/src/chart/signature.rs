//! Cross-cycle change detection.
//!
//! A chart's signature is its column count plus the kind of its terminal
//! column. A change is reported only against a previously recorded signature,
//! so the first observation of an instrument is always silent and two
//! identical charts in a row never signal twice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::builder::Chart;
use super::column::ColumnKind;

/// Minimal chart state compared between cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    #[serde(rename = "count")]
    pub column_count: usize,
    #[serde(rename = "type")]
    pub kind: ColumnKind,
}

/// Outcome of comparing a chart against the previous signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeDetection {
    pub changed: bool,
    /// Signature to record; `None` only for an empty chart.
    pub signature: Option<Signature>,
}

/// Compare a freshly built chart with the previous signature, if any.
pub fn detect_change(previous: Option<&Signature>, chart: &Chart) -> ChangeDetection {
    let signature = chart.signature();
    let changed = match (previous, signature.as_ref()) {
        (Some(prev), Some(next)) => prev != next,
        _ => false,
    };
    ChangeDetection { changed, signature }
}

/// A detected structural change, handed to the notifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub symbol: String,
    pub kind: ColumnKind,
    pub column_count: usize,
    pub box_size: f64,
    /// Time of the last bar in the chart.
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    /// Event for a chart, or `None` if the chart is empty.
    pub fn from_chart(symbol: &str, chart: &Chart) -> Option<Self> {
        let sig = chart.signature()?;
        Some(Self {
            symbol: symbol.to_string(),
            kind: sig.kind,
            column_count: sig.column_count,
            box_size: chart.box_size,
            timestamp: chart.last_updated,
        })
    }
}
