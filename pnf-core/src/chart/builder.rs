//! Chart builder: box sizing plus the column state machine over one history.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::column::{Column, ColumnKind};
use super::machine::{build_columns, ChartError};
use super::signature::Signature;
use crate::config::ChartConfig;
use crate::domain::Bar;
use crate::indicators::{estimate_box_size, BoxSizeSource};

/// A point-and-figure chart for one instrument.
///
/// `columns` holds the finalized columns followed by the in-progress column.
/// It is empty only when no usable bars were supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    pub columns: Vec<Column>,
    pub box_size: f64,
    pub box_source: BoxSizeSource,
    pub last_updated: DateTime<Utc>,
}

impl Chart {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// The in-progress column.
    pub fn terminal(&self) -> Option<&Column> {
        self.columns.last()
    }

    pub fn terminal_kind(&self) -> Option<ColumnKind> {
        self.terminal().map(Column::kind)
    }

    /// Every column before the in-progress one.
    pub fn finalized(&self) -> &[Column] {
        match self.columns.split_last() {
            Some((_, rest)) => rest,
            None => &[],
        }
    }

    /// Column count and terminal kind, or `None` for an empty chart.
    pub fn signature(&self) -> Option<Signature> {
        self.terminal_kind().map(|kind| Signature {
            column_count: self.column_count(),
            kind,
        })
    }
}

/// Build a chart from an instrument's bar history (oldest first).
///
/// Void bars are dropped first. With no usable bars the chart is empty, uses
/// the fallback box size and is stamped with the current time. The config is
/// assumed to have been validated at startup.
pub fn build_chart(bars: &[Bar], config: &ChartConfig) -> Result<Chart, ChartError> {
    let bars: Cow<'_, [Bar]> = if bars.iter().any(Bar::is_void) {
        let kept: Vec<Bar> = bars.iter().filter(|b| !b.is_void()).cloned().collect();
        log::debug!("dropped {} void bars", bars.len() - kept.len());
        Cow::Owned(kept)
    } else {
        Cow::Borrowed(bars)
    };

    let estimate = estimate_box_size(&bars, config.lookback);
    if estimate.source != BoxSizeSource::Atr {
        log::debug!(
            "box size {} from {:?} fallback ({} bars)",
            estimate.box_size,
            estimate.source,
            bars.len()
        );
    }

    let Some(last) = bars.last() else {
        return Ok(Chart {
            columns: Vec::new(),
            box_size: estimate.box_size,
            box_source: estimate.source,
            last_updated: Utc::now(),
        });
    };

    let columns = build_columns(&bars, estimate.box_size, config.reversal)?;

    Ok(Chart {
        columns,
        box_size: estimate.box_size,
        box_source: estimate.source,
        last_updated: last.timestamp,
    })
}
