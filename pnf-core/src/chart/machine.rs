//! Column state machine.
//!
//! Consumes closing prices left to right and produces the finalized columns
//! plus the in-progress column. Per close `p`, with current high `H` and low `L`:
//!
//! - X column: extend up while `p >= H + box`; reverse to O when
//!   `p <= H - box * reversal`, starting at `H - box` down to `quantize(p)`.
//! - O column: extend down while `p <= L - box`; reverse to X when
//!   `p >= L + box * reversal`, starting at `L + box` up to `quantize(p)`.
//! - Otherwise the bar changes nothing.

use thiserror::Error;

use super::column::{level, quantize_index, Column, ColumnBuilder, ColumnKind};
use crate::config::ConfigError;
use crate::domain::Bar;

/// Upper bound on boxes in a single column.
pub const MAX_COLUMN_BOXES: u64 = 1_000_000;

/// Largest |price / box_size| accepted; keeps box indices exact in f64.
pub const MAX_BOX_INDEX: i64 = 1 << 52;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChartError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("close price must be finite, got {0}")]
    NonFinitePrice(f64),

    #[error("price {price} is out of range for box size {box_size}")]
    PriceOutOfRange { price: f64, box_size: f64 },

    #[error(
        "column would hold {boxes} boxes (limit {limit}); box size {box_size} is too small for the price range",
        limit = MAX_COLUMN_BOXES
    )]
    ColumnTooTall { boxes: u64, box_size: f64 },
}

/// Initial column kind: X if the second close exceeds the first, else O.
///
/// With a single close there is no second bar to compare against and the
/// chart starts as O.
pub fn initial_kind(first: f64, second: Option<f64>) -> ColumnKind {
    match second {
        Some(second) if second > first => ColumnKind::X,
        _ => ColumnKind::O,
    }
}

/// Streaming point-and-figure column builder.
#[derive(Debug, Clone)]
pub struct ColumnMachine {
    box_size: f64,
    reversal: i64,
    finalized: Vec<Column>,
    current: ColumnBuilder,
}

impl ColumnMachine {
    /// Start a chart at `quantize(first_close)` with the given initial kind.
    pub fn start(
        first_close: f64,
        kind: ColumnKind,
        box_size: f64,
        reversal: u32,
    ) -> Result<Self, ChartError> {
        if !(box_size.is_finite() && box_size > 0.0) {
            return Err(ConfigError::InvalidBoxSize(box_size).into());
        }
        if reversal == 0 {
            return Err(ConfigError::InvalidReversal(reversal).into());
        }
        let seed = checked_index(first_close, box_size)?;

        Ok(Self {
            box_size,
            reversal: i64::from(reversal),
            finalized: Vec::new(),
            current: ColumnBuilder::seed(kind, seed),
        })
    }

    pub fn box_size(&self) -> f64 {
        self.box_size
    }

    /// Columns finalized so far (excludes the in-progress column).
    pub fn finalized(&self) -> &[Column] {
        &self.finalized
    }

    pub fn current(&self) -> &ColumnBuilder {
        &self.current
    }

    /// Feed one closing price.
    pub fn push(&mut self, price: f64) -> Result<(), ChartError> {
        let b = self.box_size;
        let q = checked_index(price, b)?;
        let high = self.current.high_index();
        let low = self.current.low_index();

        match self.current.kind() {
            ColumnKind::X => {
                if price >= level(high + 1, b) {
                    let mut next = self.current;
                    next.extend_up(q.max(high + 1));
                    self.current = self.checked(next)?;
                } else if price <= level(high - self.reversal, b) {
                    let top = high - 1;
                    let next = ColumnBuilder::spanning(ColumnKind::O, q.min(top), top);
                    self.reverse_into(next)?;
                }
            }
            ColumnKind::O => {
                if price <= level(low - 1, b) {
                    let mut next = self.current;
                    next.extend_down(q.min(low - 1));
                    self.current = self.checked(next)?;
                } else if price >= level(low + self.reversal, b) {
                    let bottom = low + 1;
                    let next = ColumnBuilder::spanning(ColumnKind::X, bottom, q.max(bottom));
                    self.reverse_into(next)?;
                }
            }
        }
        Ok(())
    }

    /// Finalized columns followed by the in-progress column.
    pub fn finish(mut self) -> Vec<Column> {
        self.finalized.push(self.current.finish(self.box_size));
        self.finalized
    }

    fn reverse_into(&mut self, next: ColumnBuilder) -> Result<(), ChartError> {
        let next = self.checked(next)?;
        self.finalized.push(self.current.finish(self.box_size));
        self.current = next;
        Ok(())
    }

    fn checked(&self, column: ColumnBuilder) -> Result<ColumnBuilder, ChartError> {
        let boxes = column.box_count();
        if boxes > MAX_COLUMN_BOXES {
            return Err(ChartError::ColumnTooTall {
                boxes,
                box_size: self.box_size,
            });
        }
        Ok(column)
    }
}

fn checked_index(price: f64, box_size: f64) -> Result<i64, ChartError> {
    if !price.is_finite() {
        return Err(ChartError::NonFinitePrice(price));
    }
    let ratio = price / box_size;
    if !ratio.is_finite() || ratio.abs() >= MAX_BOX_INDEX as f64 {
        return Err(ChartError::PriceOutOfRange { price, box_size });
    }
    Ok(quantize_index(price, box_size))
}

/// Run the state machine over a sequence of closes.
///
/// Returns an empty sequence for empty input; otherwise the last column is
/// the in-progress one.
pub fn columns_from_closes(
    closes: &[f64],
    box_size: f64,
    reversal: u32,
) -> Result<Vec<Column>, ChartError> {
    let Some(&first) = closes.first() else {
        return Ok(Vec::new());
    };
    let kind = initial_kind(first, closes.get(1).copied());
    let mut machine = ColumnMachine::start(first, kind, box_size, reversal)?;
    for &price in &closes[1..] {
        machine.push(price)?;
    }
    Ok(machine.finish())
}

/// Run the state machine over bar closes.
pub fn build_columns(
    bars: &[Bar],
    box_size: f64,
    reversal: u32,
) -> Result<Vec<Column>, ChartError> {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    columns_from_closes(&closes, box_size, reversal)
}
