//! Columns of X (rising) and O (falling) boxes.
//!
//! Box levels are exact multiples of the box size from a zero origin. A column
//! is stored as a contiguous run of integer box indices, and every level is
//! recomputed as `index * box_size`, so no rounding drift accumulates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Column direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    X,
    O,
}

impl ColumnKind {
    pub fn opposite(self) -> Self {
        match self {
            ColumnKind::X => ColumnKind::O,
            ColumnKind::O => ColumnKind::X,
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::X => write!(f, "X"),
            ColumnKind::O => write!(f, "O"),
        }
    }
}

/// Box index of a price: `floor(price / box_size)`.
pub fn quantize_index(price: f64, box_size: f64) -> i64 {
    (price / box_size).floor() as i64
}

/// Quantized price level: `floor(price / box_size) * box_size`.
pub fn quantize(price: f64, box_size: f64) -> f64 {
    level(quantize_index(price, box_size), box_size)
}

/// Price level of a box index.
pub fn level(index: i64, box_size: f64) -> f64 {
    index as f64 * box_size
}

/// A finalized column. Immutable once built.
///
/// `boxes` are in append order: ascending for X, descending for O. For X the
/// last box is `high` and the first is `low`; for O the reverse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    kind: ColumnKind,
    boxes: Vec<f64>,
    high: f64,
    low: f64,
}

impl Column {
    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    pub fn boxes(&self) -> &[f64] {
        &self.boxes
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

/// The in-progress column. The only mutable column state in a chart build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnBuilder {
    kind: ColumnKind,
    low: i64,
    high: i64,
}

impl ColumnBuilder {
    /// A single-box column at `index`.
    pub fn seed(kind: ColumnKind, index: i64) -> Self {
        Self {
            kind,
            low: index,
            high: index,
        }
    }

    /// A column spanning `low..=high` box indices.
    pub fn spanning(kind: ColumnKind, low: i64, high: i64) -> Self {
        debug_assert!(low <= high);
        Self { kind, low, high }
    }

    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    pub fn high_index(&self) -> i64 {
        self.high
    }

    pub fn low_index(&self) -> i64 {
        self.low
    }

    /// Number of boxes the column currently holds.
    pub fn box_count(&self) -> u64 {
        self.high.abs_diff(self.low) + 1
    }

    /// Raise the top of an X column.
    pub fn extend_up(&mut self, new_high: i64) {
        debug_assert_eq!(self.kind, ColumnKind::X);
        self.high = self.high.max(new_high);
    }

    /// Lower the bottom of an O column.
    pub fn extend_down(&mut self, new_low: i64) {
        debug_assert_eq!(self.kind, ColumnKind::O);
        self.low = self.low.min(new_low);
    }

    /// Materialize the column's price levels.
    pub fn finish(&self, box_size: f64) -> Column {
        let boxes: Vec<f64> = match self.kind {
            ColumnKind::X => (self.low..=self.high).map(|i| level(i, box_size)).collect(),
            ColumnKind::O => (self.low..=self.high)
                .rev()
                .map(|i| level(i, box_size))
                .collect(),
        };
        Column {
            kind: self.kind,
            boxes,
            high: level(self.high, box_size),
            low: level(self.low, box_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_floors_toward_negative_infinity() {
        assert_eq!(quantize(9.0, 2.0), 8.0);
        assert_eq!(quantize(10.0, 2.0), 10.0);
        assert_eq!(quantize(-1.0, 2.0), -2.0);
        assert_eq!(quantize_index(-0.5, 1.0), -1);
    }

    #[test]
    fn x_column_boxes_ascend() {
        let mut b = ColumnBuilder::seed(ColumnKind::X, 5);
        b.extend_up(8);
        let col = b.finish(2.0);
        assert_eq!(col.kind(), ColumnKind::X);
        assert_eq!(col.boxes(), &[10.0, 12.0, 14.0, 16.0]);
        assert_eq!(col.high(), 16.0);
        assert_eq!(col.low(), 10.0);
        assert_eq!(col.len(), 4);
    }

    #[test]
    fn o_column_boxes_descend() {
        let b = ColumnBuilder::spanning(ColumnKind::O, 4, 7);
        let col = b.finish(2.0);
        assert_eq!(col.boxes(), &[14.0, 12.0, 10.0, 8.0]);
        assert_eq!(col.high(), 14.0);
        assert_eq!(col.low(), 8.0);
    }

    #[test]
    fn extend_never_shrinks() {
        let mut b = ColumnBuilder::seed(ColumnKind::X, 10);
        b.extend_up(7);
        assert_eq!(b.high_index(), 10);
        assert_eq!(b.box_count(), 1);
    }

    #[test]
    fn levels_do_not_drift() {
        let b = ColumnBuilder::spanning(ColumnKind::X, 0, 1000);
        let col = b.finish(0.1);
        assert_eq!(col.boxes()[1000], 1000.0 * 0.1);
        assert_eq!(col.high(), 1000.0 * 0.1);
    }

    #[test]
    fn kind_display_and_opposite() {
        assert_eq!(ColumnKind::X.to_string(), "X");
        assert_eq!(ColumnKind::O.opposite(), ColumnKind::X);
    }
}
