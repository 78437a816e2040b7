//! Point-and-figure charting: columns, the column state machine, the chart
//! builder and cross-cycle change detection.

pub mod builder;
pub mod column;
pub mod machine;
pub mod signature;

pub use builder::{build_chart, Chart};
pub use column::{level, quantize, quantize_index, Column, ColumnBuilder, ColumnKind};
pub use machine::{
    build_columns, columns_from_closes, initial_kind, ChartError, ColumnMachine, MAX_BOX_INDEX,
    MAX_COLUMN_BOXES,
};
pub use signature::{detect_change, ChangeDetection, ChangeEvent, Signature};
