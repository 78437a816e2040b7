//! Volatility estimate used for box sizing.

pub mod atr;

pub use atr::{box_size, estimate_box_size, true_range, BoxEstimate, BoxSizeSource};
