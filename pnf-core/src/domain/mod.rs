//! Domain types for the point-and-figure monitor.

pub mod bar;
pub mod instrument;

pub use bar::{drop_void, Bar};
pub use instrument::Instrument;
