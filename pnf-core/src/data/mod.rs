//! Bar sources and watchlist configuration.

pub mod circuit_breaker;
pub mod csv_import;
pub mod interval;
pub mod kite;
pub mod provider;
pub mod synthetic;
pub mod watchlist;

pub use circuit_breaker::CircuitBreaker;
pub use csv_import::{read_bars, write_bars, CsvProvider};
pub use interval::Interval;
pub use kite::{KiteProvider, KiteSettings, DEFAULT_BASE_URL};
pub use provider::{BarSource, DataError};
pub use synthetic::SyntheticProvider;
pub use watchlist::Watchlist;
