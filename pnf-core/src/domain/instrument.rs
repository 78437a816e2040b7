use serde::{Deserialize, Serialize};
use std::fmt;

/// A tradable instrument on the watchlist.
///
/// `symbol` is the broker's trading symbol and keys all per-instrument state;
/// `instrument_token` is the numeric id the historical-data endpoint expects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub instrument_token: u64,
    pub exchange: String,
}

impl Instrument {
    pub fn new(
        symbol: impl Into<String>,
        instrument_token: u64,
        exchange: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            instrument_token,
            exchange: exchange.into(),
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.exchange, self.symbol)
    }
}
