//! Watchlist configuration: the ordered set of instruments to monitor.
//!
//! Stored as TOML (`[[instruments]]` entries with symbol, instrument_token
//! and exchange). Symbols key all per-instrument state, so they must be
//! unique.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::config::ConfigError;
use crate::domain::Instrument;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watchlist {
    pub instruments: Vec<Instrument>,
}

impl Watchlist {
    pub fn new(instruments: Vec<Instrument>) -> Self {
        Self { instruments }
    }

    /// Load a watchlist from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::File(format!("read watchlist {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse and validate a watchlist from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let list: Self = toml::from_str(content)
            .map_err(|e| ConfigError::File(format!("parse watchlist TOML: {e}")))?;
        list.validate()?;
        Ok(list)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::File(format!("serialize watchlist: {e}")))
    }

    /// Non-empty, with unique non-blank symbols.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instruments.is_empty() {
            return Err(ConfigError::InvalidWatchlist("no instruments".into()));
        }
        let mut seen = HashSet::new();
        for inst in &self.instruments {
            if inst.symbol.trim().is_empty() {
                return Err(ConfigError::InvalidWatchlist(format!(
                    "blank symbol for token {}",
                    inst.instrument_token
                )));
            }
            if !seen.insert(inst.symbol.as_str()) {
                return Err(ConfigError::InvalidWatchlist(format!(
                    "duplicate symbol '{}'",
                    inst.symbol
                )));
            }
        }
        Ok(())
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.instruments.iter().map(|i| i.symbol.as_str()).collect()
    }

    pub fn get(&self, symbol: &str) -> Option<&Instrument> {
        self.instruments.iter().find(|i| i.symbol == symbol)
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instrument> {
        self.instruments.iter()
    }

    /// The default NSE watchlist: two indices and six large caps.
    pub fn default_nse() -> Self {
        let instruments = [
            ("NIFTY 50", 256265),
            ("NIFTY BANK", 260105),
            ("RELIANCE", 738561),
            ("HDFCBANK", 341249),
            ("ICICIBANK", 1270529),
            ("INFY", 408065),
            ("TCS", 2953213),
            ("ITC", 424961),
        ]
        .into_iter()
        .map(|(symbol, token)| Instrument::new(symbol, token, "NSE"))
        .collect();
        Self { instruments }
    }
}

impl Default for Watchlist {
    fn default() -> Self {
        Self::default_nse()
    }
}

impl<'a> IntoIterator for &'a Watchlist {
    type Item = &'a Instrument;
    type IntoIter = std::slice::Iter<'a, Instrument>;

    fn into_iter(self) -> Self::IntoIter {
        self.instruments.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_watchlist_has_eight_nse_instruments() {
        let w = Watchlist::default_nse();
        assert_eq!(w.len(), 8);
        assert!(w.iter().all(|i| i.exchange == "NSE"));
        assert_eq!(w.get("INFY").unwrap().instrument_token, 408065);
        assert_eq!(w.symbols()[0], "NIFTY 50");
        assert!(w.validate().is_ok());
    }

    #[test]
    fn toml_roundtrip_keeps_order() {
        let w = Watchlist::default_nse();
        let text = w.to_toml().unwrap();
        assert!(text.contains("[[instruments]]"));
        let parsed = Watchlist::from_toml(&text).unwrap();
        assert_eq!(parsed, w);
    }

    #[test]
    fn duplicate_symbols_are_rejected() {
        let text = r#"
            [[instruments]]
            symbol = "TCS"
            instrument_token = 1
            exchange = "NSE"

            [[instruments]]
            symbol = "TCS"
            instrument_token = 2
            exchange = "NSE"
        "#;
        assert!(matches!(
            Watchlist::from_toml(text),
            Err(ConfigError::InvalidWatchlist(_))
        ));
    }

    #[test]
    fn empty_is_rejected() {
        assert!(Watchlist::from_toml("instruments = []").is_err());
        assert!(Watchlist::new(Vec::new()).validate().is_err());
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watchlist.toml");
        std::fs::write(&path, Watchlist::default_nse().to_toml().unwrap()).unwrap();
        assert_eq!(Watchlist::from_file(&path).unwrap().len(), 8);
        assert!(Watchlist::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
