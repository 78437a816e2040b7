//! Chart configuration and its startup validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default ATR lookback length.
pub const DEFAULT_LOOKBACK: usize = 14;

/// Default reversal multiple (the classic three-box reversal).
pub const DEFAULT_REVERSAL: u32 = 3;

/// Invalid configuration. Fatal at startup, never recovered mid-cycle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("lookback length must be positive, got {0}")]
    InvalidLookback(usize),

    #[error("reversal multiple must be positive, got {0}")]
    InvalidReversal(u32),

    #[error("box size must be a positive finite number, got {0}")]
    InvalidBoxSize(f64),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("invalid watchlist: {0}")]
    InvalidWatchlist(String),

    #[error("invalid runtime setting: {0}")]
    InvalidRuntime(String),

    #[error("config file error: {0}")]
    File(String),
}

/// Parameters for one chart build: volatility lookback and reversal multiple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartConfig {
    pub lookback: usize,
    pub reversal: u32,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            lookback: DEFAULT_LOOKBACK,
            reversal: DEFAULT_REVERSAL,
        }
    }
}

impl ChartConfig {
    /// Build a validated config.
    pub fn new(lookback: usize, reversal: u32) -> Result<Self, ConfigError> {
        let config = Self { lookback, reversal };
        config.validate()?;
        Ok(config)
    }

    /// Both values must be positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lookback == 0 {
            return Err(ConfigError::InvalidLookback(self.lookback));
        }
        if self.reversal == 0 {
            return Err(ConfigError::InvalidReversal(self.reversal));
        }
        Ok(())
    }

    /// Fewest bars that give a full true-range window (`lookback + 1`).
    pub fn min_bars(&self) -> usize {
        self.lookback + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_fourteen_and_three() {
        let config = ChartConfig::default();
        assert_eq!(config.lookback, 14);
        assert_eq!(config.reversal, 3);
        assert!(config.validate().is_ok());
        assert_eq!(config.min_bars(), 15);
    }

    #[test]
    fn zero_lookback_rejected() {
        assert_eq!(ChartConfig::new(0, 3), Err(ConfigError::InvalidLookback(0)));
    }

    #[test]
    fn zero_reversal_rejected() {
        assert_eq!(ChartConfig::new(14, 0), Err(ConfigError::InvalidReversal(0)));
    }

    #[test]
    fn toml_roundtrip() {
        let config = ChartConfig::new(20, 2).unwrap();
        let s = toml::to_string(&config).unwrap();
        let back: ChartConfig = toml::from_str(&s).unwrap();
        assert_eq!(config, back);
    }
}
