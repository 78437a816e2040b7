//! Monitor configuration file.
//!
//! One TOML document with `[chart]`, `[schedule]`, `[runtime]`, `[kite]`,
//! `[telegram]` and `[[watchlist.instruments]]` sections. Every section has
//! defaults matching the NSE intraday deployment, so an empty file is valid.
//! Secrets can come from the environment instead of the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use pnf_core::config::{DEFAULT_LOOKBACK, DEFAULT_REVERSAL};
use pnf_core::data::{KiteSettings, DEFAULT_BASE_URL};
use pnf_core::{ChartConfig, ConfigError, Interval, Watchlist};

use crate::alerts::DEFAULT_ALERT_CAPACITY;
use crate::schedule::ScheduleConfig;

pub const ENV_KITE_API_KEY: &str = "KITE_API_KEY";
pub const ENV_KITE_ACCESS_TOKEN: &str = "KITE_ACCESS_TOKEN";
pub const ENV_TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const ENV_TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";

/// `[chart]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartSection {
    pub lookback: usize,
    pub reversal: u32,
    pub interval: Interval,
}

impl Default for ChartSection {
    fn default() -> Self {
        Self {
            lookback: DEFAULT_LOOKBACK,
            reversal: DEFAULT_REVERSAL,
            interval: Interval::ThirtyMinute,
        }
    }
}

impl ChartSection {
    pub fn chart_config(&self) -> ChartConfig {
        ChartConfig {
            lookback: self.lookback,
            reversal: self.reversal,
        }
    }
}

/// `[runtime]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker threads for per-instrument processing.
    pub threads: usize,
    pub fetch_timeout_secs: u64,
    /// Calendar days of history requested per fetch.
    pub history_days: u32,
    pub alert_log_capacity: usize,
    /// Where signatures survive restarts; unset keeps them in memory only.
    pub signature_file: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            fetch_timeout_secs: 20,
            history_days: 10,
            alert_log_capacity: DEFAULT_ALERT_CAPACITY,
            signature_file: None,
        }
    }
}

impl RuntimeConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == 0 {
            return Err(ConfigError::InvalidRuntime("threads must be at least 1".into()));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::InvalidRuntime(
                "fetch_timeout_secs must be positive".into(),
            ));
        }
        if self.history_days == 0 {
            return Err(ConfigError::InvalidRuntime("history_days must be positive".into()));
        }
        if self.alert_log_capacity == 0 {
            return Err(ConfigError::InvalidRuntime(
                "alert_log_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// `[kite]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KiteSection {
    pub api_key: String,
    pub access_token: String,
    pub base_url: String,
}

impl Default for KiteSection {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            access_token: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl KiteSection {
    pub fn settings(&self, runtime: &RuntimeConfig) -> KiteSettings {
        let mut settings = KiteSettings::new(self.api_key.clone(), self.access_token.clone());
        settings.base_url = self.base_url.clone();
        settings.timeout = runtime.fetch_timeout();
        settings.history_days = runtime.history_days;
        settings
    }
}

/// `[telegram]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSection {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

/// The whole monitor file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub chart: ChartSection,
    pub schedule: ScheduleConfig,
    pub runtime: RuntimeConfig,
    pub kite: KiteSection,
    pub telegram: TelegramSection,
    pub watchlist: Watchlist,
}

impl MonitorConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::File(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse without validating.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::File(format!("parse monitor TOML: {e}")))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::File(format!("serialize monitor config: {e}")))
    }

    /// Replace secrets with `KITE_*` / `TELEGRAM_*` environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Like [`apply_env_overrides`](Self::apply_env_overrides) with an
    /// explicit lookup. Empty values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get(ENV_KITE_API_KEY) {
            self.kite.api_key = v;
        }
        if let Some(v) = get(ENV_KITE_ACCESS_TOKEN) {
            self.kite.access_token = v;
        }
        if let Some(v) = get(ENV_TELEGRAM_BOT_TOKEN) {
            self.telegram.bot_token = Some(v);
        }
        if let Some(v) = get(ENV_TELEGRAM_CHAT_ID) {
            self.telegram.chat_id = Some(v);
        }
    }

    /// Startup validation. Any error here is fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chart.chart_config().validate()?;
        self.schedule.validate()?;
        self.runtime.validate()?;
        self.watchlist.validate()?;
        Ok(())
    }
}
