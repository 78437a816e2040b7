//! Candle intervals with the broker's wire names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "minute")]
    Minute,
    #[serde(rename = "3minute")]
    ThreeMinute,
    #[serde(rename = "5minute")]
    FiveMinute,
    #[serde(rename = "10minute")]
    TenMinute,
    #[serde(rename = "15minute")]
    FifteenMinute,
    #[serde(rename = "30minute")]
    ThirtyMinute,
    #[serde(rename = "60minute")]
    SixtyMinute,
    #[serde(rename = "day")]
    Day,
}

impl Interval {
    pub const ALL: [Interval; 8] = [
        Interval::Minute,
        Interval::ThreeMinute,
        Interval::FiveMinute,
        Interval::TenMinute,
        Interval::FifteenMinute,
        Interval::ThirtyMinute,
        Interval::SixtyMinute,
        Interval::Day,
    ];

    /// Name used in the historical-candle URL.
    pub fn as_str(self) -> &'static str {
        match self {
            Interval::Minute => "minute",
            Interval::ThreeMinute => "3minute",
            Interval::FiveMinute => "5minute",
            Interval::TenMinute => "10minute",
            Interval::FifteenMinute => "15minute",
            Interval::ThirtyMinute => "30minute",
            Interval::SixtyMinute => "60minute",
            Interval::Day => "day",
        }
    }

    /// Short label for alert text, e.g. `30m`.
    pub fn label(self) -> &'static str {
        match self {
            Interval::Minute => "1m",
            Interval::ThreeMinute => "3m",
            Interval::FiveMinute => "5m",
            Interval::TenMinute => "10m",
            Interval::FifteenMinute => "15m",
            Interval::ThirtyMinute => "30m",
            Interval::SixtyMinute => "60m",
            Interval::Day => "1d",
        }
    }

    pub fn minutes(self) -> u64 {
        match self {
            Interval::Minute => 1,
            Interval::ThreeMinute => 3,
            Interval::FiveMinute => 5,
            Interval::TenMinute => 10,
            Interval::FifteenMinute => 15,
            Interval::ThirtyMinute => 30,
            Interval::SixtyMinute => 60,
            Interval::Day => 24 * 60,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::from_secs(self.minutes() * 60)
    }
}

impl Default for Interval {
    fn default() -> Self {
        Interval::ThirtyMinute
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::ALL
            .into_iter()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| format!("unknown interval '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_thirty_minutes() {
        let i = Interval::default();
        assert_eq!(i.as_str(), "30minute");
        assert_eq!(i.label(), "30m");
        assert_eq!(i.duration(), Duration::from_secs(1800));
    }

    #[test]
    fn parses_wire_names() {
        for i in Interval::ALL {
            assert_eq!(i.as_str().parse::<Interval>().unwrap(), i);
        }
        assert!("2minute".parse::<Interval>().is_err());
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&Interval::FifteenMinute).unwrap();
        assert_eq!(json, "\"15minute\"");
        let back: Interval = serde_json::from_str("\"day\"").unwrap();
        assert_eq!(back, Interval::Day);
    }
}
