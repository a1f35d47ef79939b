// =============================================================================
// Shared types used across the TickWatch screener engine
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single trade event from the upstream market-data feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub price: f64,
    #[serde(default)]
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

/// One sampling-interval bar. For intraday streaming every tick closes its
/// own bar, so open/high/low collapse onto the trade price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl From<&Tick> for PriceBar {
    fn from(tick: &Tick) -> Self {
        Self {
            timestamp: tick.timestamp,
            open: tick.price,
            high: tick.price,
            low: tick.price,
            close: tick.price,
            volume: tick.volume,
        }
    }
}

/// How loud an alert should be when it reaches the notification sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Critical,
}

impl Default for Severity {
    fn default() -> Self {
        Self::Info
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_to_bar_collapses_ohlc() {
        let tick = Tick {
            symbol: "RELIANCE".into(),
            price: 2500.5,
            volume: 1200.0,
            timestamp: Utc::now(),
        };
        let bar = PriceBar::from(&tick);
        assert_eq!(bar.open, 2500.5);
        assert_eq!(bar.high, 2500.5);
        assert_eq!(bar.low, 2500.5);
        assert_eq!(bar.close, 2500.5);
        assert_eq!(bar.volume, 1200.0);
    }

    #[test]
    fn severity_serialises_lowercase() {
        assert_eq!(serde_json::to_string(&Severity::Warn).unwrap(), "\"warn\"");
        let s: Severity = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(s, Severity::Critical);
    }

    #[test]
    fn tick_deserialises_without_volume() {
        let json = r#"{"symbol":"TCS","price":3900.0,"timestamp":"2024-06-03T09:15:00Z"}"#;
        let tick: Tick = serde_json::from_str(json).unwrap();
        assert_eq!(tick.volume, 0.0);
    }
}
