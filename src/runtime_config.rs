// =============================================================================
// Runtime Configuration — Hot-reloadable engine settings with atomic save
// =============================================================================
//
// Every tunable threshold of the screener engine lives here: the watchlist,
// the alert thresholds, the severity mapping, and the feed/notifier wiring.
// Workers take an atomic read of the current config on each tick, so changes
// apply on the next tick without any reload coordination.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.  All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
//
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::alerts::AlertKind;
use crate::types::Severity;

/// Default on-disk location of the runtime config.
pub const CONFIG_PATH: &str = "runtime_config.json";

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbols() -> Vec<String> {
    vec![
        "RELIANCE".to_string(),
        "TCS".to_string(),
        "HDFCBANK".to_string(),
        "INFY".to_string(),
        "ICICIBANK".to_string(),
    ]
}

fn default_gap_pct() -> f64 {
    3.0
}

fn default_rsi_overbought() -> f64 {
    70.0
}

fn default_rsi_oversold() -> f64 {
    30.0
}

fn default_cooldown_seconds() -> u64 {
    300
}

fn default_risk_pct() -> f64 {
    0.02
}

fn default_reward_pct() -> f64 {
    0.04
}

fn default_history_points() -> usize {
    60
}

fn severity_warn() -> Severity {
    Severity::Warn
}

fn severity_info() -> Severity {
    Severity::Info
}

fn severity_critical() -> Severity {
    Severity::Critical
}

// =============================================================================
// Thresholds
// =============================================================================

/// Signal and alert thresholds, read at evaluation time on every tick.
///
/// `risk_pct` / `reward_pct` are fractions of the entry price (0.02 = 2 %).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Thresholds {
    /// Absolute session-gap percent that trips the gap alert.
    #[serde(default = "default_gap_pct")]
    pub gap_pct: f64,

    /// RSI level above which a symbol is overbought.
    #[serde(default = "default_rsi_overbought")]
    pub rsi_overbought: f64,

    /// RSI level below which a symbol is oversold.
    #[serde(default = "default_rsi_oversold")]
    pub rsi_oversold: f64,

    /// Minimum seconds between successive fires of the same alert type for
    /// the same symbol.
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,

    /// Stop-loss distance as a fraction of entry.
    #[serde(default = "default_risk_pct")]
    pub risk_pct: f64,

    /// Target distance as a fraction of entry.
    #[serde(default = "default_reward_pct")]
    pub reward_pct: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            gap_pct: default_gap_pct(),
            rsi_overbought: default_rsi_overbought(),
            rsi_oversold: default_rsi_oversold(),
            cooldown_seconds: default_cooldown_seconds(),
            risk_pct: default_risk_pct(),
            reward_pct: default_reward_pct(),
        }
    }
}

// =============================================================================
// SeverityMap
// =============================================================================

/// Which severity each alert type is emitted with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SeverityMap {
    #[serde(default = "severity_warn")]
    pub bollinger_upper: Severity,

    #[serde(default = "severity_warn")]
    pub bollinger_lower: Severity,

    #[serde(default = "severity_info")]
    pub rsi_overbought: Severity,

    #[serde(default = "severity_info")]
    pub rsi_oversold: Severity,

    #[serde(default = "severity_critical")]
    pub gap: Severity,
}

impl Default for SeverityMap {
    fn default() -> Self {
        Self {
            bollinger_upper: severity_warn(),
            bollinger_lower: severity_warn(),
            rsi_overbought: severity_info(),
            rsi_oversold: severity_info(),
            gap: severity_critical(),
        }
    }
}

impl SeverityMap {
    pub fn for_kind(&self, kind: AlertKind) -> Severity {
        match kind {
            AlertKind::BollingerUpperCross => self.bollinger_upper,
            AlertKind::BollingerLowerCross => self.bollinger_lower,
            AlertKind::RsiOverbought => self.rsi_overbought,
            AlertKind::RsiOversold => self.rsi_oversold,
            AlertKind::GapBreach => self.gap,
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the TickWatch engine.
///
/// Every field has a serde default so that older JSON files missing new
/// fields will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Watchlist ----------------------------------------------------------

    /// Symbols the engine is watching. Mutable at runtime through the
    /// watchlist endpoints; per-symbol state is still created lazily on the
    /// first tick.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    // --- Evaluation ---------------------------------------------------------

    #[serde(default)]
    pub thresholds: Thresholds,

    #[serde(default)]
    pub severities: SeverityMap,

    /// Close-history points retained for the per-symbol detail endpoint.
    #[serde(default = "default_history_points")]
    pub history_points: usize,

    // --- External wiring ----------------------------------------------------

    /// Upstream tick feed WebSocket URL. When absent the engine runs the
    /// built-in random-walk demo feed.
    #[serde(default)]
    pub feed_url: Option<String>,

    /// Telegram notifier credentials. When absent, alerts are only logged.
    #[serde(default)]
    pub telegram_bot_token: Option<String>,

    #[serde(default)]
    pub telegram_chat_id: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            thresholds: Thresholds::default(),
            severities: SeverityMap::default(),
            history_points: default_history_points(),
            feed_url: None,
            telegram_bot_token: None,
            telegram_chat_id: None,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    ///
    /// This prevents corruption if the process crashes mid-write.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.symbols.len(), 5);
        assert_eq!(cfg.symbols[0], "RELIANCE");
        assert!((cfg.thresholds.rsi_overbought - 70.0).abs() < f64::EPSILON);
        assert!((cfg.thresholds.rsi_oversold - 30.0).abs() < f64::EPSILON);
        assert_eq!(cfg.thresholds.cooldown_seconds, 300);
        assert!((cfg.thresholds.risk_pct - 0.02).abs() < f64::EPSILON);
        assert!((cfg.thresholds.reward_pct - 0.04).abs() < f64::EPSILON);
        assert_eq!(cfg.history_points, 60);
        assert!(cfg.feed_url.is_none());
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.symbols.len(), 5);
        assert!((cfg.thresholds.gap_pct - 3.0).abs() < f64::EPSILON);
        assert_eq!(cfg.severities.gap, Severity::Critical);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "symbols": ["SBIN"], "thresholds": { "rsi_oversold": 25.0 } }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.symbols, vec!["SBIN"]);
        assert!((cfg.thresholds.rsi_oversold - 25.0).abs() < f64::EPSILON);
        assert!((cfg.thresholds.rsi_overbought - 70.0).abs() < f64::EPSILON);
        assert_eq!(cfg.thresholds.cooldown_seconds, 300);
    }

    #[test]
    fn severity_map_covers_every_kind() {
        let map = SeverityMap::default();
        assert_eq!(map.for_kind(AlertKind::BollingerUpperCross), Severity::Warn);
        assert_eq!(map.for_kind(AlertKind::BollingerLowerCross), Severity::Warn);
        assert_eq!(map.for_kind(AlertKind::RsiOverbought), Severity::Info);
        assert_eq!(map.for_kind(AlertKind::RsiOversold), Severity::Info);
        assert_eq!(map.for_kind(AlertKind::GapBreach), Severity::Critical);
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = RuntimeConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.symbols, cfg2.symbols);
        assert_eq!(cfg.history_points, cfg2.history_points);
        assert!((cfg.thresholds.gap_pct - cfg2.thresholds.gap_pct).abs() < f64::EPSILON);
    }
}
