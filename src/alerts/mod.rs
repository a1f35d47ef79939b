// =============================================================================
// Alerts Module
// =============================================================================
//
// Alert types, the emitted Alert record, and the per-(symbol, kind) edge
// detection state machines (see `detector.rs`). Alerts are emitted, not
// stored as mutable state; the app keeps a bounded ring of recent ones for
// the REST feed.

pub mod detector;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::types::Severity;

pub use detector::{AlertBank, AlertMachine};

/// The conditions the detector watches, evaluated independently per symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    BollingerUpperCross,
    BollingerLowerCross,
    RsiOverbought,
    RsiOversold,
    GapBreach,
}

impl AlertKind {
    pub const ALL: [AlertKind; 5] = [
        AlertKind::BollingerUpperCross,
        AlertKind::BollingerLowerCross,
        AlertKind::RsiOverbought,
        AlertKind::RsiOversold,
        AlertKind::GapBreach,
    ];
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BollingerUpperCross => write!(f, "bollinger_upper_cross"),
            Self::BollingerLowerCross => write!(f, "bollinger_lower_cross"),
            Self::RsiOverbought => write!(f, "rsi_overbought"),
            Self::RsiOversold => write!(f, "rsi_oversold"),
            Self::GapBreach => write!(f, "gap_breach"),
        }
    }
}

/// One emitted alert event.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: Uuid,
    pub symbol: String,
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    /// The condition value at fire time (price for band crosses, RSI for
    /// RSI entries, gap percent for gap breaches).
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        symbol: &str,
        kind: AlertKind,
        severity: Severity,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            kind,
            severity,
            message: render_message(symbol, kind, value),
            value,
            timestamp,
        }
    }
}

/// Message template per alert type.
fn render_message(symbol: &str, kind: AlertKind, value: f64) -> String {
    match kind {
        AlertKind::BollingerUpperCross => {
            format!("{symbol} broke above its upper Bollinger band at {value:.2}")
        }
        AlertKind::BollingerLowerCross => {
            format!("{symbol} fell below its lower Bollinger band at {value:.2}")
        }
        AlertKind::RsiOverbought => {
            format!("{symbol} entered overbought territory (RSI {value:.1})")
        }
        AlertKind::RsiOversold => {
            format!("{symbol} entered oversold territory (RSI {value:.1})")
        }
        AlertKind::GapBreach => {
            format!("{symbol} opened with a {value:+.2}% gap")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_kind_serialises_snake_case() {
        assert_eq!(
            serde_json::to_string(&AlertKind::BollingerUpperCross).unwrap(),
            "\"bollinger_upper_cross\""
        );
        assert_eq!(AlertKind::GapBreach.to_string(), "gap_breach");
    }

    #[test]
    fn message_templates_name_the_symbol() {
        for kind in AlertKind::ALL {
            let alert = Alert::new("TCS", kind, Severity::Info, 42.0, Utc::now());
            assert!(alert.message.contains("TCS"), "{kind}: {}", alert.message);
        }
    }

    #[test]
    fn gap_message_keeps_the_sign() {
        let down = Alert::new("INFY", AlertKind::GapBreach, Severity::Critical, -4.2, Utc::now());
        assert!(down.message.contains("-4.20%"), "{}", down.message);
        let up = Alert::new("INFY", AlertKind::GapBreach, Severity::Critical, 3.5, Utc::now());
        assert!(up.message.contains("+3.50%"), "{}", up.message);
    }
}
