// =============================================================================
// Signal Generator
// =============================================================================
//
// Deterministic rule table over the latest close and indicator snapshot:
//
//   BUY   when RSI < oversold  AND close <= lower Bollinger band
//   SELL  when RSI > overbought AND close >= upper Bollinger band
//   HOLD  otherwise — and always while RSI or the bands are undefined
//
// Entry/stop/target only exist on BUY and SELL; HOLD carries none (absent,
// not zero). Thresholds come from the runtime config read on each tick.

use serde::Serialize;

use crate::indicators::IndicatorSnapshot;
use crate::runtime_config::Thresholds;

/// Trade direction for a derived signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalDirection {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for SignalDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Hold => write!(f, "HOLD"),
        }
    }
}

/// A derived trading signal. Never persisted apart from the snapshot it was
/// computed with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Signal {
    pub direction: SignalDirection,
    pub entry: Option<f64>,
    pub stop_loss: Option<f64>,
    pub target: Option<f64>,
}

impl Signal {
    fn hold() -> Self {
        Self {
            direction: SignalDirection::Hold,
            entry: None,
            stop_loss: None,
            target: None,
        }
    }
}

/// Evaluate the rule table for one tick.
pub fn evaluate(close: f64, indicators: &IndicatorSnapshot, thresholds: &Thresholds) -> Signal {
    // Undefined indicator history forces HOLD.
    let (rsi, bb_upper, bb_lower) =
        match (indicators.rsi14, indicators.bb_upper, indicators.bb_lower) {
            (Some(r), Some(u), Some(l)) => (r, u, l),
            _ => return Signal::hold(),
        };

    if rsi < thresholds.rsi_oversold && close <= bb_lower {
        let entry = close;
        Signal {
            direction: SignalDirection::Buy,
            entry: Some(entry),
            stop_loss: Some(entry * (1.0 - thresholds.risk_pct)),
            target: Some(entry * (1.0 + thresholds.reward_pct)),
        }
    } else if rsi > thresholds.rsi_overbought && close >= bb_upper {
        let entry = close;
        Signal {
            direction: SignalDirection::Sell,
            entry: Some(entry),
            stop_loss: Some(entry * (1.0 + thresholds.risk_pct)),
            target: Some(entry * (1.0 - thresholds.reward_pct)),
        }
    } else {
        Signal::hold()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(rsi: Option<f64>, bb_upper: Option<f64>, bb_lower: Option<f64>) -> IndicatorSnapshot {
        IndicatorSnapshot {
            rsi14: rsi,
            ma20: Some(100.0),
            ma50: Some(100.0),
            ma200: None,
            bb_upper,
            bb_lower,
            vwap: Some(100.0),
        }
    }

    #[test]
    fn undefined_rsi_forces_hold() {
        let sig = evaluate(
            80.0,
            &snapshot(None, Some(110.0), Some(90.0)),
            &Thresholds::default(),
        );
        assert_eq!(sig.direction, SignalDirection::Hold);
        assert!(sig.entry.is_none());
        assert!(sig.stop_loss.is_none());
        assert!(sig.target.is_none());
    }

    #[test]
    fn undefined_bands_force_hold() {
        let sig = evaluate(80.0, &snapshot(Some(20.0), None, None), &Thresholds::default());
        assert_eq!(sig.direction, SignalDirection::Hold);
    }

    #[test]
    fn oversold_at_lower_band_is_buy_with_levels() {
        // RSI 25 with close exactly on the lower band must be BUY.
        let th = Thresholds::default();
        let close = 90.0;
        let sig = evaluate(close, &snapshot(Some(25.0), Some(110.0), Some(90.0)), &th);
        assert_eq!(sig.direction, SignalDirection::Buy);
        assert_eq!(sig.entry, Some(close));
        assert!((sig.stop_loss.unwrap() - close * (1.0 - th.risk_pct)).abs() < 1e-10);
        assert!((sig.target.unwrap() - close * (1.0 + th.reward_pct)).abs() < 1e-10);
    }

    #[test]
    fn overbought_at_upper_band_is_sell_with_levels() {
        let th = Thresholds::default();
        let close = 112.0;
        let sig = evaluate(close, &snapshot(Some(75.0), Some(110.0), Some(90.0)), &th);
        assert_eq!(sig.direction, SignalDirection::Sell);
        assert_eq!(sig.entry, Some(close));
        assert!((sig.stop_loss.unwrap() - close * (1.0 + th.risk_pct)).abs() < 1e-10);
        assert!((sig.target.unwrap() - close * (1.0 - th.reward_pct)).abs() < 1e-10);
    }

    #[test]
    fn oversold_but_above_band_is_hold() {
        // Both legs of the conjunction are required.
        let sig = evaluate(
            95.0,
            &snapshot(Some(25.0), Some(110.0), Some(90.0)),
            &Thresholds::default(),
        );
        assert_eq!(sig.direction, SignalDirection::Hold);
    }

    #[test]
    fn threshold_boundaries_are_strict() {
        // RSI exactly at the threshold does not qualify.
        let th = Thresholds::default();
        let at_oversold = evaluate(90.0, &snapshot(Some(30.0), Some(110.0), Some(90.0)), &th);
        assert_eq!(at_oversold.direction, SignalDirection::Hold);
        let at_overbought = evaluate(110.0, &snapshot(Some(70.0), Some(110.0), Some(90.0)), &th);
        assert_eq!(at_overbought.direction, SignalDirection::Hold);
    }

    #[test]
    fn custom_thresholds_are_honoured() {
        let th = Thresholds {
            rsi_oversold: 40.0,
            ..Thresholds::default()
        };
        let sig = evaluate(90.0, &snapshot(Some(35.0), Some(110.0), Some(90.0)), &th);
        assert_eq!(sig.direction, SignalDirection::Buy);
    }

    #[test]
    fn direction_serialises_uppercase() {
        assert_eq!(
            serde_json::to_string(&SignalDirection::Buy).unwrap(),
            "\"BUY\""
        );
    }
}
