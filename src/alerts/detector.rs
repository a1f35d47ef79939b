// =============================================================================
// Alert Detector — edge-triggered state machines with cooldown
// =============================================================================
//
// One two-state machine per (symbol, alert type): Idle or Fired(at, value).
// A machine fires only on the tick where its condition transitions
// false -> true (edge-triggered), and re-arms only after the configured
// cooldown has elapsed since the previous fire. A crossing inside the
// cooldown window is suppressed entirely: no alert, and the cooldown clock
// keeps running from the original fire.
//
// An undefined indicator makes its conditions evaluate false, so the
// dependent alert types cannot fire and the machine returns to Idle.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::indicators::IndicatorSnapshot;
use crate::runtime_config::Thresholds;

use super::AlertKind;

// ---------------------------------------------------------------------------
// AlertMachine
// ---------------------------------------------------------------------------

/// Edge + cooldown tracker for a single (symbol, kind) pair.
///
/// `condition_held` is the previous tick's condition level — the machine is
/// conceptually Fired while it is true and Idle once the condition lets go.
/// `last_fired_at` survives the return to Idle so the cooldown spans
/// repeated crossings.
#[derive(Debug, Clone, Default)]
pub struct AlertMachine {
    condition_held: bool,
    last_fired_at: Option<DateTime<Utc>>,
    last_value: f64,
}

impl AlertMachine {
    /// Feed one tick's condition evaluation. Returns `true` when an alert
    /// should be emitted.
    pub fn evaluate(
        &mut self,
        condition: bool,
        value: f64,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> bool {
        let edge = condition && !self.condition_held;
        self.condition_held = condition;

        if !edge {
            return false;
        }

        if let Some(fired_at) = self.last_fired_at {
            if now.signed_duration_since(fired_at) < cooldown {
                // Suppressed: no emission, no state change beyond the level
                // tracking above.
                return false;
            }
        }

        self.last_fired_at = Some(now);
        self.last_value = value;
        true
    }

    pub fn last_fired_at(&self) -> Option<DateTime<Utc>> {
        self.last_fired_at
    }

    pub fn last_value(&self) -> f64 {
        self.last_value
    }
}

// ---------------------------------------------------------------------------
// AlertBank
// ---------------------------------------------------------------------------

/// All machines for one symbol, keyed by alert type. Created lazily on the
/// first qualifying evaluation and never destroyed (bounded by the kind
/// set).
#[derive(Debug, Clone, Default)]
pub struct AlertBank {
    machines: HashMap<AlertKind, AlertMachine>,
}

impl AlertBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate every alert type against this tick. Returns the kinds that
    /// newly fired, with their condition values.
    pub fn evaluate(
        &mut self,
        close: f64,
        indicators: &IndicatorSnapshot,
        gap_pct: Option<f64>,
        thresholds: &Thresholds,
        now: DateTime<Utc>,
    ) -> Vec<(AlertKind, f64)> {
        let cooldown = Duration::seconds(thresholds.cooldown_seconds as i64);
        let mut fired = Vec::new();

        for kind in AlertKind::ALL {
            // (condition, value-at-fire); undefined inputs read as false.
            let (condition, value) = match kind {
                AlertKind::BollingerUpperCross => match indicators.bb_upper {
                    Some(upper) => (close > upper, close),
                    None => (false, close),
                },
                AlertKind::BollingerLowerCross => match indicators.bb_lower {
                    Some(lower) => (close < lower, close),
                    None => (false, close),
                },
                AlertKind::RsiOverbought => match indicators.rsi14 {
                    Some(rsi) => (rsi > thresholds.rsi_overbought, rsi),
                    None => (false, 0.0),
                },
                AlertKind::RsiOversold => match indicators.rsi14 {
                    Some(rsi) => (rsi < thresholds.rsi_oversold, rsi),
                    None => (false, 0.0),
                },
                AlertKind::GapBreach => match gap_pct {
                    Some(gap) => (gap.abs() >= thresholds.gap_pct, gap),
                    None => (false, 0.0),
                },
            };

            let machine = self.machines.entry(kind).or_default();
            if machine.evaluate(condition, value, now, cooldown) {
                fired.push((kind, value));
            }
        }

        fired
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn snapshot(rsi: Option<f64>, bb_upper: Option<f64>, bb_lower: Option<f64>) -> IndicatorSnapshot {
        IndicatorSnapshot {
            rsi14: rsi,
            ma20: Some(100.0),
            ma50: None,
            ma200: None,
            bb_upper,
            bb_lower,
            vwap: None,
        }
    }

    fn kinds(fired: &[(AlertKind, f64)]) -> Vec<AlertKind> {
        fired.iter().map(|(k, _)| *k).collect()
    }

    // ---- AlertMachine ----------------------------------------------------

    #[test]
    fn machine_fires_on_rising_edge_only() {
        let mut m = AlertMachine::default();
        let cd = Duration::seconds(300);
        assert!(m.evaluate(true, 1.0, at(0), cd));
        // Condition holds for four more ticks: no re-fire.
        for i in 1..5 {
            assert!(!m.evaluate(true, 1.0, at(i), cd));
        }
    }

    #[test]
    fn machine_suppresses_refire_inside_cooldown() {
        let mut m = AlertMachine::default();
        let cd = Duration::seconds(300);
        assert!(m.evaluate(true, 1.0, at(0), cd));
        assert!(!m.evaluate(false, 0.0, at(10), cd)); // condition releases
        assert!(!m.evaluate(true, 1.0, at(20), cd)); // second edge, cooled down? no
        assert_eq!(m.last_fired_at(), Some(at(0)), "suppression must not move the clock");
    }

    #[test]
    fn machine_rearms_after_cooldown() {
        let mut m = AlertMachine::default();
        let cd = Duration::seconds(300);
        assert!(m.evaluate(true, 1.0, at(0), cd));
        assert!(!m.evaluate(false, 0.0, at(100), cd));
        assert!(m.evaluate(true, 2.0, at(301), cd));
        assert_eq!(m.last_fired_at(), Some(at(301)));
        assert_eq!(m.last_value(), 2.0);
    }

    #[test]
    fn machine_held_condition_through_cooldown_does_not_refire() {
        // The condition never releases, so there is never a fresh edge even
        // after the cooldown expires.
        let mut m = AlertMachine::default();
        let cd = Duration::seconds(60);
        assert!(m.evaluate(true, 1.0, at(0), cd));
        for i in 1..10 {
            assert!(!m.evaluate(true, 1.0, at(i * 30), cd));
        }
    }

    // ---- AlertBank -------------------------------------------------------

    #[test]
    fn band_hover_emits_exactly_one_alert() {
        let th = Thresholds::default();
        let mut bank = AlertBank::new();
        let snap = snapshot(Some(50.0), Some(110.0), Some(90.0));

        let mut total = 0;
        for i in 0..5 {
            let fired = bank.evaluate(112.0, &snap, None, &th, at(i));
            total += fired.len();
            if i == 0 {
                assert_eq!(kinds(&fired), vec![AlertKind::BollingerUpperCross]);
            }
        }
        assert_eq!(total, 1, "hovering above the band must not re-fire");
    }

    #[test]
    fn upper_and_lower_crosses_are_independent() {
        let th = Thresholds::default();
        let mut bank = AlertBank::new();
        let snap = snapshot(Some(50.0), Some(110.0), Some(90.0));

        let fired = bank.evaluate(112.0, &snap, None, &th, at(0));
        assert_eq!(kinds(&fired), vec![AlertKind::BollingerUpperCross]);

        // Price collapses through the lower band after the upper-cross; a
        // different kind, so the upper cooldown does not apply.
        let fired = bank.evaluate(88.0, &snap, None, &th, at(10));
        assert_eq!(kinds(&fired), vec![AlertKind::BollingerLowerCross]);
    }

    #[test]
    fn rsi_extreme_fires_alongside_band_cross() {
        let th = Thresholds::default();
        let mut bank = AlertBank::new();
        let snap = snapshot(Some(75.0), Some(110.0), Some(90.0));

        let fired = bank.evaluate(112.0, &snap, None, &th, at(0));
        let fired = kinds(&fired);
        assert!(fired.contains(&AlertKind::BollingerUpperCross));
        assert!(fired.contains(&AlertKind::RsiOverbought));
    }

    #[test]
    fn undefined_rsi_blocks_rsi_alerts() {
        let th = Thresholds::default();
        let mut bank = AlertBank::new();
        let snap = snapshot(None, Some(110.0), Some(90.0));
        let fired = bank.evaluate(112.0, &snap, None, &th, at(0));
        assert_eq!(kinds(&fired), vec![AlertKind::BollingerUpperCross]);
    }

    #[test]
    fn gap_breach_uses_absolute_threshold() {
        let th = Thresholds::default(); // gap_pct = 3.0
        let mut bank = AlertBank::new();
        let snap = snapshot(Some(50.0), Some(110.0), Some(90.0));

        let fired = bank.evaluate(100.0, &snap, Some(-3.5), &th, at(0));
        assert_eq!(fired, vec![(AlertKind::GapBreach, -3.5)]);

        // Small gap next session: condition releases, no fire.
        let fired = bank.evaluate(100.0, &snap, Some(0.4), &th, at(400));
        assert!(fired.is_empty());
    }

    #[test]
    fn cooldown_spans_band_recrossings() {
        let th = Thresholds {
            cooldown_seconds: 300,
            ..Thresholds::default()
        };
        let mut bank = AlertBank::new();
        let snap = snapshot(Some(50.0), Some(110.0), Some(90.0));

        assert_eq!(bank.evaluate(112.0, &snap, None, &th, at(0)).len(), 1);
        assert!(bank.evaluate(105.0, &snap, None, &th, at(60)).is_empty());
        // Second crossing at t=120, inside cooldown: suppressed.
        assert!(bank.evaluate(113.0, &snap, None, &th, at(120)).is_empty());
        assert!(bank.evaluate(105.0, &snap, None, &th, at(180)).is_empty());
        // Third crossing after expiry: fires again.
        assert_eq!(bank.evaluate(114.0, &snap, None, &th, at(301)).len(), 1);
    }
}
