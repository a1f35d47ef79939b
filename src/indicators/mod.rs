// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free derivation of indicator values from a symbol's
// rolling window. Every value is `Option<f64>` so callers are forced to
// treat "not yet available" distinctly from zero — an undefined RSI forces
// HOLD downstream and blocks the alert types that depend on it.

pub mod bollinger;
pub mod vwap;

use serde::Serialize;

use crate::market_data::RollingWindow;

pub use bollinger::{BollingerBands, BB_STD_DEVS};
pub use vwap::SessionVwap;

/// Indicator values derived from one symbol's window at a point in time.
/// Immutable once produced; replaced wholesale on each tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub rsi14: Option<f64>,
    pub ma20: Option<f64>,
    pub ma50: Option<f64>,
    pub ma200: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_lower: Option<f64>,
    pub vwap: Option<f64>,
}

/// Compute a fresh snapshot from the window's incremental aggregates and
/// the session VWAP accumulator. Read-only over both.
pub fn compute_snapshot(window: &RollingWindow, session: &SessionVwap) -> IndicatorSnapshot {
    let bands = bollinger::from_window(window);

    IndicatorSnapshot {
        rsi14: window.rsi(),
        ma20: window.sma(20),
        ma50: window.sma(50),
        ma200: window.sma(200),
        bb_upper: bands.map(|b| b.upper),
        bb_lower: bands.map(|b| b.lower),
        vwap: session.value(),
    }
}
