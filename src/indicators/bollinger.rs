// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Middle band = SMA(20), upper/lower = SMA ± k·σ with k = 2. The deviation is
// the **sample** standard deviation (N-1 divisor) — the window store
// maintains the matching running sum-of-squares, and the tests pin this
// convention down.

use crate::market_data::{RollingWindow, BB_PERIOD};

/// Band multiplier. Two standard deviations is the charting default.
pub const BB_STD_DEVS: f64 = 2.0;

/// Result of a Bollinger Band calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Compute the bands from a window's incremental aggregates.
///
/// Returns `None` until `BB_PERIOD` closes exist. Read-only: the window is
/// never mutated during calculation.
pub fn from_window(window: &RollingWindow) -> Option<BollingerBands> {
    let middle = window.sma(BB_PERIOD)?;
    let std_dev = window.stddev_bb()?;

    let upper = middle + BB_STD_DEVS * std_dev;
    let lower = middle - BB_STD_DEVS * std_dev;

    (upper.is_finite() && lower.is_finite()).then_some(BollingerBands {
        upper,
        middle,
        lower,
    })
}
