// =============================================================================
// RollingWindow -- bounded per-symbol close history with O(1) aggregates
// =============================================================================
//
// Stores the most recent closes for one symbol (at most `WINDOW_CAPACITY`,
// the largest indicator period) and keeps every aggregate the indicator
// layer needs maintained incrementally:
//
//   - a running sum per tracked SMA period (20 / 50 / 200)
//   - a running sum-of-squares for the Bollinger stddev window (20)
//   - Wilder's smoothed average gain / average loss for RSI(14)
//
// Ingest is O(1) amortized per tick. Aggregates are never recomputed from
// the raw window on the hot path; the unit tests cross-check them against a
// direct recomputation.

use std::collections::VecDeque;

use crate::types::PriceBar;

/// Largest indicator look-back; also the window capacity.
pub const WINDOW_CAPACITY: usize = 200;

/// SMA periods maintained incrementally.
pub const SMA_PERIODS: [usize; 3] = [20, 50, 200];

/// Bollinger Band look-back (shares the 20-period running sum).
pub const BB_PERIOD: usize = 20;

/// RSI look-back.
pub const RSI_PERIOD: usize = 14;

// ---------------------------------------------------------------------------
// Wilder RSI state
// ---------------------------------------------------------------------------

/// Incremental Wilder smoothing state.
///
/// The seed averages come from the first `RSI_PERIOD - 1` price deltas, so
/// RSI becomes available on the `RSI_PERIOD`-th tick of a fresh symbol.
/// After seeding, each delta is folded in with smoothing factor
/// `1 / RSI_PERIOD`. The smoothing is exponential, so window eviction does
/// not touch it.
#[derive(Debug, Clone, Default)]
struct WilderState {
    prev_close: Option<f64>,
    deltas_seen: usize,
    seed_gain_sum: f64,
    seed_loss_sum: f64,
    avg_gain: f64,
    avg_loss: f64,
}

impl WilderState {
    /// Number of deltas consumed by the seed averages.
    const SEED_DELTAS: usize = RSI_PERIOD - 1;

    fn observe(&mut self, close: f64) {
        let prev = match self.prev_close.replace(close) {
            Some(p) => p,
            None => return, // first close carries no delta
        };

        let delta = close - prev;
        let gain = if delta > 0.0 { delta } else { 0.0 };
        let loss = if delta < 0.0 { -delta } else { 0.0 };
        self.deltas_seen += 1;

        if self.deltas_seen <= Self::SEED_DELTAS {
            self.seed_gain_sum += gain;
            self.seed_loss_sum += loss;
            if self.deltas_seen == Self::SEED_DELTAS {
                self.avg_gain = self.seed_gain_sum / Self::SEED_DELTAS as f64;
                self.avg_loss = self.seed_loss_sum / Self::SEED_DELTAS as f64;
            }
            return;
        }

        let period = RSI_PERIOD as f64;
        self.avg_gain = (self.avg_gain * (period - 1.0) + gain) / period;
        self.avg_loss = (self.avg_loss * (period - 1.0) + loss) / period;
    }

    /// Current RSI in [0, 100], or `None` until the seed window is full.
    fn rsi(&self) -> Option<f64> {
        if self.deltas_seen < Self::SEED_DELTAS {
            return None;
        }

        let value = if self.avg_loss == 0.0 && self.avg_gain == 0.0 {
            50.0 // no movement at all
        } else if self.avg_loss == 0.0 {
            100.0 // only gains
        } else {
            let rs = self.avg_gain / self.avg_loss;
            100.0 - 100.0 / (1.0 + rs)
        };

        value.is_finite().then_some(value)
    }
}

// ---------------------------------------------------------------------------
// RollingWindow
// ---------------------------------------------------------------------------

/// Bounded close history for one symbol plus its incremental aggregates.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    closes: VecDeque<f64>,
    /// Running sum over the trailing window of each entry in `SMA_PERIODS`.
    sums: [f64; SMA_PERIODS.len()],
    /// Running sum of squares over the trailing `BB_PERIOD` closes.
    sum_sq: f64,
    wilder: WilderState,
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl RollingWindow {
    pub fn new() -> Self {
        Self {
            closes: VecDeque::with_capacity(WINDOW_CAPACITY + 1),
            sums: [0.0; SMA_PERIODS.len()],
            sum_sq: 0.0,
            wilder: WilderState::default(),
        }
    }

    /// Ingest one bar: append its close, evict FIFO past capacity and adjust
    /// every aggregate by exactly the entering and leaving contributions.
    pub fn ingest(&mut self, bar: &PriceBar) {
        let close = bar.close;
        let len = self.closes.len();

        // Subtract the value leaving each trailing sub-window. Index is into
        // the pre-push buffer: the oldest element still inside a period-p
        // window sits at len - p.
        for (i, &period) in SMA_PERIODS.iter().enumerate() {
            self.sums[i] += close;
            if len >= period {
                self.sums[i] -= self.closes[len - period];
            }
        }
        self.sum_sq += close * close;
        if len >= BB_PERIOD {
            let leaving = self.closes[len - BB_PERIOD];
            self.sum_sq -= leaving * leaving;
        }

        self.wilder.observe(close);

        self.closes.push_back(close);
        if self.closes.len() > WINDOW_CAPACITY {
            self.closes.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.closes.back().copied()
    }

    /// SMA over one of the tracked periods. `None` until the full period is
    /// satisfied (partial windows would report misleading early values) or
    /// when `period` is not one of `SMA_PERIODS`.
    pub fn sma(&self, period: usize) -> Option<f64> {
        let idx = SMA_PERIODS.iter().position(|&p| p == period)?;
        if self.closes.len() < period {
            return None;
        }
        Some(self.sums[idx] / period as f64)
    }

    /// Sample standard deviation (N-1 divisor) over the trailing
    /// `BB_PERIOD` closes. `None` until the window is full.
    pub fn stddev_bb(&self) -> Option<f64> {
        if self.closes.len() < BB_PERIOD {
            return None;
        }
        let n = BB_PERIOD as f64;
        let sum = self.sums[0]; // SMA_PERIODS[0] == BB_PERIOD
        // Guard against tiny negative variance from float cancellation.
        let var = ((self.sum_sq - sum * sum / n) / (n - 1.0)).max(0.0);
        Some(var.sqrt())
    }

    /// Current Wilder RSI, or `None` before the 14th tick.
    pub fn rsi(&self) -> Option<f64> {
        self.wilder.rsi()
    }

    /// The most recent `count` closes, oldest first.
    pub fn recent_closes(&self, count: usize) -> Vec<f64> {
        let start = self.closes.len().saturating_sub(count);
        self.closes.iter().skip(start).copied().collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn bar(close: f64) -> PriceBar {
        PriceBar {
            timestamp: Utc::now(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    fn feed(window: &mut RollingWindow, closes: &[f64]) {
        for &c in closes {
            window.ingest(&bar(c));
        }
    }

    /// Deterministic but irregular price path for cross-checking aggregates.
    fn wobble(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + ((i * 37 + 11) % 23) as f64 - 11.0 + (i % 7) as f64 * 0.5)
            .collect()
    }

    fn direct_sma(closes: &[f64], period: usize) -> Option<f64> {
        if closes.len() < period {
            return None;
        }
        let window = &closes[closes.len() - period..];
        Some(window.iter().sum::<f64>() / period as f64)
    }

    fn direct_stddev(closes: &[f64], period: usize) -> Option<f64> {
        let mean = direct_sma(closes, period)?;
        let window = &closes[closes.len() - period..];
        let var =
            window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (period as f64 - 1.0);
        Some(var.sqrt())
    }

    #[test]
    fn capacity_is_bounded() {
        let mut w = RollingWindow::new();
        feed(&mut w, &wobble(350));
        assert_eq!(w.len(), WINDOW_CAPACITY);
    }

    #[test]
    fn incremental_sma_matches_direct_recompute() {
        let mut w = RollingWindow::new();
        let path = wobble(320);
        for (i, &c) in path.iter().enumerate() {
            w.ingest(&bar(c));
            let seen = &path[..=i];
            for period in SMA_PERIODS {
                match (w.sma(period), direct_sma(seen, period)) {
                    (Some(inc), Some(direct)) => {
                        assert!(
                            (inc - direct).abs() < 1e-6,
                            "SMA{period} diverged at tick {i}: {inc} vs {direct}"
                        );
                    }
                    (None, None) => {}
                    (a, b) => panic!("SMA{period} availability mismatch at tick {i}: {a:?} vs {b:?}"),
                }
            }
        }
    }

    #[test]
    fn incremental_stddev_matches_direct_recompute() {
        let mut w = RollingWindow::new();
        let path = wobble(260);
        for (i, &c) in path.iter().enumerate() {
            w.ingest(&bar(c));
            let seen = &path[..=i];
            match (w.stddev_bb(), direct_stddev(seen, BB_PERIOD)) {
                (Some(inc), Some(direct)) => {
                    assert!(
                        (inc - direct).abs() < 1e-6,
                        "stddev diverged at tick {i}: {inc} vs {direct}"
                    );
                }
                (None, None) => {}
                (a, b) => panic!("stddev availability mismatch at tick {i}: {a:?} vs {b:?}"),
            }
        }
    }

    #[test]
    fn sma_undefined_until_full_period() {
        let mut w = RollingWindow::new();
        feed(&mut w, &wobble(199));
        assert!(w.sma(20).is_some());
        assert!(w.sma(50).is_some());
        assert!(w.sma(200).is_none());
        w.ingest(&bar(100.0));
        assert!(w.sma(200).is_some());
    }

    #[test]
    fn untracked_period_reports_none() {
        let mut w = RollingWindow::new();
        feed(&mut w, &wobble(60));
        assert!(w.sma(33).is_none());
    }

    #[test]
    fn rsi_undefined_for_first_13_ticks_then_defined() {
        let mut w = RollingWindow::new();
        for i in 0..13 {
            w.ingest(&bar(100.0 + i as f64));
            assert!(w.rsi().is_none(), "RSI defined too early at tick {}", i + 1);
        }
        w.ingest(&bar(113.0)); // 14th tick
        assert!(w.rsi().is_some());
    }

    #[test]
    fn rsi_monotonic_up_approaches_100() {
        let mut w = RollingWindow::new();
        feed(&mut w, &(1..=40).map(|x| x as f64).collect::<Vec<_>>());
        let rsi = w.rsi().unwrap();
        assert!((rsi - 100.0).abs() < 1e-9, "expected 100, got {rsi}");
    }

    #[test]
    fn rsi_monotonic_down_approaches_0() {
        let mut w = RollingWindow::new();
        feed(&mut w, &(1..=40).rev().map(|x| x as f64).collect::<Vec<_>>());
        let rsi = w.rsi().unwrap();
        assert!(rsi.abs() < 1e-9, "expected 0, got {rsi}");
    }

    #[test]
    fn rsi_flat_market_is_neutral() {
        let mut w = RollingWindow::new();
        feed(&mut w, &vec![100.0; 30]);
        let rsi = w.rsi().unwrap();
        assert!((rsi - 50.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_stays_in_range_after_eviction() {
        let mut w = RollingWindow::new();
        feed(&mut w, &wobble(300));
        let rsi = w.rsi().unwrap();
        assert!((0.0..=100.0).contains(&rsi));
    }

    #[test]
    fn recent_closes_returns_tail_oldest_first() {
        let mut w = RollingWindow::new();
        feed(&mut w, &[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(w.recent_closes(3), vec![3.0, 4.0, 5.0]);
        assert_eq!(w.recent_closes(99).len(), 5);
    }
}
