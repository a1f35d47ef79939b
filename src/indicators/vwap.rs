// =============================================================================
// Session VWAP
// =============================================================================
//
// Volume-Weighted Average Price over the current trading session:
// cumulative(price × volume) / cumulative(volume). The accumulator is reset
// by the ingestion path when the session clock rolls over; calculation
// itself is read-only.

/// Cumulative VWAP accumulator for one symbol's current session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionVwap {
    price_volume: f64,
    volume: f64,
}

impl SessionVwap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one trade into the session accumulators. Zero-volume ticks leave
    /// the VWAP unchanged.
    pub fn apply(&mut self, price: f64, volume: f64) {
        if volume <= 0.0 {
            return;
        }
        self.price_volume += price * volume;
        self.volume += volume;
    }

    /// Start a fresh session.
    pub fn reset(&mut self) {
        self.price_volume = 0.0;
        self.volume = 0.0;
    }

    /// Current session VWAP, or `None` before any volume has traded.
    pub fn value(&self) -> Option<f64> {
        if self.volume <= 0.0 {
            return None;
        }
        let vwap = self.price_volume / self.volume;
        vwap.is_finite().then_some(vwap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_session_has_no_vwap() {
        assert!(SessionVwap::new().value().is_none());
    }

    #[test]
    fn vwap_weights_by_volume() {
        let mut v = SessionVwap::new();
        v.apply(100.0, 300.0);
        v.apply(110.0, 100.0);
        // (100·300 + 110·100) / 400 = 102.5
        assert!((v.value().unwrap() - 102.5).abs() < 1e-10);
    }

    #[test]
    fn zero_volume_ticks_are_ignored() {
        let mut v = SessionVwap::new();
        v.apply(100.0, 50.0);
        v.apply(999.0, 0.0);
        assert!((v.value().unwrap() - 100.0).abs() < 1e-10);
    }

    #[test]
    fn reset_starts_a_new_session() {
        let mut v = SessionVwap::new();
        v.apply(100.0, 50.0);
        v.reset();
        assert!(v.value().is_none());
        v.apply(200.0, 10.0);
        assert!((v.value().unwrap() - 200.0).abs() < 1e-10);
    }
}
