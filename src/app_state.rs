// =============================================================================
// Central Application State — TickWatch Screener Engine
// =============================================================================
//
// The single source of truth the REST surface reads from. Symbol workers
// own their per-symbol mutable state exclusively; what lands here is the
// read-only published view: the latest snapshot per symbol, bounded close
// history for the detail endpoint, and a ring of recent alerts.
//
// Thread safety:
//   - Atomic counters for lock-free version/throughput tracking.
//   - parking_lot::RwLock for all mutable shared collections.
//   - The hub manages its own interior mutability.
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::alerts::Alert;
use crate::hub::SubscriptionHub;
use crate::indicators::IndicatorSnapshot;
use crate::runtime_config::RuntimeConfig;
use crate::signals::Signal;

/// Maximum number of recent alerts retained for the REST feed.
const MAX_RECENT_ALERTS: usize = 100;

// =============================================================================
// Published per-symbol view
// =============================================================================

/// The latest computed state of one watched symbol. Replaced wholesale on
/// every tick; the dashboard reads it, never writes it.
#[derive(Debug, Clone, Serialize)]
pub struct StockSnapshot {
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    /// Percent move of the session open against the previous session close.
    /// Absent during a symbol's first observed session.
    pub gap_pct: Option<f64>,
    pub session_volume: f64,
    pub indicators: IndicatorSnapshot,
    pub signal: Signal,
}

/// One point of the close history kept for the detail endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct HistoryPoint {
    pub ts: DateTime<Utc>,
    pub price: f64,
}

// =============================================================================
// AppState
// =============================================================================

/// Shared application state, wrapped in `Arc` and handed to every task.
pub struct AppState {
    /// Monotonically increasing version counter, bumped on every published
    /// mutation so pollers can detect changes cheaply.
    pub state_version: AtomicU64,

    pub runtime_config: Arc<RwLock<RuntimeConfig>>,
    pub hub: Arc<SubscriptionHub>,

    /// Latest snapshot per symbol.
    pub snapshots: RwLock<HashMap<String, StockSnapshot>>,

    /// Bounded close history per symbol (capacity from config).
    pub histories: RwLock<HashMap<String, VecDeque<HistoryPoint>>>,

    /// Ring of recently emitted alerts, newest last.
    pub recent_alerts: RwLock<VecDeque<Alert>>,

    // ── Throughput counters ─────────────────────────────────────────────
    pub ticks_processed: AtomicU64,
    pub ticks_rejected: AtomicU64,

    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            state_version: AtomicU64::new(1),
            runtime_config: Arc::new(RwLock::new(config)),
            hub: Arc::new(SubscriptionHub::new()),
            snapshots: RwLock::new(HashMap::new()),
            histories: RwLock::new(HashMap::new()),
            recent_alerts: RwLock::new(VecDeque::new()),
            ticks_processed: AtomicU64::new(0),
            ticks_rejected: AtomicU64::new(0),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Published state ─────────────────────────────────────────────────

    /// Replace a symbol's snapshot and append to its history ring.
    pub fn record_snapshot(&self, snapshot: StockSnapshot) {
        let cap = self.runtime_config.read().history_points.max(1);

        {
            let mut histories = self.histories.write();
            let ring = histories
                .entry(snapshot.symbol.clone())
                .or_insert_with(|| VecDeque::with_capacity(cap + 1));
            ring.push_back(HistoryPoint {
                ts: snapshot.timestamp,
                price: snapshot.price,
            });
            while ring.len() > cap {
                ring.pop_front();
            }
        }

        self.snapshots
            .write()
            .insert(snapshot.symbol.clone(), snapshot);
        self.increment_version();
    }

    /// Record an emitted alert in the bounded ring.
    pub fn record_alert(&self, alert: Alert) {
        let mut alerts = self.recent_alerts.write();
        alerts.push_back(alert);
        while alerts.len() > MAX_RECENT_ALERTS {
            alerts.pop_front();
        }
        drop(alerts);
        self.increment_version();
    }

    /// Most recent alerts, newest first.
    pub fn recent_alerts(&self, limit: usize) -> Vec<Alert> {
        self.recent_alerts
            .read()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Close history for one symbol, oldest first.
    pub fn history(&self, symbol: &str) -> Vec<HistoryPoint> {
        self.histories
            .read()
            .get(symbol)
            .map(|ring| ring.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
