// =============================================================================
// Tick Ingestion Engine — one serialized worker per symbol
// =============================================================================
//
// Per-symbol mutable state (rolling window, session accumulators, alert
// machines) is owned by exactly one worker task, created lazily on the
// symbol's first tick. The router hands each tick to its symbol's worker
// over an unbounded channel, so ticks for one symbol are processed strictly
// in arrival order while different symbols proceed fully in parallel.
//
// Per-tick pipeline: validate -> session roll -> window ingest -> indicator
// snapshot -> signal -> alert machines -> publish to the hub and the alert
// sink. Publishing enqueues and returns; nothing on this path waits for
// subscriber or notifier I/O.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::alerts::{Alert, AlertBank};
use crate::app_state::{AppState, StockSnapshot};
use crate::hub::{DetailUpdate, ScreenerUpdate};
use crate::indicators::{self, SessionVwap};
use crate::market_data::RollingWindow;
use crate::runtime_config::RuntimeConfig;
use crate::signals;
use crate::types::{PriceBar, Tick};

// ---------------------------------------------------------------------------
// Per-symbol state
// ---------------------------------------------------------------------------

/// Everything one symbol's worker mutates. Nothing here is shared.
struct SymbolState {
    symbol: String,
    window: RollingWindow,
    vwap: SessionVwap,
    bank: AlertBank,
    last_ts: Option<DateTime<Utc>>,
    session_date: Option<NaiveDate>,
    session_volume: f64,
    /// Close of the previous session, once one has completed.
    prev_session_close: Option<f64>,
    /// Gap percent for the current session, fixed at the session's first tick.
    gap_pct: Option<f64>,
    /// Previous published snapshot, serialized, for the screener field diff.
    prev_published: Option<serde_json::Value>,
}

/// The outputs of one accepted tick.
struct TickOutcome {
    snapshot: StockSnapshot,
    detail: DetailUpdate,
    screener: ScreenerUpdate,
    alerts: Vec<Alert>,
}

impl SymbolState {
    fn new(symbol: String) -> Self {
        Self {
            symbol,
            window: RollingWindow::new(),
            vwap: SessionVwap::new(),
            bank: AlertBank::new(),
            last_ts: None,
            session_date: None,
            session_volume: 0.0,
            prev_session_close: None,
            gap_pct: None,
            prev_published: None,
        }
    }

    /// Run the full pipeline for one tick. Returns `None` when the tick is
    /// retrograde (older than the last processed one) and no state changed.
    fn process(&mut self, tick: &Tick, config: &RuntimeConfig) -> Option<TickOutcome> {
        if let Some(last) = self.last_ts {
            if tick.timestamp < last {
                debug!(
                    symbol = %self.symbol,
                    tick_ts = %tick.timestamp,
                    last_ts = %last,
                    "retrograde tick discarded"
                );
                return None;
            }
        }

        // ── Session boundary ────────────────────────────────────────────
        let date = tick.timestamp.date_naive();
        if self.session_date != Some(date) {
            self.prev_session_close = self.window.last_close();
            self.gap_pct = self.prev_session_close.and_then(|prev| {
                (prev > 0.0).then(|| (tick.price - prev) / prev * 100.0)
            });
            self.vwap.reset();
            self.session_volume = 0.0;
            self.session_date = Some(date);
            if let Some(gap) = self.gap_pct {
                debug!(symbol = %self.symbol, gap_pct = gap, "session rolled");
            }
        }

        // ── Window + session accumulators ───────────────────────────────
        let bar = PriceBar::from(tick);
        self.window.ingest(&bar);
        self.vwap.apply(tick.price, tick.volume);
        self.session_volume += tick.volume;
        self.last_ts = Some(tick.timestamp);

        // ── Derivation ──────────────────────────────────────────────────
        let snapshot = indicators::compute_snapshot(&self.window, &self.vwap);
        let signal = signals::evaluate(tick.price, &snapshot, &config.thresholds);

        let alerts: Vec<Alert> = self
            .bank
            .evaluate(
                tick.price,
                &snapshot,
                self.gap_pct,
                &config.thresholds,
                tick.timestamp,
            )
            .into_iter()
            .map(|(kind, value)| {
                Alert::new(
                    &self.symbol,
                    kind,
                    config.severities.for_kind(kind),
                    value,
                    tick.timestamp,
                )
            })
            .collect();

        let stock = StockSnapshot {
            symbol: self.symbol.clone(),
            price: tick.price,
            timestamp: tick.timestamp,
            gap_pct: self.gap_pct,
            session_volume: self.session_volume,
            indicators: snapshot,
            signal,
        };

        // ── Screener delta ──────────────────────────────────────────────
        let current = serde_json::to_value(&stock).unwrap_or_default();
        let mut updated_fields = diff_fields(self.prev_published.as_ref(), &current);
        if !alerts.is_empty() {
            updated_fields.insert(
                "alerts".to_string(),
                serde_json::to_value(&alerts).unwrap_or_default(),
            );
        }
        self.prev_published = Some(current);

        Some(TickOutcome {
            detail: DetailUpdate {
                tick: tick.clone(),
                indicators: snapshot,
                signal,
                alerts: alerts.clone(),
            },
            screener: ScreenerUpdate {
                symbol: self.symbol.clone(),
                updated_fields,
                timestamp: tick.timestamp,
            },
            snapshot: stock,
            alerts,
        })
    }
}

/// Changed top-level fields between two serialized snapshots. `symbol` and
/// `timestamp` are identity/clock, not state, and are skipped.
fn diff_fields(
    prev: Option<&serde_json::Value>,
    current: &serde_json::Value,
) -> serde_json::Map<String, serde_json::Value> {
    let mut changed = serde_json::Map::new();
    let current_obj = match current.as_object() {
        Some(obj) => obj,
        None => return changed,
    };
    let prev_obj = prev.and_then(|v| v.as_object());

    for (key, value) in current_obj {
        if key == "symbol" || key == "timestamp" {
            continue;
        }
        let unchanged = prev_obj
            .and_then(|p| p.get(key))
            .map(|old| old == value)
            .unwrap_or(false);
        if !unchanged {
            changed.insert(key.clone(), value.clone());
        }
    }
    changed
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Routes inbound ticks to per-symbol workers and owns the worker registry.
pub struct Engine {
    state: Arc<AppState>,
    alert_tx: mpsc::UnboundedSender<Alert>,
    workers: RwLock<HashMap<String, mpsc::UnboundedSender<Tick>>>,
}

impl Engine {
    pub fn new(state: Arc<AppState>, alert_tx: mpsc::UnboundedSender<Alert>) -> Arc<Self> {
        Arc::new(Self {
            state,
            alert_tx,
            workers: RwLock::new(HashMap::new()),
        })
    }

    /// Accept one tick from the feed. Malformed ticks are rejected here;
    /// per-symbol ordering checks happen inside the symbol's worker.
    pub fn ingest(self: &Arc<Self>, tick: Tick) {
        if !Self::is_well_formed(&tick) {
            warn!(symbol = %tick.symbol, price = tick.price, "malformed tick rejected");
            self.state.ticks_rejected.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let sender = self.worker_for(&tick.symbol);
        if sender.send(tick).is_err() {
            // Worker task ended; it will be respawned on the next tick.
            warn!("symbol worker channel closed; dropping tick");
        }
    }

    fn is_well_formed(tick: &Tick) -> bool {
        !tick.symbol.is_empty()
            && tick.price.is_finite()
            && tick.price > 0.0
            && tick.volume.is_finite()
            && tick.volume >= 0.0
    }

    /// Sender for a symbol's worker, spawning the worker on first use.
    fn worker_for(self: &Arc<Self>, symbol: &str) -> mpsc::UnboundedSender<Tick> {
        if let Some(sender) = self.workers.read().get(symbol) {
            if !sender.is_closed() {
                return sender.clone();
            }
        }

        let mut workers = self.workers.write();
        // Double-checked: another ingest may have spawned it meanwhile.
        if let Some(sender) = workers.get(symbol) {
            if !sender.is_closed() {
                return sender.clone();
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        workers.insert(symbol.to_string(), tx.clone());

        let engine = self.clone();
        let symbol = symbol.to_string();
        tokio::spawn(async move {
            engine.run_symbol_worker(symbol, rx).await;
        });

        tx
    }

    /// The single serialized mutation path for one symbol.
    async fn run_symbol_worker(self: Arc<Self>, symbol: String, mut rx: mpsc::UnboundedReceiver<Tick>) {
        info!(symbol = %symbol, "symbol worker started");
        let mut sym = SymbolState::new(symbol);

        while let Some(tick) = rx.recv().await {
            let config = self.state.runtime_config.read().clone();

            let outcome = match sym.process(&tick, &config) {
                Some(outcome) => outcome,
                None => {
                    self.state.ticks_rejected.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };

            for alert in &outcome.alerts {
                info!(
                    symbol = %alert.symbol,
                    kind = %alert.kind,
                    severity = %alert.severity,
                    "alert fired"
                );
                self.state.record_alert(alert.clone());
                // Fire-and-forget to the notification sink.
                if self.alert_tx.send(alert.clone()).is_err() {
                    warn!("alert sink channel closed");
                }
            }

            self.state
                .hub
                .publish(&outcome.snapshot.symbol, &outcome.detail, &outcome.screener);
            self.state.record_snapshot(outcome.snapshot);
            self.state.ticks_processed.fetch_add(1, Ordering::Relaxed);
        }

        info!(symbol = %sym.symbol, "symbol worker stopped");
    }
}
