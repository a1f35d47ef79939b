// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/`. The health endpoint is public; every
// other route requires a valid signed token via the `AuthBearer` extractor.
// The two WebSocket channels are mounted here as well and do their own
// query-param token check.
//
// CORS is configured permissively for development; tighten allowed origins
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::api::auth::AuthBearer;
use crate::app_state::{AppState, StockSnapshot};
use crate::runtime_config::{RuntimeConfig, CONFIG_PATH};

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST + WS router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Public ──────────────────────────────────────────────────
        .route("/api/health", get(health))
        // ── Authenticated ───────────────────────────────────────────
        .route("/api/stocks", get(list_stocks))
        .route("/api/stocks/:symbol", get(get_stock))
        .route("/api/watchlist/check/:symbol", get(check_watchlist))
        .route("/api/watchlist/add", post(add_to_watchlist))
        .route("/api/watchlist/remove", post(remove_from_watchlist))
        .route("/api/alerts", get(recent_alerts))
        .route("/api/config", get(get_config).put(put_config))
        // ── WebSocket channels ──────────────────────────────────────
        .route("/ws/screener", get(crate::api::ws::screener_handler))
        .route("/ws/stocks/:symbol", get(crate::api::ws::stock_handler))
        // ── Middleware & State ──────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health (public)
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    uptime_secs: u64,
    symbols_tracked: usize,
    subscribers: usize,
    ticks_processed: u64,
    ticks_rejected: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        uptime_secs: state.uptime_secs(),
        symbols_tracked: state.snapshots.read().len(),
        subscribers: state.hub.subscriber_count(),
        ticks_processed: state
            .ticks_processed
            .load(std::sync::atomic::Ordering::Relaxed),
        ticks_rejected: state
            .ticks_rejected
            .load(std::sync::atomic::Ordering::Relaxed),
        server_time: chrono::Utc::now().timestamp_millis(),
    };
    Json(resp)
}

// =============================================================================
// Screener listing (authenticated)
// =============================================================================

#[derive(Deserialize)]
struct StockFilters {
    /// Case-insensitive symbol substring.
    q: Option<String>,
    /// Minimum absolute session-gap percent.
    min_gap: Option<f64>,
    /// Minimum session volume.
    min_volume: Option<f64>,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct StockListResponse {
    items: Vec<StockSnapshot>,
}

async fn list_stocks(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Query(filters): Query<StockFilters>,
) -> impl IntoResponse {
    let limit = filters.limit.unwrap_or(20);
    let watchlist = state.runtime_config.read().symbols.clone();
    let snapshots = state.snapshots.read();

    // Watchlist order, skipping symbols that have not ticked yet.
    let mut items: Vec<StockSnapshot> = watchlist
        .iter()
        .filter_map(|symbol| snapshots.get(symbol).cloned())
        .collect();
    drop(snapshots);

    if let Some(q) = &filters.q {
        let q = q.to_lowercase();
        items.retain(|s| s.symbol.to_lowercase().contains(&q));
    }
    if let Some(min_gap) = filters.min_gap {
        items.retain(|s| s.gap_pct.map(|g| g.abs() >= min_gap).unwrap_or(false));
    }
    if let Some(min_volume) = filters.min_volume {
        items.retain(|s| s.session_volume >= min_volume);
    }
    items.truncate(limit);

    Json(StockListResponse { items })
}

// =============================================================================
// Stock detail (authenticated)
// =============================================================================

async fn get_stock(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> impl IntoResponse {
    let symbol = symbol.to_uppercase();

    let snapshot = state.snapshots.read().get(&symbol).cloned();
    match snapshot {
        Some(snapshot) => {
            let history = state.history(&symbol);
            let body = serde_json::json!({
                "stock": snapshot,
                "history": history,
            });
            Json(body).into_response()
        }
        None => {
            let body = serde_json::json!({
                "error": format!("no market data for {symbol}"),
            });
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
    }
}

// =============================================================================
// Watchlist (authenticated)
// =============================================================================

#[derive(Deserialize)]
struct WatchlistQuery {
    symbol: String,
}

async fn check_watchlist(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> impl IntoResponse {
    let symbol = symbol.to_uppercase();
    let in_watchlist = state
        .runtime_config
        .read()
        .symbols
        .iter()
        .any(|s| s == &symbol);
    Json(serde_json::json!({ "symbol": symbol, "in_watchlist": in_watchlist }))
}

async fn add_to_watchlist(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WatchlistQuery>,
) -> impl IntoResponse {
    let symbol = query.symbol.trim().to_uppercase();
    if symbol.is_empty() {
        let body = serde_json::json!({ "success": false, "error": "empty symbol" });
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    }

    let symbols = {
        let mut config = state.runtime_config.write();
        if !config.symbols.contains(&symbol) {
            config.symbols.push(symbol.clone());
        }
        config.symbols.clone()
    };
    persist_config(&state);
    state.increment_version();

    info!(symbol = %symbol, "watchlist add");
    Json(serde_json::json!({ "success": true, "symbols": symbols })).into_response()
}

async fn remove_from_watchlist(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WatchlistQuery>,
) -> impl IntoResponse {
    let symbol = query.symbol.trim().to_uppercase();

    let symbols = {
        let mut config = state.runtime_config.write();
        config.symbols.retain(|s| s != &symbol);
        config.symbols.clone()
    };
    persist_config(&state);
    state.increment_version();

    info!(symbol = %symbol, "watchlist remove");
    Json(serde_json::json!({ "success": true, "symbols": symbols }))
}

// =============================================================================
// Alerts feed (authenticated)
// =============================================================================

#[derive(Deserialize)]
struct AlertsQuery {
    limit: Option<usize>,
}

async fn recent_alerts(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertsQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(50);
    Json(state.recent_alerts(limit))
}

// =============================================================================
// Config (authenticated)
// =============================================================================

async fn get_config(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    Json(state.runtime_config.read().clone())
}

/// Replace the runtime config. Missing fields fall back to defaults via
/// serde; thresholds apply from the next tick onwards.
async fn put_config(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(new_config): Json<RuntimeConfig>,
) -> impl IntoResponse {
    *state.runtime_config.write() = new_config;
    persist_config(&state);
    state.increment_version();

    info!("runtime config replaced via API");
    Json(state.runtime_config.read().clone())
}

fn persist_config(state: &Arc<AppState>) {
    let config = state.runtime_config.read().clone();
    if let Err(e) = config.save(CONFIG_PATH) {
        warn!(error = %e, "failed to persist runtime config");
    }
}
