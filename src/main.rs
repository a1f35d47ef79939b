// =============================================================================
// TickWatch Screener Engine — Main Entry Point
// =============================================================================
//
// Startup order: config, shared state, alert dispatcher, tick feed (real or
// simulated), API server. The engine streams until Ctrl+C, then saves the
// runtime config and exits.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod alerts;
mod api;
mod app_state;
mod engine;
mod hub;
mod indicators;
mod market_data;
mod notify;
mod runtime_config;
mod signals;
mod types;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::engine::Engine;
use crate::runtime_config::{RuntimeConfig, CONFIG_PATH};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║          TickWatch Screener Engine — Starting Up         ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });

    // Override watchlist / feed wiring from env if available.
    if let Ok(syms) = std::env::var("TICKWATCH_SYMBOLS") {
        config.symbols = syms
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Ok(url) = std::env::var("TICKWATCH_FEED_URL") {
        if !url.is_empty() {
            config.feed_url = Some(url);
        }
    }

    info!(symbols = ?config.symbols, "Configured watchlist");

    // ── 2. Build shared state ────────────────────────────────────────────
    let state = Arc::new(AppState::new(config));

    // ── 3. Alert dispatcher (fire-and-forget sink) ───────────────────────
    let (alert_tx, alert_rx) = mpsc::unbounded_channel();
    {
        let dispatcher_state = state.clone();
        tokio::spawn(async move {
            notify::run_alert_dispatcher(dispatcher_state, alert_rx).await;
        });
    }

    // ── 4. Ingestion engine ──────────────────────────────────────────────
    let engine = Engine::new(state.clone(), alert_tx);

    // ── 5. Tick feed ─────────────────────────────────────────────────────
    let feed_url = state.runtime_config.read().feed_url.clone();
    match feed_url {
        Some(url) => {
            let feed_engine = engine.clone();
            tokio::spawn(async move {
                loop {
                    if let Err(e) =
                        market_data::tick_stream::run_feed_stream(&url, &feed_engine).await
                    {
                        error!(error = %e, "Tick feed error — reconnecting in 5s");
                    }
                    tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
                }
            });
        }
        None => {
            let sim_state = state.clone();
            let sim_engine = engine.clone();
            tokio::spawn(async move {
                market_data::tick_stream::run_simulated_feed(sim_state, sim_engine).await;
            });
        }
    }

    // ── 6. API server ────────────────────────────────────────────────────
    let api_state = state.clone();
    let bind_addr =
        std::env::var("TICKWATCH_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".into());
    let bind_addr_clone = bind_addr.clone();

    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        let listener = tokio::net::TcpListener::bind(&bind_addr_clone)
            .await
            .expect("Failed to bind API server");
        info!(addr = %bind_addr_clone, "API server listening");
        axum::serve(listener, app)
            .await
            .expect("API server failed");
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 7. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    if let Err(e) = state.runtime_config.read().save(CONFIG_PATH) {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!("TickWatch shut down complete.");
    Ok(())
}
