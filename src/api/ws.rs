// =============================================================================
// WebSocket Handlers — Push transport over the subscription hub
// =============================================================================
//
// Two channels:
//
//   /ws/screener?token=...          every symbol's screener deltas
//   /ws/stocks/:symbol?token=...    full detail updates for one symbol
//
// On connect the client receives a `snapshot` message with the current
// state (possibly empty for a symbol that has not ticked yet — the
// subscription still succeeds and goes live on the symbol's first tick),
// then one message per queued hub update. The writer loop drains this
// connection's own coalescing queue, so a slow client only coalesces its
// own view.
//
// Reconnection is entirely client-driven: a reconnecting client simply
// re-subscribes and picks up fresh state from the next tick.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::api::auth::validate_token;
use crate::app_state::AppState;
use crate::hub::{SubscriberKind, SubscriptionHandle};

// =============================================================================
// Query parameters
// =============================================================================

#[derive(Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

// =============================================================================
// Upgrade handlers
// =============================================================================

/// Screener-wide channel: one delta message per changed symbol.
pub async fn screener_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let token = query.token.unwrap_or_default();
    if !validate_token(&token) {
        warn!("screener WebSocket rejected: invalid token");
        return (
            axum::http::StatusCode::FORBIDDEN,
            "Invalid or missing token",
        )
            .into_response();
    }

    info!("screener WebSocket accepted");
    ws.on_upgrade(move |socket| async move {
        let handle = state.hub.subscribe(SubscriberKind::Screener);

        // Initial snapshot: every symbol currently tracked.
        let items: Vec<_> = state.snapshots.read().values().cloned().collect();
        let initial = serde_json::json!({ "snapshot": items }).to_string();

        run_subscription(socket, handle, initial).await;
    })
    .into_response()
}

/// Single-symbol detail channel.
pub async fn stock_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let token = query.token.unwrap_or_default();
    if !validate_token(&token) {
        warn!(symbol = %symbol, "stock WebSocket rejected: invalid token");
        return (
            axum::http::StatusCode::FORBIDDEN,
            "Invalid or missing token",
        )
            .into_response();
    }

    let symbol = symbol.to_uppercase();
    info!(symbol = %symbol, "stock WebSocket accepted");

    ws.on_upgrade(move |socket| async move {
        let handle = state.hub.subscribe(SubscriberKind::Symbol(symbol.clone()));

        // Current snapshot if the symbol has ticked; null otherwise. The
        // subscription is live either way.
        let snapshot = state.snapshots.read().get(&symbol).cloned();
        let initial = serde_json::json!({ "snapshot": snapshot }).to_string();

        run_subscription(socket, handle, initial).await;
    })
    .into_response()
}

// =============================================================================
// Connection loop
// =============================================================================

/// Drive one subscription: push the initial snapshot, then forward queued
/// hub updates while answering client pings. Dropping the handle on exit
/// unsubscribes, so an in-flight publish at disconnect time just sees a
/// closed queue.
async fn run_subscription(socket: WebSocket, handle: SubscriptionHandle, initial: String) {
    use futures_util::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    let id = handle.id();

    if let Err(e) = sender.send(Message::Text(initial.into())).await {
        warn!(id, error = %e, "failed to send initial snapshot");
        return;
    }

    loop {
        tokio::select! {
            // ── Writer: drain this subscriber's queue ───────────────────
            update = handle.recv() => {
                let Some(update) = update else {
                    debug!(id, "subscription closed");
                    break;
                };
                let json = match serde_json::to_string(&update) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(id, error = %e, "failed to serialise update");
                        continue;
                    }
                };
                if let Err(e) = sender.send(Message::Text(json.into())).await {
                    debug!(id, error = %e, "WebSocket send failed -- disconnecting");
                    break;
                }
            }

            // ── Reader: client control frames ───────────────────────────
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            debug!(id, error = %e, "failed to send Pong -- disconnecting");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!(id, "WebSocket close frame received");
                        break;
                    }
                    Some(Ok(Message::Text(text))) => {
                        // Heartbeats and the like; nothing to do.
                        debug!(id, msg = %text, "client text message ignored");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(id, error = %e, "WebSocket receive error");
                        break;
                    }
                    None => {
                        debug!(id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    info!(id, "WebSocket connection closed");
    // `handle` drops here and unsubscribes from the hub.
}
