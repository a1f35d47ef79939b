// =============================================================================
// Alert Notification Dispatcher
// =============================================================================
//
// Consumes emitted alerts from the engine's channel and forwards them to
// the configured Telegram bot. Strictly fire-and-forget: a delivery failure
// is logged and dropped, never retried, and never propagates backpressure
// to tick processing (the channel is drained on this task regardless).
//
// When no bot credentials are configured the dispatcher degrades to
// logging only.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::alerts::Alert;
use crate::app_state::AppState;
use crate::types::Severity;

/// Drain the alert channel until the engine shuts down.
pub async fn run_alert_dispatcher(state: Arc<AppState>, mut rx: mpsc::UnboundedReceiver<Alert>) {
    let client = reqwest::Client::new();

    while let Some(alert) = rx.recv().await {
        info!(
            symbol = %alert.symbol,
            kind = %alert.kind,
            severity = %alert.severity,
            message = %alert.message,
            "dispatching alert"
        );

        let (token, chat_id) = {
            let config = state.runtime_config.read();
            (
                config.telegram_bot_token.clone(),
                config.telegram_chat_id.clone(),
            )
        };

        let (token, chat_id) = match (token, chat_id) {
            (Some(t), Some(c)) if !t.is_empty() && !c.is_empty() => (t, c),
            _ => continue, // log-only mode
        };

        if let Err(e) = send_telegram(&client, &token, &chat_id, &alert).await {
            warn!(error = %e, symbol = %alert.symbol, "alert delivery failed (not retried)");
        }
    }

    info!("alert dispatcher stopped");
}

/// POST one alert to the Telegram bot API.
async fn send_telegram(
    client: &reqwest::Client,
    token: &str,
    chat_id: &str,
    alert: &Alert,
) -> Result<()> {
    let url = format!("https://api.telegram.org/bot{token}/sendMessage");
    let body = serde_json::json!({
        "chat_id": chat_id,
        "text": format_alert_text(alert),
    });

    let response = client
        .post(&url)
        .json(&body)
        .send()
        .await
        .context("telegram request failed")?;

    if !response.status().is_success() {
        anyhow::bail!("telegram responded with status {}", response.status());
    }
    Ok(())
}

/// Render an alert for the chat sink.
fn format_alert_text(alert: &Alert) -> String {
    let marker = match alert.severity {
        Severity::Info => "[INFO]",
        Severity::Warn => "[WARN]",
        Severity::Critical => "[CRITICAL]",
    };
    format!(
        "{marker} {}\n{}\nat {}",
        alert.symbol,
        alert.message,
        alert.timestamp.format("%H:%M:%S")
    )
}
