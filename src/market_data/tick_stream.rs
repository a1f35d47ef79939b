// =============================================================================
// Tick Stream -- inbound market-data feed
// =============================================================================
//
// Two tick sources drive the engine:
//
//   - `run_feed_stream` connects to the configured upstream WebSocket feed
//     and forwards every parsed tick. Runs until the stream disconnects or
//     errors, then returns so the caller (main.rs) can reconnect.
//   - `run_simulated_feed` random-walks a price per watched symbol, one
//     tick per symbol per second — the engine runs end to end without a
//     broker attached.
//
// The feed shape is one JSON object per message:
//
//   { "symbol": "TCS", "price": 3921.5, "volume": 120, "timestamp": ... }
//
// `timestamp` is accepted as epoch milliseconds or RFC 3339; numeric fields
// are accepted as JSON numbers or strings (several vendor feeds quote
// them).

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use futures_util::StreamExt;
use rand::Rng;
use tokio_tungstenite::connect_async;
use tracing::{debug, error, info, warn};

use crate::app_state::AppState;
use crate::engine::Engine;
use crate::types::Tick;

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a single feed message into a [`Tick`].
pub fn parse_tick_message(text: &str) -> Result<Tick> {
    let root: serde_json::Value =
        serde_json::from_str(text).context("failed to parse tick JSON")?;

    let symbol = root["symbol"]
        .as_str()
        .context("missing field symbol")?
        .to_uppercase();

    let price = parse_value_f64(&root["price"], "price")?;
    let volume = match root.get("volume") {
        Some(v) if !v.is_null() => parse_value_f64(v, "volume")?,
        _ => 0.0,
    };
    let timestamp = parse_timestamp(&root["timestamp"])?;

    Ok(Tick {
        symbol,
        price,
        volume,
        timestamp,
    })
}

/// Helper: vendor feeds send numeric values either as JSON numbers or as
/// strings.
fn parse_value_f64(val: &serde_json::Value, name: &str) -> Result<f64> {
    match val {
        serde_json::Value::String(s) => s
            .parse::<f64>()
            .with_context(|| format!("failed to parse {name} as f64: {s}")),
        serde_json::Value::Number(n) => n
            .as_f64()
            .with_context(|| format!("field {name} is not a valid f64")),
        _ => anyhow::bail!("field {name} has unexpected JSON type"),
    }
}

/// Accept epoch milliseconds (number) or RFC 3339 (string).
fn parse_timestamp(val: &serde_json::Value) -> Result<DateTime<Utc>> {
    match val {
        serde_json::Value::Number(n) => {
            let millis = n.as_i64().context("timestamp is not a valid integer")?;
            Utc.timestamp_millis_opt(millis)
                .single()
                .context("timestamp out of range")
        }
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .with_context(|| format!("failed to parse timestamp: {s}")),
        _ => anyhow::bail!("missing or malformed timestamp"),
    }
}

// ---------------------------------------------------------------------------
// Upstream feed
// ---------------------------------------------------------------------------

/// Connect to the upstream tick WebSocket and pump ticks into the engine.
///
/// Returns when the stream ends or errors; the caller handles reconnection
/// and backoff.
pub async fn run_feed_stream(url: &str, engine: &Arc<Engine>) -> Result<()> {
    info!(url = %url, "connecting to tick feed");

    let (ws_stream, _response) = connect_async(url)
        .await
        .context("failed to connect to tick feed")?;

    info!("tick feed connected");
    let (_write, mut read) = ws_stream.split();

    loop {
        match read.next().await {
            Some(Ok(msg)) => {
                if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
                    match parse_tick_message(&text) {
                        Ok(tick) => {
                            debug!(symbol = %tick.symbol, price = tick.price, "tick received");
                            engine.ingest(tick);
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to parse tick message");
                        }
                    }
                }
                // Ping/Pong/Binary/Close frames are handled by tungstenite.
            }
            Some(Err(e)) => {
                error!(error = %e, "tick feed read error");
                return Err(e.into());
            }
            None => {
                warn!("tick feed stream ended");
                return Ok(());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Simulated feed
// ---------------------------------------------------------------------------

/// Random-walk demo feed: one tick per watched symbol per second, jittering
/// each price by up to ±0.1% like an idle intraday tape. Reads the
/// watchlist from the runtime config on every cycle so watchlist changes
/// take effect immediately.
pub async fn run_simulated_feed(state: Arc<AppState>, engine: Arc<Engine>) {
    info!("no feed URL configured -- running simulated random-walk feed");

    let mut prices: HashMap<String, f64> = HashMap::new();
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(1));

    loop {
        interval.tick().await;
        let symbols = state.runtime_config.read().symbols.clone();
        let now = Utc::now();

        for symbol in symbols {
            let mut rng = rand::thread_rng();
            let price = prices
                .entry(symbol.clone())
                .or_insert_with(|| rng.gen_range(100.0..3000.0));
            *price *= 1.0 + rng.gen_range(-0.001..0.001);
            let volume = rng.gen_range(0.0_f64..10_000.0).floor();

            engine.ingest(Tick {
                symbol,
                price: *price,
                volume,
                timestamp: now,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tick_with_numeric_fields() {
        let json = r#"{"symbol":"tcs","price":3921.5,"volume":120,"timestamp":1717406100000}"#;
        let tick = parse_tick_message(json).expect("should parse");
        assert_eq!(tick.symbol, "TCS");
        assert!((tick.price - 3921.5).abs() < f64::EPSILON);
        assert!((tick.volume - 120.0).abs() < f64::EPSILON);
        assert_eq!(tick.timestamp.timestamp_millis(), 1_717_406_100_000);
    }

    #[test]
    fn parse_tick_with_string_fields_and_rfc3339() {
        let json = r#"{
            "symbol": "RELIANCE",
            "price": "2950.75",
            "volume": "450",
            "timestamp": "2024-06-03T09:15:00+05:30"
        }"#;
        let tick = parse_tick_message(json).expect("should parse");
        assert_eq!(tick.symbol, "RELIANCE");
        assert!((tick.price - 2950.75).abs() < f64::EPSILON);
        assert!((tick.volume - 450.0).abs() < f64::EPSILON);
        // 09:15 IST == 03:45 UTC.
        assert_eq!(tick.timestamp.to_rfc3339(), "2024-06-03T03:45:00+00:00");
    }

    #[test]
    fn parse_tick_without_volume_defaults_to_zero() {
        let json = r#"{"symbol":"INFY","price":1500.0,"timestamp":1717406100000}"#;
        let tick = parse_tick_message(json).expect("should parse");
        assert_eq!(tick.volume, 0.0);
    }

    #[test]
    fn parse_tick_missing_symbol_fails() {
        let json = r#"{"price":1500.0,"timestamp":1717406100000}"#;
        assert!(parse_tick_message(json).is_err());
    }

    #[test]
    fn parse_tick_bad_price_fails() {
        let json = r#"{"symbol":"INFY","price":"not-a-number","timestamp":1717406100000}"#;
        assert!(parse_tick_message(json).is_err());
    }

    #[test]
    fn parse_tick_bad_timestamp_fails() {
        let json = r#"{"symbol":"INFY","price":1500.0,"timestamp":true}"#;
        assert!(parse_tick_message(json).is_err());
    }
}
