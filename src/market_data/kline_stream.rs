use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tracing::{debug, error, info, warn};

use crate::types::{ConnState, OhlcPoint};

// ---------------------------------------------------------------------------
// Kline WebSocket stream
// ---------------------------------------------------------------------------

/// One decoded candle update from the feed, ready to merge.
#[derive(Debug, Clone)]
pub struct KlineUpdate {
    pub symbol: String,
    pub point: OhlcPoint,
}

/// Build the single-stream kline URL for a `(symbol, interval)` pair.
fn build_kline_url(symbol: &str, interval: &str) -> String {
    let lower = symbol.to_lowercase();
    format!("wss://stream.binance.com:9443/ws/{lower}@kline_{interval}")
}

/// Connect to the kline WebSocket stream for a single `(symbol, interval)`
/// pair and forward decoded updates into `tx`.
///
/// `conn_state` tracks the connection lifecycle for the session: it is set to
/// `Connecting` on entry, `Open` after the handshake, and `Disconnected`
/// before this function returns for any reason.
///
/// Runs until the stream ends, the transport errors, or the receiving side of
/// `tx` is dropped (which is how the session tears down the connection on a
/// symbol/interval change). There is no automatic reconnect; the caller
/// decides whether to resubscribe.
pub async fn run_kline_stream(
    symbol: &str,
    interval: &str,
    conn_state: &Arc<RwLock<ConnState>>,
    tx: mpsc::Sender<KlineUpdate>,
) -> Result<()> {
    *conn_state.write() = ConnState::Connecting;

    let url = build_kline_url(symbol, interval);
    info!(url = %url, symbol = %symbol, interval = %interval, "connecting to kline WebSocket");

    let connect_result = connect_async(&url)
        .await
        .context("failed to connect to kline WebSocket");
    let (ws_stream, _response) = match connect_result {
        Ok(ok) => ok,
        Err(e) => {
            *conn_state.write() = ConnState::Disconnected;
            return Err(e);
        }
    };

    *conn_state.write() = ConnState::Open;
    info!(symbol = %symbol, interval = %interval, "kline WebSocket connected");
    let (_write, mut read) = ws_stream.split();

    let result = loop {
        match read.next().await {
            Some(Ok(msg)) => {
                if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
                    match parse_kline_message(&text) {
                        Ok(Some(update)) => {
                            debug!(
                                symbol = %update.symbol,
                                time = update.point.time,
                                close = update.point.close,
                                "candle update"
                            );
                            if tx.send(update).await.is_err() {
                                // Session dropped the receiver -- this
                                // subscription has been superseded.
                                debug!(symbol = %symbol, "update channel closed, leaving stream");
                                break Ok(());
                            }
                        }
                        Ok(None) => {
                            debug!("ignoring non-kline event");
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to parse kline message");
                        }
                    }
                }
                // Ping / Pong / Binary / Close frames are ignored --
                // tungstenite handles pong replies automatically.
            }
            Some(Err(e)) => {
                error!(symbol = %symbol, error = %e, "kline WebSocket read error");
                break Err(e.into());
            }
            None => {
                warn!(symbol = %symbol, interval = %interval, "kline WebSocket stream ended");
                break Ok(());
            }
        }
    };

    *conn_state.write() = ConnState::Disconnected;
    result
}

// ---------------------------------------------------------------------------
// Message decoding
// ---------------------------------------------------------------------------

/// Parse one kline message into a [`KlineUpdate`].
///
/// Expected shape (single-stream payload):
/// ```json
/// { "e": "kline", "s": "BTCUSDT", "k": { "t": 1700000000000,
///   "o": "37000.00", "h": "37050.00", "l": "36990.00", "c": "37020.00" } }
/// ```
/// The combined-stream envelope (`{ "stream": ..., "data": {...} }`) is also
/// accepted. The period-start `k.t` arrives in milliseconds and is mapped to
/// seconds. Returns `Ok(None)` for well-formed events that are not klines.
fn parse_kline_message(text: &str) -> Result<Option<KlineUpdate>> {
    let root: serde_json::Value =
        serde_json::from_str(text).context("failed to parse kline JSON")?;

    // Support both combined-stream envelope and direct single-stream payload.
    let data = if root.get("data").is_some() {
        &root["data"]
    } else {
        &root
    };

    match data["e"].as_str() {
        Some("kline") => {}
        Some(_) => return Ok(None),
        None => anyhow::bail!("missing field e"),
    }

    let symbol = data["s"]
        .as_str()
        .context("missing field s")?
        .to_uppercase();

    let k = &data["k"];

    let open_time_ms = k["t"].as_i64().context("missing field k.t")?;

    let open = parse_string_f64(&k["o"], "k.o")?;
    let high = parse_string_f64(&k["h"], "k.h")?;
    let low = parse_string_f64(&k["l"], "k.l")?;
    let close = parse_string_f64(&k["c"], "k.c")?;

    let point = OhlcPoint {
        time: open_time_ms / 1000,
        open,
        high,
        low,
        close,
    };

    Ok(Some(KlineUpdate { symbol, point }))
}

/// Helper: the feed sends numeric values as JSON strings inside kline objects.
fn parse_string_f64(val: &serde_json::Value, name: &str) -> Result<f64> {
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

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
