// =============================================================================
// Candle Chart — Main Entry Point
// =============================================================================
//
// Single-session live chart client: subscribes to one (symbol, interval)
// kline stream, keeps a bounded candle series with an SMA overlay, persists
// snapshots to a local cache, and renders through the presentation sink.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod cache;
mod indicators;
mod market_data;
mod presentation;
mod runtime_config;
mod session;
mod types;

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::presentation::LogSink;
use crate::runtime_config::RuntimeConfig;
use crate::session::{ChartSession, SessionCommand};

const CONFIG_PATH: &str = "chart_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });

    // Override the subscription target from env if available.
    if let Ok(sym) = std::env::var("CHART_SYMBOL") {
        let sym = sym.trim().to_uppercase();
        if !sym.is_empty() {
            config.symbol = sym;
        }
    }
    if let Ok(iv) = std::env::var("CHART_INTERVAL") {
        let iv = iv.trim().to_lowercase();
        if !iv.is_empty() {
            config.interval = iv;
        }
    }

    info!(
        symbol = %config.symbol,
        interval = %config.interval,
        sma_period = config.sma_period,
        "Candle chart starting"
    );

    let config = Arc::new(RwLock::new(config));

    // ── 2. Build and spawn the chart session ─────────────────────────────
    let (cmd_tx, cmd_rx) = mpsc::channel::<SessionCommand>(16);
    let session = ChartSession::new(&config.read(), Arc::new(LogSink));
    let session_task = tokio::spawn(session.run(cmd_rx));

    // ── 3. Stdin command surface ─────────────────────────────────────────
    // `symbol <PAIR>` and `interval <IV>` lines stand in for the selection
    // widgets of a chart UI.
    let stdin_config = config.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        info!("commands: `symbol <PAIR>` | `interval <IV>`");

        while let Ok(Some(line)) = lines.next_line().await {
            let mut parts = line.split_whitespace();
            let cmd = match (parts.next(), parts.next()) {
                (Some("symbol"), Some(sym)) => {
                    let sym = sym.to_uppercase();
                    stdin_config.write().symbol = sym.clone();
                    Some(SessionCommand::SetSymbol(sym))
                }
                (Some("interval"), Some(iv)) => {
                    let iv = iv.to_lowercase();
                    stdin_config.write().interval = iv.clone();
                    Some(SessionCommand::SetInterval(iv))
                }
                (None, _) => None,
                _ => {
                    warn!(line = %line, "unrecognised command");
                    None
                }
            };

            if let Some(cmd) = cmd {
                if cmd_tx.send(cmd).await.is_err() {
                    break;
                }
            }
        }
    });

    // ── 4. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping");

    session_task.abort();

    if let Err(e) = config.read().save(CONFIG_PATH) {
        warn!(error = %e, "Failed to save config on shutdown");
    }

    info!("Candle chart shut down complete.");
    Ok(())
}
