// =============================================================================
// Chart Session — event loop driving one live chart
// =============================================================================
//
// Owns the series store, the cache, and the presentation sink; nothing here
// is ambient or static. One update is processed to completion (merge ->
// recompute overlay -> persist -> redraw) before the next is taken, so the
// series is never observed mid-mutation.
//
// At most one kline connection is active at a time. A symbol or interval
// change aborts the current stream task, reseeds the series from the cache,
// redraws, and subscribes to the new target. A stream that ends on its own
// (transport error, server close) leaves the session Disconnected until the
// next user command -- there is no automatic reconnect.
// =============================================================================

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::SeriesCache;
use crate::indicators::sma::calculate_sma;
use crate::market_data::kline_stream::run_kline_stream;
use crate::market_data::{KlineUpdate, MergeOutcome, SeriesStore};
use crate::presentation::ChartSink;
use crate::runtime_config::RuntimeConfig;
use crate::types::ConnState;

/// User-driven changes to the active subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    SetSymbol(String),
    SetInterval(String),
}

/// Handle to the currently active stream task.
struct StreamHandle {
    rx: mpsc::Receiver<KlineUpdate>,
    task: JoinHandle<()>,
}

/// Receive the next update from the active stream, or park forever when no
/// stream is active (a user command is then the only way forward).
async fn next_update(stream: &mut Option<StreamHandle>) -> Option<KlineUpdate> {
    match stream {
        Some(handle) => handle.rx.recv().await,
        None => std::future::pending().await,
    }
}

pub struct ChartSession {
    store: SeriesStore,
    cache: SeriesCache,
    sink: Arc<dyn ChartSink>,
    conn_state: Arc<RwLock<ConnState>>,
    symbol: String,
    interval: String,
    sma_period: usize,
}

impl ChartSession {
    pub fn new(config: &RuntimeConfig, sink: Arc<dyn ChartSink>) -> Self {
        Self {
            store: SeriesStore::new(config.max_points),
            cache: SeriesCache::new(config.cache_dir.clone()),
            sink,
            conn_state: Arc::new(RwLock::new(ConnState::Disconnected)),
            symbol: config.symbol.clone(),
            interval: config.interval.clone(),
            sma_period: config.sma_period,
        }
    }

    pub fn conn_state(&self) -> ConnState {
        *self.conn_state.read()
    }

    /// Run the session until the command channel closes.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        self.reseed();
        let mut stream = Some(self.subscribe());

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd, &mut stream),
                    None => break,
                },
                update = next_update(&mut stream) => match update {
                    Some(update) => self.apply_update(&update),
                    None => {
                        // Stream task finished and dropped its sender.
                        stream = None;
                        warn!(
                            symbol = %self.symbol,
                            interval = %self.interval,
                            state = %self.conn_state(),
                            "kline stream closed -- change symbol or interval to resubscribe"
                        );
                    }
                },
            }
        }

        if let Some(handle) = stream.take() {
            handle.task.abort();
        }
        info!("chart session stopped");
    }

    /// Apply one user command, tearing down and replacing the connection when
    /// the subscription target changes.
    fn handle_command(&mut self, cmd: SessionCommand, stream: &mut Option<StreamHandle>) {
        let changed = match cmd {
            SessionCommand::SetSymbol(symbol) => {
                let symbol = symbol.trim().to_uppercase();
                if symbol.is_empty() || symbol == self.symbol {
                    false
                } else {
                    info!(from = %self.symbol, to = %symbol, "symbol changed");
                    self.symbol = symbol;
                    true
                }
            }
            SessionCommand::SetInterval(interval) => {
                let interval = interval.trim().to_lowercase();
                if interval.is_empty() || interval == self.interval {
                    false
                } else {
                    info!(from = %self.interval, to = %interval, "interval changed");
                    self.interval = interval;
                    true
                }
            }
        };

        if !changed {
            return;
        }

        // Drop the old connection first: once the handle is aborted and its
        // receiver dropped, any in-flight updates from it are discarded.
        if let Some(handle) = stream.take() {
            handle.task.abort();
        }
        self.reseed();
        *stream = Some(self.subscribe());
    }

    /// Spawn a stream task for the current `(symbol, interval)` target.
    fn subscribe(&self) -> StreamHandle {
        let (tx, rx) = mpsc::channel(64);
        let symbol = self.symbol.clone();
        let interval = self.interval.clone();
        let conn_state = self.conn_state.clone();

        let task = tokio::spawn(async move {
            if let Err(e) = run_kline_stream(&symbol, &interval, &conn_state, tx).await {
                error!(symbol = %symbol, interval = %interval, error = %e, "kline stream error");
            }
        });

        StreamHandle { rx, task }
    }

    /// Seed the in-memory series from the cache for the current target and
    /// redraw, so history is visible before the first live update lands.
    fn reseed(&self) {
        let restored = self.cache.restore(&self.symbol, &self.interval);
        self.store.seed(&self.symbol, restored);
        self.redraw();
    }

    /// Hand the current series and its overlay to the sink in one explicit
    /// call.
    fn redraw(&self) {
        let series = self.store.snapshot(&self.symbol);
        let average = calculate_sma(&series, self.sma_period);
        self.sink.set_series(&series, &average);
    }

    /// One full update cycle: merge, recompute overlay, persist, redraw.
    fn apply_update(&self, update: &KlineUpdate) {
        if update.symbol != self.symbol {
            debug!(got = %update.symbol, want = %self.symbol, "update for stale symbol ignored");
            return;
        }

        if self.store.merge(&self.symbol, update.point) == MergeOutcome::Rejected {
            // Out-of-order point; the series is unchanged so there is
            // nothing to persist or redraw.
            return;
        }

        let series = self.store.snapshot(&self.symbol);
        self.cache.persist(&self.symbol, &self.interval, &series);

        self.redraw();
        self.sink.set_price(update.point.close);
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AveragePoint, OhlcPoint};
    use parking_lot::Mutex;

    /// Sink that records every redraw for inspection.
    struct RecordingSink {
        redraws: Mutex<Vec<(Vec<OhlcPoint>, Vec<AveragePoint>)>>,
        prices: Mutex<Vec<f64>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                redraws: Mutex::new(Vec::new()),
                prices: Mutex::new(Vec::new()),
            })
        }
    }

    impl ChartSink for RecordingSink {
        fn set_series(&self, candles: &[OhlcPoint], average: &[AveragePoint]) {
            self.redraws
                .lock()
                .push((candles.to_vec(), average.to_vec()));
        }

        fn set_price(&self, price: f64) {
            self.prices.lock().push(price);
        }
    }

    fn test_config(tag: &str) -> RuntimeConfig {
        RuntimeConfig {
            symbol: "BTCUSDT".into(),
            interval: "1m".into(),
            sma_period: 3,
            max_points: 1000,
            cache_dir: std::env::temp_dir()
                .join(format!("chart_session_test_{tag}_{}", std::process::id()))
                .to_string_lossy()
                .into_owned(),
        }
    }

    fn update(time: i64, close: f64) -> KlineUpdate {
        KlineUpdate {
            symbol: "BTCUSDT".into(),
            point: OhlcPoint {
                time,
                open: close,
                high: close,
                low: close,
                close,
            },
        }
    }

    #[test]
    fn reseed_redraws_restored_history() {
        let config = test_config("reseed");
        let _ = std::fs::remove_dir_all(&config.cache_dir);

        // A previous session left history in the cache.
        let cache = SeriesCache::new(config.cache_dir.clone());
        let history: Vec<OhlcPoint> = (1..=4).map(|t| update(t, 10.0 * t as f64).point).collect();
        cache.persist("BTCUSDT", "1m", &history);

        let sink = RecordingSink::new();
        let session = ChartSession::new(&config, sink.clone());
        session.reseed();

        let redraws = sink.redraws.lock();
        assert_eq!(redraws.len(), 1);
        let (candles, average) = &redraws[0];
        assert_eq!(*candles, history);
        // Overlay is recomputed over the restored series (period 3).
        assert_eq!(average.len(), 2);
        assert_eq!(average[0].time, 3);
        assert!((average[0].value - 20.0).abs() < 1e-10);
    }

    #[test]
    fn update_cycle_merges_persists_and_redraws() {
        let config = test_config("cycle");
        let _ = std::fs::remove_dir_all(&config.cache_dir);
        let sink = RecordingSink::new();
        let session = ChartSession::new(&config, sink.clone());

        for (t, c) in [(1, 10.0), (2, 20.0), (3, 30.0), (4, 40.0)] {
            session.apply_update(&update(t, c));
        }

        let redraws = sink.redraws.lock();
        assert_eq!(redraws.len(), 4);

        let (candles, average) = redraws.last().unwrap();
        assert_eq!(candles.len(), 4);
        assert_eq!(average.len(), 2);
        assert_eq!(average[0].time, 3);
        assert!((average[0].value - 20.0).abs() < 1e-10);
        assert!((average[1].value - 30.0).abs() < 1e-10);

        assert_eq!(*sink.prices.lock(), vec![10.0, 20.0, 30.0, 40.0]);

        // The snapshot reached the cache on every cycle.
        let cache = SeriesCache::new(config.cache_dir.clone());
        assert_eq!(cache.restore("BTCUSDT", "1m").len(), 4);
    }

    #[test]
    fn overlay_suppressed_below_window() {
        let config = test_config("subwindow");
        let _ = std::fs::remove_dir_all(&config.cache_dir);
        let sink = RecordingSink::new();
        let session = ChartSession::new(&config, sink.clone());

        session.apply_update(&update(1, 10.0));
        session.apply_update(&update(2, 20.0));

        let redraws = sink.redraws.lock();
        let (candles, average) = redraws.last().unwrap();
        assert_eq!(candles.len(), 2);
        assert!(average.is_empty());
    }

    #[test]
    fn stale_symbol_update_ignored() {
        let config = test_config("stale");
        let _ = std::fs::remove_dir_all(&config.cache_dir);
        let sink = RecordingSink::new();
        let session = ChartSession::new(&config, sink.clone());

        let mut stale = update(1, 10.0);
        stale.symbol = "ETHUSDT".into();
        session.apply_update(&stale);

        assert!(sink.redraws.lock().is_empty());
        assert!(sink.prices.lock().is_empty());
    }

    #[test]
    fn rejected_merge_does_not_redraw() {
        let config = test_config("rejected");
        let _ = std::fs::remove_dir_all(&config.cache_dir);
        let sink = RecordingSink::new();
        let session = ChartSession::new(&config, sink.clone());

        session.apply_update(&update(200, 6.0));
        session.apply_update(&update(100, 5.0)); // backward time

        assert_eq!(sink.redraws.lock().len(), 1);
        assert_eq!(session.store.len("BTCUSDT"), 1);
    }

    #[test]
    fn in_progress_refinement_keeps_length() {
        let config = test_config("refine");
        let _ = std::fs::remove_dir_all(&config.cache_dir);
        let sink = RecordingSink::new();
        let session = ChartSession::new(&config, sink.clone());

        session.apply_update(&update(100, 5.0));
        session.apply_update(&update(100, 7.0));
        session.apply_update(&update(200, 9.0));

        let redraws = sink.redraws.lock();
        let (candles, _) = redraws.last().unwrap();
        assert_eq!(candles.len(), 2);
        assert!((candles[0].close - 7.0).abs() < f64::EPSILON);
        assert!((candles[1].close - 9.0).abs() < f64::EPSILON);
    }
}
