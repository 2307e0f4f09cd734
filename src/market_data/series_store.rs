use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::types::OhlcPoint;

// ---------------------------------------------------------------------------
// SeriesStore -- bounded, ordered candle series per symbol
// ---------------------------------------------------------------------------

/// Result of a single merge call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The point's time was newer than the series tail and was appended.
    Appended,
    /// The point refined the in-progress period (equal time) and replaced
    /// the tail element.
    Replaced,
    /// The point's time was older than the series tail; the series is
    /// unchanged.
    Rejected,
}

/// Thread-safe store holding the most recent candles per symbol.
///
/// The feed resends the current period repeatedly while it is still open, so
/// an incoming point with the same `time` as the series tail replaces the
/// tail in place. A strictly newer point is appended and the series is then
/// trimmed from the front to `max_points`. The series is therefore always
/// ascending by `time` with at most one point per distinct `time`.
pub struct SeriesStore {
    series: RwLock<HashMap<String, Vec<OhlcPoint>>>,
    max_points: usize,
}

impl SeriesStore {
    /// Create a store that retains at most `max_points` candles per symbol.
    pub fn new(max_points: usize) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            max_points,
        }
    }

    /// Insert or replace the latest candle for `symbol`.
    ///
    /// * Empty series, or tail `time` older than `point.time` -- append,
    ///   then trim the oldest entries down to `max_points`.
    /// * Tail `time` equal to `point.time` -- replace the tail (in-progress
    ///   period refinement); length is unchanged so no trim runs.
    /// * Tail `time` newer than `point.time` -- out-of-order message; the
    ///   feed never sends these for a healthy subscription, so it is logged
    ///   and dropped rather than spliced in.
    pub fn merge(&self, symbol: &str, point: OhlcPoint) -> MergeOutcome {
        let mut map = self.series.write();
        let series = map.entry(symbol.to_string()).or_default();

        match series.last().map(|p| p.time) {
            Some(tail_time) if tail_time == point.time => {
                if let Some(last) = series.last_mut() {
                    *last = point;
                }
                MergeOutcome::Replaced
            }
            Some(tail_time) if tail_time > point.time => {
                warn!(
                    symbol = %symbol,
                    tail_time,
                    point_time = point.time,
                    "out-of-order candle dropped"
                );
                MergeOutcome::Rejected
            }
            _ => {
                series.push(point);
                if series.len() > self.max_points {
                    let excess = series.len() - self.max_points;
                    series.drain(..excess);
                }
                MergeOutcome::Appended
            }
        }
    }

    /// Return a clone of the current series for `symbol` (oldest-first), or
    /// an empty vec for an unknown symbol.
    pub fn snapshot(&self, symbol: &str) -> Vec<OhlcPoint> {
        let map = self.series.read();
        map.get(symbol).cloned().unwrap_or_default()
    }

    /// Replace the series for `symbol` with restored history, typically read
    /// from the cache at subscription start.
    ///
    /// Restored data is not trusted: only the longest prefix that is strictly
    /// ascending by `time` is kept, and the result is clamped to the
    /// retention bound (most recent points win).
    pub fn seed(&self, symbol: &str, points: Vec<OhlcPoint>) {
        let mut valid: Vec<OhlcPoint> = Vec::with_capacity(points.len());
        for p in points {
            match valid.last() {
                Some(last) if last.time >= p.time => {
                    warn!(
                        symbol = %symbol,
                        kept = valid.len(),
                        "restored series not strictly ascending -- truncating"
                    );
                    break;
                }
                _ => valid.push(p),
            }
        }
        if valid.len() > self.max_points {
            let excess = valid.len() - self.max_points;
            valid.drain(..excess);
        }

        debug!(symbol = %symbol, points = valid.len(), "series seeded");
        self.series.write().insert(symbol.to_string(), valid);
    }

    /// Number of candles currently stored for `symbol`.
    pub fn len(&self, symbol: &str) -> usize {
        let map = self.series.read();
        map.get(symbol).map_or(0, Vec::len)
    }

    /// Close price of the most recent candle for `symbol`, if any.
    pub fn last_close(&self, symbol: &str) -> Option<f64> {
        let map = self.series.read();
        map.get(symbol).and_then(|s| s.last().map(|p| p.close))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
