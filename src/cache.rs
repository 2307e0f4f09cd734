// =============================================================================
// Series Cache — local persistence of recent chart history
// =============================================================================
//
// One JSON file per (symbol, interval) pair in a local cache directory, so a
// new session can seed the chart with the previous session's history before
// the live stream starts populating it.
//
// Writes use the atomic tmp + rename pattern to prevent corruption on crash.
// The cache is strictly best-effort: the in-memory series stays the source of
// truth, so every failure here is logged and swallowed — a cache outage must
// never block the live data path.
// =============================================================================

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::types::OhlcPoint;

/// File-backed cache of serialized candle series, keyed by
/// `chartData_<symbol>_<interval>`.
pub struct SeriesCache {
    dir: PathBuf,
}

impl SeriesCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, symbol: &str, interval: &str) -> PathBuf {
        self.dir.join(format!("chartData_{symbol}_{interval}.json"))
    }

    /// Write `series` to the cache entry for `(symbol, interval)`.
    ///
    /// Failures are logged at warn and swallowed; the caller never sees them.
    pub fn persist(&self, symbol: &str, interval: &str, series: &[OhlcPoint]) {
        if let Err(e) = self.try_persist(symbol, interval, series) {
            warn!(symbol = %symbol, interval = %interval, error = %e, "failed to persist series cache");
        }
    }

    fn try_persist(&self, symbol: &str, interval: &str, series: &[OhlcPoint]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create cache dir {}", self.dir.display()))?;

        let content =
            serde_json::to_string(series).context("failed to serialise series to JSON")?;

        // Atomic write: write to a temporary sibling file, then rename.
        let path = self.entry_path(symbol, interval);
        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp cache entry {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, &path)
            .with_context(|| format!("failed to rename tmp cache entry to {}", path.display()))?;

        debug!(symbol = %symbol, interval = %interval, points = series.len(), "series cached");
        Ok(())
    }

    /// Read the cached series for `(symbol, interval)`.
    ///
    /// A missing entry or an undeserialisable blob is not a fault: both log
    /// and return an empty series so the chart simply starts cold.
    pub fn restore(&self, symbol: &str, interval: &str) -> Vec<OhlcPoint> {
        let path = self.entry_path(symbol, interval);
        if !path.exists() {
            debug!(symbol = %symbol, interval = %interval, "no cache entry -- starting cold");
            return Vec::new();
        }

        match self.try_restore(&path) {
            Ok(series) => {
                debug!(symbol = %symbol, interval = %interval, points = series.len(), "series restored from cache");
                series
            }
            Err(e) => {
                warn!(symbol = %symbol, interval = %interval, error = %e, "failed to restore series cache");
                Vec::new()
            }
        }
    }

    fn try_restore(&self, path: &Path) -> Result<Vec<OhlcPoint>> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read cache entry {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse cache entry {}", path.display()))
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn temp_cache(tag: &str) -> SeriesCache {
        let dir = std::env::temp_dir().join(format!(
            "candle_chart_cache_test_{tag}_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        SeriesCache::new(dir)
    }

    fn point(time: i64, close: f64) -> OhlcPoint {
        OhlcPoint {
            time,
            open: close - 0.5,
            high: close + 1.0,
            low: close - 1.0,
            close,
        }
    }

    #[test]
    fn roundtrip_preserves_series() {
        let cache = temp_cache("roundtrip");
        let series = vec![point(100, 5.0), point(160, 6.0), point(220, 7.0)];

        cache.persist("BTCUSDT", "1m", &series);
        let restored = cache.restore("BTCUSDT", "1m");

        assert_eq!(restored, series);
    }

    #[test]
    fn restore_missing_entry_is_empty() {
        let cache = temp_cache("missing");
        assert!(cache.restore("XYZUSDT", "1h").is_empty());
    }

    #[test]
    fn restore_corrupt_entry_is_empty() {
        let cache = temp_cache("corrupt");
        cache.persist("BTCUSDT", "1m", &[point(100, 5.0)]);

        let path = cache.entry_path("BTCUSDT", "1m");
        std::fs::write(&path, "{ not valid json").unwrap();

        assert!(cache.restore("BTCUSDT", "1m").is_empty());
    }

    #[test]
    fn entries_are_keyed_by_symbol_and_interval() {
        let cache = temp_cache("keying");
        cache.persist("BTCUSDT", "1m", &[point(100, 5.0)]);
        cache.persist("BTCUSDT", "5m", &[point(100, 6.0), point(400, 7.0)]);

        assert_eq!(cache.restore("BTCUSDT", "1m").len(), 1);
        assert_eq!(cache.restore("BTCUSDT", "5m").len(), 2);
        assert!(cache.restore("ETHUSDT", "1m").is_empty());
    }

    #[test]
    fn persist_empty_series_roundtrips() {
        let cache = temp_cache("empty");
        cache.persist("BTCUSDT", "1m", &[]);
        assert!(cache.restore("BTCUSDT", "1m").is_empty());
    }
}
