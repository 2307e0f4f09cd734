// =============================================================================
// Presentation sink — the redraw contract consumed by the chart session
// =============================================================================
//
// The session never talks to a chart widget directly. After each mutation it
// makes a single explicit redraw call against this trait, handing over the
// full candle series and the full overlay series, plus the latest close for
// the textual price readout. A real renderer plugs in here; the bundled
// implementation just logs.

use chrono::{TimeZone, Utc};
use tracing::info;

use crate::types::{AveragePoint, OhlcPoint};

/// Redraw surface for one chart.
pub trait ChartSink: Send + Sync {
    /// Replace the rendered candle layer and moving-average layer.
    fn set_series(&self, candles: &[OhlcPoint], average: &[AveragePoint]);

    /// Update the textual current-price display.
    fn set_price(&self, price: f64);
}

/// Sink that renders to the structured log -- the default surface for a
/// headless session.
pub struct LogSink;

impl ChartSink for LogSink {
    fn set_series(&self, candles: &[OhlcPoint], average: &[AveragePoint]) {
        let tail = match candles.last() {
            Some(p) => p,
            None => {
                info!("chart cleared");
                return;
            }
        };

        let period_start = Utc
            .timestamp_opt(tail.time, 0)
            .single()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| tail.time.to_string());

        info!(
            candles = candles.len(),
            sma_points = average.len(),
            period_start = %period_start,
            open = tail.open,
            high = tail.high,
            low = tail.low,
            close = tail.close,
            "chart redraw"
        );
    }

    fn set_price(&self, price: f64) {
        info!(price = format!("{price:.2}"), "current price");
    }
}
