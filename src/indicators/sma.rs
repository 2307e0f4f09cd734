// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================
//
// Mean of the closing prices over the most recent fixed-size window,
// recomputed as the window slides forward by one candle.
//
// The chart overlay wants one output point per candle once the window is
// full, aligned to that candle's period-start time, so this operates on the
// whole series rather than a bare close slice.
// =============================================================================

use crate::types::{AveragePoint, OhlcPoint};

/// Compute the SMA overlay for `series` with look-back `period`.
///
/// Emits one [`AveragePoint`] per candle starting at index `period - 1`,
/// with `value` = mean of the closes in the window ending at that candle.
/// Pure and stateless: safe to recompute from scratch on every update.
///
/// # Edge cases
/// - `period == 0` => empty vec (division by zero guard)
/// - `series.len() < period` => empty vec (no partial-window averages)
/// - A non-finite window sum stops the output early; downstream consumers
///   should not trust a broken series.
pub fn calculate_sma(series: &[OhlcPoint], period: usize) -> Vec<AveragePoint> {
    if period == 0 || series.len() < period {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(series.len() - period + 1);
    for i in (period - 1)..series.len() {
        let window = &series[i + 1 - period..=i];
        let sum: f64 = window.iter().map(|p| p.close).sum();
        let value = sum / period as f64;
        if !value.is_finite() {
            break;
        }
        result.push(AveragePoint {
            time: series[i].time,
            value,
        });
    }

    result
}
