// =============================================================================
// Shared types used across the chart core
// =============================================================================

use serde::{Deserialize, Serialize};

/// One candlestick: the four representative prices of a fixed time period.
///
/// `time` is the period-start timestamp in seconds and serves as the point's
/// identity key inside a series. A point is only ever superseded by wholesale
/// replacement during a merge, never by in-place field mutation from outside.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OhlcPoint {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// One point of the moving-average overlay, aligned to an `OhlcPoint`'s
/// `time`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AveragePoint {
    pub time: i64,
    pub value: f64,
}

/// Connection lifecycle of the kline stream ingestor.
///
/// There is at most one active connection per session; a symbol or interval
/// change while `Connecting` or `Open` tears the connection down and
/// re-enters `Connecting` for the new target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Open,
}

impl Default for ConnState {
    fn default() -> Self {
        Self::Disconnected
    }
}

impl std::fmt::Display for ConnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Open => write!(f, "Open"),
        }
    }
}
