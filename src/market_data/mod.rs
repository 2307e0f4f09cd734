// Market data layer: the bounded per-symbol candle store and the kline
// WebSocket ingestor that feeds it.

pub mod kline_stream;
pub mod series_store;

pub use kline_stream::KlineUpdate;
pub use series_store::{MergeOutcome, SeriesStore};
