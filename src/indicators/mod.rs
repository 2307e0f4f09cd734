// =============================================================================
// Indicators Module
// =============================================================================
//
// Pure, side-effect-free overlay computations. Functions here take the candle
// series as input and return fresh output series; they carry no state between
// calls.

pub mod sma;
