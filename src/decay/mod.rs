// =============================================================================
// Signal Decay Module
// =============================================================================
//
// Tools for judging whether a return stream is losing its edge:
// - Half-life of mean reversion (discrete OU regression)
// - CUSUM breakpoints in cumulative performance
// - Signal return streams (buy-and-hold, lagged momentum)
// - The combined decay report

pub mod analyzer;
pub mod breakpoints;
pub mod half_life;
pub mod signal;

pub use analyzer::{DecayAnalyzer, DecayReport};
pub use signal::SignalKind;
