// =============================================================================
// Statistics Module
// =============================================================================
//
// Pure, side-effect-free building blocks for the decay and regime analyses.
// Every function returns `Option<T>` (or a `Series` of options) so callers
// are forced to handle insufficient-data and zero-variance cases.

pub mod moments;
pub mod rolling;

pub use moments::{annualized_sharpe, mean, ols, sample_std, skewness, ReturnSummary, TRADING_DAYS};
pub use rolling::{
    rolling_annualized_return, rolling_autocorrelation, rolling_sharpe, rolling_volatility,
};
