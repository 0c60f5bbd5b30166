// =============================================================================
// Analysis errors — structural input failures only
// =============================================================================
//
// Statistically degenerate input (short windows, zero variance) is never an
// error: it surfaces as `None` values or typed sentinels.  Everything in this
// enum means the caller handed over something that cannot be a time series,
// or asked for a component this build does not ship.

use chrono::{DateTime, Utc};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Timestamps must be strictly increasing (which also rules out duplicates).
    #[error("timestamp at index {index} ({current}) is not after the previous one ({previous})")]
    NonIncreasingTimestamp {
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("series has {timestamps} timestamps but {values} values")]
    LengthMismatch { timestamps: usize, values: usize },

    #[error("empty series: {0}")]
    EmptySeries(&'static str),

    /// Log returns need strictly positive, finite prices.
    #[error("price at index {index} is not a positive finite number ({value})")]
    InvalidPrice { index: usize, value: f64 },

    #[error("latent-state classifier unavailable: {0}")]
    LatentStateUnavailable(String),

    #[error("latent-state fit failed: {0}")]
    LatentStateFit(String),
}
