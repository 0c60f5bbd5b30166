// =============================================================================
// Mean-Reversion Half-Life — discrete Ornstein-Uhlenbeck approximation
// =============================================================================
//
// Regress the one-step change on the lagged level:
//
//   x_t - x_{t-1} = a + b * x_{t-1} + e_t
//
// b plays the role of -theta (mean-reversion speed), so the half-life
//
//   t_half = -ln(2) / b
//
// exists only for b < 0.  b >= 0 means deviations do not decay.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::stats::ols;
use crate::types::Series;

/// Minimum number of (lagged, change) pairs required for the regression.
pub const MIN_PAIRS: usize = 30;

/// Outcome of a half-life estimation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum HalfLife {
    /// Half-life in the series' native time steps.
    Steps(f64),
    /// Slope >= 0 (or a singular fit): deviations never halve.
    NoMeanReversion,
    /// Fewer than [`MIN_PAIRS`] usable pairs.
    InsufficientData,
}

impl HalfLife {
    /// Numeric view: `Steps` as is, `NoMeanReversion` as +inf.
    pub fn as_f64(self) -> Option<f64> {
        match self {
            Self::Steps(v) => Some(v),
            Self::NoMeanReversion => Some(f64::INFINITY),
            Self::InsufficientData => None,
        }
    }

    pub fn interpretation(self) -> &'static str {
        match self.as_f64() {
            None => "not enough data",
            Some(h) if h < 5.0 => "very fast mean-reversion",
            Some(h) if h < 60.0 => "short-term mean-reversion",
            Some(h) if h < 252.0 => "medium-term signal",
            Some(_) => "long-term trend / very slow mean-reversion",
        }
    }
}

impl std::fmt::Display for HalfLife {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Steps(v) => write!(f, "{v:.1}"),
            Self::NoMeanReversion => write!(f, "inf"),
            Self::InsufficientData => write!(f, "n/a"),
        }
    }
}

/// Estimate the mean-reversion half-life of `series`.
pub fn estimate_half_life(series: &Series) -> HalfLife {
    let values = series.values();

    let mut lagged = Vec::with_capacity(values.len());
    let mut change = Vec::with_capacity(values.len());
    for pair in values.windows(2) {
        if let (Some(prev), Some(cur)) = (pair[0], pair[1]) {
            lagged.push(prev);
            change.push(cur - prev);
        }
    }

    if lagged.len() < MIN_PAIRS {
        trace!(
            pairs = lagged.len(),
            min = MIN_PAIRS,
            "half-life: insufficient data"
        );
        return HalfLife::InsufficientData;
    }

    let Some(fit) = ols(&lagged, &change) else {
        trace!("half-life: singular regression (constant series)");
        return HalfLife::NoMeanReversion;
    };

    if fit.slope >= 0.0 {
        trace!(
            slope = format!("{:.6}", fit.slope),
            "half-life: no mean reversion"
        );
        return HalfLife::NoMeanReversion;
    }

    let half_life = -std::f64::consts::LN_2 / fit.slope;
    trace!(
        slope = format!("{:.6}", fit.slope),
        half_life = format!("{:.2}", half_life),
        "half-life estimated"
    );
    HalfLife::Steps(half_life)
}
