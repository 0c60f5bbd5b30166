// =============================================================================
// Signal Decay Analyzer
// =============================================================================
//
// Answers "is this return stream losing its edge?" from several angles:
//
//   - whole-sample performance and max drawdown
//   - first-half vs second-half Sharpe and a decay verdict
//   - rolling annualized return, volatility and Sharpe (window), plus the
//     Sharpe's linear trend per year
//   - rolling lag-1 autocorrelation (2 x window)
//   - half-life of the cumulative return path
//   - CUSUM breakpoints in cumulative performance

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::breakpoints::BreakpointDetector;
use super::half_life::{estimate_half_life, HalfLife};
use crate::error::{AnalysisError, Result};
use crate::stats::{
    annualized_sharpe, ols, rolling_annualized_return, rolling_autocorrelation, rolling_sharpe,
    rolling_volatility, ReturnSummary,
};
use crate::types::Series;

/// Minimum number of defined rolling-Sharpe points before a trend is fitted.
const MIN_TREND_POINTS: usize = 100;

/// How the second half of the sample compares with the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayVerdict {
    /// Second-half Sharpe below half of the first-half Sharpe.
    Significant,
    /// Second-half Sharpe below the first-half Sharpe.
    Moderate,
    Stable,
    /// One of the halves has no Sharpe (zero variance or too short).
    Undetermined,
}

impl DecayVerdict {
    fn from_halves(first: Option<f64>, second: Option<f64>) -> Self {
        match (first, second) {
            (Some(s1), Some(s2)) if s2 < s1 * 0.5 => Self::Significant,
            (Some(s1), Some(s2)) if s2 < s1 => Self::Moderate,
            (Some(_), Some(_)) => Self::Stable,
            _ => Self::Undetermined,
        }
    }
}

impl std::fmt::Display for DecayVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Significant => write!(f, "WARNING: significant decay (Sharpe dropped >50%)"),
            Self::Moderate => write!(f, "NOTICE: moderate decay"),
            Self::Stable => write!(f, "OK: stable or improving"),
            Self::Undetermined => write!(f, "undetermined (degenerate half)"),
        }
    }
}

/// Everything the decay analysis produces for one return stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayReport {
    pub window: usize,
    pub summary: ReturnSummary,
    pub first_half_sharpe: Option<f64>,
    pub second_half_sharpe: Option<f64>,
    pub verdict: DecayVerdict,
    pub half_life: HalfLife,
    pub breakpoints: Vec<DateTime<Utc>>,
    /// Annualized mean return over each window, percent.
    pub rolling_return: Series,
    /// Annualized volatility over each window, percent.
    pub rolling_volatility: Series,
    pub rolling_sharpe: Series,
    /// Linear trend of the rolling Sharpe, per year.
    pub sharpe_trend_per_year: Option<f64>,
    pub rolling_autocorrelation: Series,
}

impl DecayReport {
    pub fn sharpe_change(&self) -> Option<f64> {
        Some(self.second_half_sharpe? - self.first_half_sharpe?)
    }
}

#[derive(Debug, Clone)]
pub struct DecayAnalyzer {
    window: usize,
    breakpoints: BreakpointDetector,
}

impl DecayAnalyzer {
    pub fn new(window: usize, breakpoint_threshold: f64, min_gap_days: i64) -> Self {
        Self {
            window,
            breakpoints: BreakpointDetector::new(window, breakpoint_threshold)
                .with_min_gap(Duration::days(min_gap_days)),
        }
    }

    pub fn analyze(&self, returns: &Series) -> Result<DecayReport> {
        if returns.defined_count() == 0 {
            return Err(AnalysisError::EmptySeries("signal returns"));
        }

        let defined = returns.defined_values();
        let summary = ReturnSummary::from_returns(&defined);

        let mid = defined.len() / 2;
        let first_half_sharpe = annualized_sharpe(&defined[..mid]);
        let second_half_sharpe = annualized_sharpe(&defined[mid..]);
        let verdict = DecayVerdict::from_halves(first_half_sharpe, second_half_sharpe);

        let rolling_return = rolling_annualized_return(returns, self.window);
        let rolling_volatility = rolling_volatility(returns, self.window);
        let rolling_sharpe = rolling_sharpe(returns, self.window);
        if rolling_sharpe.is_all_undefined() {
            debug!(window = self.window, "rolling Sharpe undefined at every point");
        }
        let sharpe_trend_per_year = trend_per_year(&rolling_sharpe);
        let rolling_autocorrelation = rolling_autocorrelation(returns, self.window * 2);

        let half_life = estimate_half_life(&returns.cumulative_sum());
        let breakpoints = self.breakpoints.scan(returns).events;

        debug!(
            first_half = ?first_half_sharpe.map(|s| format!("{s:.3}")),
            second_half = ?second_half_sharpe.map(|s| format!("{s:.3}")),
            trend = ?sharpe_trend_per_year.map(|s| format!("{s:.4}")),
            "decay statistics computed"
        );
        info!(
            observations = summary.observations,
            half_life = %half_life,
            breakpoints = breakpoints.len(),
            verdict = ?verdict,
            "decay analysis complete"
        );

        Ok(DecayReport {
            window: self.window,
            summary,
            first_half_sharpe,
            second_half_sharpe,
            verdict,
            half_life,
            breakpoints,
            rolling_return,
            rolling_volatility,
            rolling_sharpe,
            sharpe_trend_per_year,
            rolling_autocorrelation,
        })
    }
}

/// OLS slope of the defined rolling-Sharpe points against their position,
/// scaled to a yearly rate.
fn trend_per_year(rolling_sharpe: &Series) -> Option<f64> {
    let y = rolling_sharpe.defined_values();
    if y.len() <= MIN_TREND_POINTS {
        return None;
    }
    let x: Vec<f64> = (0..y.len()).map(|i| i as f64).collect();
    ols(&x, &y).map(|fit| fit.slope * 252.0)
}
