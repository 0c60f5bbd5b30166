// =============================================================================
// Sample Moments, Correlation and Least Squares
// =============================================================================
//
// Conventions:
//   - Standard deviation uses the sample (n - 1) denominator.
//   - Annualization assumes 252 trading periods per year:
//       annual mean = mean * 252,  annual vol = std * sqrt(252)
//   - Skewness is the adjusted Fisher-Pearson coefficient
//       G1 = sqrt(n (n - 1)) / (n - 2) * m3 / m2^1.5
//     with m2, m3 the biased central moments.

use serde::{Deserialize, Serialize};

/// Trading periods per year.
pub const TRADING_DAYS: f64 = 252.0;

/// Standard deviations below this are treated as zero variance.
pub(crate) const MIN_STD: f64 = f64::EPSILON;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation.  Exactly `0.0` when every value is identical,
/// `None` below two points.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let first = values[0];
    if values.iter().all(|&v| v == first) {
        return Some(0.0);
    }
    let m = mean(values)?;
    let ss = values.iter().map(|x| (x - m).powi(2)).sum::<f64>();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

/// Adjusted Fisher-Pearson skewness.  `None` below three points or when the
/// sample has no variance.
pub fn skewness(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 3 {
        return None;
    }
    let m = mean(values)?;
    let nf = n as f64;
    let m2 = values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / nf;
    let m3 = values.iter().map(|x| (x - m).powi(3)).sum::<f64>() / nf;
    if m2.sqrt() < MIN_STD {
        return None;
    }
    let g1 = m3 / m2.powf(1.5);
    Some((nf * (nf - 1.0)).sqrt() / (nf - 2.0) * g1)
}

/// Annualized Sharpe ratio of a return sample (zero risk-free rate).
pub fn annualized_sharpe(returns: &[f64]) -> Option<f64> {
    let m = mean(returns)?;
    let s = sample_std(returns)?;
    if s < MIN_STD {
        return None;
    }
    Some((m * TRADING_DAYS) / (s * TRADING_DAYS.sqrt()))
}

/// Pearson correlation of two equally long samples.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let mx = mean(x)?;
    let my = mean(y)?;

    let mut cov = 0.0_f64;
    let mut var_x = 0.0_f64;
    let mut var_y = 0.0_f64;
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - mx;
        let dy = yi - my;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denominator = (var_x * var_y).sqrt();
    if denominator < MIN_STD {
        return None;
    }
    Some((cov / denominator).clamp(-1.0, 1.0))
}

/// Result of a simple linear regression `y = intercept + slope * x`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

/// Ordinary least squares of `y` on `x`.  `None` when `x` has no variance.
pub fn ols(x: &[f64], y: &[f64]) -> Option<LinearFit> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let mx = mean(x)?;
    let my = mean(y)?;

    // slope = Σ((x-x̄)(y-ȳ)) / Σ((x-x̄)²)
    let mut numerator = 0.0_f64;
    let mut denominator = 0.0_f64;
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - mx;
        numerator += dx * (yi - my);
        denominator += dx * dx;
    }

    if denominator.abs() < f64::EPSILON {
        return None;
    }

    let slope = numerator / denominator;
    Some(LinearFit {
        slope,
        intercept: my - slope * mx,
    })
}

/// Largest peak-to-trough decline of the compounded equity curve
/// `Π(1 + r)`, in percent (<= 0).
pub fn max_drawdown_pct(returns: &[f64]) -> Option<f64> {
    if returns.is_empty() {
        return None;
    }
    let mut equity = 1.0_f64;
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for r in returns {
        equity *= 1.0 + r;
        peak = peak.max(equity);
        if peak > 0.0 {
            worst = worst.min(equity / peak - 1.0);
        }
    }
    Some(worst * 100.0)
}

// =============================================================================
// ReturnSummary
// =============================================================================

/// Whole-sample performance figures for a return series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnSummary {
    pub observations: usize,
    /// Annualized mean return, percent.
    pub annual_return_pct: Option<f64>,
    /// Annualized volatility, percent.
    pub annual_vol_pct: Option<f64>,
    pub sharpe: Option<f64>,
    /// Maximum drawdown, percent (<= 0).
    pub max_drawdown_pct: Option<f64>,
}

impl ReturnSummary {
    pub fn from_returns(returns: &[f64]) -> Self {
        Self {
            observations: returns.len(),
            annual_return_pct: mean(returns).map(|m| m * TRADING_DAYS * 100.0),
            annual_vol_pct: sample_std(returns).map(|s| s * TRADING_DAYS.sqrt() * 100.0),
            sharpe: annualized_sharpe(returns),
            max_drawdown_pct: max_drawdown_pct(returns),
        }
    }
}
