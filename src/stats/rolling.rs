// =============================================================================
// Rolling-Window Statistics
// =============================================================================
//
// Every function here returns a `Series` on the input's index.  The value at
// index i is computed from the trailing window `values[i + 1 - window ..= i]`
// (the window includes the current observation), so the first `window - 1`
// points are undefined.  A window that contains an undefined input point is
// undefined as well.
//
// Degenerate windows (zero variance) yield `None`; nothing here panics or
// returns an error on statistically poor input.

use tracing::trace;

use super::moments::{mean, pearson, sample_std, MIN_STD, TRADING_DAYS};
use crate::types::Series;

/// Apply `f` to every full trailing window of `series`.
fn rolling_apply<F>(series: &Series, window: usize, f: F) -> Series
where
    F: Fn(&[f64]) -> Option<f64>,
{
    let values = series.values();
    let n = values.len();
    let mut out = vec![None; n];

    if window == 0 || n < window {
        trace!(len = n, window, "rolling: window longer than series");
        return series.with_values(out);
    }

    let mut buf: Vec<f64> = Vec::with_capacity(window);
    for end in window - 1..n {
        buf.clear();
        let start = end + 1 - window;
        let complete = values[start..=end].iter().all(|v| match v {
            Some(x) => {
                buf.push(*x);
                true
            }
            None => false,
        });
        if complete {
            out[end] = f(&buf);
        }
    }

    series.with_values(out)
}

pub fn rolling_mean(series: &Series, window: usize) -> Series {
    rolling_apply(series, window, mean)
}

/// Rolling sample standard deviation.
pub fn rolling_std(series: &Series, window: usize) -> Series {
    rolling_apply(series, window, sample_std)
}

/// Rolling annualized mean return in percent: `mean * 252 * 100`.
pub fn rolling_annualized_return(returns: &Series, window: usize) -> Series {
    rolling_apply(returns, window, |w| mean(w).map(|m| m * TRADING_DAYS * 100.0))
}

/// Rolling annualized volatility in percent: `std * sqrt(252) * 100`.
pub fn rolling_volatility(returns: &Series, window: usize) -> Series {
    rolling_apply(returns, window, |w| {
        sample_std(w).map(|s| s * TRADING_DAYS.sqrt() * 100.0)
    })
}

/// Rolling annualized Sharpe ratio.
///
/// `(mean * 252) / (std * sqrt(252))` over each trailing window; undefined
/// where the window is incomplete or has zero standard deviation.
pub fn rolling_sharpe(returns: &Series, window: usize) -> Series {
    rolling_apply(returns, window, |w| {
        let m = mean(w)?;
        let s = sample_std(w)?;
        if s < MIN_STD {
            return None;
        }
        Some((m * TRADING_DAYS) / (s * TRADING_DAYS.sqrt()))
    })
}

/// Rolling lag-1 autocorrelation.
///
/// Within each window of length `window`, the Pearson correlation between
/// `w[1..]` and `w[..window - 1]`.  Needs at least three points per window;
/// zero variance on either side yields `None`.
pub fn rolling_autocorrelation(series: &Series, window: usize) -> Series {
    rolling_apply(series, window, |w| {
        if w.len() < 3 {
            return None;
        }
        pearson(&w[1..], &w[..w.len() - 1])
    })
}
