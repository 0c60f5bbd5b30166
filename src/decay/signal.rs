// =============================================================================
// Signal Return Streams
// =============================================================================
//
// Turns a price history into the return stream whose decay is analysed.
//
//   BuyAndHold — the instrument's own log returns.
//   Momentum   — long when the trailing `lookback` simple return is positive,
//                flat otherwise.  The position decided at t-1 earns the log
//                return of t, so no bar trades on information it has not
//                seen yet.

use serde::{Deserialize, Serialize};

use crate::types::{PriceHistory, Series};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalKind {
    BuyAndHold,
    Momentum { lookback: usize },
}

impl Default for SignalKind {
    fn default() -> Self {
        Self::Momentum { lookback: 252 }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BuyAndHold => write!(f, "buy-and-hold"),
            Self::Momentum { lookback } => write!(f, "momentum({lookback})"),
        }
    }
}

impl SignalKind {
    /// Strategy returns for this signal, trimmed to the first defined point.
    pub fn returns(&self, history: &PriceHistory) -> Series {
        let log_returns = history.log_returns();
        match *self {
            Self::BuyAndHold => log_returns,
            Self::Momentum { lookback } => momentum_returns(history, &log_returns, lookback),
        }
    }
}

fn momentum_returns(history: &PriceHistory, log_returns: &Series, lookback: usize) -> Series {
    let prices = history.prices();

    // position[i] on the price index: 1.0 long, 0.0 flat, None before the
    // lookback is available.
    let position: Vec<Option<f64>> = (0..prices.len())
        .map(|i| {
            if lookback == 0 || i < lookback {
                return None;
            }
            let past = prices.get(i - lookback)?;
            let now = prices.get(i)?;
            Some(if now / past - 1.0 > 0.0 { 1.0 } else { 0.0 })
        })
        .collect();

    // log_returns[k] belongs to price index k + 1; it is earned by the
    // position held at price index k.
    let values: Vec<Option<f64>> = (0..log_returns.len())
        .map(|k| match (position[k], log_returns.get(k)) {
            (Some(p), Some(r)) => Some(p * r),
            _ => None,
        })
        .collect();

    let strategy = log_returns.with_values(values);
    let first = strategy
        .values()
        .iter()
        .position(Option::is_some)
        .unwrap_or(strategy.len());
    strategy.slice(first, strategy.len())
}
