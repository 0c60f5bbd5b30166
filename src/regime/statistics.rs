// =============================================================================
// Per-Regime Statistics and Transition Matrix
// =============================================================================
//
// Every label that occurs takes part, `Unknown` included: warm-up points get
// their own row in the table and their own row and column in the matrix.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{RegimeLabel, RegimeSeries};
use crate::stats::{annualized_sharpe, mean, sample_std, skewness, TRADING_DAYS};
use crate::types::Series;

/// Return statistics for one regime.  Percent fields are already scaled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeStats {
    pub regime: RegimeLabel,
    pub count: usize,
    pub pct_time: f64,
    pub ann_return_pct: Option<f64>,
    pub ann_vol_pct: Option<f64>,
    pub sharpe: Option<f64>,
    pub skewness: Option<f64>,
    pub worst_pct: Option<f64>,
    pub best_pct: Option<f64>,
}

/// Per-regime statistics, sorted by ascending annualized volatility
/// (regimes without a volatility last).
///
/// `returns` and `regimes` must share an index; points where the return is
/// undefined are skipped.  `pct_time` is relative to all defined returns.
pub fn regime_statistics(returns: &Series, regimes: &RegimeSeries) -> Vec<RegimeStats> {
    debug_assert_eq!(returns.len(), regimes.len());
    if regimes.is_empty() {
        return Vec::new();
    }
    let mut grouped: BTreeMap<RegimeLabel, Vec<f64>> = BTreeMap::new();
    for (value, &label) in returns.values().iter().zip(regimes.labels()) {
        if let Some(r) = value {
            grouped.entry(label).or_default().push(*r);
        }
    }

    let total: usize = grouped.values().map(Vec::len).sum();
    let mut table: Vec<RegimeStats> = grouped
        .into_iter()
        .map(|(regime, r)| RegimeStats {
            regime,
            count: r.len(),
            pct_time: r.len() as f64 / total as f64 * 100.0,
            ann_return_pct: mean(&r).map(|m| m * TRADING_DAYS * 100.0),
            ann_vol_pct: sample_std(&r).map(|s| s * TRADING_DAYS.sqrt() * 100.0),
            sharpe: annualized_sharpe(&r),
            skewness: skewness(&r),
            worst_pct: r.iter().copied().reduce(f64::min).map(|v| v * 100.0),
            best_pct: r.iter().copied().reduce(f64::max).map(|v| v * 100.0),
        })
        .collect();

    table.sort_by(|a, b| match (a.ann_vol_pct, b.ann_vol_pct) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.regime.cmp(&b.regime),
    });
    table
}

// =============================================================================
// TransitionMatrix
// =============================================================================

/// Empirical P(regime at t | regime at t-1).
///
/// A label appears as a row only if it was followed by another observation
/// at least once; every row sums to one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionMatrix {
    counts: BTreeMap<RegimeLabel, BTreeMap<RegimeLabel, usize>>,
}

impl TransitionMatrix {
    pub fn from_regimes(regimes: &RegimeSeries) -> Self {
        let mut counts: BTreeMap<RegimeLabel, BTreeMap<RegimeLabel, usize>> = BTreeMap::new();
        for pair in regimes.labels().windows(2) {
            *counts.entry(pair[0]).or_default().entry(pair[1]).or_default() += 1;
        }
        Self { counts }
    }

    /// Every label seen on either side of a transition, ordered.
    pub fn labels(&self) -> Vec<RegimeLabel> {
        let mut all: Vec<RegimeLabel> = self
            .counts
            .iter()
            .flat_map(|(from, row)| std::iter::once(*from).chain(row.keys().copied()))
            .collect();
        all.sort();
        all.dedup();
        all
    }

    pub fn count(&self, from: RegimeLabel, to: RegimeLabel) -> usize {
        self.counts
            .get(&from)
            .and_then(|row| row.get(&to))
            .copied()
            .unwrap_or(0)
    }

    /// `None` when `from` never has a successor.
    pub fn probability(&self, from: RegimeLabel, to: RegimeLabel) -> Option<f64> {
        let total: usize = self.counts.get(&from)?.values().sum();
        Some(self.count(from, to) as f64 / total as f64)
    }

    /// Normalised row for `from`.
    pub fn row(&self, from: RegimeLabel) -> Option<BTreeMap<RegimeLabel, f64>> {
        let row = self.counts.get(&from)?;
        let total: usize = row.values().sum();
        Some(
            row.iter()
                .map(|(to, c)| (*to, *c as f64 / total as f64))
                .collect(),
        )
    }

    /// Number of observed regime switches.
    pub fn switch_count(&self) -> usize {
        self.counts
            .iter()
            .flat_map(|(from, row)| row.iter().filter(move |(to, _)| *to != from))
            .map(|(_, c)| *c)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tests::{daily_index, daily_series};
    use RegimeLabel::*;

    fn regimes(labels: &[RegimeLabel]) -> RegimeSeries {
        RegimeSeries::new(daily_index(labels.len()), labels.to_vec())
    }

    #[test]
    fn rows_sum_to_one_and_terminal_label_has_no_row() {
        let r = regimes(&[Normal, Normal, LowVol, Normal, LowVol, Normal, Crisis]);
        let m = TransitionMatrix::from_regimes(&r);
        for from in m.labels() {
            if let Some(row) = m.row(from) {
                assert!((row.values().sum::<f64>() - 1.0).abs() < 1e-12);
            }
        }
        // Crisis only ever appears last.
        assert!(m.row(Crisis).is_none());
        assert!(m.probability(Crisis, Normal).is_none());
        assert_eq!(m.labels(), vec![LowVol, Normal, Crisis]);
        // Normal -> {Normal, LowVol, LowVol, Crisis}
        assert!((m.probability(Normal, LowVol).unwrap() - 0.5).abs() < 1e-12);
        assert!((m.probability(Normal, Crisis).unwrap() - 0.25).abs() < 1e-12);
        assert_eq!(m.probability(LowVol, Crisis), Some(0.0));
        assert_eq!(m.switch_count(), 5);
    }

    #[test]
    fn unknown_is_a_state_of_the_matrix() {
        let r = regimes(&[Unknown, Unknown, Normal, Normal, Unknown, Normal]);
        let m = TransitionMatrix::from_regimes(&r);
        assert_eq!(m.labels(), vec![Normal, Unknown]);
        assert_eq!(m.count(Unknown, Unknown), 1);
        assert_eq!(m.count(Unknown, Normal), 2);
        assert_eq!(m.count(Normal, Normal), 1);
        assert_eq!(m.count(Normal, Unknown), 1);
        assert!((m.probability(Unknown, Normal).unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.probability(Normal, Unknown).unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(m.switch_count(), 3);
    }

    #[test]
    fn stats_group_and_sort_by_volatility() {
        let returns = daily_series(&[0.0, 0.01, -0.01, 0.05, -0.05, 0.04, 0.001]);
        let r = regimes(&[Unknown, Normal, Normal, Crisis, Crisis, Crisis, Normal]);
        let table = regime_statistics(&returns, &r);
        assert_eq!(table.len(), 3);
        assert_eq!(table[0].regime, Normal);
        assert_eq!(table[1].regime, Crisis);
        assert_eq!(table[0].count, 3);
        assert_eq!(table[1].count, 3);
        assert!((table[0].pct_time - 300.0 / 7.0).abs() < 1e-12);
        let total: f64 = table.iter().map(|s| s.pct_time).sum();
        assert!((total - 100.0).abs() < 1e-9);
        assert!((table[1].best_pct.unwrap() - 5.0).abs() < 1e-12);
        assert!((table[1].worst_pct.unwrap() + 5.0).abs() < 1e-12);
        assert!(table[0].ann_vol_pct.unwrap() < table[1].ann_vol_pct.unwrap());
        // One warm-up point: no volatility, so it sorts last.
        assert_eq!(table[2].regime, Unknown);
        assert_eq!(table[2].count, 1);
        assert!((table[2].pct_time - 100.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn undefined_returns_are_not_counted() {
        let values = vec![None, Some(0.01), Some(-0.01), Some(0.02)];
        let returns = Series::new(daily_index(4), values).unwrap();
        let r = regimes(&[Unknown, Unknown, Normal, Normal]);
        let table = regime_statistics(&returns, &r);
        let unknown = table.iter().find(|s| s.regime == Unknown).unwrap();
        assert_eq!(unknown.count, 1);
        assert!((unknown.pct_time - 100.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn single_observation_regime_sorts_last() {
        let returns = daily_series(&[0.01, -0.01, 0.02, 0.03]);
        let r = regimes(&[Normal, Normal, Normal, Crisis]);
        let table = regime_statistics(&returns, &r);
        assert_eq!(table.last().unwrap().regime, Crisis);
        assert!(table.last().unwrap().ann_vol_pct.is_none());
        assert!(table.last().unwrap().sharpe.is_none());
    }
}
