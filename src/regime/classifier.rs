// =============================================================================
// Regime Classifiers
// =============================================================================
//
// Two interchangeable strategies behind `RegimeClassifier`:
//
//   ThresholdClassifier    rolling annualized vol bucketed by an ordered
//                          band table (strict `<` upper bounds, first match)
//   LatentStateClassifier  Gaussian HMM fitted to the whole sample, states
//                          ranked by mean return
//
// Both return one label per input index; positions without data are
// `Unknown`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{RegimeLabel, RegimeSeries};
use crate::error::{AnalysisError, Result};
use crate::stats::rolling_volatility;
use crate::types::Series;

pub trait RegimeClassifier {
    fn name(&self) -> &'static str;

    /// Label every index of `returns`.
    fn classify(&self, returns: &Series) -> Result<RegimeSeries>;
}

// =============================================================================
// Threshold strategy
// =============================================================================

/// One row of the volatility band table.  `upper: None` is the catch-all.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolBand {
    pub upper: Option<f64>,
    pub label: RegimeLabel,
}

impl VolBand {
    pub fn below(upper: f64, label: RegimeLabel) -> Self {
        Self { upper: Some(upper), label }
    }

    pub fn otherwise(label: RegimeLabel) -> Self {
        Self { upper: None, label }
    }

    fn matches(&self, vol_pct: f64) -> bool {
        self.upper.map_or(true, |u| vol_pct < u)
    }
}

pub fn default_vol_bands() -> Vec<VolBand> {
    vec![
        VolBand::below(10.0, RegimeLabel::LowVol),
        VolBand::below(20.0, RegimeLabel::Normal),
        VolBand::below(30.0, RegimeLabel::Elevated),
        VolBand::otherwise(RegimeLabel::Crisis),
    ]
}

#[derive(Debug, Clone)]
pub struct ThresholdClassifier {
    window: usize,
    bands: Vec<VolBand>,
}

impl ThresholdClassifier {
    /// Bands are sorted by upper bound (catch-all last) before use.
    pub fn new(window: usize, mut bands: Vec<VolBand>) -> Self {
        bands.sort_by(|a, b| match (a.upper, b.upper) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        Self { window, bands }
    }

    /// Label for one annualized volatility reading (percent).
    pub fn label_for(&self, vol_pct: f64) -> RegimeLabel {
        self.bands
            .iter()
            .find(|b| b.matches(vol_pct))
            .map_or(RegimeLabel::Unknown, |b| b.label)
    }
}

impl Default for ThresholdClassifier {
    fn default() -> Self {
        Self::new(20, default_vol_bands())
    }
}

impl RegimeClassifier for ThresholdClassifier {
    fn name(&self) -> &'static str {
        "volatility"
    }

    fn classify(&self, returns: &Series) -> Result<RegimeSeries> {
        let vol = rolling_volatility(returns, self.window);
        let labels = vol
            .values()
            .iter()
            .map(|v| v.map_or(RegimeLabel::Unknown, |x| self.label_for(x)))
            .collect();
        Ok(RegimeSeries::new(returns.timestamps().to_vec(), labels))
    }
}

// =============================================================================
// Latent-state strategy
// =============================================================================

/// Gaussian hidden Markov model classifier.
///
/// The model is fitted on the full sample and decoded with Viterbi, so a
/// label can depend on observations that come after it.  Use the output for
/// ex-post analysis only, never as a live trading signal.
#[derive(Debug, Clone)]
pub struct LatentStateClassifier {
    n_states: usize,
    max_iter: usize,
    tol: f64,
}

impl LatentStateClassifier {
    pub fn new(n_states: usize, max_iter: usize, tol: f64) -> Result<Self> {
        if !cfg!(feature = "latent-state") {
            return Err(AnalysisError::LatentStateUnavailable(
                "built without the `latent-state` feature".into(),
            ));
        }
        if n_states < 2 {
            return Err(AnalysisError::LatentStateUnavailable(format!(
                "a latent-state model needs at least 2 states, got {n_states}"
            )));
        }
        Ok(Self { n_states, max_iter, tol })
    }

    /// Fixed label for the state of mean rank `rank`.
    pub fn label_for_rank(&self, rank: usize) -> RegimeLabel {
        match (self.n_states, rank) {
            (3, 0) => RegimeLabel::Crisis,
            (3, 1) => RegimeLabel::Normal,
            (3, _) => RegimeLabel::Bull,
            (2, 0) => RegimeLabel::Bear,
            (2, _) => RegimeLabel::Bull,
            (_, k) => RegimeLabel::State(k),
        }
    }
}

#[cfg(feature = "latent-state")]
impl RegimeClassifier for LatentStateClassifier {
    fn name(&self) -> &'static str {
        "hmm"
    }

    fn classify(&self, returns: &Series) -> Result<RegimeSeries> {
        use super::hmm::GaussianHmm;

        let observations = returns.defined_values();
        let model = GaussianHmm::fit(&observations, self.n_states, self.max_iter, self.tol)?;
        let ranks = model.mean_ranks();
        let mut path = model.decode(&observations).into_iter();

        debug!(
            states = self.n_states,
            iterations = model.iterations(),
            log_likelihood = ?model.log_likelihood().map(|ll| format!("{:.2}", ll)),
            means = ?model.means().iter().map(|m| format!("{:.5}", m)).collect::<Vec<_>>(),
            vols = ?model.variances().iter().map(|v| format!("{:.5}", v.sqrt())).collect::<Vec<_>>(),
            "HMM fitted"
        );

        let labels = returns
            .values()
            .iter()
            .map(|v| match v.and_then(|_| path.next()) {
                Some(state) => self.label_for_rank(ranks[state]),
                None => RegimeLabel::Unknown,
            })
            .collect();
        Ok(RegimeSeries::new(returns.timestamps().to_vec(), labels))
    }
}

#[cfg(not(feature = "latent-state"))]
impl RegimeClassifier for LatentStateClassifier {
    fn name(&self) -> &'static str {
        "hmm"
    }

    fn classify(&self, _returns: &Series) -> Result<RegimeSeries> {
        Err(AnalysisError::LatentStateUnavailable(
            "built without the `latent-state` feature".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regime::statistics::TransitionMatrix;
    use crate::types::tests::{daily_index, daily_series};
    use RegimeLabel::*;

    /// Alternating +/-1% returns, switching to +/-3% at index 250.
    fn shifted_returns() -> Series {
        let values: Vec<f64> = (0..500)
            .map(|i| {
                let size = if i < 250 { 0.01 } else { 0.03 };
                if i % 2 == 0 { size } else { -size }
            })
            .collect();
        daily_series(&values)
    }

    #[test]
    fn band_boundaries_are_strict() {
        let c = ThresholdClassifier::default();
        assert_eq!(c.label_for(9.99), LowVol);
        assert_eq!(c.label_for(10.0), Normal);
        assert_eq!(c.label_for(19.99), Normal);
        assert_eq!(c.label_for(20.0), Elevated);
        assert_eq!(c.label_for(30.0), Crisis);
        assert_eq!(c.label_for(0.0), LowVol);
    }

    #[test]
    fn bands_are_evaluated_in_ascending_order() {
        let c = ThresholdClassifier::new(
            5,
            vec![
                VolBand::otherwise(Crisis),
                VolBand::below(30.0, Elevated),
                VolBand::below(10.0, LowVol),
            ],
        );
        assert_eq!(c.label_for(5.0), LowVol);
        assert_eq!(c.label_for(15.0), Elevated);
        assert_eq!(c.bands.last().unwrap().upper, None);
    }

    #[test]
    fn table_without_catch_all_leaves_high_vol_unknown() {
        let c = ThresholdClassifier::new(5, vec![VolBand::below(10.0, LowVol)]);
        assert_eq!(c.label_for(50.0), Unknown);
    }

    #[test]
    fn warm_up_is_unknown_and_flat_returns_are_low_vol() {
        let r = daily_series(&[0.001; 30]);
        let regimes = ThresholdClassifier::new(10, default_vol_bands())
            .classify(&r)
            .unwrap();
        assert_eq!(regimes.len(), 30);
        assert!(regimes.labels()[..9].iter().all(|l| *l == Unknown));
        assert!(regimes.labels()[9..].iter().all(|l| *l == LowVol));
    }

    #[test]
    fn volatility_shift_moves_labels_to_high_regimes() {
        let r = shifted_returns();
        let regimes = ThresholdClassifier::default().classify(&r).unwrap();
        let labels = regimes.labels();

        assert!(labels[..19].iter().all(|l| *l == Unknown));
        assert!(labels[19..250].iter().all(|l| matches!(l, LowVol | Normal)));
        assert!(labels[270..].iter().all(|l| matches!(l, Elevated | Crisis)));
        let changes = regimes.changes();
        assert!(!changes.is_empty());
        assert!(changes.iter().all(|&i| (250..270).contains(&i)));

        let m = TransitionMatrix::from_regimes(&regimes);
        assert!(m.probability(Normal, Normal).unwrap() > 0.99);
        assert!(m.count(Normal, Elevated) + m.count(Normal, Crisis) == 1);
        assert_eq!(m.count(Crisis, Normal), 0);
        assert_eq!(regimes.current(), Some(Crisis));
    }

    #[test]
    fn latent_state_rejects_single_state() {
        assert!(LatentStateClassifier::new(1, 100, 1e-4).is_err());
    }

    #[test]
    fn rank_labels() {
        let three = LatentStateClassifier { n_states: 3, max_iter: 10, tol: 1e-4 };
        assert_eq!(three.label_for_rank(0), Crisis);
        assert_eq!(three.label_for_rank(1), Normal);
        assert_eq!(three.label_for_rank(2), Bull);
        let two = LatentStateClassifier { n_states: 2, max_iter: 10, tol: 1e-4 };
        assert_eq!(two.label_for_rank(0), Bear);
        assert_eq!(two.label_for_rank(1), Bull);
        let four = LatentStateClassifier { n_states: 4, max_iter: 10, tol: 1e-4 };
        assert_eq!(four.label_for_rank(3), State(3));
    }

    #[cfg(feature = "latent-state")]
    #[test]
    fn latent_state_labels_follow_mean_return() {
        use crate::regime::hmm::tests::normal_draws;
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let mut rng = StdRng::seed_from_u64(2024);
        let mut values: Vec<Option<f64>> = vec![None];
        values.extend(normal_draws(&mut rng, 200, 0.01, 0.002).into_iter().map(Some));
        values.extend(normal_draws(&mut rng, 200, -0.01, 0.002).into_iter().map(Some));
        let r = Series::new(daily_index(values.len()), values).unwrap();

        let c = LatentStateClassifier::new(2, 200, 1e-6).unwrap();
        let regimes = c.classify(&r).unwrap();
        assert_eq!(regimes.len(), 401);
        assert_eq!(regimes.labels()[0], Unknown);
        let bull = regimes.labels()[1..201].iter().filter(|l| **l == Bull).count();
        let bear = regimes.labels()[201..].iter().filter(|l| **l == Bear).count();
        assert!(bull >= 195, "bull = {bull}");
        assert!(bear >= 195, "bear = {bear}");
    }

    #[cfg(not(feature = "latent-state"))]
    #[test]
    fn latent_state_fails_closed_without_feature() {
        assert!(matches!(
            LatentStateClassifier::new(3, 100, 1e-4),
            Err(AnalysisError::LatentStateUnavailable(_))
        ));
    }
}
