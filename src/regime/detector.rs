// =============================================================================
// Regime Detector
// =============================================================================
//
// Runs the configured classifier over a return series and summarises the
// resulting labels.  Selection is explicit:
//
//   1. `volatility`  threshold classifier
//   2. `hmm`         latent-state classifier; if it cannot be built (feature
//                    missing, bad state count) or its fit fails, log a
//                    warning and run the threshold classifier instead
//
// The analysis always records which method actually produced the labels.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::classifier::{LatentStateClassifier, RegimeClassifier, ThresholdClassifier};
use super::statistics::{regime_statistics, RegimeStats, TransitionMatrix};
use super::{RegimeLabel, RegimeSeries};
use crate::error::{AnalysisError, Result};
use crate::types::Series;

// =============================================================================
// Types
// =============================================================================

/// Classification method named in the config (`"volatility"` or `"hmm"`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimeMethod {
    /// Rolling annualized volatility against the band table.
    #[default]
    Volatility,
    /// Gaussian hidden Markov model, ranked by state mean.
    Hmm,
}

impl std::fmt::Display for RegimeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Volatility => write!(f, "volatility"),
            Self::Hmm => write!(f, "hmm"),
        }
    }
}

/// Labels plus everything derived from them.
///
/// `regimes` shares the index of the classified return series, warm-up
/// included.  `stats` and `transitions` are built from those same labels,
/// so an `Unknown` warm-up stretch shows up in both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeAnalysis {
    pub method_requested: RegimeMethod,
    /// Method that actually produced `regimes`.
    pub method_used: RegimeMethod,
    /// Why the requested method was not used, if it was not.
    pub fallback_reason: Option<String>,
    pub regimes: RegimeSeries,
    /// Sorted by ascending annualized volatility.
    pub stats: Vec<RegimeStats>,
    pub transitions: TransitionMatrix,
    /// Label of the last observation; `None` only for an empty series.
    pub current_regime: Option<RegimeLabel>,
}

impl RegimeAnalysis {
    /// True when the latent-state method was requested but thresholds ran.
    pub fn fell_back(&self) -> bool {
        self.method_used != self.method_requested
    }
}

// =============================================================================
// RegimeDetector
// =============================================================================

/// Chooses a classifier, runs it, and summarises the labels.
///
/// The threshold classifier is always built, since it doubles as the
/// fallback.  The latent-state classifier is built per call from the stored
/// parameters, so a bad state count surfaces as a fallback rather than a
/// construction error.
#[derive(Debug, Clone)]
pub struct RegimeDetector {
    method: RegimeMethod,
    threshold: ThresholdClassifier,
    hmm_states: usize,
    hmm_max_iter: usize,
    hmm_tol: f64,
}

impl RegimeDetector {
    pub fn new(method: RegimeMethod, threshold: ThresholdClassifier) -> Self {
        Self {
            method,
            threshold,
            hmm_states: 3,
            hmm_max_iter: 200,
            hmm_tol: 1e-4,
        }
    }

    /// Latent-state parameters: number of states, EM iteration cap and
    /// log-likelihood convergence tolerance.  Defaults are 3, 200 and 1e-4.
    pub fn with_latent_state(mut self, n_states: usize, max_iter: usize, tol: f64) -> Self {
        self.hmm_states = n_states;
        self.hmm_max_iter = max_iter;
        self.hmm_tol = tol;
        self
    }

    /// Classify `returns` and build statistics and transitions.
    ///
    /// Only an empty input is an error; a failing latent-state fit is
    /// recovered by the threshold fallback.
    pub fn detect(&self, returns: &Series) -> Result<RegimeAnalysis> {
        if returns.is_empty() {
            return Err(AnalysisError::EmptySeries("regime returns"));
        }

        let (method_used, fallback_reason, regimes) = match self.method {
            RegimeMethod::Volatility => (RegimeMethod::Volatility, None, self.threshold.classify(returns)?),
            RegimeMethod::Hmm => match self.classify_latent(returns) {
                Ok(regimes) => (RegimeMethod::Hmm, None, regimes),
                Err(e) => {
                    warn!(
                        error = %e,
                        fallback = self.threshold.name(),
                        "latent-state classification unavailable, using volatility thresholds"
                    );
                    (
                        RegimeMethod::Volatility,
                        Some(e.to_string()),
                        self.threshold.classify(returns)?,
                    )
                }
            },
        };

        let stats = regime_statistics(returns, &regimes);
        let transitions = TransitionMatrix::from_regimes(&regimes);
        let current_regime = regimes.current();

        debug!(
            changes = regimes.changes().len(),
            switches = transitions.switch_count(),
            "regime transitions computed"
        );
        info!(
            method = %method_used,
            regimes = stats.len(),
            current = ?current_regime.map(|r| r.to_string()),
            "regime analysis complete"
        );

        Ok(RegimeAnalysis {
            method_requested: self.method,
            method_used,
            fallback_reason,
            regimes,
            stats,
            transitions,
            current_regime,
        })
    }

    fn classify_latent(&self, returns: &Series) -> Result<RegimeSeries> {
        LatentStateClassifier::new(self.hmm_states, self.hmm_max_iter, self.hmm_tol)?
            .classify(returns)
    }
}

impl Default for RegimeDetector {
    fn default() -> Self {
        Self::new(RegimeMethod::Volatility, ThresholdClassifier::default())
    }
}
