// =============================================================================
// Gaussian Hidden Markov Model — univariate returns
// =============================================================================
//
// Each hidden state j emits returns from N(mu_j, var_j).  The model is fitted
// with Baum-Welch (EM) and decoded with Viterbi:
//
//   E-step: scaled forward-backward gives gamma_t(j) = P(z_t = j | x) and
//           the expected transition counts xi(i, j).
//   M-step: pi = gamma_0,  A(i, j) = xi(i, j) / sum_j xi(i, j),
//           mu_j  = sum_t gamma_t(j) x_t / sum_t gamma_t(j)
//           var_j = sum_t gamma_t(j) (x_t - mu_j)^2 / sum_t gamma_t(j)
//
// Emission densities are evaluated in log space and rescaled by their
// per-step maximum before exponentiation, so outliers cannot underflow every
// state at once.  Initialisation is deterministic: states start at the means
// of equal-count quantile buckets of the sorted sample.
//
// The fit uses the whole sample at once: a decoded state at t depends on
// observations after t.

use std::f64::consts::PI;

use tracing::{debug, trace};

use crate::error::{AnalysisError, Result};
use crate::stats::{mean, sample_std};

/// Observations required per hidden state.
const MIN_OBS_PER_STATE: usize = 10;

/// Floor applied to transition and initial probabilities after each M-step.
const PROB_FLOOR: f64 = 1e-12;

/// Variance floor as a fraction of the sample variance.
const VAR_FLOOR_RATIO: f64 = 1e-3;

/// Self-transition probability used to seed the transition matrix.
const INITIAL_STAY_PROB: f64 = 0.9;

#[derive(Debug, Clone)]
pub struct GaussianHmm {
    initial: Vec<f64>,
    transition: Vec<Vec<f64>>,
    means: Vec<f64>,
    variances: Vec<f64>,
    log_likelihood_history: Vec<f64>,
}

impl GaussianHmm {
    /// Fit an `n_states` model to `observations`.
    pub fn fit(observations: &[f64], n_states: usize, max_iter: usize, tol: f64) -> Result<Self> {
        if n_states < 2 {
            return Err(AnalysisError::LatentStateFit(format!(
                "need at least 2 states, got {n_states}"
            )));
        }
        let required = n_states * MIN_OBS_PER_STATE;
        if observations.len() < required {
            return Err(AnalysisError::LatentStateFit(format!(
                "need at least {required} observations for {n_states} states, got {}",
                observations.len()
            )));
        }
        if observations.iter().any(|x| !x.is_finite()) {
            return Err(AnalysisError::LatentStateFit(
                "observations contain non-finite values".into(),
            ));
        }
        let sample_var = sample_std(observations).map(|s| s * s).unwrap_or(0.0);
        if sample_var <= 0.0 {
            return Err(AnalysisError::LatentStateFit(
                "observations have zero variance".into(),
            ));
        }
        let var_floor = sample_var * VAR_FLOOR_RATIO;

        let mut model = Self::initialise(observations, n_states, sample_var);
        let mut prev_ll = f64::NEG_INFINITY;

        for iter in 0..max_iter {
            let ll = model.em_step(observations, var_floor);
            if !ll.is_finite() {
                return Err(AnalysisError::LatentStateFit(format!(
                    "log-likelihood diverged at iteration {}",
                    iter + 1
                )));
            }
            model.log_likelihood_history.push(ll);

            if (ll - prev_ll).abs() < tol {
                debug!(
                    iterations = iter + 1,
                    log_likelihood = format!("{:.4}", ll),
                    "HMM converged"
                );
                break;
            }
            prev_ll = ll;

            if (iter + 1) % 10 == 0 {
                trace!(iteration = iter + 1, log_likelihood = format!("{:.4}", ll), "HMM EM step");
            }
        }

        Ok(model)
    }

    fn initialise(observations: &[f64], n_states: usize, sample_var: f64) -> Self {
        let mut sorted = observations.to_vec();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();

        let means = (0..n_states)
            .map(|k| {
                let lo = k * n / n_states;
                let hi = (k + 1) * n / n_states;
                mean(&sorted[lo..hi]).unwrap_or(0.0)
            })
            .collect();

        let off = (1.0 - INITIAL_STAY_PROB) / (n_states - 1) as f64;
        let transition = (0..n_states)
            .map(|i| {
                (0..n_states)
                    .map(|j| if i == j { INITIAL_STAY_PROB } else { off })
                    .collect()
            })
            .collect();

        Self {
            initial: vec![1.0 / n_states as f64; n_states],
            transition,
            means,
            variances: vec![sample_var; n_states],
            log_likelihood_history: Vec::new(),
        }
    }

    pub fn n_states(&self) -> usize {
        self.means.len()
    }

    /// Fitted emission means.
    pub fn means(&self) -> &[f64] {
        &self.means
    }

    /// Fitted emission variances, same order as [`means`](Self::means).
    pub fn variances(&self) -> &[f64] {
        &self.variances
    }

    /// Log-likelihood after the last EM step; `None` before any step.
    pub fn log_likelihood(&self) -> Option<f64> {
        self.log_likelihood_history.last().copied()
    }

    pub fn iterations(&self) -> usize {
        self.log_likelihood_history.len()
    }

    /// Rank of each state when states are sorted by fitted mean, ascending.
    pub fn mean_ranks(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.n_states()).collect();
        order.sort_by(|&a, &b| self.means[a].total_cmp(&self.means[b]));
        let mut ranks = vec![0; self.n_states()];
        for (rank, state) in order.into_iter().enumerate() {
            ranks[state] = rank;
        }
        ranks
    }

    fn log_pdf(&self, state: usize, x: f64) -> f64 {
        let var = self.variances[state];
        let d = x - self.means[state];
        -0.5 * ((2.0 * PI * var).ln() + d * d / var)
    }

    /// Emission densities rescaled per step, plus the log of each step's scale.
    fn emissions(&self, observations: &[f64]) -> (Vec<Vec<f64>>, Vec<f64>) {
        let n = self.n_states();
        let mut probs = Vec::with_capacity(observations.len());
        let mut log_scale = Vec::with_capacity(observations.len());
        for &x in observations {
            let logs: Vec<f64> = (0..n).map(|j| self.log_pdf(j, x)).collect();
            let max = logs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            probs.push(logs.iter().map(|l| (l - max).exp()).collect());
            log_scale.push(max);
        }
        (probs, log_scale)
    }

    /// One Baum-Welch iteration.  Returns the log-likelihood under the
    /// parameters *before* the update.
    fn em_step(&mut self, x: &[f64], var_floor: f64) -> f64 {
        let t_len = x.len();
        let n = self.n_states();
        let (b, log_scale) = self.emissions(x);

        // --- Forward (scaled) ---------------------------------------------
        let mut alpha = vec![vec![0.0_f64; n]; t_len];
        let mut scale = vec![0.0_f64; t_len];
        for j in 0..n {
            alpha[0][j] = self.initial[j] * b[0][j];
        }
        scale[0] = normalise(&mut alpha[0]);
        for t in 1..t_len {
            for j in 0..n {
                let inflow: f64 = (0..n).map(|i| alpha[t - 1][i] * self.transition[i][j]).sum();
                alpha[t][j] = inflow * b[t][j];
            }
            scale[t] = normalise(&mut alpha[t]);
        }

        let log_likelihood: f64 = scale.iter().map(|c| c.max(f64::MIN_POSITIVE).ln()).sum::<f64>()
            + log_scale.iter().sum::<f64>();

        // --- Backward (same scaling) --------------------------------------
        let mut beta = vec![vec![1.0_f64; n]; t_len];
        for t in (0..t_len - 1).rev() {
            let c = scale[t + 1].max(f64::MIN_POSITIVE);
            for i in 0..n {
                let s: f64 = (0..n)
                    .map(|j| self.transition[i][j] * b[t + 1][j] * beta[t + 1][j])
                    .sum();
                beta[t][i] = s / c;
            }
        }

        // --- Posteriors ---------------------------------------------------
        let mut gamma = vec![vec![0.0_f64; n]; t_len];
        for t in 0..t_len {
            for j in 0..n {
                gamma[t][j] = alpha[t][j] * beta[t][j];
            }
            normalise(&mut gamma[t]);
        }

        let mut xi = vec![vec![0.0_f64; n]; n];
        for t in 0..t_len - 1 {
            let c = scale[t + 1].max(f64::MIN_POSITIVE);
            for i in 0..n {
                for j in 0..n {
                    xi[i][j] += alpha[t][i] * self.transition[i][j] * b[t + 1][j] * beta[t + 1][j] / c;
                }
            }
        }

        // --- M-step -------------------------------------------------------
        self.initial = gamma[0].clone();
        floor_and_normalise(&mut self.initial);

        for (i, row) in xi.iter().enumerate() {
            let total: f64 = row.iter().sum();
            if total > f64::MIN_POSITIVE {
                self.transition[i] = row.iter().map(|v| v / total).collect();
            }
            floor_and_normalise(&mut self.transition[i]);
        }

        for j in 0..n {
            let weight: f64 = gamma.iter().map(|g| g[j]).sum();
            if weight <= f64::MIN_POSITIVE {
                continue;
            }
            let mu = gamma.iter().zip(x).map(|(g, xt)| g[j] * xt).sum::<f64>() / weight;
            let var = gamma
                .iter()
                .zip(x)
                .map(|(g, xt)| g[j] * (xt - mu).powi(2))
                .sum::<f64>()
                / weight;
            self.means[j] = mu;
            self.variances[j] = var.max(var_floor);
        }

        log_likelihood
    }

    /// Most likely state path (Viterbi, log space).
    pub fn decode(&self, observations: &[f64]) -> Vec<usize> {
        let t_len = observations.len();
        let n = self.n_states();
        if t_len == 0 {
            return Vec::new();
        }

        let log_a: Vec<Vec<f64>> = self
            .transition
            .iter()
            .map(|row| row.iter().map(|p| p.max(f64::MIN_POSITIVE).ln()).collect())
            .collect();

        let mut delta: Vec<f64> = (0..n)
            .map(|j| self.initial[j].max(f64::MIN_POSITIVE).ln() + self.log_pdf(j, observations[0]))
            .collect();
        let mut psi = vec![vec![0_usize; n]; t_len];

        for t in 1..t_len {
            let mut next = vec![f64::NEG_INFINITY; n];
            for j in 0..n {
                let (best_state, best_val) = (0..n)
                    .map(|i| (i, delta[i] + log_a[i][j]))
                    .fold((0, f64::NEG_INFINITY), |acc, cur| if cur.1 > acc.1 { cur } else { acc });
                next[j] = best_val + self.log_pdf(j, observations[t]);
                psi[t][j] = best_state;
            }
            delta = next;
        }

        let mut path = vec![0_usize; t_len];
        path[t_len - 1] = (0..n)
            .fold((0, f64::NEG_INFINITY), |acc, j| if delta[j] > acc.1 { (j, delta[j]) } else { acc })
            .0;
        for t in (0..t_len - 1).rev() {
            path[t] = psi[t + 1][path[t + 1]];
        }
        path
    }
}

/// Normalise `v` to sum to one; returns the original sum.
fn normalise(v: &mut [f64]) -> f64 {
    let sum: f64 = v.iter().sum();
    if sum > 0.0 {
        for p in v.iter_mut() {
            *p /= sum;
        }
    } else {
        let uniform = 1.0 / v.len() as f64;
        v.iter_mut().for_each(|p| *p = uniform);
    }
    sum
}

fn floor_and_normalise(v: &mut [f64]) {
    for p in v.iter_mut() {
        *p = p.max(PROB_FLOOR);
    }
    normalise(v);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    /// `n` draws from N(mean, std).
    pub(crate) fn normal_draws(rng: &mut StdRng, n: usize, mean: f64, std: f64) -> Vec<f64> {
        let dist = Normal::new(mean, std).unwrap();
        (0..n).map(|_| dist.sample(rng)).collect()
    }

    fn two_regimes() -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(42);
        let mut x = normal_draws(&mut rng, 200, 0.01, 0.002);
        x.extend(normal_draws(&mut rng, 200, -0.01, 0.002));
        x
    }

    #[test]
    fn separates_well_spaced_regimes() {
        let x = two_regimes();
        let model = GaussianHmm::fit(&x, 2, 200, 1e-4).unwrap();
        let ranks = model.mean_ranks();
        let path = model.decode(&x);
        assert_eq!(path.len(), x.len());

        let correct = path
            .iter()
            .enumerate()
            .filter(|&(t, &s)| {
                let expected_rank = if t < 200 { 1 } else { 0 };
                ranks[s] == expected_rank
            })
            .count();
        assert!(correct >= 390, "only {correct} of 400 decoded correctly");

        let mut means = model.means().to_vec();
        means.sort_by(f64::total_cmp);
        assert!((means[0] + 0.01).abs() < 0.002);
        assert!((means[1] - 0.01).abs() < 0.002);
    }

    #[test]
    fn transition_rows_are_distributions() {
        let model = GaussianHmm::fit(&two_regimes(), 3, 50, 1e-6).unwrap();
        for row in &model.transition {
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
        assert!(model.iterations() >= 1);
        assert!(model.log_likelihood().unwrap().is_finite());
    }

    #[test]
    fn log_likelihood_does_not_decrease() {
        let model = GaussianHmm::fit(&two_regimes(), 2, 30, 0.0).unwrap();
        for pair in model.log_likelihood_history.windows(2) {
            assert!(pair[1] >= pair[0] - 1e-6, "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn rejects_degenerate_input() {
        assert!(GaussianHmm::fit(&[0.01; 100], 2, 10, 1e-4).is_err());
        assert!(GaussianHmm::fit(&[0.01, 0.02, 0.03], 2, 10, 1e-4).is_err());
        assert!(GaussianHmm::fit(&two_regimes(), 1, 10, 1e-4).is_err());
    }

    #[test]
    fn mean_ranks_sort_ascending() {
        let model = GaussianHmm {
            initial: vec![0.5, 0.5, 0.0],
            transition: vec![vec![1.0 / 3.0; 3]; 3],
            means: vec![0.02, -0.03, 0.0],
            variances: vec![1.0; 3],
            log_likelihood_history: Vec::new(),
        };
        assert_eq!(model.mean_ranks(), vec![2, 0, 1]);
    }
}
