// =============================================================================
// Analysis Configuration — JSON settings
// =============================================================================
//
// Every tunable of a batch run lives here: which symbols, where prices come
// from, which signal is analysed, and the decay / regime parameters.
//
// All fields carry `#[serde(default)]` so that a partial (or empty) JSON file
// loads with the remaining values at their defaults.
//
// =============================================================================

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::decay::{breakpoints, SignalKind};
use crate::market_data::DataSource;
use crate::regime::classifier::default_vol_bands;
use crate::regime::{RegimeDetector, RegimeMethod, ThresholdClassifier, VolBand};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbols() -> Vec<String> {
    vec!["SPY".to_string()]
}

fn default_decay_window() -> usize {
    252
}

fn default_breakpoint_threshold() -> f64 {
    breakpoints::DEFAULT_THRESHOLD
}

fn default_cluster_gap_days() -> i64 {
    breakpoints::DEFAULT_MIN_GAP_DAYS
}

fn default_regime_window() -> usize {
    20
}

fn default_hmm_states() -> usize {
    3
}

fn default_hmm_max_iter() -> usize {
    200
}

fn default_hmm_tol() -> f64 {
    1e-4
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_fetch_retries() -> u32 {
    3
}

// =============================================================================
// DecayParams
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayParams {
    /// Rolling window for Sharpe and CUSUM statistics (autocorrelation uses
    /// twice this).
    #[serde(default = "default_decay_window")]
    pub window: usize,

    /// |z| above which a CUSUM point is flagged.
    #[serde(default = "default_breakpoint_threshold")]
    pub breakpoint_threshold: f64,

    /// Flags closer than this (calendar days) to the last kept breakpoint
    /// are merged into it.
    #[serde(default = "default_cluster_gap_days")]
    pub cluster_gap_days: i64,
}

impl Default for DecayParams {
    fn default() -> Self {
        Self {
            window: default_decay_window(),
            breakpoint_threshold: default_breakpoint_threshold(),
            cluster_gap_days: default_cluster_gap_days(),
        }
    }
}

// =============================================================================
// RegimeParams
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeParams {
    #[serde(default)]
    pub method: RegimeMethod,

    /// Rolling volatility window for the threshold classifier.
    #[serde(default = "default_regime_window")]
    pub window: usize,

    /// Annualized volatility bands (percent), evaluated ascending.
    #[serde(default = "default_vol_bands")]
    pub vol_bands: Vec<VolBand>,

    #[serde(default = "default_hmm_states")]
    pub hmm_states: usize,

    #[serde(default = "default_hmm_max_iter")]
    pub hmm_max_iter: usize,

    #[serde(default = "default_hmm_tol")]
    pub hmm_tol: f64,
}

impl Default for RegimeParams {
    fn default() -> Self {
        Self {
            method: RegimeMethod::default(),
            window: default_regime_window(),
            vol_bands: default_vol_bands(),
            hmm_states: default_hmm_states(),
            hmm_max_iter: default_hmm_max_iter(),
            hmm_tol: default_hmm_tol(),
        }
    }
}

impl RegimeParams {
    pub fn detector(&self) -> RegimeDetector {
        RegimeDetector::new(
            self.method,
            ThresholdClassifier::new(self.window, self.vol_bands.clone()),
        )
        .with_latent_state(self.hmm_states, self.hmm_max_iter, self.hmm_tol)
    }
}

// =============================================================================
// AnalysisConfig
// =============================================================================

/// Top-level configuration for a batch analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Instruments to analyse, in order.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    #[serde(default)]
    pub data_source: DataSource,

    /// Return stream whose decay is analysed.
    #[serde(default)]
    pub signal: SignalKind,

    #[serde(default)]
    pub decay: DecayParams,

    #[serde(default)]
    pub regime: RegimeParams,

    /// Per-request HTTP timeout.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Attempts per instrument before the fetch is abandoned.
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,

    /// Directory for `{symbol}_analysis.json` reports; none written if unset.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            data_source: DataSource::default(),
            signal: SignalKind::default(),
            decay: DecayParams::default(),
            regime: RegimeParams::default(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            fetch_retries: default_fetch_retries(),
            output_dir: None,
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// A missing file is an error so the caller can fall back to defaults
    /// with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read analysis config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse analysis config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            signal = %config.signal,
            regime_method = %config.regime.method,
            "analysis config loaded"
        );

        Ok(config)
    }

    /// Replace the symbol list from a comma-separated string; blank entries
    /// are dropped and symbols upper-cased.  An empty result keeps the
    /// current list.
    pub fn override_symbols(&mut self, raw: &str) {
        let symbols: Vec<String> = raw
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if !symbols.is_empty() {
            self.symbols = symbols;
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
