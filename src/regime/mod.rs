// =============================================================================
// Regime Detection Module
// =============================================================================
//
// Labels every observation of a return series with a market regime and
// summarises the labelled sample:
// - Volatility thresholds (rolling annualized vol bucketed into bands)
// - Gaussian hidden Markov model (Baum-Welch fit, Viterbi decode)
// - Per-regime return statistics and the empirical transition matrix

pub mod classifier;
pub mod detector;
#[cfg(feature = "latent-state")]
pub mod hmm;
pub mod statistics;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use classifier::{ThresholdClassifier, VolBand};
pub use detector::{RegimeAnalysis, RegimeDetector, RegimeMethod};

// =============================================================================
// RegimeLabel
// =============================================================================

/// Regime tag attached to one observation.
///
/// Ordering follows declaration order and is only used to keep tables
/// deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum RegimeLabel {
    LowVol,
    Normal,
    Elevated,
    Crisis,
    Bear,
    Bull,
    /// Rank of a latent state by mean return, for models with more than
    /// three states.
    State(usize),
    /// No rule matched (warm-up or undefined statistic).
    Unknown,
}

impl RegimeLabel {
    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }
}

impl std::fmt::Display for RegimeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LowVol => write!(f, "Low Vol"),
            Self::Normal => write!(f, "Normal"),
            Self::Elevated => write!(f, "Elevated"),
            Self::Crisis => write!(f, "Crisis"),
            Self::Bear => write!(f, "Bear"),
            Self::Bull => write!(f, "Bull"),
            Self::State(k) => write!(f, "State {k}"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

impl FromStr for RegimeLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Low Vol" => Ok(Self::LowVol),
            "Normal" => Ok(Self::Normal),
            "Elevated" => Ok(Self::Elevated),
            "Crisis" => Ok(Self::Crisis),
            "Bear" => Ok(Self::Bear),
            "Bull" => Ok(Self::Bull),
            "Unknown" => Ok(Self::Unknown),
            other => other
                .strip_prefix("State ")
                .and_then(|k| k.parse().ok())
                .map(Self::State)
                .ok_or_else(|| format!("unknown regime label '{other}'")),
        }
    }
}

impl From<RegimeLabel> for String {
    fn from(label: RegimeLabel) -> Self {
        label.to_string()
    }
}

impl TryFrom<String> for RegimeLabel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// =============================================================================
// RegimeSeries
// =============================================================================

/// One regime label per timestamp of the classified return series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeSeries {
    timestamps: Vec<DateTime<Utc>>,
    labels: Vec<RegimeLabel>,
}

impl RegimeSeries {
    /// Pair labels with an existing (already validated) index.
    pub(crate) fn new(timestamps: Vec<DateTime<Utc>>, labels: Vec<RegimeLabel>) -> Self {
        debug_assert_eq!(timestamps.len(), labels.len());
        Self { timestamps, labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn labels(&self) -> &[RegimeLabel] {
        &self.labels
    }

    /// Label of the most recent observation.
    pub fn current(&self) -> Option<RegimeLabel> {
        self.labels.last().copied()
    }

    /// Indices where the label differs from the previous known label.
    pub fn changes(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let mut prev: Option<RegimeLabel> = None;
        for (i, &label) in self.labels.iter().enumerate() {
            if !label.is_known() {
                continue;
            }
            if matches!(prev, Some(p) if p != label) {
                out.push(i);
            }
            prev = Some(label);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_display_roundtrip() {
        for label in [
            RegimeLabel::LowVol,
            RegimeLabel::Normal,
            RegimeLabel::Elevated,
            RegimeLabel::Crisis,
            RegimeLabel::Bear,
            RegimeLabel::Bull,
            RegimeLabel::State(4),
            RegimeLabel::Unknown,
        ] {
            assert_eq!(label.to_string().parse::<RegimeLabel>().unwrap(), label);
        }
        assert!("Sideways".parse::<RegimeLabel>().is_err());
    }

    #[test]
    fn label_serialises_as_display_string() {
        let json = serde_json::to_string(&RegimeLabel::LowVol).unwrap();
        assert_eq!(json, "\"Low Vol\"");
        let back: RegimeLabel = serde_json::from_str("\"State 2\"").unwrap();
        assert_eq!(back, RegimeLabel::State(2));
    }

    #[test]
    fn changes_skip_unknown() {
        let ts = crate::types::tests::daily_index(6);
        let series = RegimeSeries::new(
            ts,
            vec![
                RegimeLabel::Unknown,
                RegimeLabel::Normal,
                RegimeLabel::Normal,
                RegimeLabel::Unknown,
                RegimeLabel::Crisis,
                RegimeLabel::Crisis,
            ],
        );
        assert_eq!(series.changes(), vec![4]);
        assert_eq!(series.current(), Some(RegimeLabel::Crisis));
    }
}
